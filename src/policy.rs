//! Policy call contract and recurrent state management.
//!
//! The gym consumes policies only through this narrow interface: a flat
//! name-keyed feature mapping in, a raw action plus an optional updated
//! recurrent state out. The engine never inspects the state's content.

use std::collections::HashMap;

use burn::prelude::*;

use crate::error::{GymError, Result};

/// Flat feature mapping handed to policies and utilities: every entry is
/// `[B, M]` for some per-feature width M.
pub type Features<B> = HashMap<String, Tensor<B, 2>>;

/// A hedging policy.
///
/// `act` receives the live features of the current step and returns the raw
/// (pre-clip) action `[B, N]` or `[1, N]`, plus the updated recurrent state
/// for stateful policies.
pub trait Policy<B: Backend> {
    /// Whether the policy carries state across time steps.
    fn is_recurrent(&self) -> bool {
        false
    }

    /// Feature name under which the engine passes the current recurrent
    /// state back to the policy. Meaningful only for recurrent policies.
    fn state_feature_name(&self) -> &str {
        "recurrent_state"
    }

    /// Initial recurrent state, rank-1 `[S]`, broadcast across the batch by
    /// the engine. Recurrent policies must return a value.
    fn init_state(&self, _device: &B::Device) -> Option<Tensor<B, 1>> {
        None
    }

    fn act(&self, features: &Features<B>) -> Result<(Tensor<B, 2>, Option<Tensor<B, 2>>)>;
}

/// Builds a policy once the instrument count is known. The gym learns the
/// instrument count from the first market batch, so it owns construction.
pub trait PolicyFactory<B: Backend> {
    fn build(&self, n_instruments: usize, device: &B::Device) -> Result<Box<dyn Policy<B>>>;
}

/// Recurrent state threaded through a rollout.
///
/// A stateless policy is represented uniformly by the `Stateless` variant so
/// the rollout loop has a single code path.
#[derive(Debug, Clone)]
pub enum RecurrentState<B: Backend> {
    Stateless,
    Stateful(Tensor<B, 2>),
}

impl<B: Backend> RecurrentState<B> {
    /// Obtain the initial state from the policy and tile it across the
    /// batch axis.
    pub fn init(policy: &dyn Policy<B>, n_paths: usize, device: &B::Device) -> Result<Self> {
        if !policy.is_recurrent() {
            return Ok(Self::Stateless);
        }
        let initial = policy.init_state(device).ok_or_else(|| {
            GymError::Policy("recurrent policy did not provide an initial state".to_string())
        })?;
        let [state_dim] = initial.dims();
        Ok(Self::Stateful(
            initial.unsqueeze_dim::<2>(0).expand([n_paths, state_dim]),
        ))
    }

    /// Current state value, if any.
    pub fn value(&self) -> Option<&Tensor<B, 2>> {
        match self {
            Self::Stateless => None,
            Self::Stateful(state) => Some(state),
        }
    }

    /// All-or-nothing replacement: a new value from the policy fully
    /// replaces the tracked state, `None` leaves it unchanged. A stateless
    /// rollout ignores updates entirely.
    pub fn replace(&mut self, new_state: Option<Tensor<B, 2>>) {
        if let Self::Stateful(current) = self {
            if let Some(next) = new_state {
                *current = next;
            }
        }
    }
}
