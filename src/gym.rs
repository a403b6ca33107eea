//! Deep Hedging Gym
//!
//! The sequential rollout-and-objective engine: rolls a policy out across a
//! batch of market paths one time step at a time, accumulates position,
//! P&L and trading cost, and reduces the terminal outcome into a monetary
//! utility used as optimization loss.
//!
//! The design pattern here is that the gym instantiates its collaborators:
//! the gym learns the instrument count from the first market batch, so it
//! owns policy and utility construction through factories.

use burn::prelude::*;
use tracing::{debug, info};

use crate::clip::{ensure_finite, ActionClip};
use crate::config::GymConfig;
use crate::error::{GymError, Result};
use crate::features::FeatureSet;
use crate::market::MarketPath;
use crate::objective::{Utility, UtilityFactory};
use crate::policy::{Policy, PolicyFactory, RecurrentState};

/// Analytics of one rollout, per path.
///
/// `loss` retains a differentiable path back to the policy parameters; all
/// other fields are detached reporting artifacts.
#[derive(Debug, Clone)]
pub struct RolloutResult<B: Backend> {
    /// Training objective `-(utility + utility0)`, `[B]`
    pub loss: Tensor<B, 1>,
    /// Utility of the hedged outcome, `[B]`
    pub utility: Tensor<B, 1>,
    /// Utility of the zero-hedge baseline, `[B]`
    pub utility0: Tensor<B, 1>,
    /// Total gains `payoff + pnl - cost`, `[B]`
    pub gains: Tensor<B, 1>,
    /// Terminal payoff, `[B]`
    pub payoff: Tensor<B, 1>,
    /// Mid-price hedging P&L excluding cost, `[B]`
    pub pnl: Tensor<B, 1>,
    /// Cumulative trading cost, `[B]`
    pub cost: Tensor<B, 1>,
    /// Clipped action per step and instrument, `[B, T, N]`
    pub actions: Tensor<B, 3>,
}

struct BoundCollaborators<B: Backend> {
    policy: Box<dyn Policy<B>>,
    utility: Box<dyn Utility<B>>,
    utility0: Box<dyn Utility<B>>,
    n_instruments: usize,
}

/// Vanilla periodic policy search deep hedging engine.
pub struct HedgeGym<B: Backend> {
    config: GymConfig,
    clip: ActionClip,
    policy_factory: Box<dyn PolicyFactory<B>>,
    utility_factory: Box<dyn UtilityFactory<B>>,
    bound: Option<BoundCollaborators<B>>,
}

impl<B: Backend> HedgeGym<B> {
    /// Set up the gym. Collaborators are instantiated later via [`build`],
    /// once the instrument count is known.
    ///
    /// [`build`]: HedgeGym::build
    pub fn new(
        config: GymConfig,
        policy_factory: Box<dyn PolicyFactory<B>>,
        utility_factory: Box<dyn UtilityFactory<B>>,
    ) -> Result<Self> {
        let clip = ActionClip::new(&config.clip)?;
        if let Some(seed) = config.seed {
            B::seed(seed);
        }
        Ok(Self {
            config,
            clip,
            policy_factory,
            utility_factory,
            bound: None,
        })
    }

    /// Instantiate the policy and both utility instances for a concrete
    /// instrument count.
    pub fn build(&mut self, n_instruments: usize, device: &B::Device) -> Result<()> {
        if self.bound.is_some() {
            return Err(GymError::InvalidState("build() called twice".to_string()));
        }
        let policy = self.policy_factory.build(n_instruments, device)?;
        let utility = self.utility_factory.build(device)?;
        let utility0 = self.utility_factory.build(device)?;
        info!(n_instruments, "built hedge gym collaborators");
        self.bound = Some(BoundCollaborators {
            policy,
            utility,
            utility0,
            n_instruments,
        });
        Ok(())
    }

    pub fn is_built(&self) -> bool {
        self.bound.is_some()
    }

    pub fn config(&self) -> &GymConfig {
        &self.config
    }

    /// Roll the policy out over one batch of market paths.
    ///
    /// Exactly `T` sequential steps; per-path computation within a step is
    /// vectorized across the batch axis. A rollout is an atomic unit of
    /// work: it either returns a complete result bundle or aborts with a
    /// fault.
    pub fn rollout(
        &self,
        market: &MarketPath<B>,
        features: &FeatureSet<B>,
    ) -> Result<RolloutResult<B>> {
        let bound = self.bound.as_ref().ok_or_else(|| {
            GymError::InvalidState("rollout invoked before build()".to_string())
        })?;
        let n_paths = market.n_paths();
        let n_steps = market.n_steps();
        let n_instruments = market.n_instruments();
        if bound.n_instruments != n_instruments {
            return Err(GymError::InvalidState(format!(
                "gym built for {} instruments, market has {}",
                bound.n_instruments, n_instruments
            )));
        }
        let device = market.hedges().device();
        debug!(n_paths, n_steps, n_instruments, "starting rollout");

        let normalized = features.normalize(n_paths, n_steps)?;
        let payoff = market.payoff().clone();

        let mut pnl = Tensor::<B, 1>::zeros([n_paths], &device);
        let mut cost = Tensor::<B, 1>::zeros([n_paths], &device);
        let mut delta = Tensor::<B, 2>::zeros([n_paths, n_instruments], &device);
        let mut action = Tensor::<B, 2>::zeros([n_paths, n_instruments], &device);
        let mut history: Vec<Tensor<B, 2>> = Vec::with_capacity(n_steps);
        let mut state = RecurrentState::init(bound.policy.as_ref(), n_paths, &device)?;

        for t in 0..n_steps {
            // Live features: supplied features first, running state last so
            // the engine-owned keys always win.
            let mut live = normalized.at_step(t);
            live.insert("action".to_string(), action.clone());
            live.insert("delta".to_string(), delta.clone());
            live.insert("cost".to_string(), cost.clone().unsqueeze_dim::<2>(1));
            live.insert("pnl".to_string(), pnl.clone().unsqueeze_dim::<2>(1));
            if let Some(current) = state.value() {
                live.insert(
                    bound.policy.state_feature_name().to_string(),
                    current.clone(),
                );
            }

            let (raw, new_state) = bound.policy.act(&live)?;
            let raw = match raw.dims() {
                [b, n] if b == n_paths && n == n_instruments => raw,
                [1, n] if n == n_instruments => raw.expand([n_paths, n_instruments]),
                dims => {
                    return Err(GymError::ShapeMismatch {
                        field: "policy action".to_string(),
                        expected: format!("[{n_paths}, {n_instruments}] or [1, {n_instruments}]"),
                        actual: format!("{dims:?}"),
                    })
                }
            };

            let lbnd_t = MarketPath::slice_step(market.lbnd(), t);
            let ubnd_t = MarketPath::slice_step(market.ubnd(), t);
            let clipped = self.clip.apply(raw, lbnd_t, ubnd_t)?;

            state.replace(new_state);
            delta = delta + clipped.clone();

            // Record actions per path, per step; detached so the reported
            // history does not retain the backward graph across all steps.
            history.push(clipped.clone().detach());

            let cost_t = MarketPath::slice_step(market.cost(), t);
            let hedges_t = MarketPath::slice_step(market.hedges(), t);
            cost = cost + (clipped.clone().abs() * cost_t).sum_dim(1).squeeze::<1>(1);
            pnl = pnl + (clipped.clone() * hedges_t).sum_dim(1).squeeze::<1>(1);

            action = clipped;
        }

        ensure_finite(&pnl, "pnl")?;
        ensure_finite(&cost, "cost")?;

        let features_t0 = normalized.at_step(0);
        let utility = bound
            .utility
            .call(payoff.clone(), pnl.clone(), cost.clone(), &features_t0)?;
        let utility0 = bound.utility0.call(
            payoff.clone(),
            pnl.zeros_like(),
            cost.zeros_like(),
            &features_t0,
        )?;
        check_utility_shape(&utility, n_paths, "utility")?;
        check_utility_shape(&utility0, n_paths, "utility0")?;

        let loss = (utility.clone() + utility0.clone()).neg();
        let gains = payoff.clone() + pnl.clone() - cost.clone();

        Ok(RolloutResult {
            loss,
            utility: utility.detach(),
            utility0: utility0.detach(),
            gains: gains.detach(),
            payoff: payoff.detach(),
            pnl: pnl.detach(),
            cost: cost.detach(),
            actions: Tensor::stack::<3>(history, 1),
        })
    }
}

fn check_utility_shape<B: Backend>(
    utility: &Tensor<B, 1>,
    n_paths: usize,
    field: &str,
) -> Result<()> {
    if utility.dims() != [n_paths] {
        return Err(GymError::ShapeMismatch {
            field: field.to_string(),
            expected: format!("[{n_paths}]"),
            actual: format!("{:?}", utility.dims()),
        });
    }
    Ok(())
}
