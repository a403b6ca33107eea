//! Policy Networks
//!
//! Reference policy implementations on top of the call contract in
//! [`crate::policy`]: a stateless feed-forward network and a recurrent
//! network with a bounded state head.
//!
//! Both consume a configured, ordered list of feature names and concatenate
//! the named tensors into the network input.

use burn::module::Ignored;
use burn::nn::{Linear, LinearConfig, Relu};
use burn::prelude::*;

use crate::error::{GymError, Result as GymResult};
use crate::policy::{Features, Policy, PolicyFactory};

/// Feature name under which recurrent policies receive their own state.
pub const RECURRENT_STATE_FEATURE: &str = "recurrent_state";

/// Feed-forward policy configuration
#[derive(Config, Debug)]
pub struct FeedForwardPolicyConfig {
    /// Total width of the concatenated input features
    pub input_dim: usize,
    /// Hidden layer dimension
    #[config(default = "64")]
    pub hidden_dim: usize,
}

/// Stateless feed-forward policy: features in, one raw action per
/// instrument out.
#[derive(Module, Debug)]
pub struct FeedForwardPolicy<B: Backend> {
    fc1: Linear<B>,
    fc2: Linear<B>,
    action_head: Linear<B>,
    activation: Relu,
    features: Ignored<Vec<String>>,
}

impl FeedForwardPolicyConfig {
    /// Initialize the network for a given instrument count and feature list.
    pub fn init<B: Backend>(
        &self,
        n_instruments: usize,
        features: Vec<String>,
        device: &B::Device,
    ) -> FeedForwardPolicy<B> {
        FeedForwardPolicy {
            fc1: LinearConfig::new(self.input_dim, self.hidden_dim).init(device),
            fc2: LinearConfig::new(self.hidden_dim, self.hidden_dim).init(device),
            action_head: LinearConfig::new(self.hidden_dim, n_instruments).init(device),
            activation: Relu::new(),
            features: Ignored(features),
        }
    }
}

impl<B: Backend> FeedForwardPolicy<B> {
    fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let hidden = self.activation.forward(self.fc1.forward(input));
        let hidden = self.activation.forward(self.fc2.forward(hidden));
        self.action_head.forward(hidden)
    }
}

impl<B: Backend> Policy<B> for FeedForwardPolicy<B> {
    fn act(&self, features: &Features<B>) -> GymResult<(Tensor<B, 2>, Option<Tensor<B, 2>>)> {
        let input = concat_features(features, &self.features.0)?;
        Ok((self.forward(input), None))
    }
}

/// Factory producing [`FeedForwardPolicy`] instances.
#[derive(Debug, Clone)]
pub struct FeedForwardPolicyFactory {
    config: FeedForwardPolicyConfig,
    features: Vec<String>,
}

impl FeedForwardPolicyFactory {
    pub fn new(config: FeedForwardPolicyConfig, features: Vec<String>) -> Self {
        Self { config, features }
    }
}

impl<B: Backend> PolicyFactory<B> for FeedForwardPolicyFactory {
    fn build(&self, n_instruments: usize, device: &B::Device) -> GymResult<Box<dyn Policy<B>>> {
        Ok(Box::new(self.config.init(
            n_instruments,
            self.features.clone(),
            device,
        )))
    }
}

/// Recurrent policy configuration
#[derive(Config, Debug)]
pub struct RecurrentPolicyConfig {
    /// Total width of the concatenated input features, excluding the state
    pub input_dim: usize,
    /// Hidden layer dimension
    #[config(default = "64")]
    pub hidden_dim: usize,
    /// Width of the recurrent state
    #[config(default = "16")]
    pub state_dim: usize,
}

/// Recurrent policy: features plus current state in, action plus a
/// tanh-bounded replacement state out.
#[derive(Module, Debug)]
pub struct RecurrentPolicy<B: Backend> {
    fc: Linear<B>,
    action_head: Linear<B>,
    state_head: Linear<B>,
    activation: Relu,
    features: Ignored<Vec<String>>,
    state_dim: Ignored<usize>,
}

impl RecurrentPolicyConfig {
    pub fn init<B: Backend>(
        &self,
        n_instruments: usize,
        features: Vec<String>,
        device: &B::Device,
    ) -> RecurrentPolicy<B> {
        RecurrentPolicy {
            fc: LinearConfig::new(self.input_dim + self.state_dim, self.hidden_dim).init(device),
            action_head: LinearConfig::new(self.hidden_dim, n_instruments).init(device),
            state_head: LinearConfig::new(self.hidden_dim, self.state_dim).init(device),
            activation: Relu::new(),
            features: Ignored(features),
            state_dim: Ignored(self.state_dim),
        }
    }
}

impl<B: Backend> Policy<B> for RecurrentPolicy<B> {
    fn is_recurrent(&self) -> bool {
        true
    }

    fn state_feature_name(&self) -> &str {
        RECURRENT_STATE_FEATURE
    }

    fn init_state(&self, device: &B::Device) -> Option<Tensor<B, 1>> {
        Some(Tensor::zeros([self.state_dim.0], device))
    }

    fn act(&self, features: &Features<B>) -> GymResult<(Tensor<B, 2>, Option<Tensor<B, 2>>)> {
        let state = features
            .get(RECURRENT_STATE_FEATURE)
            .ok_or_else(|| GymError::MissingFeature(RECURRENT_STATE_FEATURE.to_string()))?
            .clone();
        let input = Tensor::cat(vec![concat_features(features, &self.features.0)?, state], 1);

        let hidden = self.activation.forward(self.fc.forward(input));
        let action = self.action_head.forward(hidden.clone());
        // Keep the state bounded so a long rollout cannot blow it up
        let new_state = self.state_head.forward(hidden).tanh();

        Ok((action, Some(new_state)))
    }
}

/// Factory producing [`RecurrentPolicy`] instances.
#[derive(Debug, Clone)]
pub struct RecurrentPolicyFactory {
    config: RecurrentPolicyConfig,
    features: Vec<String>,
}

impl RecurrentPolicyFactory {
    pub fn new(config: RecurrentPolicyConfig, features: Vec<String>) -> Self {
        Self { config, features }
    }
}

impl<B: Backend> PolicyFactory<B> for RecurrentPolicyFactory {
    fn build(&self, n_instruments: usize, device: &B::Device) -> GymResult<Box<dyn Policy<B>>> {
        Ok(Box::new(self.config.init(
            n_instruments,
            self.features.clone(),
            device,
        )))
    }
}

/// Concatenate named features along the width axis, in the order given.
fn concat_features<B: Backend>(features: &Features<B>, names: &[String]) -> GymResult<Tensor<B, 2>> {
    if names.is_empty() {
        return Err(GymError::Config(
            "policy network consumes no features".to_string(),
        ));
    }
    let mut parts = Vec::with_capacity(names.len());
    for name in names {
        let feature = features
            .get(name)
            .ok_or_else(|| GymError::MissingFeature(name.clone()))?;
        parts.push(feature.clone());
    }
    Ok(Tensor::cat(parts, 1))
}
