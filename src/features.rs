//! Feature Assembler
//!
//! Normalizes externally supplied per-step and per-path auxiliary data into
//! flat name-keyed mappings with canonical tensor ranks, ready to be merged
//! with live rollout state at each time step.

use std::collections::HashMap;

use burn::prelude::*;

use crate::error::{GymError, Result};

/// A per-step feature as supplied by the caller.
///
/// `Flat` carries one value per path and step `[B, T]`; `Full` carries a
/// vector per path and step `[B, T, M]`.
#[derive(Debug, Clone)]
pub enum StepFeature<B: Backend> {
    Flat(Tensor<B, 2>),
    Full(Tensor<B, 3>),
}

impl<B: Backend> From<Tensor<B, 2>> for StepFeature<B> {
    fn from(tensor: Tensor<B, 2>) -> Self {
        Self::Flat(tensor)
    }
}

impl<B: Backend> From<Tensor<B, 3>> for StepFeature<B> {
    fn from(tensor: Tensor<B, 3>) -> Self {
        Self::Full(tensor)
    }
}

/// A per-path feature as supplied by the caller: `[B]` or `[B, M]`.
#[derive(Debug, Clone)]
pub enum PathFeature<B: Backend> {
    Flat(Tensor<B, 1>),
    Full(Tensor<B, 2>),
}

impl<B: Backend> From<Tensor<B, 1>> for PathFeature<B> {
    fn from(tensor: Tensor<B, 1>) -> Self {
        Self::Flat(tensor)
    }
}

impl<B: Backend> From<Tensor<B, 2>> for PathFeature<B> {
    fn from(tensor: Tensor<B, 2>) -> Self {
        Self::Full(tensor)
    }
}

/// Raw feature bundle for one rollout invocation.
#[derive(Debug, Clone)]
pub struct FeatureSet<B: Backend> {
    per_step: HashMap<String, StepFeature<B>>,
    per_path: HashMap<String, PathFeature<B>>,
}

impl<B: Backend> Default for FeatureSet<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> FeatureSet<B> {
    pub fn new() -> Self {
        Self {
            per_step: HashMap::new(),
            per_path: HashMap::new(),
        }
    }

    /// Add a feature available at every time step.
    pub fn with_per_step(mut self, name: impl Into<String>, feature: impl Into<StepFeature<B>>) -> Self {
        self.per_step.insert(name.into(), feature.into());
        self
    }

    /// Add a feature constant along the path.
    pub fn with_per_path(mut self, name: impl Into<String>, feature: impl Into<PathFeature<B>>) -> Self {
        self.per_path.insert(name.into(), feature.into());
        self
    }

    /// Validate and normalize all features to canonical ranks: per-step to
    /// `[B, T, M]`, per-path to `[B, M]`.
    ///
    /// Pure transform; nothing is cached across calls since feature sets may
    /// change per invocation.
    pub fn normalize(&self, n_paths: usize, n_steps: usize) -> Result<NormalizedFeatures<B>> {
        let mut per_step = HashMap::with_capacity(self.per_step.len());
        for (name, feature) in &self.per_step {
            let full = match feature {
                StepFeature::Flat(t) => t.clone().unsqueeze_dim::<3>(2),
                StepFeature::Full(t) => t.clone(),
            };
            let [b, t, _m] = full.dims();
            if b != n_paths || t != n_steps {
                return Err(GymError::ShapeMismatch {
                    field: format!("features.per_step.{name}"),
                    expected: format!("[{n_paths}, {n_steps}, *]"),
                    actual: format!("{:?}", full.dims()),
                });
            }
            per_step.insert(name.clone(), full);
        }

        let mut per_path = HashMap::with_capacity(self.per_path.len());
        for (name, feature) in &self.per_path {
            let full = match feature {
                PathFeature::Flat(t) => t.clone().unsqueeze_dim::<2>(1),
                PathFeature::Full(t) => t.clone(),
            };
            let [b, _m] = full.dims();
            if b != n_paths {
                return Err(GymError::ShapeMismatch {
                    field: format!("features.per_path.{name}"),
                    expected: format!("[{n_paths}, *]"),
                    actual: format!("{:?}", full.dims()),
                });
            }
            per_path.insert(name.clone(), full);
        }

        Ok(NormalizedFeatures { per_step, per_path })
    }
}

/// Features after validation, at canonical ranks.
#[derive(Debug, Clone)]
pub struct NormalizedFeatures<B: Backend> {
    pub per_step: HashMap<String, Tensor<B, 3>>,
    pub per_path: HashMap<String, Tensor<B, 2>>,
}

impl<B: Backend> NormalizedFeatures<B> {
    /// Flat `[B, M]` view of every feature at time step `t`: per-path
    /// features in full, per-step features sliced at `t`.
    pub fn at_step(&self, t: usize) -> HashMap<String, Tensor<B, 2>> {
        let mut live = HashMap::with_capacity(self.per_step.len() + self.per_path.len());
        for (name, feature) in &self.per_path {
            live.insert(name.clone(), feature.clone());
        }
        for (name, feature) in &self.per_step {
            let [b, _t, m] = feature.dims();
            live.insert(
                name.clone(),
                feature.clone().slice([0..b, t..t + 1, 0..m]).squeeze::<2>(1),
            );
        }
        live
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_flat_per_step_normalized_to_rank_3() {
        let device = Default::default();
        let features = FeatureSet::<TestBackend>::new()
            .with_per_step("price", Tensor::<TestBackend, 2>::zeros([4, 3], &device));

        let normalized = features.normalize(4, 3).unwrap();

        assert_eq!(normalized.per_step["price"].dims(), [4, 3, 1]);
    }

    #[test]
    fn test_flat_per_path_normalized_to_rank_2() {
        let device = Default::default();
        let features = FeatureSet::<TestBackend>::new()
            .with_per_path("spot", Tensor::<TestBackend, 1>::zeros([4], &device));

        let normalized = features.normalize(4, 3).unwrap();

        assert_eq!(normalized.per_path["spot"].dims(), [4, 1]);
    }

    #[test]
    fn test_step_count_mismatch_names_feature() {
        let device = Default::default();
        let features = FeatureSet::<TestBackend>::new()
            .with_per_step("vol", Tensor::<TestBackend, 2>::zeros([4, 5], &device));

        let err = features.normalize(4, 3).unwrap_err();

        match err {
            GymError::ShapeMismatch { field, .. } => {
                assert_eq!(field, "features.per_step.vol");
            }
            other => panic!("expected shape mismatch, found {other:?}"),
        }
    }

    #[test]
    fn test_batch_mismatch_rejected() {
        let device = Default::default();
        let features = FeatureSet::<TestBackend>::new()
            .with_per_path("spot", Tensor::<TestBackend, 1>::zeros([2], &device));

        assert!(features.normalize(4, 3).is_err());
    }

    #[test]
    fn test_at_step_slices_per_step_features() {
        let device = Default::default();
        let price = Tensor::<TestBackend, 3>::from_floats(
            [[[1.0], [2.0], [3.0]], [[4.0], [5.0], [6.0]]],
            &device,
        );
        let features = FeatureSet::<TestBackend>::new()
            .with_per_step("price", price)
            .with_per_path("spot", Tensor::<TestBackend, 1>::from_floats([9.0, 8.0], &device));

        let live = features.normalize(2, 3).unwrap().at_step(1);

        assert_eq!(live["price"].dims(), [2, 1]);
        assert_eq!(
            live["price"].to_data().to_vec::<f32>().unwrap(),
            vec![2.0, 5.0]
        );
        assert_eq!(live["spot"].dims(), [2, 1]);
    }
}
