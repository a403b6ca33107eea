//! Bounded Action Transform
//!
//! Maps raw policy actions into per-step, per-instrument admissible
//! intervals. The smooth variant keeps gradients flowing through the
//! boundary; the hard variant is for debugging.

use burn::prelude::*;

use crate::config::ClipConfig;
use crate::error::{GymError, Result};

/// Lower limit on interval width used to guard the rescaling division.
/// Narrower intervals are treated as degenerate and forced to a zero action.
const MIN_INTERVAL_WIDTH: f64 = 1e-8;

/// Clipping algorithm, fixed when the transform is constructed.
#[derive(Debug, Clone, PartialEq)]
pub enum ClipMode {
    /// Elementwise min/max against the bounds. Not differentiable at the
    /// boundary; debugging aid.
    Hard,
    /// Smooth squash into the bounds, optionally preceded by a hard guard at
    /// `outer_cut_off` times the bounds. The guard caps extreme pre-clip
    /// magnitudes, which occur when an action has no effect on the gains
    /// process and is therefore unconstrained by gradients.
    Soft {
        outer_cut_off: Option<f64>,
        hinge_softness: f64,
    },
}

/// Differentiable bounded action transform.
#[derive(Debug, Clone)]
pub struct ActionClip {
    mode: ClipMode,
}

impl ActionClip {
    /// Build the transform from configuration, validating its parameters.
    pub fn new(config: &ClipConfig) -> Result<Self> {
        let mode = if config.hard_clip {
            ClipMode::Hard
        } else {
            if config.outer_clip && config.outer_clip_cut_off < 1.0 {
                return Err(GymError::Config(format!(
                    "outer_clip_cut_off must be >= 1, found {}",
                    config.outer_clip_cut_off
                )));
            }
            if config.hinge_softness <= 0.0 {
                return Err(GymError::Config(format!(
                    "hinge_softness must be > 0, found {}",
                    config.hinge_softness
                )));
            }
            ClipMode::Soft {
                outer_cut_off: config.outer_clip.then_some(config.outer_clip_cut_off),
                hinge_softness: config.hinge_softness,
            }
        };
        Ok(Self { mode })
    }

    /// Selected clipping mode.
    pub fn mode(&self) -> &ClipMode {
        &self.mode
    }

    /// Clip a raw action `[B, N]` into `[lbnd, ubnd]`.
    ///
    /// The bound ordering and sign preconditions are checked on every call.
    /// A non-finite raw or clipped action is reported as a numerical fault;
    /// the raw side is checked explicitly because elementwise min/max would
    /// silently swallow a NaN instead of propagating it.
    pub fn apply<B: Backend>(
        &self,
        raw: Tensor<B, 2>,
        lbnd: Tensor<B, 2>,
        ubnd: Tensor<B, 2>,
    ) -> Result<Tensor<B, 2>> {
        check_bounds(&lbnd, &ubnd)?;
        ensure_finite(&raw, "raw action")?;

        let clipped = match &self.mode {
            ClipMode::Hard => raw.min_pair(ubnd).max_pair(lbnd),
            ClipMode::Soft {
                outer_cut_off,
                hinge_softness,
            } => {
                let raw = match outer_cut_off {
                    Some(cut_off) => raw
                        .min_pair(ubnd.clone().mul_scalar(*cut_off))
                        .max_pair(lbnd.clone().mul_scalar(*cut_off)),
                    None => raw,
                };

                let width = ubnd - lbnd.clone();
                let rel = (raw - lbnd.clone()).div(width.clone().clamp_min(MIN_INTERVAL_WIDTH));
                let squashed = softclip_unit(rel, *hinge_softness);
                let act = squashed * width.clone() + lbnd;

                // Degenerate intervals (ubnd == lbnd, both necessarily zero
                // given the sign preconditions) force a zero action.
                act.zeros_like()
                    .mask_where(width.greater_elem(MIN_INTERVAL_WIDTH), act)
            }
        };

        ensure_finite(&clipped, "clipped action")?;
        Ok(clipped)
    }
}

/// Smooth squash of `x` into the unit interval.
///
/// Two-sided scaled softplus: approaches a hard clamp onto `[0, 1]` as the
/// softness goes to zero, and is strictly monotone and smooth everywhere.
fn softclip_unit<B: Backend>(x: Tensor<B, 2>, softness: f64) -> Tensor<B, 2> {
    scaled_softplus(x.clone(), softness) - scaled_softplus(x.sub_scalar(1.0), softness)
}

/// `softness * softplus(x / softness)`, computed in the overflow-free form
/// `max(z, 0) + log1p(exp(-|z|))`.
fn scaled_softplus<B: Backend>(x: Tensor<B, 2>, softness: f64) -> Tensor<B, 2> {
    let z = x.div_scalar(softness);
    let positive_part = z.clone().clamp_min(0.0);
    let log_part = z.abs().neg().exp().log1p();
    (positive_part + log_part).mul_scalar(softness)
}

/// Verify the bound preconditions: `ubnd >= lbnd`, `ubnd >= 0`, `lbnd <= 0`.
fn check_bounds<B: Backend>(lbnd: &Tensor<B, 2>, ubnd: &Tensor<B, 2>) -> Result<()> {
    if scalar_f32((ubnd.clone() - lbnd.clone()).min()) < 0.0 {
        return Err(GymError::BoundViolation(
            "upper bound for actions must not be below lower bound".to_string(),
        ));
    }
    if scalar_f32(ubnd.clone().min()) < 0.0 {
        return Err(GymError::BoundViolation(
            "upper bound for actions must not be negative".to_string(),
        ));
    }
    if scalar_f32(lbnd.clone().max()) > 0.0 {
        return Err(GymError::BoundViolation(
            "lower bound for actions must not be positive".to_string(),
        ));
    }
    Ok(())
}

/// Extract the single value of a fully reduced tensor. Non-finite bound
/// values are not flagged here; they surface through the post-clip check.
fn scalar_f32<B: Backend>(reduced: Tensor<B, 1>) -> f32 {
    reduced.into_data().iter::<f32>().next().unwrap_or(f32::NAN)
}

/// Fail fast with a numerical fault if the tensor holds NaN or Inf.
pub(crate) fn ensure_finite<B: Backend, const D: usize>(
    tensor: &Tensor<B, D>,
    field: &str,
) -> Result<()> {
    let data = tensor.to_data();
    for value in data.iter::<f32>() {
        if !value.is_finite() {
            return Err(GymError::NonFinite {
                field: field.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::Autodiff;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn clip(config: ClipConfig) -> ActionClip {
        ActionClip::new(&config).unwrap()
    }

    fn hard() -> ActionClip {
        clip(ClipConfig {
            hard_clip: true,
            ..ClipConfig::default()
        })
    }

    fn soft(hinge_softness: f64) -> ActionClip {
        clip(ClipConfig {
            hinge_softness,
            ..ClipConfig::default()
        })
    }

    fn tensor2(values: [[f32; 2]; 2]) -> Tensor<TestBackend, 2> {
        Tensor::from_floats(values, &Default::default())
    }

    fn to_vec(t: Tensor<TestBackend, 2>) -> Vec<f32> {
        t.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_hard_clip_exact() {
        let raw = tensor2([[2.0, -3.0], [0.25, 0.0]]);
        let lbnd = tensor2([[-1.0, -1.0], [-1.0, -1.0]]);
        let ubnd = tensor2([[1.0, 1.0], [1.0, 1.0]]);

        let out = to_vec(hard().apply(raw, lbnd, ubnd).unwrap());

        assert_eq!(out, vec![1.0, -1.0, 0.25, 0.0]);
    }

    #[test]
    fn test_soft_clip_respects_bounds() {
        let raw = tensor2([[5.0, -5.0], [0.5, -0.25]]);
        let lbnd = tensor2([[-1.0, -2.0], [-1.0, -2.0]]);
        let ubnd = tensor2([[1.0, 0.5], [1.0, 0.5]]);

        let out = to_vec(soft(1.0).apply(raw, lbnd.clone(), ubnd.clone()).unwrap());
        let lo = to_vec(lbnd);
        let hi = to_vec(ubnd);

        for ((value, lo), hi) in out.iter().zip(lo).zip(hi) {
            assert!(*value >= lo && *value <= hi, "value {value} outside [{lo}, {hi}]");
        }
    }

    #[test]
    fn test_soft_clip_centered_midpoint() {
        // Symmetric bounds map a zero raw action to zero.
        let raw = tensor2([[0.0, 0.0], [0.0, 0.0]]);
        let lbnd = tensor2([[-1.0, -1.0], [-1.0, -1.0]]);
        let ubnd = tensor2([[1.0, 1.0], [1.0, 1.0]]);

        let out = to_vec(soft(1.0).apply(raw, lbnd, ubnd).unwrap());

        for value in out {
            assert!(value.abs() < 1e-6, "expected 0, found {value}");
        }
    }

    #[test]
    fn test_degenerate_interval_is_exact_zero() {
        let raw = tensor2([[0.7, -0.3], [123.0, 0.1]]);
        let lbnd = tensor2([[0.0, -1.0], [0.0, -1.0]]);
        let ubnd = tensor2([[0.0, 1.0], [0.0, 1.0]]);

        for mode in [hard(), soft(1.0)] {
            let out = to_vec(mode.apply(raw.clone(), lbnd.clone(), ubnd.clone()).unwrap());
            assert_eq!(out[0], 0.0);
            assert_eq!(out[2], 0.0);
            assert!(out.iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn test_small_softness_approaches_hard_clip() {
        let raw = tensor2([[0.3, 1.5], [-0.5, -2.0]]);
        let lbnd = tensor2([[-1.0, -1.0], [-1.0, -1.0]]);
        let ubnd = tensor2([[1.0, 1.0], [1.0, 1.0]]);

        let soft_out = to_vec(soft(0.01).apply(raw.clone(), lbnd.clone(), ubnd.clone()).unwrap());
        let hard_out = to_vec(hard().apply(raw, lbnd, ubnd).unwrap());

        for (s, h) in soft_out.iter().zip(hard_out) {
            assert!((s - h).abs() < 0.05, "soft {s} too far from hard {h}");
        }
    }

    #[test]
    fn test_outer_guard_caps_extreme_actions() {
        let raw = tensor2([[1.0e7, -1.0e7], [0.0, 0.0]]);
        let lbnd = tensor2([[-1.0, -1.0], [-1.0, -1.0]]);
        let ubnd = tensor2([[1.0, 1.0], [1.0, 1.0]]);

        let out = to_vec(soft(1.0).apply(raw, lbnd, ubnd).unwrap());

        assert!(out.iter().all(|v| v.is_finite()));
        assert!(out[0] <= 1.0 && out[1] >= -1.0);
    }

    #[test]
    fn test_bound_ordering_violation() {
        let raw = tensor2([[0.0, 0.0], [0.0, 0.0]]);
        let lbnd = tensor2([[-1.0, 0.0], [-1.0, -1.0]]);
        let ubnd = tensor2([[1.0, -0.5], [1.0, 1.0]]);

        let err = hard().apply(raw, lbnd, ubnd).unwrap_err();
        assert!(matches!(err, GymError::BoundViolation(_)));
    }

    #[test]
    fn test_bound_sign_violations() {
        let raw = tensor2([[0.0, 0.0], [0.0, 0.0]]);

        // Negative upper bound
        let lbnd = tensor2([[-1.0, -1.0], [-1.0, -1.0]]);
        let ubnd = tensor2([[1.0, -0.5], [1.0, 1.0]]);
        assert!(matches!(
            hard().apply(raw.clone(), lbnd, ubnd).unwrap_err(),
            GymError::BoundViolation(_)
        ));

        // Positive lower bound
        let lbnd = tensor2([[0.5, -1.0], [-1.0, -1.0]]);
        let ubnd = tensor2([[1.0, 1.0], [1.0, 1.0]]);
        assert!(matches!(
            hard().apply(raw, lbnd, ubnd).unwrap_err(),
            GymError::BoundViolation(_)
        ));
    }

    #[test]
    fn test_nan_action_is_numerical_fault() {
        let raw = tensor2([[f32::NAN, 0.0], [0.0, 0.0]]);
        let lbnd = tensor2([[-1.0, -1.0], [-1.0, -1.0]]);
        let ubnd = tensor2([[1.0, 1.0], [1.0, 1.0]]);

        let err = soft(1.0).apply(raw, lbnd, ubnd).unwrap_err();
        assert!(matches!(err, GymError::NonFinite { .. }));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let bad_softness = ClipConfig {
            hinge_softness: 0.0,
            ..ClipConfig::default()
        };
        assert!(ActionClip::new(&bad_softness).is_err());

        let bad_cut_off = ClipConfig {
            outer_clip_cut_off: 0.5,
            ..ClipConfig::default()
        };
        assert!(ActionClip::new(&bad_cut_off).is_err());
    }

    #[test]
    fn test_soft_clip_gradient_flows() {
        type AD = Autodiff<TestBackend>;
        let device = Default::default();

        let raw = Tensor::<AD, 2>::from_floats([[0.3, -0.6], [1.4, 0.0]], &device).require_grad();
        let lbnd = Tensor::<AD, 2>::from_floats([[-1.0, -1.0], [-1.0, -1.0]], &device);
        let ubnd = Tensor::<AD, 2>::from_floats([[1.0, 1.0], [1.0, 1.0]], &device);

        let clipped = soft(1.0).apply(raw.clone(), lbnd, ubnd).unwrap();
        let grads = clipped.sum().backward();
        let grad = raw.grad(&grads).expect("gradient must exist");

        let values = grad.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| v.is_finite()));
        assert!(values.iter().any(|v| v.abs() > 0.0), "gradient is all zero");
    }
}
