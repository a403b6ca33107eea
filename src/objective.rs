//! Monetary utility objectives.
//!
//! A utility reduces the terminal payoff, hedging P&L and trading cost of a
//! path into one risk-adjusted scalar per path. The gym evaluates two
//! independently parameterized instances: one on the hedged outcome and one
//! on a zero-hedge baseline.

use burn::prelude::*;

use crate::error::{GymError, Result};
use crate::policy::Features;

/// Monetary utility call contract.
pub trait Utility<B: Backend> {
    /// Risk-adjusted utility `[B]` of the terminal outcome. `features_t0`
    /// holds every per-path feature and every per-step feature sliced at
    /// time zero.
    fn call(
        &self,
        payoff: Tensor<B, 1>,
        pnl: Tensor<B, 1>,
        cost: Tensor<B, 1>,
        features_t0: &Features<B>,
    ) -> Result<Tensor<B, 1>>;
}

/// Builds utility instances. Invoked twice per gym build so the hedged
/// objective and the zero-hedge baseline do not share trainable parameters.
pub trait UtilityFactory<B: Backend> {
    fn build(&self, device: &B::Device) -> Result<Box<dyn Utility<B>>>;
}

/// Risk-neutral utility: the plain gains `payoff + pnl - cost`.
#[derive(Debug, Clone, Default)]
pub struct MeanUtility;

impl<B: Backend> Utility<B> for MeanUtility {
    fn call(
        &self,
        payoff: Tensor<B, 1>,
        pnl: Tensor<B, 1>,
        cost: Tensor<B, 1>,
        _features_t0: &Features<B>,
    ) -> Result<Tensor<B, 1>> {
        Ok(payoff + pnl - cost)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MeanUtilityFactory;

impl<B: Backend> UtilityFactory<B> for MeanUtilityFactory {
    fn build(&self, _device: &B::Device) -> Result<Box<dyn Utility<B>>> {
        Ok(Box::new(MeanUtility))
    }
}

/// Exponential (entropic) utility `-(1/lambda) * exp(-lambda * gains)`.
///
/// Monotone in gains and concave, penalizing downside outcomes more the
/// larger the risk aversion `lambda`.
#[derive(Debug, Clone)]
pub struct EntropicUtility {
    risk_aversion: f64,
}

impl EntropicUtility {
    pub fn new(risk_aversion: f64) -> Result<Self> {
        if risk_aversion <= 0.0 {
            return Err(GymError::Config(format!(
                "risk_aversion must be > 0, found {risk_aversion}"
            )));
        }
        Ok(Self { risk_aversion })
    }
}

impl<B: Backend> Utility<B> for EntropicUtility {
    fn call(
        &self,
        payoff: Tensor<B, 1>,
        pnl: Tensor<B, 1>,
        cost: Tensor<B, 1>,
        _features_t0: &Features<B>,
    ) -> Result<Tensor<B, 1>> {
        let gains = payoff + pnl - cost;
        Ok(gains
            .mul_scalar(-self.risk_aversion)
            .exp()
            .mul_scalar(-1.0 / self.risk_aversion))
    }
}

#[derive(Debug, Clone)]
pub struct EntropicUtilityFactory {
    pub risk_aversion: f64,
}

impl<B: Backend> UtilityFactory<B> for EntropicUtilityFactory {
    fn build(&self, _device: &B::Device) -> Result<Box<dyn Utility<B>>> {
        Ok(Box::new(EntropicUtility::new(self.risk_aversion)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn t1(values: [f32; 2]) -> Tensor<TestBackend, 1> {
        Tensor::from_floats(values, &Default::default())
    }

    #[test]
    fn test_mean_utility_is_gains() {
        let utility = MeanUtility;
        let out = Utility::<TestBackend>::call(
            &utility,
            t1([1.0, 2.0]),
            t1([0.5, -0.5]),
            t1([0.25, 0.25]),
            &Features::new(),
        )
        .unwrap();

        assert_eq!(out.into_data().to_vec::<f32>().unwrap(), vec![1.25, 1.25]);
    }

    #[test]
    fn test_entropic_utility_monotone_in_gains() {
        let utility = EntropicUtility::new(1.0).unwrap();
        let out = Utility::<TestBackend>::call(
            &utility,
            t1([0.0, 1.0]),
            t1([0.0, 0.0]),
            t1([0.0, 0.0]),
            &Features::new(),
        )
        .unwrap();

        let values = out.into_data().to_vec::<f32>().unwrap();
        assert!(values[1] > values[0]);
        assert!(values.iter().all(|v| *v < 0.0));
    }

    #[test]
    fn test_entropic_utility_rejects_bad_risk_aversion() {
        assert!(EntropicUtility::new(0.0).is_err());
        assert!(EntropicUtility::new(-1.0).is_err());
    }
}
