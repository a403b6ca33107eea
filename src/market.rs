//! Market path bundle supplied per training batch: instrument returns,
//! trading cost rates, per-step action bounds and the terminal payoff.

use burn::prelude::*;

use crate::error::{GymError, Result};

/// Immutable market data for one batch of simulated paths.
///
/// All rank-3 tensors are `[B, T, N]` with B paths, T time steps and N
/// hedging instruments; the payoff is `[B]`.
#[derive(Debug, Clone)]
pub struct MarketPath<B: Backend> {
    hedges: Tensor<B, 3>,
    cost: Tensor<B, 3>,
    lbnd: Tensor<B, 3>,
    ubnd: Tensor<B, 3>,
    payoff: Tensor<B, 1>,
}

impl<B: Backend> MarketPath<B> {
    /// Validate shapes and assemble the bundle.
    pub fn new(
        hedges: Tensor<B, 3>,
        cost: Tensor<B, 3>,
        lbnd: Tensor<B, 3>,
        ubnd: Tensor<B, 3>,
        payoff: Tensor<B, 1>,
    ) -> Result<Self> {
        let dims = hedges.dims();
        let [n_paths, n_steps, n_instruments] = dims;
        if n_paths == 0 || n_steps == 0 || n_instruments == 0 {
            return Err(GymError::ShapeMismatch {
                field: "market.hedges".to_string(),
                expected: "non-empty [B, T, N]".to_string(),
                actual: format!("{dims:?}"),
            });
        }

        check_rank3(&cost, dims, "market.cost")?;
        check_rank3(&lbnd, dims, "market.lbnd")?;
        check_rank3(&ubnd, dims, "market.ubnd")?;

        if payoff.dims() != [n_paths] {
            return Err(GymError::ShapeMismatch {
                field: "market.payoff".to_string(),
                expected: format!("[{n_paths}]"),
                actual: format!("{:?}", payoff.dims()),
            });
        }

        Ok(Self {
            hedges,
            cost,
            lbnd,
            ubnd,
            payoff,
        })
    }

    pub fn hedges(&self) -> &Tensor<B, 3> {
        &self.hedges
    }

    pub fn cost(&self) -> &Tensor<B, 3> {
        &self.cost
    }

    pub fn lbnd(&self) -> &Tensor<B, 3> {
        &self.lbnd
    }

    pub fn ubnd(&self) -> &Tensor<B, 3> {
        &self.ubnd
    }

    pub fn payoff(&self) -> &Tensor<B, 1> {
        &self.payoff
    }

    pub fn n_paths(&self) -> usize {
        self.hedges.dims()[0]
    }

    pub fn n_steps(&self) -> usize {
        self.hedges.dims()[1]
    }

    pub fn n_instruments(&self) -> usize {
        self.hedges.dims()[2]
    }

    /// `[B, N]` slice of a rank-3 field at time step `t`.
    pub(crate) fn slice_step(tensor: &Tensor<B, 3>, t: usize) -> Tensor<B, 2> {
        let [b, _t, n] = tensor.dims();
        tensor.clone().slice([0..b, t..t + 1, 0..n]).squeeze::<2>(1)
    }
}

fn check_rank3<B: Backend>(
    tensor: &Tensor<B, 3>,
    expected: [usize; 3],
    field: &str,
) -> Result<()> {
    if tensor.dims() != expected {
        return Err(GymError::ShapeMismatch {
            field: field.to_string(),
            expected: format!("{expected:?}"),
            actual: format!("{:?}", tensor.dims()),
        });
    }
    Ok(())
}
