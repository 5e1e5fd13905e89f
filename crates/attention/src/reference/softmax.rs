//! Row-wise softmax with max subtraction.

use candle_core::{Result, Tensor, D};

/// Normalizes the last dimension of `scores` into probability distributions.
///
/// Each row's maximum is subtracted before exponentiating so the largest
/// exponent is `exp(0) = 1` and the row sum is at least one. The maximum is
/// detached from the autograd graph; the shift cancels in the quotient and
/// leaves gradients unchanged.
pub fn stable_softmax_last_dim(scores: &Tensor) -> Result<Tensor> {
    let row_max = scores.max_keepdim(D::Minus1)?.detach();
    let shifted = scores.broadcast_sub(&row_max)?;
    let exp = shifted.exp()?;
    let denom = exp.sum_keepdim(D::Minus1)?;
    exp.broadcast_div(&denom)
}
