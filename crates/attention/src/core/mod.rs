//! Core traits and types shared by the attention kernel and its callers.
//!
//! Operands follow the layout `Q [.., n_q, d_k]`, `K [.., n_k, d_k]` and
//! `V [.., n_k, d_v]`, where `..` is any number of batch dimensions shared by
//! all three tensors. Outputs keep the same leading dimensions.

pub mod config;
pub mod errors;

use candle_core::Tensor;

pub use config::{Config, PrecisionPolicy};
pub use errors::AttentionError;

/// Result of one attention call.
#[derive(Debug, Clone)]
pub struct AttentionOutput {
    /// Weighted values `O = A · V`, shaped `[.., n_q, d_v]`.
    pub output: Tensor,
    /// Attention matrix `A`, shaped `[.., n_q, n_k]`, present when requested.
    pub weights: Option<Tensor>,
}

impl AttentionOutput {
    /// Splits the result into `(A, O)`.
    pub fn into_parts(self) -> (Option<Tensor>, Tensor) {
        (self.weights, self.output)
    }
}

/// Unified interface for attention kernels.
///
/// * `q` and `k` share their last dimension; `k` and `v` share their row count.
/// * `d_k` is the dimensionality used for the `1 / sqrt(d_k)` score scaling.
/// * When `return_attn` is set the row-stochastic attention matrix is returned
///   alongside the output.
pub trait Attention {
    /// Compute scaled dot-product attention.
    fn attend(
        &self,
        q: &Tensor,
        k: &Tensor,
        v: &Tensor,
        d_k: usize,
        return_attn: bool,
    ) -> Result<AttentionOutput, AttentionError>;
}
