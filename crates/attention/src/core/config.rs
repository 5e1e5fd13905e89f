//! Configuration options for the attention kernel.
//!
//! The [`Config`] struct captures run-time knobs that callers can tune without
//! swapping implementations. It deserializes from the `[kernel]` section of a
//! runtime configuration file.

use serde::Deserialize;

/// Dtype used while computing scores, softmax and the weighted sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrecisionPolicy {
    /// Promote `f16`/`bf16` operands to `f32` and cast the results back.
    #[default]
    PromoteHalf,
    /// Compute in whatever dtype the operands arrive in. `bf16` on the CPU
    /// backend is still computed in `f32`, since candle has no CPU `bf16`
    /// matmul.
    Inherit,
}

/// Configuration driving attention behaviour.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Compute dtype selection.
    pub precision: PrecisionPolicy,
    /// Reject inputs containing NaN or infinities with
    /// [`AttentionError::Numerical`](crate::AttentionError::Numerical).
    ///
    /// When `false` the kernel does not inspect its inputs and non-finite
    /// values propagate into the outputs.
    pub check_finite: bool,
}
