//! Error types emitted by the attention kernel.

use thiserror::Error;

/// Attention-specific error category.
#[derive(Debug, Error)]
pub enum AttentionError {
    /// Operand shapes do not satisfy the `Q [.., n_q, d_k]`, `K [.., n_k, d_k]`,
    /// `V [.., n_k, d_v]` contract, or `d_k` is not positive.
    #[error("shape mismatch for {operands}: {detail}")]
    ShapeMismatch {
        operands: &'static str,
        detail: String,
    },
    /// The kernel does not support the requested data type.
    #[error("unsupported dtype {requested}")]
    UnsupportedDType { requested: String },
    /// `q`, `k` and `v` were supplied with different dtypes.
    #[error("q, k, v must share a dtype, got q={q}, k={k}, v={v}")]
    DTypeMismatch { q: String, k: String, v: String },
    /// `q`, `k` and `v` live on different devices.
    #[error("q, k, v must reside on the same device")]
    DeviceMismatch,
    /// An operand holds NaN or infinite entries (only raised when
    /// [`Config::check_finite`](crate::core::Config::check_finite) is set).
    #[error("non-finite values in {operand}")]
    Numerical { operand: &'static str },
    /// A backend-specific failure propagated to the caller.
    #[error("backend failure: {message}")]
    Backend { message: String },
}

impl AttentionError {
    pub(crate) fn shape(operands: &'static str, detail: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            operands,
            detail: detail.into(),
        }
    }
}

impl From<candle_core::Error> for AttentionError {
    fn from(err: candle_core::Error) -> Self {
        Self::Backend {
            message: err.to_string(),
        }
    }
}
