//! Trainable wrappers around the attention kernel.
//!
//! [`SelfAttention`] owns three learned affine projections (query, key and
//! value) of one input sequence and feeds their outputs to
//! [`attention::ExactAttention`]. Parameters live in a `candle_nn::VarMap`
//! supplied through a `VarBuilder`, so gradients and optimizer updates are
//! handled by Candle.

pub mod checks;
pub mod self_attention;

use attention::AttentionError;
use thiserror::Error;

pub use self_attention::{LazySelfAttention, SelfAttention, SelfAttentionConfig};

/// Errors raised while constructing or running a layer.
#[derive(Debug, Error)]
pub enum LayerError {
    /// The layer input does not match the layer's dimensions.
    #[error("shape mismatch for {operand}: {detail}")]
    ShapeMismatch {
        operand: &'static str,
        detail: String,
    },
    /// Invalid layer configuration.
    #[error("invalid layer configuration: {0}")]
    Config(String),
    /// Failure reported by the attention kernel.
    #[error(transparent)]
    Attention(#[from] AttentionError),
    /// Failure reported by Candle while allocating or applying parameters.
    #[error("backend failure: {0}")]
    Backend(#[from] candle_core::Error),
}
