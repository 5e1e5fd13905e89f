//! Scaled dot-product attention built on Candle tensors.
//!
//! The crate computes `softmax(Q · Kᵗ / sqrt(d_k)) · V` over operands with
//! layout `Q [.., n_q, d_k]`, `K [.., n_k, d_k]` and `V [.., n_k, d_v]`, where
//! the optional leading dimensions are independent batch entries. The
//! attention matrix can be returned next to the output on request.
//!
//! Shapes are validated before any arithmetic runs. The softmax subtracts each
//! row's maximum before exponentiating, so large score magnitudes never
//! overflow. Inputs are not checked for NaN or infinities unless
//! [`Config::check_finite`] is enabled; otherwise such values propagate.
//!
//! [`derivation`] keeps the intermediate forms of the computation (loop dot
//! products, matrix and einsum score forms) as standalone functions.

pub mod core;
pub mod derivation;
pub mod reference;

pub use crate::core::{Attention, AttentionError, AttentionOutput, Config, PrecisionPolicy};
pub use reference::{attention, attention_with_weights, ExactAttention};
