//! Portable, exact implementation of scaled dot-product attention.
//!
//! This path favours clarity over absolute performance and is the baseline the
//! derivation stages are checked against.

pub mod exact;
pub mod softmax;

pub use exact::{attention, attention_with_weights, ExactAttention};
pub use softmax::stable_softmax_last_dim;
