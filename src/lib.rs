//! Scaled dot-product self-attention, derived step by step.
//!
//! The kernel lives in [`attention`], the trainable projection wrapper in
//! [`layers`]. This crate adds runtime configuration and device selection for
//! the `attention-primer` walkthrough binary.

pub use attention;
pub use layers;

pub mod config;
pub mod device;

pub use config::{ConfigError, PrimerConfig, RuntimeConfig};
pub use device::setup_device;
