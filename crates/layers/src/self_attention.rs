//! Self-attention with learned query, key and value projections.
//!
//! Inputs are shaped `(seq, d_model)` or `(batch, seq, d_model)`. Each
//! projection is an affine map with bias, `Q = X · Wq + bq` and likewise for K
//! (`d_model -> d_k`) and V (`d_model -> d_v`). The three projections are
//! allocated under the `query`, `key` and `value` prefixes of the supplied
//! `VarBuilder` and initialised independently.

use std::sync::OnceLock;

use attention::{Attention, AttentionOutput, Config, ExactAttention};
use candle_core::{DType, Tensor};
use candle_nn::{Linear, Module, VarBuilder};
use serde::Deserialize;

use crate::{checks, LayerError};

/// Dimensions of a [`SelfAttention`] layer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SelfAttentionConfig {
    /// Feature size of the input sequence.
    pub d_model: usize,
    /// Query/key projection size, also used for the `1 / sqrt(d_k)` scaling.
    pub d_k: usize,
    /// Value projection size, the feature size of the output.
    pub d_v: usize,
    /// Return the attention matrix next to the output.
    pub return_attn: bool,
}

impl Default for SelfAttentionConfig {
    fn default() -> Self {
        Self {
            d_model: 6,
            d_k: 4,
            d_v: 4,
            return_attn: false,
        }
    }
}

impl SelfAttentionConfig {
    pub fn new(d_model: usize, d_k: usize, d_v: usize) -> Self {
        Self {
            d_model,
            d_k,
            d_v,
            return_attn: false,
        }
    }

    pub fn with_return_attn(mut self, return_attn: bool) -> Self {
        self.return_attn = return_attn;
        self
    }

    pub fn validate(&self) -> Result<(), LayerError> {
        for (name, value) in [("d_model", self.d_model), ("d_k", self.d_k), ("d_v", self.d_v)] {
            if value == 0 {
                return Err(LayerError::Config(format!("{name} must be greater than zero")));
            }
        }
        Ok(())
    }
}

/// Query/key/value projections wired into the attention kernel.
#[derive(Debug)]
pub struct SelfAttention {
    query: Linear,
    key: Linear,
    value: Linear,
    kernel: ExactAttention,
    config: SelfAttentionConfig,
    dtype: DType,
}

impl SelfAttention {
    /// Allocates the projections and pairs them with a default kernel.
    pub fn new(config: SelfAttentionConfig, vb: VarBuilder) -> Result<Self, LayerError> {
        Self::with_kernel_config(config, Config::default(), vb)
    }

    /// Allocates the projections and pairs them with a kernel built from
    /// `kernel_config`.
    pub fn with_kernel_config(
        config: SelfAttentionConfig,
        kernel_config: Config,
        vb: VarBuilder,
    ) -> Result<Self, LayerError> {
        config.validate()?;
        let query = candle_nn::linear(config.d_model, config.d_k, vb.pp("query"))?;
        let key = candle_nn::linear(config.d_model, config.d_k, vb.pp("key"))?;
        let value = candle_nn::linear(config.d_model, config.d_v, vb.pp("value"))?;
        log::debug!(
            "layers::self_attention allocated d_model={} d_k={} d_v={} dtype={:?}",
            config.d_model,
            config.d_k,
            config.d_v,
            vb.dtype()
        );
        Ok(Self {
            query,
            key,
            value,
            kernel: ExactAttention::with_config(kernel_config),
            dtype: vb.dtype(),
            config,
        })
    }

    pub fn config(&self) -> &SelfAttentionConfig {
        &self.config
    }

    pub fn query(&self) -> &Linear {
        &self.query
    }

    pub fn key(&self) -> &Linear {
        &self.key
    }

    pub fn value(&self) -> &Linear {
        &self.value
    }

    /// Applies the three projections, returning `(Q, K, V)`.
    pub fn project(&self, x: &Tensor) -> Result<(Tensor, Tensor, Tensor), LayerError> {
        checks::expect_hidden("x", x, self.config.d_model)?;
        checks::expect_dtype_in("x", x, &[self.dtype])?;
        let q = self.query.forward(x)?;
        let k = self.key.forward(x)?;
        let v = self.value.forward(x)?;
        Ok((q, k, v))
    }

    /// Projects `x` and attends over it. The attention matrix is included when
    /// the layer was configured with `return_attn`.
    pub fn forward(&self, x: &Tensor) -> Result<AttentionOutput, LayerError> {
        let (q, k, v) = self.project(x)?;
        Ok(self
            .kernel
            .attend(&q, &k, &v, self.config.d_k, self.config.return_attn)?)
    }
}

/// A [`SelfAttention`] whose `d_model` is taken from the first input.
///
/// Parameters are allocated on the first [`forward`](Self::forward); later
/// inputs must carry the same feature size.
pub struct LazySelfAttention<'a> {
    d_k: usize,
    d_v: usize,
    return_attn: bool,
    kernel_config: Config,
    vb: VarBuilder<'a>,
    built: OnceLock<SelfAttention>,
}

impl<'a> LazySelfAttention<'a> {
    pub fn new(d_k: usize, d_v: usize, return_attn: bool, vb: VarBuilder<'a>) -> Self {
        Self {
            d_k,
            d_v,
            return_attn,
            kernel_config: Config::default(),
            vb,
            built: OnceLock::new(),
        }
    }

    pub fn with_kernel_config(mut self, kernel_config: Config) -> Self {
        self.kernel_config = kernel_config;
        self
    }

    pub fn is_built(&self) -> bool {
        self.built.get().is_some()
    }

    /// The built layer, if a forward pass has already run.
    pub fn layer(&self) -> Option<&SelfAttention> {
        self.built.get()
    }

    pub fn forward(&self, x: &Tensor) -> Result<AttentionOutput, LayerError> {
        self.build(x)?.forward(x)
    }

    fn build(&self, x: &Tensor) -> Result<&SelfAttention, LayerError> {
        if let Some(layer) = self.built.get() {
            return Ok(layer);
        }
        let d_model = checks::expect_sequence("x", x)?;
        let config = SelfAttentionConfig {
            d_model,
            d_k: self.d_k,
            d_v: self.d_v,
            return_attn: self.return_attn,
        };
        log::debug!("layers::self_attention building lazily from first input d_model={d_model}");
        let layer =
            SelfAttention::with_kernel_config(config, self.kernel_config.clone(), self.vb.clone())?;
        // A concurrent first call may have won; both read the same VarMap entries.
        let _ = self.built.set(layer);
        self.built.get().ok_or_else(|| {
            LayerError::Config("lazy self-attention failed to store its parameters".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;
    use candle_nn::VarMap;

    #[test]
    fn config_rejects_zero_dims() {
        let err = SelfAttentionConfig::new(4, 0, 4).validate().unwrap_err();
        assert!(matches!(err, LayerError::Config(message) if message.contains("d_k")));
    }

    #[test]
    fn projections_have_expected_shapes() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let layer = SelfAttention::new(SelfAttentionConfig::new(6, 4, 3), vb).unwrap();

        assert_eq!(layer.query().weight().dims(), &[4, 6]);
        assert_eq!(layer.key().weight().dims(), &[4, 6]);
        assert_eq!(layer.value().weight().dims(), &[3, 6]);
        assert_eq!(layer.value().bias().map(|b| b.dims().to_vec()), Some(vec![3]));
        assert_eq!(varmap.all_vars().len(), 6);
    }

    #[test]
    fn dtype_mismatch_is_reported() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let layer = SelfAttention::new(SelfAttentionConfig::new(6, 4, 3), vb).unwrap();
        let x = Tensor::zeros((2, 6), DType::F64, &device).unwrap();
        let err = layer.forward(&x).unwrap_err();
        assert!(matches!(err, LayerError::ShapeMismatch { operand: "x", .. }));
    }
}
