//! Reference scaled dot-product attention kernel.
//!
//! The exact path validates all operands eagerly, folds any leading batch
//! dimensions into one, and then runs `softmax(Q · Kᵗ / sqrt(d_k)) · V` with
//! three batched matmuls and the stable softmax from
//! [`softmax`](super::softmax).

use std::sync::OnceLock;

use candle_core::{DType, Device, Tensor};

use super::softmax::stable_softmax_last_dim;
use crate::core::{Attention, AttentionError, AttentionOutput, Config, PrecisionPolicy};

/// Numerically stable, portable attention kernel.
#[derive(Debug, Default)]
pub struct ExactAttention {
    config: Config,
    first_call: OnceLock<()>,
}

impl ExactAttention {
    /// Construct a kernel with the default [`Config`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct a kernel with an explicit configuration.
    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            first_call: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Computes `softmax(Q · Kᵗ / sqrt(d_k)) · V` with the default configuration.
///
/// Returns only the output `O`, shaped `[.., n_q, d_v]`.
pub fn attention(q: &Tensor, k: &Tensor, v: &Tensor, d_k: usize) -> Result<Tensor, AttentionError> {
    Ok(default_kernel().attend(q, k, v, d_k, false)?.output)
}

/// Same as [`attention`] but also returns the attention matrix, as `(A, O)`.
pub fn attention_with_weights(
    q: &Tensor,
    k: &Tensor,
    v: &Tensor,
    d_k: usize,
) -> Result<(Tensor, Tensor), AttentionError> {
    let (weights, output) = default_kernel().attend(q, k, v, d_k, true)?.into_parts();
    let weights = weights.ok_or_else(|| AttentionError::Backend {
        message: "kernel did not return attention weights".to_string(),
    })?;
    Ok((weights, output))
}

fn default_kernel() -> &'static ExactAttention {
    static KERNEL: OnceLock<ExactAttention> = OnceLock::new();
    KERNEL.get_or_init(ExactAttention::new)
}

/// Dimensions extracted from validated operands.
#[derive(Debug, Clone, PartialEq, Eq)]
struct OperandDims {
    batch: Vec<usize>,
    n_q: usize,
    n_k: usize,
    features: usize,
    d_v: usize,
}

impl OperandDims {
    fn merged_batch(&self) -> usize {
        self.batch.iter().product()
    }

    fn with_batch(&self, rows: usize, cols: usize) -> Vec<usize> {
        let mut shape = self.batch.clone();
        shape.push(rows);
        shape.push(cols);
        shape
    }
}

fn validate_operands(
    q: &Tensor,
    k: &Tensor,
    v: &Tensor,
    d_k: usize,
    config: &Config,
) -> Result<OperandDims, AttentionError> {
    let device = q.device();
    if !device.same_device(k.device()) || !device.same_device(v.device()) {
        return Err(AttentionError::DeviceMismatch);
    }

    let dtype = q.dtype();
    if dtype != k.dtype() || dtype != v.dtype() {
        return Err(AttentionError::DTypeMismatch {
            q: format!("{:?}", q.dtype()),
            k: format!("{:?}", k.dtype()),
            v: format!("{:?}", v.dtype()),
        });
    }
    if !matches!(dtype, DType::F16 | DType::BF16 | DType::F32 | DType::F64) {
        return Err(AttentionError::UnsupportedDType {
            requested: format!("{dtype:?}"),
        });
    }

    let (q_dims, k_dims, v_dims) = (q.dims(), k.dims(), v.dims());
    for (name, dims) in [("q", q_dims), ("k", k_dims), ("v", v_dims)] {
        if dims.len() < 2 {
            return Err(AttentionError::shape(
                name,
                format!("expected [.., rows, features], got {dims:?}"),
            ));
        }
    }
    if q_dims.len() != k_dims.len() || q_dims.len() != v_dims.len() {
        return Err(AttentionError::shape(
            "q, k, v",
            format!("ranks differ: q={q_dims:?} k={k_dims:?} v={v_dims:?}"),
        ));
    }

    let rank = q_dims.len();
    let batch = &q_dims[..rank - 2];
    if &k_dims[..rank - 2] != batch || &v_dims[..rank - 2] != batch {
        return Err(AttentionError::shape(
            "q, k, v",
            format!("leading dimensions differ: q={q_dims:?} k={k_dims:?} v={v_dims:?}"),
        ));
    }

    let (n_q, q_features) = (q_dims[rank - 2], q_dims[rank - 1]);
    let (n_k, k_features) = (k_dims[rank - 2], k_dims[rank - 1]);
    let (v_rows, d_v) = (v_dims[rank - 2], v_dims[rank - 1]);

    if q_features != k_features {
        return Err(AttentionError::shape(
            "q, k",
            format!("last dimension differs: q has {q_features}, k has {k_features}"),
        ));
    }
    if v_rows != n_k {
        return Err(AttentionError::shape(
            "k, v",
            format!("row count differs: k has {n_k} keys, v has {v_rows} values"),
        ));
    }
    if d_k == 0 {
        return Err(AttentionError::shape("d_k", "d_k must be positive, got 0"));
    }
    if n_q == 0 || n_k == 0 {
        return Err(AttentionError::shape(
            "q, k",
            format!("need at least one query and one key, got n_q={n_q} n_k={n_k}"),
        ));
    }
    if batch.contains(&0) {
        return Err(AttentionError::shape(
            "q, k, v",
            format!("leading dimensions must be non-empty, got {batch:?}"),
        ));
    }
    if d_k != q_features {
        log::debug!(
            "attention::reference scaling by d_k={d_k} while q/k carry {q_features} features"
        );
    }

    if config.check_finite {
        for (name, tensor) in [("q", q), ("k", k), ("v", v)] {
            ensure_finite(name, tensor)?;
        }
    }

    Ok(OperandDims {
        batch: batch.to_vec(),
        n_q,
        n_k,
        features: q_features,
        d_v,
    })
}

fn ensure_finite(operand: &'static str, tensor: &Tensor) -> Result<(), AttentionError> {
    let values = tensor.to_dtype(DType::F64)?.flatten_all()?.to_vec1::<f64>()?;
    if values.iter().all(|value| value.is_finite()) {
        Ok(())
    } else {
        Err(AttentionError::Numerical { operand })
    }
}

/// The CPU backend has no bf16 matmul, so bf16 is promoted there even under
/// [`PrecisionPolicy::Inherit`].
fn compute_dtype(policy: PrecisionPolicy, dtype: DType, device: &Device) -> DType {
    match (policy, dtype) {
        (PrecisionPolicy::PromoteHalf, DType::F16 | DType::BF16) => DType::F32,
        (PrecisionPolicy::Inherit, DType::BF16) if device.is_cpu() => DType::F32,
        _ => dtype,
    }
}

impl Attention for ExactAttention {
    fn attend(
        &self,
        q: &Tensor,
        k: &Tensor,
        v: &Tensor,
        d_k: usize,
        return_attn: bool,
    ) -> Result<AttentionOutput, AttentionError> {
        if self.first_call.set(()).is_ok() {
            log::info!(
                "attention::reference init precision={:?} check_finite={}",
                self.config.precision,
                self.config.check_finite
            );
        }

        let dims = validate_operands(q, k, v, d_k, &self.config)?;
        log::debug!(
            "attention::reference attend batch={:?} n_q={} n_k={} d_k={} d_v={} return_attn={}",
            dims.batch,
            dims.n_q,
            dims.n_k,
            d_k,
            dims.d_v,
            return_attn
        );

        let dtype = q.dtype();
        let compute = compute_dtype(self.config.precision, dtype, q.device());
        let merged = dims.merged_batch();

        let q_view = q
            .to_dtype(compute)?
            .reshape((merged, dims.n_q, dims.features))?;
        let k_view = k
            .to_dtype(compute)?
            .reshape((merged, dims.n_k, dims.features))?;
        let v_view = v.to_dtype(compute)?.reshape((merged, dims.n_k, dims.d_v))?;

        let scores = q_view.matmul(&k_view.t()?)?;
        let scores = scores.affine(1.0 / (d_k as f64).sqrt(), 0.0)?;
        let probs = stable_softmax_last_dim(&scores)?;
        let output = probs.matmul(&v_view)?;

        let output = output
            .reshape(dims.with_batch(dims.n_q, dims.d_v))?
            .to_dtype(dtype)?;
        let weights = if return_attn {
            Some(
                probs
                    .reshape(dims.with_batch(dims.n_q, dims.n_k))?
                    .to_dtype(dtype)?,
            )
        } else {
            None
        };

        Ok(AttentionOutput { output, weights })
    }
}
