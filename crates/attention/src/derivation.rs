//! Intermediate forms of the attention computation.
//!
//! Each function computes one stage on its own: a dot product written as a
//! loop, the query/key score matrix via loops, matmul and an einsum-style
//! contraction, score scaling and value weighting. All score forms produce
//! the same matrix; the tests below check this against
//! [`ExactAttention`](crate::ExactAttention).

use candle_core::{DType, Tensor, D};

use crate::core::AttentionError;

/// Sum of elementwise products of two equally long vectors.
pub fn dot_product(a: &[f32], b: &[f32]) -> Result<f32, AttentionError> {
    if a.len() != b.len() {
        return Err(AttentionError::ShapeMismatch {
            operands: "a, b",
            detail: format!("vector lengths differ: {} vs {}", a.len(), b.len()),
        });
    }
    let mut acc = 0f32;
    for i in 0..a.len() {
        acc += a[i] * b[i];
    }
    Ok(acc)
}

/// Score matrix `S[i][j] = dot(q_i, k_j)` for 2-D `q (n_q, d)` and `k (n_k, d)`,
/// computed one pair at a time.
pub fn similarity_scores_loop(q: &Tensor, k: &Tensor) -> Result<Tensor, AttentionError> {
    let (n_q, q_features) = q.dims2()?;
    let (n_k, k_features) = k.dims2()?;
    if q_features != k_features {
        return Err(AttentionError::ShapeMismatch {
            operands: "q, k",
            detail: format!("last dimension differs: q has {q_features}, k has {k_features}"),
        });
    }

    let queries = q.to_dtype(DType::F32)?.to_vec2::<f32>()?;
    let keys = k.to_dtype(DType::F32)?.to_vec2::<f32>()?;
    let mut scores = Vec::with_capacity(n_q * n_k);
    for query in &queries {
        for key in &keys {
            scores.push(dot_product(query, key)?);
        }
    }

    Ok(Tensor::from_vec(scores, (n_q, n_k), q.device())?.to_dtype(q.dtype())?)
}

/// Score matrix as a single matrix product, `Q · Kᵗ`.
pub fn similarity_scores_matmul(q: &Tensor, k: &Tensor) -> Result<Tensor, AttentionError> {
    Ok(q.matmul(&k.t()?.contiguous()?)?)
}

/// Score matrix as the contraction `..id,..jd->..ij`.
///
/// Queries are expanded to `[.., n_q, 1, d]` and keys to `[.., 1, n_k, d]`; the
/// broadcast product is summed over `d`. Works for any number of leading batch
/// dimensions, so a stack of query sets is scored against its own keys in one
/// call.
pub fn similarity_scores_einsum(q: &Tensor, k: &Tensor) -> Result<Tensor, AttentionError> {
    let rank = q.rank();
    if rank < 2 || k.rank() != rank {
        return Err(AttentionError::ShapeMismatch {
            operands: "q, k",
            detail: format!("expected equal ranks >= 2, got q={:?} k={:?}", q.dims(), k.dims()),
        });
    }
    let expanded_q = q.unsqueeze(rank - 1)?;
    let expanded_k = k.unsqueeze(rank - 2)?;
    Ok(expanded_q.broadcast_mul(&expanded_k)?.sum(D::Minus1)?)
}

/// Divides raw scores by `sqrt(d_k)`.
pub fn scale_scores(scores: &Tensor, d_k: usize) -> Result<Tensor, AttentionError> {
    if d_k == 0 {
        return Err(AttentionError::ShapeMismatch {
            operands: "d_k",
            detail: "d_k must be positive, got 0".to_string(),
        });
    }
    Ok(scores.affine(1.0 / (d_k as f64).sqrt(), 0.0)?)
}

/// Weighted sum of value rows, `A · V`.
pub fn weight_values(weights: &Tensor, v: &Tensor) -> Result<Tensor, AttentionError> {
    Ok(weights.matmul(v)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::{attention_with_weights, stable_softmax_last_dim};
    use candle_core::{Device, Result as CandleResult};

    fn max_abs_diff(a: &Tensor, b: &Tensor) -> CandleResult<f32> {
        a.sub(b)?.abs()?.flatten_all()?.max(0)?.to_vec0::<f32>()
    }

    #[test]
    fn dot_product_loop() {
        let q = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let k = [1.0f32, 0.0, -1.0, 2.0, 7.0, 4.0];
        assert_eq!(dot_product(&q, &k).unwrap(), 65.0);
    }

    #[test]
    fn dot_product_length_mismatch() {
        let err = dot_product(&[1.0, 2.0], &[1.0]).unwrap_err();
        assert!(matches!(err, AttentionError::ShapeMismatch { .. }));
    }

    #[test]
    fn score_forms_agree() -> CandleResult<()> {
        let device = Device::Cpu;
        let q = Tensor::randn(0f32, 1.0, (4, 6), &device)?;
        let k = Tensor::randn(0f32, 1.0, (5, 6), &device)?;

        let looped = similarity_scores_loop(&q, &k).unwrap();
        let matmul = similarity_scores_matmul(&q, &k).unwrap();
        let einsum = similarity_scores_einsum(&q, &k).unwrap();

        assert_eq!(looped.dims(), &[4, 5]);
        assert!(max_abs_diff(&looped, &matmul)? < 1e-5);
        assert!(max_abs_diff(&looped, &einsum)? < 1e-5);
        Ok(())
    }

    #[test]
    fn batched_einsum_matches_per_batch_matmul() -> CandleResult<()> {
        let device = Device::Cpu;
        let q = Tensor::randn(0f32, 1.0, (3, 4, 6), &device)?;
        let k = Tensor::randn(0f32, 1.0, (3, 2, 6), &device)?;
        let batched = similarity_scores_einsum(&q, &k).unwrap();
        assert_eq!(batched.dims(), &[3, 4, 2]);

        for b in 0..3 {
            let single = similarity_scores_matmul(&q.get(b)?, &k.get(b)?).unwrap();
            assert!(max_abs_diff(&batched.get(b)?, &single)? < 1e-5);
        }
        Ok(())
    }

    #[test]
    fn loop_rejects_feature_mismatch() -> CandleResult<()> {
        let device = Device::Cpu;
        let q = Tensor::zeros((2, 6), DType::F32, &device)?;
        let k = Tensor::zeros((3, 5), DType::F32, &device)?;
        let err = similarity_scores_loop(&q, &k).unwrap_err();
        assert!(matches!(err, AttentionError::ShapeMismatch { operands: "q, k", .. }));
        Ok(())
    }

    #[test]
    fn stages_compose_into_kernel() -> CandleResult<()> {
        let device = Device::Cpu;
        let q = Tensor::randn(0f32, 1.0, (3, 8), &device)?;
        let k = Tensor::randn(0f32, 1.0, (6, 8), &device)?;
        let v = Tensor::randn(0f32, 1.0, (6, 2), &device)?;

        let scores = similarity_scores_loop(&q, &k).unwrap();
        let scaled = scale_scores(&scores, 8).unwrap();
        let weights = stable_softmax_last_dim(&scaled)?;
        let output = weight_values(&weights, &v).unwrap();

        let (kernel_weights, kernel_output) = attention_with_weights(&q, &k, &v, 8).unwrap();
        assert!(max_abs_diff(&weights, &kernel_weights)? < 1e-5);
        assert!(max_abs_diff(&output, &kernel_output)? < 1e-5);
        Ok(())
    }

    #[test]
    fn scaling_divides_by_root_dk() -> CandleResult<()> {
        let scores = Tensor::new(&[[65.0f32, 101.0]], &Device::Cpu)?;
        let scaled = scale_scores(&scores, 6).unwrap().to_vec2::<f32>()?;
        assert!((scaled[0][0] - 26.536).abs() < 1e-3);
        assert!((scaled[0][1] - 41.233).abs() < 1e-3);
        assert!(scale_scores(&scores, 0).is_err());
        Ok(())
    }
}
