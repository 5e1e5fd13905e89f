//! Lightweight validation helpers for layer inputs.
//!
//! They return [`LayerError::ShapeMismatch`] naming the operand so call sites
//! can propagate errors without panicking.

use candle_core::{DType, Tensor};

use crate::LayerError;

/// Validates the `(seq, hidden)` or `(batch, seq, hidden)` convention and
/// returns the hidden size.
pub fn expect_sequence(operand: &'static str, tensor: &Tensor) -> Result<usize, LayerError> {
    match tensor.dims() {
        [seq, hidden] | [_, seq, hidden] if *seq > 0 && *hidden > 0 => Ok(*hidden),
        dims => Err(LayerError::ShapeMismatch {
            operand,
            detail: format!(
                "expected non-empty (seq, d_model) or (batch, seq, d_model), got {dims:?}"
            ),
        }),
    }
}

/// Ensures the trailing (feature) dimension equals `expected`.
pub fn expect_hidden(
    operand: &'static str,
    tensor: &Tensor,
    expected: usize,
) -> Result<(), LayerError> {
    let actual = expect_sequence(operand, tensor)?;
    if actual == expected {
        Ok(())
    } else {
        Err(LayerError::ShapeMismatch {
            operand,
            detail: format!(
                "expected d_model {expected}, got {actual} (shape {:?})",
                tensor.dims()
            ),
        })
    }
}

/// Checks the tensor dtype is one of the allowed values.
pub fn expect_dtype_in(
    operand: &'static str,
    tensor: &Tensor,
    allowed: &[DType],
) -> Result<(), LayerError> {
    let dtype = tensor.dtype();
    if allowed.contains(&dtype) {
        Ok(())
    } else {
        Err(LayerError::ShapeMismatch {
            operand,
            detail: format!("expected dtype in {allowed:?}, got {dtype:?}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn accepts_two_and_three_dims() {
        let device = Device::Cpu;
        let flat = Tensor::zeros((4, 6), DType::F32, &device).unwrap();
        let batched = Tensor::zeros((2, 4, 6), DType::F32, &device).unwrap();
        assert_eq!(expect_sequence("x", &flat).unwrap(), 6);
        assert_eq!(expect_sequence("x", &batched).unwrap(), 6);
    }

    #[test]
    fn rejects_other_ranks_and_empty() {
        let device = Device::Cpu;
        let vector = Tensor::zeros(6, DType::F32, &device).unwrap();
        let empty = Tensor::zeros((0, 6), DType::F32, &device).unwrap();
        assert!(expect_sequence("x", &vector).is_err());
        assert!(expect_sequence("x", &empty).is_err());
    }

    #[test]
    fn hidden_mismatch_names_operand() {
        let device = Device::Cpu;
        let x = Tensor::zeros((3, 5), DType::F32, &device).unwrap();
        match expect_hidden("x", &x, 6).unwrap_err() {
            LayerError::ShapeMismatch { operand, detail } => {
                assert_eq!(operand, "x");
                assert!(detail.contains("expected d_model 6, got 5"), "{detail}");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
