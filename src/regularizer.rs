//! Lp regularization of embedding vectors.

use candle_core::Tensor;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for an [`LpRegularizer`], validated eagerly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegularizerConfig {
    /// Weight multiplying the penalty before it joins the loss.
    pub weight: f32,
    /// Norm degree; 1 or 2.
    pub p: u32,
    /// Divide by `sqrt(numel)` so the weight is comparable across
    /// dimensionalities and batch sizes.
    pub normalize: bool,
}

impl RegularizerConfig {
    /// The DistMult recipe (Yang et al. 2015): normalized L2 with
    /// weight 0.1.
    pub fn distmult_default() -> Self {
        Self {
            weight: 0.1,
            p: 2,
            normalize: true,
        }
    }
}

/// Adds `weight * ||x||_p` over the embeddings a forward pass touched.
#[derive(Debug, Clone, Copy)]
pub struct LpRegularizer {
    weight: f32,
    p: u32,
    normalize: bool,
}

impl LpRegularizer {
    pub fn new(config: RegularizerConfig) -> Result<Self> {
        if !(config.weight > 0.0) || !config.weight.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "regularizer weight must be positive and finite, got {}",
                config.weight
            )));
        }
        if config.p != 1 && config.p != 2 {
            return Err(Error::InvalidConfig(format!(
                "regularizer norm degree must be 1 or 2, got {}",
                config.p
            )));
        }
        Ok(Self {
            weight: config.weight,
            p: config.p,
            normalize: config.normalize,
        })
    }

    /// Weighted Lp penalty of `x` as a scalar tensor.
    pub fn penalty(&self, x: &Tensor) -> Result<Tensor> {
        let value = match self.p {
            1 => x.abs()?.sum_all()?,
            _ => x.sqr()?.sum_all()?.sqrt()?,
        };
        let value = if self.normalize {
            (value / (x.elem_count() as f64).sqrt())?
        } else {
            value
        };
        Ok((value * self.weight as f64)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn test_config_validation() {
        let bad_weight = LpRegularizer::new(RegularizerConfig {
            weight: 0.0,
            p: 2,
            normalize: false,
        });
        assert!(bad_weight.is_err());

        let bad_p = LpRegularizer::new(RegularizerConfig {
            weight: 0.1,
            p: 3,
            normalize: false,
        });
        assert!(bad_p.is_err());
    }

    #[test]
    fn test_l2_penalty_value() {
        let reg = LpRegularizer::new(RegularizerConfig {
            weight: 0.5,
            p: 2,
            normalize: false,
        })
        .unwrap();
        let x = Tensor::from_vec(vec![3.0f32, 4.0], (1, 2), &Device::Cpu).unwrap();
        let penalty = reg.penalty(&x).unwrap().to_scalar::<f32>().unwrap();
        // 0.5 * ||(3, 4)||_2 = 0.5 * 5
        assert!((penalty - 2.5).abs() < 1e-6);
    }

    #[test]
    fn test_l1_penalty_value() {
        let reg = LpRegularizer::new(RegularizerConfig {
            weight: 1.0,
            p: 1,
            normalize: false,
        })
        .unwrap();
        let x = Tensor::from_vec(vec![-1.0f32, 2.0, -3.0], (3,), &Device::Cpu).unwrap();
        let penalty = reg.penalty(&x).unwrap().to_scalar::<f32>().unwrap();
        assert!((penalty - 6.0).abs() < 1e-6);
    }
}
