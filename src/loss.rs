//! Loss functors mapping scores to a scalar training objective.

use candle_core::Tensor;

use crate::error::{Error, Result};

/// Pairwise margin ranking loss: `sum(max(0, margin - (pos - neg)))`.
///
/// Zero exactly when every positive score beats its negative by at least
/// the margin. Uses the *sum* reduction, matching the classic TransE
/// recipe: per-batch loss scales with batch size, which couples the
/// effective learning rate to the batch size. Callers that want a
/// size-independent objective should divide by the batch length
/// themselves.
#[derive(Debug, Clone, Copy)]
pub struct MarginRankingLoss {
    margin: f32,
}

impl MarginRankingLoss {
    pub fn new(margin: f32) -> Result<Self> {
        if !(margin > 0.0) || !margin.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "margin must be positive and finite, got {}",
                margin
            )));
        }
        Ok(Self { margin })
    }

    /// Compute the loss for aligned `(n,)` score vectors.
    pub fn forward(&self, pos_scores: &Tensor, neg_scores: &Tensor) -> Result<Tensor> {
        let hinge = ((neg_scores - pos_scores)? + self.margin as f64)?.relu()?;
        Ok(hinge.sum_all()?)
    }

    pub fn margin(&self) -> f32 {
        self.margin
    }
}

/// Multi-label pointwise loss: binary cross-entropy on raw scores against a
/// (possibly smoothed) label matrix of the same shape, mean-reduced over
/// batch and candidates.
#[derive(Debug, Clone, Copy, Default)]
pub struct BceWithLogitsLoss;

impl BceWithLogitsLoss {
    pub fn forward(&self, scores: &Tensor, labels: &Tensor) -> Result<Tensor> {
        Ok(candle_nn::loss::binary_cross_entropy_with_logit(
            scores, labels,
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn vec1(values: &[f32]) -> Tensor {
        Tensor::from_vec(values.to_vec(), (values.len(),), &Device::Cpu).unwrap()
    }

    #[test]
    fn test_margin_must_be_positive() {
        assert!(MarginRankingLoss::new(0.0).is_err());
        assert!(MarginRankingLoss::new(-1.0).is_err());
        assert!(MarginRankingLoss::new(f32::NAN).is_err());
        assert!(MarginRankingLoss::new(1.0).is_ok());
    }

    #[test]
    fn test_zero_when_margin_satisfied_everywhere() {
        let loss = MarginRankingLoss::new(1.0).unwrap();
        let pos = vec1(&[2.0, 5.0, 0.0]);
        let neg = vec1(&[1.0, 2.0, -1.5]);
        let value = loss.forward(&pos, &neg).unwrap().to_scalar::<f32>().unwrap();
        assert_eq!(value, 0.0);
    }

    #[test]
    fn test_positive_when_any_pair_violates_margin() {
        let loss = MarginRankingLoss::new(1.0).unwrap();
        let pos = vec1(&[2.0, 1.0]);
        let neg = vec1(&[1.0, 0.5]);
        // Second pair's gap is 0.5 < margin, hinge = 0.5.
        let value = loss.forward(&pos, &neg).unwrap().to_scalar::<f32>().unwrap();
        assert!((value - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_monotone_in_score_gap() {
        let loss = MarginRankingLoss::new(1.0).unwrap();
        let neg = vec1(&[0.0]);
        let mut previous = f32::INFINITY;
        for gap in [-2.0f32, -1.0, 0.0, 0.5, 1.0, 2.0] {
            let value = loss
                .forward(&vec1(&[gap]), &neg)
                .unwrap()
                .to_scalar::<f32>()
                .unwrap();
            assert!(value <= previous, "loss must not increase with the gap");
            previous = value;
        }
        assert_eq!(previous, 0.0);
    }

    #[test]
    fn test_sum_reduction_scales_with_batch() {
        let loss = MarginRankingLoss::new(1.0).unwrap();
        let one = loss
            .forward(&vec1(&[0.0]), &vec1(&[0.0]))
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        let three = loss
            .forward(&vec1(&[0.0; 3]), &vec1(&[0.0; 3]))
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        assert!((three - 3.0 * one).abs() < 1e-6);
    }

    #[test]
    fn test_bce_prefers_confident_correct_scores() {
        let loss = BceWithLogitsLoss;
        let labels =
            Tensor::from_vec(vec![1.0f32, 0.0, 0.0], (1, 3), &Device::Cpu).unwrap();
        let good = Tensor::from_vec(vec![4.0f32, -4.0, -4.0], (1, 3), &Device::Cpu).unwrap();
        let bad = Tensor::from_vec(vec![-4.0f32, 4.0, 4.0], (1, 3), &Device::Cpu).unwrap();

        let good_loss = loss.forward(&good, &labels).unwrap().to_scalar::<f32>().unwrap();
        let bad_loss = loss.forward(&bad, &labels).unwrap().to_scalar::<f32>().unwrap();
        assert!(good_loss < bad_loss);
    }
}
