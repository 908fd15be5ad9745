//! Loss functions for link classification
//!
//! Losses take raw scores (logits) and apply the sigmoid themselves, so the
//! gradient they return is with respect to the logit.

use num_traits::Float;

use super::ZenLossFunction;
use crate::errors::{GNNError, GNNResult};

/// Binary cross-entropy on sigmoid probabilities, mean over the batch
#[derive(Debug, Clone)]
pub struct BinaryCrossEntropyLoss<T: Float> {
    /// Probabilities are clipped to [epsilon, 1 - epsilon] before the log
    epsilon: T,
}

impl<T: Float> BinaryCrossEntropyLoss<T> {
    pub fn new() -> Self {
        Self {
            epsilon: T::from(1e-7).unwrap_or_else(T::epsilon),
        }
    }

    fn sigmoid(x: T) -> T {
        if x >= T::zero() {
            T::one() / (T::one() + (-x).exp())
        } else {
            let e = x.exp();
            e / (T::one() + e)
        }
    }

    fn check_lengths(predictions: &[T], targets: &[T]) -> GNNResult<()> {
        if predictions.len() != targets.len() {
            return Err(GNNError::DimensionMismatch(format!(
                "{} predictions but {} targets",
                predictions.len(),
                targets.len()
            )));
        }
        if predictions.is_empty() {
            return Err(GNNError::InvalidInput(
                "Loss requires at least one prediction".to_string(),
            ));
        }
        Ok(())
    }
}

impl<T: Float> Default for BinaryCrossEntropyLoss<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Float + Send + Sync> ZenLossFunction<T> for BinaryCrossEntropyLoss<T> {
    fn compute_loss(&self, predictions: &[T], targets: &[T]) -> GNNResult<T> {
        Self::check_lengths(predictions, targets)?;

        let upper = T::one() - self.epsilon;
        let total = predictions
            .iter()
            .zip(targets)
            .fold(T::zero(), |acc, (&logit, &target)| {
                let prob = Self::sigmoid(logit).max(self.epsilon).min(upper);
                acc - target * prob.ln() - (T::one() - target) * (T::one() - prob).ln()
            });

        let n = T::from(predictions.len()).unwrap_or_else(T::one);
        Ok(total / n)
    }

    fn compute_gradient(&self, predictions: &[T], targets: &[T]) -> GNNResult<Vec<T>> {
        Self::check_lengths(predictions, targets)?;

        let n = T::from(predictions.len()).unwrap_or_else(T::one);
        Ok(predictions
            .iter()
            .zip(targets)
            .map(|(&logit, &target)| (Self::sigmoid(logit) - target) / n)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_bce_at_zero_logit_is_ln2() {
        let loss = BinaryCrossEntropyLoss::<f64>::new();
        let value = loss.compute_loss(&[0.0, 0.0], &[1.0, 0.0]).unwrap();
        assert_abs_diff_eq!(value, std::f64::consts::LN_2, epsilon = 1e-12);
    }

    #[test]
    fn test_bce_clips_confident_mistakes() {
        let loss = BinaryCrossEntropyLoss::<f64>::new();
        let value = loss.compute_loss(&[-1000.0], &[1.0]).unwrap();
        assert_abs_diff_eq!(value, -(1e-7f64).ln(), epsilon = 1e-9);
    }

    #[test]
    fn test_gradient_is_sigmoid_minus_label_over_batch() {
        let loss = BinaryCrossEntropyLoss::<f64>::new();
        let logits = [0.3, -1.2, 2.0, 0.0];
        let labels = [1.0, 0.0, 0.0, 1.0];
        let grads = loss.compute_gradient(&logits, &labels).unwrap();

        for ((&s, &y), g) in logits.iter().zip(&labels).zip(grads) {
            let p = 1.0 / (1.0 + (-s).exp());
            assert_abs_diff_eq!(g, (p - y) / 4.0, epsilon = 1e-12);
        }

        // Finite difference on an unclipped logit
        let h = 1e-6;
        let mut plus = logits;
        let mut minus = logits;
        plus[1] += h;
        minus[1] -= h;
        let numeric = (loss.compute_loss(&plus, &labels).unwrap()
            - loss.compute_loss(&minus, &labels).unwrap())
            / (2.0 * h);
        let analytic = loss.compute_gradient(&logits, &labels).unwrap()[1];
        assert_abs_diff_eq!(numeric, analytic, epsilon = 1e-6);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let loss = BinaryCrossEntropyLoss::<f32>::new();
        assert!(loss.compute_loss(&[0.1], &[1.0, 0.0]).is_err());
        assert!(loss.compute_gradient(&[], &[]).is_err());
    }
}
