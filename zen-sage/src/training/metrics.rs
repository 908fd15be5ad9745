//! Binary classification metrics
//!
//! `BinaryMetrics` accumulates predicted probabilities and labels over a whole
//! pass (one epoch or one evaluation) and derives the summary statistics at
//! the end. Hard predictions use a fixed 0.5 threshold.

use std::cmp::Ordering;

use crate::errors::{GNNError, GNNResult};

/// Decision threshold on the predicted probability
pub const THRESHOLD: f32 = 0.5;

/// Confusion matrix counts at the decision threshold
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfusionMatrix {
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
}

impl ConfusionMatrix {
    pub fn total(&self) -> usize {
        self.true_positives + self.false_positives + self.true_negatives + self.false_negatives
    }
}

/// Streaming accumulator over one pass
#[derive(Debug, Clone, Default)]
pub struct BinaryMetrics {
    scores: Vec<f32>,
    labels: Vec<bool>,
    weighted_loss: f64,
    loss_samples: usize,
}

impl BinaryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a batch of predicted probabilities and their 0/1 labels
    pub fn update(&mut self, probabilities: &[f32], labels: &[f32]) -> GNNResult<()> {
        if probabilities.len() != labels.len() {
            return Err(GNNError::DimensionMismatch(format!(
                "{} probabilities but {} labels",
                probabilities.len(),
                labels.len()
            )));
        }
        self.scores.extend_from_slice(probabilities);
        self.labels.extend(labels.iter().map(|&y| y >= 0.5));
        Ok(())
    }

    /// Record the mean loss of a batch of `samples` links
    pub fn record_loss(&mut self, batch_loss: f32, samples: usize) {
        self.weighted_loss += f64::from(batch_loss) * samples as f64;
        self.loss_samples += samples;
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn reset(&mut self) {
        self.scores.clear();
        self.labels.clear();
        self.weighted_loss = 0.0;
        self.loss_samples = 0;
    }

    /// Sample-weighted mean of the recorded batch losses
    pub fn loss(&self) -> f32 {
        if self.loss_samples == 0 {
            0.0
        } else {
            (self.weighted_loss / self.loss_samples as f64) as f32
        }
    }

    pub fn confusion_matrix(&self) -> ConfusionMatrix {
        let mut matrix = ConfusionMatrix::default();
        for (&score, &label) in self.scores.iter().zip(&self.labels) {
            match (score > THRESHOLD, label) {
                (true, true) => matrix.true_positives += 1,
                (true, false) => matrix.false_positives += 1,
                (false, false) => matrix.true_negatives += 1,
                (false, true) => matrix.false_negatives += 1,
            }
        }
        matrix
    }

    pub fn accuracy(&self) -> f32 {
        let m = self.confusion_matrix();
        ratio(m.true_positives + m.true_negatives, m.total())
    }

    pub fn precision(&self) -> f32 {
        let m = self.confusion_matrix();
        ratio(m.true_positives, m.true_positives + m.false_positives)
    }

    pub fn recall(&self) -> f32 {
        let m = self.confusion_matrix();
        ratio(m.true_positives, m.true_positives + m.false_negatives)
    }

    /// Harmonic mean of precision and recall, 0 when both are 0
    pub fn f1(&self) -> f32 {
        f1_score(self.precision(), self.recall())
    }

    /// Area under the ROC curve via the rank statistic, ties averaged.
    ///
    /// Returns 0.5 when only one class has been seen.
    pub fn auc(&self) -> f32 {
        let positives = self.labels.iter().filter(|&&y| y).count();
        let negatives = self.labels.len() - positives;
        if positives == 0 || negatives == 0 {
            return 0.5;
        }

        let mut order: Vec<usize> = (0..self.scores.len()).collect();
        order.sort_by(|&a, &b| {
            self.scores[a]
                .partial_cmp(&self.scores[b])
                .unwrap_or(Ordering::Equal)
        });

        // Sum of 1-based ranks of the positives, tied groups share their mean rank
        let mut positive_rank_sum = 0.0f64;
        let mut start = 0;
        while start < order.len() {
            let mut end = start + 1;
            while end < order.len() && self.scores[order[end]] == self.scores[order[start]] {
                end += 1;
            }
            let mean_rank = (start + 1 + end) as f64 / 2.0;
            let tied_positives = order[start..end].iter().filter(|&&i| self.labels[i]).count();
            positive_rank_sum += mean_rank * tied_positives as f64;
            start = end;
        }

        let (p, n) = (positives as f64, negatives as f64);
        ((positive_rank_sum - p * (p + 1.0) / 2.0) / (p * n)) as f32
    }
}

/// F1 from precision and recall, 0 when both are 0
pub fn f1_score(precision: f32, recall: f32) -> f32 {
    if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    }
}

fn ratio(numerator: usize, denominator: usize) -> f32 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f32 / denominator as f32
    }
}
