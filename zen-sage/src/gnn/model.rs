/**
 * @file zen-sage/src/gnn/model.rs
 * @brief GraphSAGE encoder with an inner-product link classifier
 *
 * ## Forward pass
 *
 * For `L` layers and hop features `[h_0, ..., h_L]`, layer `k` maps every
 * adjacent pair `(h_i, h_{i+1})` with `i < L - k` to a new `h_i`, so the hop
 * list shrinks by one per layer and a single matrix `[2B, d]` remains. Its rows
 * are L2-normalised into embeddings; rows `0..B` are link sources and rows
 * `B..2B` their targets. The link score is the inner product of the two
 * embeddings and the link probability its sigmoid.
 *
 * ## Training
 *
 * `train_batch` runs forward in training mode, computes binary cross-entropy,
 * backpropagates by hand through every step and applies one Adam update.
 */

use ndarray::{s, Array1, Array2, Axis, Ix1, Ix2};
use rand_chacha::ChaCha8Rng;

use super::layers::{AggregatorCache, LayerGradients, MeanAggregatorLayer};
use super::sampler::LinkBatch;
use super::weights::ModelWeights;
use super::{seeded_rng, sigmoid, streams, ActivationFunction, TrainingMode};
use crate::config::HyperParameters;
use crate::errors::{GNNError, GNNResult};
use crate::training::{BinaryCrossEntropyLoss, ZenAdam, ZenLossFunction, ZenOptimizer};

/// Lower bound on the squared norm before normalisation
const NORM_EPSILON: f32 = 1e-12;

/// Loss and probabilities of one batch
#[derive(Debug, Clone)]
pub struct BatchOutput {
    pub loss: f32,
    pub probabilities: Array1<f32>,
}

/// Intermediate values needed by the backward pass
#[derive(Debug)]
struct ForwardCache {
    /// One cache per hop pair, per layer
    layer_caches: Vec<Vec<AggregatorCache>>,
    embeddings: Array2<f32>,
    norms: Array1<f32>,
    clamped: Vec<bool>,
}

/// GraphSAGE link prediction model
#[derive(Debug, Clone)]
pub struct GraphSAGELinkModel {
    layers: Vec<MeanAggregatorLayer>,
    num_samples: Vec<usize>,
    optimizer: ZenAdam<f32>,
    loss: BinaryCrossEntropyLoss<f32>,
    dropout_rng: ChaCha8Rng,
}

impl GraphSAGELinkModel {
    /**
     * Build the encoder for `feature_dim` input features.
     *
     * @param feature_dim Node feature width
     * @param hyper Layer sizes, sample counts, bias, dropout and optimizer settings
     * @param seed Master seed for weight initialisation and dropout
     */
    pub fn new(feature_dim: usize, hyper: &HyperParameters, seed: u64) -> GNNResult<Self> {
        if hyper.layer_sizes.is_empty() || hyper.layer_sizes.len() != hyper.num_samples.len() {
            return Err(GNNError::InvalidConfiguration(format!(
                "layer_sizes ({}) and num_samples ({}) must be non-empty and of equal length",
                hyper.layer_sizes.len(),
                hyper.num_samples.len()
            )));
        }

        let mut init_rng = seeded_rng(seed, streams::INIT);
        let num_layers = hyper.layer_sizes.len();
        let mut layers = Vec::with_capacity(num_layers);
        let mut input_dim = feature_dim;

        for (k, &output_dim) in hyper.layer_sizes.iter().enumerate() {
            let activation = if k + 1 == num_layers {
                ActivationFunction::Linear
            } else {
                ActivationFunction::ReLU
            };
            layers.push(MeanAggregatorLayer::new(
                input_dim,
                output_dim,
                hyper.bias,
                activation,
                hyper.dropout,
                hyper.weight_init,
                &mut init_rng,
            )?);
            input_dim = output_dim;
        }

        let mut optimizer = ZenAdam::from_config(hyper.learning_rate, &hyper.adam);
        optimizer.initialize(layers.iter().map(MeanAggregatorLayer::num_parameters).sum())?;

        Ok(Self {
            layers,
            num_samples: hyper.num_samples.clone(),
            optimizer,
            loss: BinaryCrossEntropyLoss::new(),
            dropout_rng: seeded_rng(seed, streams::DROPOUT),
        })
    }

    pub fn layers(&self) -> &[MeanAggregatorLayer] {
        &self.layers
    }

    pub fn num_parameters(&self) -> usize {
        self.layers.iter().map(MeanAggregatorLayer::num_parameters).sum()
    }

    /// Width of the link embeddings
    pub fn embedding_dim(&self) -> usize {
        self.layers.last().map_or(0, MeanAggregatorLayer::output_dim)
    }

    /// One optimisation step on a batch; returns the pre-update loss and probabilities
    pub fn train_batch(&mut self, batch: &LinkBatch) -> GNNResult<BatchOutput> {
        let (output, grads) = self.loss_and_gradients(batch, TrainingMode::Training)?;

        let flat: Vec<f32> = grads.iter().flat_map(LayerGradients::values).collect();
        let parameters: Vec<&mut f32> = self
            .layers
            .iter_mut()
            .flat_map(MeanAggregatorLayer::parameters_mut)
            .collect();
        self.optimizer.update_parameters(parameters, &flat)?;

        Ok(output)
    }

    /// Loss and probabilities without dropout or parameter updates
    pub fn predict_batch(&mut self, batch: &LinkBatch) -> GNNResult<BatchOutput> {
        let (scores, _) = self.forward(&batch.hops, TrainingMode::Inference)?;
        self.score_output(&scores, &batch.labels)
    }

    /// L2-normalised embeddings of the batch heads, sources then targets
    pub fn embed(&mut self, hops: &[Array2<f32>]) -> GNNResult<Array2<f32>> {
        let (_, cache) = self.forward(hops, TrainingMode::Inference)?;
        Ok(cache.embeddings)
    }

    /// Weights in layer order: w_self, w_neigh, bias (when used)
    pub fn weights(&self) -> ModelWeights {
        let mut arrays = Vec::with_capacity(3 * self.layers.len());
        for layer in &self.layers {
            arrays.push(layer.w_self.clone().into_dyn());
            arrays.push(layer.w_neigh.clone().into_dyn());
            if let Some(bias) = &layer.bias {
                arrays.push(bias.clone().into_dyn());
            }
        }
        ModelWeights::new(arrays)
    }

    /// Replace every weight and restart the optimizer.
    ///
    /// Count and shapes must match the model exactly.
    pub fn set_weights(&mut self, weights: &ModelWeights) -> GNNResult<()> {
        let expected = self.weights().shapes();
        let actual = weights.shapes();
        if expected != actual {
            return Err(GNNError::DimensionMismatch(format!(
                "Model expects weight shapes {:?}, got {:?}",
                expected, actual
            )));
        }

        let mut arrays = weights.arrays().iter();
        let mut next = || {
            arrays
                .next()
                .cloned()
                .ok_or_else(|| GNNError::DimensionMismatch("Too few weight arrays".to_string()))
        };
        for layer in &mut self.layers {
            layer.w_self = next()?.into_dimensionality::<Ix2>()?;
            layer.w_neigh = next()?.into_dimensionality::<Ix2>()?;
            if layer.bias.is_some() {
                layer.bias = Some(next()?.into_dimensionality::<Ix1>()?);
            }
        }
        // Moments tracked for the previous weights no longer apply
        self.optimizer.reset();
        Ok(())
    }

    fn score_output(&self, scores: &Array1<f32>, labels: &Array1<f32>) -> GNNResult<BatchOutput> {
        let scores = scores.to_vec();
        let loss = self.loss.compute_loss(&scores, &labels.to_vec())?;
        let probabilities = scores.into_iter().map(sigmoid).collect();
        Ok(BatchOutput {
            loss,
            probabilities,
        })
    }

    fn loss_and_gradients(
        &mut self,
        batch: &LinkBatch,
        mode: TrainingMode,
    ) -> GNNResult<(BatchOutput, Vec<LayerGradients>)> {
        let (scores, cache) = self.forward(&batch.hops, mode)?;
        let output = self.score_output(&scores, &batch.labels)?;
        let d_scores = self
            .loss
            .compute_gradient(&scores.to_vec(), &batch.labels.to_vec())?;
        let grads = self.backward(&cache, &d_scores)?;
        Ok((output, grads))
    }

    fn forward(
        &mut self,
        hops: &[Array2<f32>],
        mode: TrainingMode,
    ) -> GNNResult<(Array1<f32>, ForwardCache)> {
        let num_layers = self.layers.len();
        if hops.len() != num_layers + 1 {
            return Err(GNNError::DimensionMismatch(format!(
                "Model with {} layers needs {} hops, got {}",
                num_layers,
                num_layers + 1,
                hops.len()
            )));
        }
        let heads = hops[0].nrows();
        if heads == 0 || heads % 2 != 0 {
            return Err(GNNError::DimensionMismatch(format!(
                "Head hop must hold sources then targets, got {} rows",
                heads
            )));
        }

        let mut current = hops.to_vec();
        let mut layer_caches = Vec::with_capacity(num_layers);

        for layer in &self.layers {
            let pairs = current.len() - 1;
            let mut next = Vec::with_capacity(pairs);
            let mut caches = Vec::with_capacity(pairs);
            for i in 0..pairs {
                let (out, cache) = layer.forward(
                    &current[i],
                    &current[i + 1],
                    self.num_samples[i],
                    mode,
                    &mut self.dropout_rng,
                )?;
                next.push(out);
                caches.push(cache);
            }
            layer_caches.push(caches);
            current = next;
        }

        let raw = current
            .pop()
            .ok_or_else(|| GNNError::TrainingFailed("Encoder produced no output".to_string()))?;

        let squared = raw.map_axis(Axis(1), |row| row.dot(&row));
        let clamped: Vec<bool> = squared.iter().map(|&s| s <= NORM_EPSILON).collect();
        let norms = squared.mapv(|s| s.max(NORM_EPSILON).sqrt());
        let embeddings = &raw / &norms.view().insert_axis(Axis(1));

        let half = heads / 2;
        let sources = embeddings.slice(s![..half, ..]);
        let targets = embeddings.slice(s![half.., ..]);
        let scores = (&sources * &targets).sum_axis(Axis(1));

        Ok((
            scores,
            ForwardCache {
                layer_caches,
                embeddings,
                norms,
                clamped,
            },
        ))
    }

    fn backward(&self, cache: &ForwardCache, d_scores: &[f32]) -> GNNResult<Vec<LayerGradients>> {
        let embeddings = &cache.embeddings;
        let half = embeddings.nrows() / 2;
        if d_scores.len() != half {
            return Err(GNNError::DimensionMismatch(format!(
                "{} score gradients for {} links",
                d_scores.len(),
                half
            )));
        }

        // Inner product
        let mut d_embeddings = Array2::<f32>::zeros(embeddings.raw_dim());
        for (i, &ds) in d_scores.iter().enumerate() {
            let source = embeddings.row(i);
            let target = embeddings.row(half + i);
            d_embeddings.row_mut(i).scaled_add(ds, &target);
            d_embeddings.row_mut(half + i).scaled_add(ds, &source);
        }

        // L2 normalisation
        let mut d_raw = d_embeddings;
        for (i, mut row) in d_raw.rows_mut().into_iter().enumerate() {
            let norm = cache.norms[i];
            if !cache.clamped[i] {
                let e = embeddings.row(i);
                let projection = e.dot(&row);
                row.scaled_add(-projection, &e);
            }
            row /= norm;
        }

        // Encoder layers, last to first
        let mut grads: Vec<LayerGradients> =
            self.layers.iter().map(MeanAggregatorLayer::zero_gradients).collect();
        let mut d_current = vec![d_raw];

        for (k, layer) in self.layers.iter().enumerate().rev() {
            let caches = &cache.layer_caches[k];
            let mut d_inputs: Vec<Option<Array2<f32>>> = vec![None; caches.len() + 1];

            for (i, layer_cache) in caches.iter().enumerate() {
                let (d_self, d_neigh) = layer.backward(layer_cache, &d_current[i], &mut grads[k])?;
                if k > 0 {
                    accumulate(&mut d_inputs[i], d_self);
                    accumulate(&mut d_inputs[i + 1], d_neigh);
                }
            }

            if k > 0 {
                d_current = d_inputs
                    .into_iter()
                    .map(|d| {
                        d.ok_or_else(|| {
                            GNNError::TrainingFailed("Missing hop gradient".to_string())
                        })
                    })
                    .collect::<GNNResult<_>>()?;
            }
        }

        Ok(grads)
    }
}

fn accumulate(slot: &mut Option<Array2<f32>>, gradient: Array2<f32>) {
    match slot {
        Some(total) => *total += &gradient,
        None => *slot = Some(gradient),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray_rand::RandomExt;
    use rand::distributions::Uniform;

    fn hyper(layer_sizes: Vec<usize>, num_samples: Vec<usize>) -> HyperParameters {
        HyperParameters {
            layer_sizes,
            num_samples,
            dropout: 0.0,
            ..HyperParameters::default()
        }
    }

    /// Random batch of `links` links over 3 features
    fn batch(links: usize, num_samples: &[usize], seed: u64) -> LinkBatch {
        let mut rng = seeded_rng(seed, streams::SAMPLER);
        let mut rows = 2 * links;
        let mut hops = vec![Array2::random_using((rows, 3), Uniform::new(-1.0f32, 1.0), &mut rng)];
        for &s in num_samples {
            rows *= s;
            hops.push(Array2::random_using((rows, 3), Uniform::new(-1.0f32, 1.0), &mut rng));
        }
        let labels = Array1::from_iter((0..links).map(|i| (i % 2) as f32));
        LinkBatch { hops, labels }
    }

    fn numeric_gradient(model: &GraphSAGELinkModel, batch: &LinkBatch, index: usize) -> f32 {
        let eps = 5e-3;
        let eval = |delta: f32| {
            let mut shifted = model.clone();
            *shifted
                .layers
                .iter_mut()
                .flat_map(MeanAggregatorLayer::parameters_mut)
                .nth(index)
                .unwrap() += delta;
            shifted.predict_batch(batch).unwrap().loss
        };
        (eval(eps) - eval(-eps)) / (2.0 * eps)
    }

    #[test]
    fn test_weights_layout() {
        let model = GraphSAGELinkModel::new(3, &hyper(vec![6, 5], vec![2, 2]), 42).unwrap();
        assert_eq!(
            model.weights().shapes(),
            vec![
                vec![3, 3],
                vec![3, 3],
                vec![6],
                vec![6, 3],
                vec![6, 2],
                vec![5]
            ]
        );
        assert_eq!(model.layers()[0].activation, ActivationFunction::ReLU);
        assert_eq!(model.layers()[1].activation, ActivationFunction::Linear);
        assert_eq!(model.embedding_dim(), 5);

        let no_bias = HyperParameters {
            bias: false,
            ..hyper(vec![4], vec![2])
        };
        let model = GraphSAGELinkModel::new(3, &no_bias, 42).unwrap();
        assert_eq!(model.weights().len(), 2);
    }

    #[test]
    fn test_embeddings_are_unit_norm() {
        let mut model = GraphSAGELinkModel::new(3, &hyper(vec![4, 4], vec![2, 3]), 1).unwrap();
        let batch = batch(3, &[2, 3], 5);
        let embeddings = model.embed(&batch.hops).unwrap();
        assert_eq!(embeddings.dim(), (6, 4));
        for row in embeddings.rows() {
            let norm = row.dot(&row).sqrt();
            assert!((norm - 1.0).abs() < 1e-5 || norm == 0.0);
        }

        let output = model.predict_batch(&batch).unwrap();
        assert!(output
            .probabilities
            .iter()
            .all(|&p| (0.0..=1.0).contains(&p)));
    }

    #[test]
    fn test_single_layer_gradients_match_finite_differences() {
        let mut model = GraphSAGELinkModel::new(3, &hyper(vec![4], vec![2]), 3).unwrap();
        let batch = batch(3, &[2], 8);

        let (_, grads) = model
            .loss_and_gradients(&batch, TrainingMode::Inference)
            .unwrap();
        let analytic: Vec<f32> = grads.iter().flat_map(LayerGradients::values).collect();

        for (index, &g) in analytic.iter().enumerate() {
            let numeric = numeric_gradient(&model, &batch, index);
            assert!(
                (g - numeric).abs() < 1e-3,
                "parameter {}: analytic {} vs numeric {}",
                index,
                g,
                numeric
            );
        }
    }

    #[test]
    fn test_two_layer_gradients_match_finite_differences() {
        let mut model = GraphSAGELinkModel::new(3, &hyper(vec![5, 4], vec![2, 2]), 4).unwrap();
        let batch = batch(2, &[2, 2], 9);

        let (_, grads) = model
            .loss_and_gradients(&batch, TrainingMode::Inference)
            .unwrap();
        let analytic: Vec<f32> = grads.iter().flat_map(LayerGradients::values).collect();
        assert_eq!(analytic.len(), model.num_parameters());

        for index in 0..analytic.len() {
            let numeric = numeric_gradient(&model, &batch, index);
            assert!(
                (analytic[index] - numeric).abs() < 1e-3,
                "parameter {}: analytic {} vs numeric {}",
                index,
                analytic[index],
                numeric
            );
        }
    }

    #[test]
    fn test_training_reduces_loss_on_fixed_batch() {
        let config = HyperParameters {
            learning_rate: 0.05,
            ..hyper(vec![8, 8], vec![2, 2])
        };
        let mut model = GraphSAGELinkModel::new(3, &config, 11).unwrap();
        let batch = batch(4, &[2, 2], 12);

        let before = model.predict_batch(&batch).unwrap().loss;
        for _ in 0..100 {
            model.train_batch(&batch).unwrap();
        }
        let after = model.predict_batch(&batch).unwrap().loss;
        assert!(after < before, "loss went from {} to {}", before, after);
    }

    #[test]
    fn test_set_weights_round_trip_and_shape_check() {
        let config = hyper(vec![4, 4], vec![2, 2]);
        let mut source = GraphSAGELinkModel::new(3, &config, 1).unwrap();
        let mut target = GraphSAGELinkModel::new(3, &config, 2).unwrap();
        let batch = batch(2, &[2, 2], 3);

        target.set_weights(&source.weights()).unwrap();
        assert_eq!(target.weights(), source.weights());
        assert_eq!(
            target.predict_batch(&batch).unwrap().probabilities,
            source.predict_batch(&batch).unwrap().probabilities
        );

        let mut arrays = source.weights().into_arrays();
        arrays.pop();
        assert!(matches!(
            target.set_weights(&ModelWeights::new(arrays)),
            Err(GNNError::DimensionMismatch(_))
        ));

        let other = GraphSAGELinkModel::new(3, &hyper(vec![6, 4], vec![2, 2]), 1).unwrap();
        assert!(matches!(
            target.set_weights(&other.weights()),
            Err(GNNError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn test_set_weights_restarts_optimizer() {
        let config = hyper(vec![4, 4], vec![2, 2]);
        let batch = batch(4, &[2, 2], 6);
        let mut fresh = GraphSAGELinkModel::new(3, &config, 5).unwrap();
        let mut restored = GraphSAGELinkModel::new(3, &config, 5).unwrap();

        let initial = fresh.weights();
        for _ in 0..5 {
            restored.train_batch(&batch).unwrap();
        }
        restored.set_weights(&initial).unwrap();

        fresh.train_batch(&batch).unwrap();
        restored.train_batch(&batch).unwrap();
        assert_eq!(restored.weights(), fresh.weights());
    }

    #[test]
    fn test_mismatched_hops_rejected() {
        let mut model = GraphSAGELinkModel::new(3, &hyper(vec![4, 4], vec![2, 2]), 1).unwrap();
        let short = batch(2, &[2], 3);
        assert!(model.predict_batch(&short).is_err());
    }
}
