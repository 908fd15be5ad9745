/**
 * @file zen-sage/src/gnn/layers.rs
 * @brief GraphSAGE mean aggregator layer
 *
 * The layer combines a node's own representation with the mean of its sampled
 * neighbours:
 *
 * ```text
 * h = act([drop(x_self) @ W_self | mean_S(drop(x_neigh)) @ W_neigh] + b)
 * ```
 *
 * `W_self` produces the first `d - d/2` output columns and `W_neigh` the
 * remaining `d/2`. Dropout is inverted (scaled by `1 / (1 - rate)`) and only
 * active in `TrainingMode::Training`.
 *
 * ## Backward pass
 *
 * `backward` consumes the cache of one `forward` call and accumulates into a
 * `LayerGradients`; a layer applied to several hop pairs in the same batch
 * simply has `backward` called once per pair with the same accumulator.
 */

use ndarray::{concatenate, s, Array1, Array2, Axis};
use ndarray_rand::RandomExt;
use rand::distributions::Uniform;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Bernoulli, Distribution};

use super::{ActivationFunction, TrainingMode, WeightInitialization};
use crate::errors::{GNNError, GNNResult};

/// Mean aggregator layer with separate self and neighbour kernels
#[derive(Debug, Clone)]
pub struct MeanAggregatorLayer {
    /// Self transformation [input_dim, output_dim - output_dim / 2]
    pub w_self: Array2<f32>,

    /// Neighbour transformation [input_dim, output_dim / 2]
    pub w_neigh: Array2<f32>,

    /// Bias over the concatenated output [output_dim]
    pub bias: Option<Array1<f32>>,

    pub activation: ActivationFunction,

    /// Dropout rate on both inputs while training
    pub dropout: f32,
}

/// Gradient accumulator mirroring the layer's parameters
#[derive(Debug, Clone, PartialEq)]
pub struct LayerGradients {
    pub w_self: Array2<f32>,
    pub w_neigh: Array2<f32>,
    pub bias: Option<Array1<f32>>,
}

/// Intermediate values of one forward call
#[derive(Debug, Clone)]
pub struct AggregatorCache {
    self_input: Array2<f32>,
    neigh_mean: Array2<f32>,
    self_mask: Option<Array2<f32>>,
    neigh_mask: Option<Array2<f32>>,
    pre_activation: Array2<f32>,
    num_samples: usize,
}

impl MeanAggregatorLayer {
    /**
     * Create a layer with freshly initialised kernels and a zero bias.
     *
     * @param input_dim Width of the incoming representations
     * @param output_dim Width of the concatenated output, at least 2
     * @param use_bias Whether a bias vector is learned
     * @param activation Output non-linearity
     * @param dropout Input dropout rate in [0, 1)
     * @param init Kernel initialisation scheme
     * @param rng Initialisation random stream
     */
    pub fn new(
        input_dim: usize,
        output_dim: usize,
        use_bias: bool,
        activation: ActivationFunction,
        dropout: f32,
        init: WeightInitialization,
        rng: &mut impl Rng,
    ) -> GNNResult<Self> {
        if input_dim == 0 || output_dim < 2 {
            return Err(GNNError::InvalidConfiguration(format!(
                "Layer dimensions must be positive with output_dim >= 2: input_dim={}, output_dim={}",
                input_dim, output_dim
            )));
        }

        let self_dim = output_dim - output_dim / 2;
        let neigh_dim = output_dim / 2;

        Ok(Self {
            w_self: create_weight_matrix((input_dim, self_dim), init, rng),
            w_neigh: create_weight_matrix((input_dim, neigh_dim), init, rng),
            bias: use_bias.then(|| Array1::zeros(output_dim)),
            activation,
            dropout,
        })
    }

    pub fn input_dim(&self) -> usize {
        self.w_self.nrows()
    }

    pub fn output_dim(&self) -> usize {
        self.w_self.ncols() + self.w_neigh.ncols()
    }

    /// Forward pass over `M` nodes with `num_samples` neighbours each.
    ///
    /// `neigh_features` holds the neighbours of node `m` in rows
    /// `m * num_samples .. (m + 1) * num_samples`.
    pub fn forward(
        &self,
        self_features: &Array2<f32>,
        neigh_features: &Array2<f32>,
        num_samples: usize,
        mode: TrainingMode,
        rng: &mut ChaCha8Rng,
    ) -> GNNResult<(Array2<f32>, AggregatorCache)> {
        let (num_nodes, input_dim) = self_features.dim();
        if input_dim != self.input_dim() || neigh_features.ncols() != input_dim {
            return Err(GNNError::DimensionMismatch(format!(
                "Layer expects {} input features, got self={} neigh={}",
                self.input_dim(),
                input_dim,
                neigh_features.ncols()
            )));
        }
        if num_samples == 0 || neigh_features.nrows() != num_nodes * num_samples {
            return Err(GNNError::DimensionMismatch(format!(
                "Expected {} neighbour rows ({} nodes x {} samples), got {}",
                num_nodes * num_samples,
                num_nodes,
                num_samples,
                neigh_features.nrows()
            )));
        }

        let (self_input, self_mask) = self.apply_dropout(self_features, mode, rng)?;
        let (neigh_input, neigh_mask) = self.apply_dropout(neigh_features, mode, rng)?;

        // Rows are grouped per node in row-major order whatever the input layout
        let neigh_mean = neigh_input
            .as_standard_layout()
            .into_owned()
            .into_shape((num_nodes, num_samples, input_dim))?
            .mean_axis(Axis(1))
            .ok_or_else(|| GNNError::DimensionMismatch("Empty neighbour sample".to_string()))?;

        let from_self = self_input.dot(&self.w_self);
        let from_neigh = neigh_mean.dot(&self.w_neigh);
        let mut pre_activation = concatenate(Axis(1), &[from_self.view(), from_neigh.view()])?
            .as_standard_layout()
            .into_owned();
        if let Some(bias) = &self.bias {
            pre_activation += bias;
        }

        let activation = self.activation;
        let output = pre_activation.mapv(|x| activation.apply(x));

        Ok((
            output,
            AggregatorCache {
                self_input,
                neigh_mean,
                self_mask,
                neigh_mask,
                pre_activation,
                num_samples,
            },
        ))
    }

    /// Backward pass: accumulates parameter gradients and returns the
    /// gradients with respect to the self and neighbour inputs.
    pub fn backward(
        &self,
        cache: &AggregatorCache,
        d_output: &Array2<f32>,
        grads: &mut LayerGradients,
    ) -> GNNResult<(Array2<f32>, Array2<f32>)> {
        if d_output.dim() != cache.pre_activation.dim() {
            return Err(GNNError::DimensionMismatch(format!(
                "Output gradient shape {:?} does not match layer output {:?}",
                d_output.dim(),
                cache.pre_activation.dim()
            )));
        }

        let activation = self.activation;
        let d_pre = d_output * &cache.pre_activation.mapv(|x| activation.derivative(x));

        let self_dim = self.w_self.ncols();
        let d_from_self = d_pre.slice(s![.., ..self_dim]);
        let d_from_neigh = d_pre.slice(s![.., self_dim..]);

        grads.w_self += &cache.self_input.t().dot(&d_from_self);
        grads.w_neigh += &cache.neigh_mean.t().dot(&d_from_neigh);
        if let Some(bias) = grads.bias.as_mut() {
            *bias += &d_pre.sum_axis(Axis(0));
        }

        let mut d_self = d_from_self.dot(&self.w_self.t());
        if let Some(mask) = &cache.self_mask {
            d_self *= mask;
        }

        let d_mean = d_from_neigh.dot(&self.w_neigh.t());
        let samples = cache.num_samples;
        let scale = 1.0 / samples as f32;
        let mut d_neigh = Array2::from_shape_fn(
            (d_mean.nrows() * samples, d_mean.ncols()),
            |(row, col)| d_mean[[row / samples, col]] * scale,
        );
        if let Some(mask) = &cache.neigh_mask {
            d_neigh *= mask;
        }

        Ok((d_self, d_neigh))
    }

    pub fn zero_gradients(&self) -> LayerGradients {
        LayerGradients {
            w_self: Array2::zeros(self.w_self.raw_dim()),
            w_neigh: Array2::zeros(self.w_neigh.raw_dim()),
            bias: self.bias.as_ref().map(|bias| Array1::zeros(bias.raw_dim())),
        }
    }

    /// Number of trainable scalars
    pub fn num_parameters(&self) -> usize {
        self.w_self.len() + self.w_neigh.len() + self.bias.as_ref().map_or(0, |b| b.len())
    }

    /// Mutable references to every parameter, kernels then bias
    pub fn parameters_mut(&mut self) -> impl Iterator<Item = &mut f32> + '_ {
        self.w_self
            .iter_mut()
            .chain(self.w_neigh.iter_mut())
            .chain(self.bias.iter_mut().flat_map(|bias| bias.iter_mut()))
    }

    fn apply_dropout(
        &self,
        input: &Array2<f32>,
        mode: TrainingMode,
        rng: &mut ChaCha8Rng,
    ) -> GNNResult<(Array2<f32>, Option<Array2<f32>>)> {
        if mode == TrainingMode::Inference || self.dropout <= 0.0 {
            return Ok((input.clone(), None));
        }

        let keep_prob = 1.0 - self.dropout;
        let keep = Bernoulli::new(f64::from(keep_prob))
            .map_err(|e| GNNError::InvalidConfiguration(format!("Invalid dropout rate: {}", e)))?;
        let scale = 1.0 / keep_prob;

        let mask = Array2::from_shape_simple_fn(input.raw_dim(), || {
            if keep.sample(&mut *rng) {
                scale
            } else {
                0.0
            }
        });

        Ok((input * &mask, Some(mask)))
    }
}

impl LayerGradients {
    /// Gradient scalars in the same order as `parameters_mut`
    pub fn values(&self) -> impl Iterator<Item = f32> + '_ {
        self.w_self
            .iter()
            .chain(self.w_neigh.iter())
            .chain(self.bias.iter().flat_map(|bias| bias.iter()))
            .copied()
    }
}

/// Kernel initialisation; (fan_in, fan_out) is the kernel shape
fn create_weight_matrix(
    shape: (usize, usize),
    init: WeightInitialization,
    rng: &mut impl Rng,
) -> Array2<f32> {
    let (fan_in, fan_out) = shape;
    let limit = match init {
        WeightInitialization::Xavier => (6.0f32 / (fan_in + fan_out) as f32).sqrt(),
        WeightInitialization::He => (6.0f32 / fan_in as f32).sqrt(),
    };
    Array2::random_using(shape, Uniform::new(-limit, limit), rng)
}
