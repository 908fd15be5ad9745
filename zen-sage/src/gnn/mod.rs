/**
 * @file zen-sage/src/gnn/mod.rs
 * @brief GraphSAGE link prediction module
 *
 * This module holds the graph side of zen-sage: loading node/edge tables,
 * splitting edges into labelled link sets, sampling multi-hop neighbourhoods
 * in batches, the GraphSAGE mean-aggregator encoder with its link classifier,
 * and the `SupervisedModel` that orchestrates a full training session.
 *
 * ## Data flow
 *
 * ```text
 * nodes.csv + edges.csv -> Graph -> EdgeSplitter (test) -> EdgeSplitter (train)
 *      -> LinkGenerator::flow -> LinkBatch -> GraphSAGELinkModel -> BCE + Adam
 * ```
 *
 * All randomness flows from one master seed through independent ChaCha
 * streams (see [`seeded_rng`]), so a session is reproducible end to end.
 */

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

// === MODULE DECLARATIONS ===

/// Graph structure: node ids, shared feature matrix, undirected adjacency
pub mod data;

/// CSV loading of node and edge tables
pub mod loader;

/// Connectivity-preserving positive/negative edge splitting
pub mod splitter;

/// Batched multi-hop neighbour sampling for link batches
pub mod sampler;

/// GraphSAGE mean aggregator layer
pub mod layers;

/// Encoder stack plus inner-product link classifier
pub mod model;

/// Session orchestration: initialize, fit, evaluate
pub mod training;

/// Ordered weight arrays and their binary persistence
pub mod weights;

// === RE-EXPORTS ===

pub use data::{Graph, NodeFeatures, NodeIndex};
pub use layers::MeanAggregatorLayer;
pub use model::GraphSAGELinkModel;
pub use sampler::{LinkBatch, LinkFlow, LinkGenerator};
pub use splitter::{EdgeSplitter, LinkSplit};
pub use training::{EpochMetrics, EvaluationMetrics, SplitSizes, SupervisedModel, TrainingHistory};
pub use weights::ModelWeights;

/// Activation functions available to aggregator layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationFunction {
    /// Rectified Linear Unit, used by every layer but the last
    ReLU,
    /// Identity, used by the final encoder layer
    Linear,
}

impl ActivationFunction {
    pub fn apply(self, x: f32) -> f32 {
        match self {
            ActivationFunction::ReLU => x.max(0.0),
            ActivationFunction::Linear => x,
        }
    }

    /// Derivative evaluated at the pre-activation value
    pub fn derivative(self, pre_activation: f32) -> f32 {
        match self {
            ActivationFunction::ReLU => {
                if pre_activation > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            ActivationFunction::Linear => 1.0,
        }
    }
}

/// Weight initialization strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightInitialization {
    /// Glorot uniform: limit = sqrt(6 / (fan_in + fan_out))
    Xavier,
    /// He uniform: limit = sqrt(6 / fan_in)
    He,
}

/// Training modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingMode {
    /// Dropout active
    Training,
    /// Deterministic forward pass
    Inference,
}

/// Independent random streams derived from the master seed
pub(crate) mod streams {
    pub const SPLIT: u64 = 1;
    pub const SAMPLER: u64 = 2;
    pub const SHUFFLE: u64 = 3;
    pub const INIT: u64 = 4;
    pub const DROPOUT: u64 = 5;
}

/// Deterministic RNG for one stream of a seeded session
pub fn seeded_rng(seed: u64, stream: u64) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(stream);
    rng
}

/// Logistic sigmoid, stable for large negative inputs
pub fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}
