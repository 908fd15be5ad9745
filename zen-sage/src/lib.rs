//! Supervised GraphSAGE link prediction for node/edge CSV graphs
//!
//! zen-sage trains a GraphSAGE mean-aggregator encoder to predict whether an
//! edge exists between two nodes. Links are scored by the inner product of
//! the two node embeddings and trained with binary cross-entropy and Adam.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use zen_sage::{load_graph, SessionConfig, SupervisedModel};
//!
//! # fn example() -> zen_sage::GNNResult<()> {
//! let graph = load_graph("nodes.csv", "edges.csv")?;
//! let mut model = SupervisedModel::new(graph, SessionConfig::default())?;
//!
//! let sizes = model.initialize()?;
//! println!("{} train links, {} test links", sizes.train, sizes.test);
//!
//! let (weights, history) = model.fit(20)?;
//! weights.save("weights.bin")?;
//! println!("trained for {} epochs", history.len());
//!
//! let (train, test) = model.evaluate()?;
//! println!("train accuracy {:.3}, test AUC {:.3}", train.accuracy, test.auc);
//! # Ok(())
//! # }
//! ```

// Re-export main types
pub use config::{AdamConfig, HyperParameters, SessionConfig, SplitConfig, SplitMethod};
pub use errors::{GNNError, GNNResult};
pub use gnn::loader::{load_edges, load_graph, load_nodes};
pub use gnn::{
    EpochMetrics, EvaluationMetrics, Graph, ModelWeights, SplitSizes, SupervisedModel,
    TrainingHistory,
};

// Modules
pub mod config;
pub mod errors;
pub mod gnn;
pub mod logging;
pub mod training;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
