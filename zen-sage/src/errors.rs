//! Error taxonomy for zen-sage
//!
//! Every fallible operation in the crate returns [`GNNResult`]. Library code
//! propagates with `?`; only the binary attaches human context on top.

use std::path::PathBuf;

/// GNN-specific error types
#[derive(Debug, thiserror::Error)]
pub enum GNNError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Weights serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Missing required column '{column}' in {}", path.display())]
    MissingColumn { column: String, path: PathBuf },

    #[error("Invalid feature value at row {row}, column '{column}': {value:?}")]
    InvalidFeature {
        row: usize,
        column: String,
        value: String,
    },

    #[error("Duplicate node id '{0}' in node table")]
    DuplicateNode(String),

    #[error("Edge at row {row} references unknown node '{node}'")]
    UnknownNode { row: usize, node: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Split ratio {ratio} over {num_edges} edges selects no edges")]
    EmptySplit { ratio: f64, num_edges: usize },

    #[error("Unable to sample {requested} {kind} edges (only {available} available)")]
    InsufficientEdges {
        kind: &'static str,
        requested: usize,
        available: usize,
    },

    #[error("Model is not initialized; call initialize() first")]
    NotInitialized,

    #[error("Training failed: {0}")]
    TrainingFailed(String),
}

/// Result alias used across the crate
pub type GNNResult<T> = Result<T, GNNError>;
