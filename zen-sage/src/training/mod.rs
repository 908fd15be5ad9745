//! Training infrastructure for zen-sage link models
//!
//! This module provides the pieces the supervised session plugs together:
//! - Optimizers over flat parameter views
//! - Loss functions with analytic gradients
//! - Streaming binary classification metrics

use num_traits::Float;

use crate::errors::GNNResult;

/// Optimizer implementations
pub mod optimizers;
pub use optimizers::*;

/// Loss function library
pub mod losses;
pub use losses::*;

/// Binary classification metrics
pub mod metrics;
pub use metrics::*;

/// Optimizer trait for zen-sage training
pub trait ZenOptimizer<T: Float>: Send + Sync {
    fn initialize(&mut self, parameter_count: usize) -> GNNResult<()>;
    fn update_parameters(&mut self, parameters: Vec<&mut T>, gradients: &[T]) -> GNNResult<()>;
    fn reset(&mut self);
}

/// Loss function trait for zen-sage training
pub trait ZenLossFunction<T: Float>: Send + Sync {
    fn compute_loss(&self, predictions: &[T], targets: &[T]) -> GNNResult<T>;
    fn compute_gradient(&self, predictions: &[T], targets: &[T]) -> GNNResult<Vec<T>>;
}
