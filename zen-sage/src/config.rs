//! Session configuration: hyperparameters, edge split ratios and the master seed
//!
//! Configuration is layered: [`SessionConfig::default`] provides the baseline,
//! an optional JSON file overrides any subset of fields, and the CLI applies
//! its flags last. Every layer produces the same explicitly named fields; there
//! is no open-ended keyword map.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{GNNError, GNNResult};
use crate::gnn::WeightInitialization;

/// Adam moment coefficients
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdamConfig {
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
        }
    }
}

/// Model and optimisation hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HyperParameters {
    /// Links per mini-batch
    pub batch_size: usize,

    /// Neighbours sampled per hop; one entry per GraphSAGE layer
    pub num_samples: Vec<usize>,

    /// Output width of each GraphSAGE layer
    pub layer_sizes: Vec<usize>,

    /// Whether aggregator layers carry a bias term
    pub bias: bool,

    /// Dropout rate applied to aggregator inputs while training
    pub dropout: f32,

    pub learning_rate: f32,

    pub weight_init: WeightInitialization,

    pub adam: AdamConfig,
}

impl Default for HyperParameters {
    fn default() -> Self {
        Self {
            batch_size: 20,
            num_samples: vec![20, 10],
            layer_sizes: vec![10, 10],
            bias: true,
            dropout: 0.1,
            learning_rate: 1e-2,
            weight_init: WeightInitialization::Xavier,
            adam: AdamConfig::default(),
        }
    }
}

/// Negative sampling strategy of the edge splitter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitMethod {
    /// Negative pairs drawn uniformly from the whole node set
    Global,
}

/// Two-stage edge split settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Fraction of all edges held out as positive test links
    pub test_ratio: f64,

    /// Fraction of the remaining edges used as positive train links
    pub train_ratio: f64,

    pub method: SplitMethod,

    /// Never remove an edge that would disconnect a component
    pub keep_connected: bool,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_ratio: 0.01,
            train_ratio: 0.1,
            method: SplitMethod::Global,
            keep_connected: true,
        }
    }
}

/// Everything a training session needs besides the data itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Master seed; every random stream in the session derives from it
    pub seed: u64,
    pub hyper: HyperParameters,
    pub split: SplitConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            hyper: HyperParameters::default(),
            split: SplitConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Load a (possibly partial) configuration from a JSON file.
    ///
    /// Missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> GNNResult<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> GNNResult<Self> {
        let config: Self = serde_json::from_str(text)?;
        Ok(config)
    }

    /// Check internal consistency before any work is done
    pub fn validate(&self) -> GNNResult<()> {
        let hyper = &self.hyper;

        if hyper.batch_size == 0 {
            return Err(invalid("batch_size must be greater than 0"));
        }

        if hyper.layer_sizes.is_empty() {
            return Err(invalid("layer_sizes must contain at least one layer"));
        }

        if hyper.num_samples.len() != hyper.layer_sizes.len() {
            return Err(invalid(format!(
                "num_samples has {} entries but layer_sizes has {}; one sample size is required per layer",
                hyper.num_samples.len(),
                hyper.layer_sizes.len()
            )));
        }

        if let Some(&size) = hyper.layer_sizes.iter().find(|&&size| size < 2) {
            return Err(invalid(format!(
                "layer size {} is too small; each layer splits its output between self and neighbour columns",
                size
            )));
        }

        if hyper.num_samples.iter().any(|&samples| samples == 0) {
            return Err(invalid("every num_samples entry must be greater than 0"));
        }

        if !(0.0..1.0).contains(&hyper.dropout) {
            return Err(invalid(format!(
                "dropout must be in [0, 1), got {}",
                hyper.dropout
            )));
        }

        if !(hyper.learning_rate > 0.0 && hyper.learning_rate.is_finite()) {
            return Err(invalid(format!(
                "learning_rate must be positive, got {}",
                hyper.learning_rate
            )));
        }

        let adam = &hyper.adam;
        if !(0.0..1.0).contains(&adam.beta1) || !(0.0..1.0).contains(&adam.beta2) {
            return Err(invalid("adam betas must be in [0, 1)"));
        }
        if adam.epsilon <= 0.0 {
            return Err(invalid("adam epsilon must be positive"));
        }

        for (name, ratio) in [
            ("test_ratio", self.split.test_ratio),
            ("train_ratio", self.split.train_ratio),
        ] {
            if !(ratio > 0.0 && ratio < 1.0) {
                return Err(invalid(format!("{} must be in (0, 1), got {}", name, ratio)));
            }
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> GNNError {
    GNNError::InvalidConfiguration(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_session() {
        let config = SessionConfig::default();
        assert_eq!(config.seed, 42);
        assert_eq!(config.hyper.batch_size, 20);
        assert_eq!(config.hyper.num_samples, vec![20, 10]);
        assert_eq!(config.hyper.layer_sizes, vec![10, 10]);
        assert!(config.hyper.bias);
        assert_eq!(config.hyper.dropout, 0.1);
        assert_eq!(config.hyper.learning_rate, 1e-2);
        assert_eq!(config.split.test_ratio, 0.01);
        assert_eq!(config.split.train_ratio, 0.1);
        assert!(config.split.keep_connected);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = SessionConfig::from_json_str(
            r#"{ "seed": 7, "hyper": { "batch_size": 64, "layer_sizes": [32, 16] } }"#,
        )
        .unwrap();

        assert_eq!(config.seed, 7);
        assert_eq!(config.hyper.batch_size, 64);
        assert_eq!(config.hyper.layer_sizes, vec![32, 16]);
        assert_eq!(config.hyper.num_samples, vec![20, 10]);
        assert_eq!(config.hyper.weight_init, WeightInitialization::Xavier);
        assert_eq!(config.split, SplitConfig::default());
    }

    #[test]
    fn test_json_weight_init_and_method_names() {
        let config = SessionConfig::from_json_str(
            r#"{ "hyper": { "weight_init": "he" }, "split": { "method": "global" } }"#,
        )
        .unwrap();
        assert_eq!(config.hyper.weight_init, WeightInitialization::He);
        assert_eq!(config.split.method, SplitMethod::Global);
    }

    #[test]
    fn test_validation_rejects_mismatched_layers() {
        let mut config = SessionConfig::default();
        config.hyper.num_samples = vec![5];
        assert!(matches!(
            config.validate(),
            Err(GNNError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let cases: Vec<Box<dyn Fn(&mut SessionConfig)>> = vec![
            Box::new(|c| c.hyper.batch_size = 0),
            Box::new(|c| c.hyper.layer_sizes = vec![1, 10]),
            Box::new(|c| c.hyper.num_samples = vec![0, 10]),
            Box::new(|c| c.hyper.dropout = 1.0),
            Box::new(|c| c.hyper.learning_rate = 0.0),
            Box::new(|c| c.split.test_ratio = 0.0),
            Box::new(|c| c.split.train_ratio = 1.5),
        ];

        for mutate in cases {
            let mut config = SessionConfig::default();
            mutate(&mut config);
            assert!(config.validate().is_err(), "accepted {:?}", config);
        }
    }

    #[test]
    fn test_unknown_method_is_rejected() {
        let result = SessionConfig::from_json_str(r#"{ "split": { "method": "local" } }"#);
        assert!(matches!(result, Err(GNNError::Json(_))));
    }
}
