/**
 * @file zen-sage/src/gnn/training.rs
 * @brief Supervised link prediction session
 *
 * `SupervisedModel` owns the full graph and the session configuration. Its
 * lifecycle is `new` -> `initialize` -> `fit` / `evaluate`, with weight access
 * at any point after `initialize`.
 *
 * ## Splits
 *
 * 1. Test links: `test_ratio` of the full graph's edges plus as many negatives.
 * 2. Train links: `train_ratio` of the test-reduced graph's edges plus as many
 *    negatives, never reusing a test pair.
 *
 * Both flows sample neighbourhoods from the train-reduced graph, so no held-out
 * positive is visible to the encoder.
 */

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::data::Graph;
use super::model::GraphSAGELinkModel;
use super::sampler::{LinkFlow, LinkGenerator};
use super::splitter::EdgeSplitter;
use super::weights::ModelWeights;
use crate::config::SessionConfig;
use crate::errors::{GNNError, GNNResult};
use crate::training::{f1_score, BinaryMetrics};

/// Number of labelled links in each split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitSizes {
    pub train: usize,
    pub test: usize,
}

/// Metrics of one training epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// 1-based epoch number
    pub epoch: usize,
    pub loss: f32,
    pub accuracy: f32,
    pub recall: f32,
    pub auc: f32,
    pub precision: f32,
    pub elapsed_secs: f64,
}

/// Per-epoch training record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochMetrics>,
}

impl TrainingHistory {
    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn last(&self) -> Option<&EpochMetrics> {
        self.epochs.last()
    }

    /// Write the history as pretty-printed JSON
    pub fn save_json(&self, path: impl AsRef<Path>) -> GNNResult<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }
}

/// Metrics of one evaluation pass
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub loss: f32,
    pub accuracy: f32,
    pub recall: f32,
    pub auc: f32,
    pub precision: f32,
}

impl EvaluationMetrics {
    pub fn f1(&self) -> f32 {
        f1_score(self.precision, self.recall)
    }
}

impl From<&BinaryMetrics> for EvaluationMetrics {
    fn from(metrics: &BinaryMetrics) -> Self {
        Self {
            loss: metrics.loss(),
            accuracy: metrics.accuracy(),
            recall: metrics.recall(),
            auc: metrics.auc(),
            precision: metrics.precision(),
        }
    }
}

/// State that exists once the session is initialized
#[derive(Debug)]
struct Session {
    model: GraphSAGELinkModel,
    train_flow: LinkFlow,
    test_flow: LinkFlow,
    sizes: SplitSizes,
}

/// Supervised GraphSAGE link prediction over one graph
#[derive(Debug)]
pub struct SupervisedModel {
    graph: Graph,
    config: SessionConfig,
    session: Option<Session>,
}

impl SupervisedModel {
    pub fn new(graph: Graph, config: SessionConfig) -> GNNResult<Self> {
        config.validate()?;
        Ok(Self {
            graph,
            config,
            session: None,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn is_initialized(&self) -> bool {
        self.session.is_some()
    }

    pub fn split_sizes(&self) -> Option<SplitSizes> {
        self.session.as_ref().map(|session| session.sizes)
    }

    /// Split the edges, build both flows and the model.
    ///
    /// Calling it again discards the previous session and its trained weights.
    pub fn initialize(&mut self) -> GNNResult<SplitSizes> {
        let seed = self.config.seed;
        let split = &self.config.split;
        let hyper = &self.config.hyper;

        let test_split = EdgeSplitter::new(&self.graph).train_test_split(
            split.test_ratio,
            split.method,
            split.keep_connected,
            seed,
        )?;

        let train_split = EdgeSplitter::new(&test_split.graph)
            .with_exclusions(test_split.pairs())
            .train_test_split(split.train_ratio, split.method, split.keep_connected, seed)?;

        let sizes = SplitSizes {
            train: train_split.len(),
            test: test_split.len(),
        };

        let graph = Arc::new(train_split.graph);
        debug!(
            nodes = graph.num_nodes(),
            edges = graph.num_edges(),
            "sampling graph ready"
        );

        let train_generator = LinkGenerator::new(
            Arc::clone(&graph),
            hyper.batch_size,
            hyper.num_samples.clone(),
            seed,
        )?;
        let train_flow = train_generator.flow(train_split.links, train_split.labels, true)?;

        let test_generator =
            LinkGenerator::new(Arc::clone(&graph), hyper.batch_size, hyper.num_samples.clone(), seed)?;
        let test_flow = test_generator.flow(test_split.links, test_split.labels, true)?;

        let model = GraphSAGELinkModel::new(graph.feature_dim(), hyper, seed)?;

        info!(
            "Model initialized: {} training links, {} testing links, {} parameters",
            sizes.train,
            sizes.test,
            model.num_parameters()
        );

        self.session = Some(Session {
            model,
            train_flow,
            test_flow,
            sizes,
        });
        Ok(sizes)
    }

    /// Train for `epochs` full passes over the training links
    pub fn fit(&mut self, epochs: usize) -> GNNResult<(ModelWeights, TrainingHistory)> {
        let session = self.session.as_mut().ok_or(GNNError::NotInitialized)?;
        let mut history = TrainingHistory::default();

        for epoch in 1..=epochs {
            let start = Instant::now();
            let mut metrics = BinaryMetrics::new();

            for index in 0..session.train_flow.len() {
                let batch = session.train_flow.batch(index)?;
                let output = session.model.train_batch(&batch)?;
                metrics.record_loss(output.loss, batch.size());
                metrics.update(&output.probabilities.to_vec(), &batch.labels.to_vec())?;
            }
            session.train_flow.on_epoch_end();

            let record = EpochMetrics {
                epoch,
                loss: metrics.loss(),
                accuracy: metrics.accuracy(),
                recall: metrics.recall(),
                auc: metrics.auc(),
                precision: metrics.precision(),
                elapsed_secs: start.elapsed().as_secs_f64(),
            };

            info!(
                "Epoch {}/{} : loss - {:.4}, accuracy - {:.4}, recall - {:.4}, AUC - {:.4}, precision - {:.4} ({:.2}s)",
                epoch,
                epochs,
                record.loss,
                record.accuracy,
                record.recall,
                record.auc,
                record.precision,
                record.elapsed_secs
            );
            history.epochs.push(record);
        }

        Ok((session.model.weights(), history))
    }

    /// Metrics over the train and test links, without dropout
    pub fn evaluate(&mut self) -> GNNResult<(EvaluationMetrics, EvaluationMetrics)> {
        let session = self.session.as_mut().ok_or(GNNError::NotInitialized)?;
        let train = evaluate_flow(&mut session.model, &mut session.train_flow)?;
        let test = evaluate_flow(&mut session.model, &mut session.test_flow)?;
        Ok((train, test))
    }

    pub fn get_weights(&self) -> GNNResult<ModelWeights> {
        self.session
            .as_ref()
            .map(|session| session.model.weights())
            .ok_or(GNNError::NotInitialized)
    }

    pub fn set_weights(&mut self, weights: &ModelWeights) -> GNNResult<()> {
        let session = self.session.as_mut().ok_or(GNNError::NotInitialized)?;
        session.model.set_weights(weights)
    }
}

fn evaluate_flow(model: &mut GraphSAGELinkModel, flow: &mut LinkFlow) -> GNNResult<EvaluationMetrics> {
    let mut metrics = BinaryMetrics::new();
    for index in 0..flow.len() {
        let batch = flow.batch(index)?;
        let output = model.predict_batch(&batch)?;
        metrics.record_loss(output.loss, batch.size());
        metrics.update(&output.probabilities.to_vec(), &batch.labels.to_vec())?;
    }
    Ok(EvaluationMetrics::from(&metrics))
}
