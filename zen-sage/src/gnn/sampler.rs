/**
 * @file zen-sage/src/gnn/sampler.rs
 * @brief Batched neighbourhood sampling for link prediction
 *
 * A `LinkGenerator` fixes the graph, the batch size and the per-hop sample
 * counts; `flow` binds it to a labelled link set. Each `LinkFlow::batch` call
 * samples a fresh multi-hop neighbourhood for both endpoints of every link in
 * the batch.
 *
 * ## Hop layout
 *
 * For a batch of `B` links and sample counts `[S1, S2]`:
 *
 * ```text
 * hops[0]: [2B, F]          sources then targets
 * hops[1]: [2B * S1, F]     S1 neighbours per hop-0 node, grouped contiguously
 * hops[2]: [2B * S1 * S2, F]
 * ```
 *
 * Neighbours are drawn uniformly with replacement. A node without neighbours
 * expands to padding slots, and padding slots expand to more padding; padding
 * rows carry zero features.
 */

use std::sync::Arc;

use ndarray::{Array1, Array2};
use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use super::data::{Graph, NodeIndex};
use super::{seeded_rng, streams};
use crate::errors::{GNNError, GNNResult};

/// One sampled mini-batch
#[derive(Debug, Clone)]
pub struct LinkBatch {
    /// Feature matrices per hop, see the module docs for the layout
    pub hops: Vec<Array2<f32>>,

    /// Link labels [B]
    pub labels: Array1<f32>,
}

impl LinkBatch {
    /// Number of links in the batch
    pub fn size(&self) -> usize {
        self.labels.len()
    }
}

/// Sampling settings shared by every flow built from it
#[derive(Debug, Clone)]
pub struct LinkGenerator {
    graph: Arc<Graph>,
    batch_size: usize,
    num_samples: Vec<usize>,
    seed: u64,
}

impl LinkGenerator {
    pub fn new(
        graph: Arc<Graph>,
        batch_size: usize,
        num_samples: Vec<usize>,
        seed: u64,
    ) -> GNNResult<Self> {
        if batch_size == 0 {
            return Err(GNNError::InvalidConfiguration(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        if num_samples.is_empty() || num_samples.contains(&0) {
            return Err(GNNError::InvalidConfiguration(format!(
                "num_samples must be a non-empty list of positive counts, got {:?}",
                num_samples
            )));
        }

        Ok(Self {
            graph,
            batch_size,
            num_samples,
            seed,
        })
    }

    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn num_samples(&self) -> &[usize] {
        &self.num_samples
    }

    /// Bind the generator to a labelled link set
    pub fn flow(
        &self,
        links: Vec<(NodeIndex, NodeIndex)>,
        labels: Vec<f32>,
        shuffle: bool,
    ) -> GNNResult<LinkFlow> {
        if links.len() != labels.len() {
            return Err(GNNError::DimensionMismatch(format!(
                "{} links but {} labels",
                links.len(),
                labels.len()
            )));
        }

        let num_nodes = self.graph.num_nodes();
        if let Some(&(a, b)) = links.iter().find(|(a, b)| *a >= num_nodes || *b >= num_nodes) {
            return Err(GNNError::InvalidInput(format!(
                "Link ({}, {}) references a node outside [0, {})",
                a, b, num_nodes
            )));
        }

        let mut flow = LinkFlow {
            graph: Arc::clone(&self.graph),
            batch_size: self.batch_size,
            num_samples: self.num_samples.clone(),
            order: (0..links.len()).collect(),
            links,
            labels,
            shuffle,
            sampling_rng: seeded_rng(self.seed, streams::SAMPLER),
            shuffle_rng: seeded_rng(self.seed, streams::SHUFFLE),
        };
        if shuffle {
            flow.order.shuffle(&mut flow.shuffle_rng);
        }

        Ok(flow)
    }
}

/// Sequence of batches over a fixed labelled link set
#[derive(Debug, Clone)]
pub struct LinkFlow {
    graph: Arc<Graph>,
    batch_size: usize,
    num_samples: Vec<usize>,
    links: Vec<(NodeIndex, NodeIndex)>,
    labels: Vec<f32>,
    order: Vec<usize>,
    shuffle: bool,
    sampling_rng: ChaCha8Rng,
    shuffle_rng: ChaCha8Rng,
}

impl LinkFlow {
    /// Number of batches per pass
    pub fn len(&self) -> usize {
        self.links.len().div_ceil(self.batch_size)
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn num_links(&self) -> usize {
        self.links.len()
    }

    pub fn feature_dim(&self) -> usize {
        self.graph.feature_dim()
    }

    /// Sample batch `index` of the current pass
    pub fn batch(&mut self, index: usize) -> GNNResult<LinkBatch> {
        if index >= self.len() {
            return Err(GNNError::InvalidInput(format!(
                "Batch index {} out of range for {} batches",
                index,
                self.len()
            )));
        }

        let start = index * self.batch_size;
        let end = (start + self.batch_size).min(self.links.len());
        let selected = &self.order[start..end];

        let mut heads: Vec<Option<NodeIndex>> = Vec::with_capacity(2 * selected.len());
        heads.extend(selected.iter().map(|&i| Some(self.links[i].0)));
        heads.extend(selected.iter().map(|&i| Some(self.links[i].1)));

        let labels = Array1::from_iter(selected.iter().map(|&i| self.labels[i]));

        let mut node_hops = vec![heads];
        for &samples in &self.num_samples {
            let frontier = node_hops.last().map(Vec::as_slice).unwrap_or(&[]);
            let next = sample_hop(&self.graph, frontier, samples, &mut self.sampling_rng);
            node_hops.push(next);
        }

        let hops = node_hops
            .iter()
            .map(|nodes| gather_features(&self.graph, nodes))
            .collect();

        Ok(LinkBatch { hops, labels })
    }

    /// Reshuffle the link order for the next pass
    pub fn on_epoch_end(&mut self) {
        if self.shuffle {
            self.order.shuffle(&mut self.shuffle_rng);
        }
    }
}

/// Draw `samples` neighbours for every frontier slot
fn sample_hop(
    graph: &Graph,
    frontier: &[Option<NodeIndex>],
    samples: usize,
    rng: &mut ChaCha8Rng,
) -> Vec<Option<NodeIndex>> {
    let mut next = Vec::with_capacity(frontier.len() * samples);

    for slot in frontier {
        let neighbors = slot.map(|node| graph.neighbors(node)).unwrap_or(&[]);
        if neighbors.is_empty() {
            next.extend(std::iter::repeat(None).take(samples));
        } else {
            next.extend((0..samples).map(|_| Some(neighbors[rng.gen_range(0..neighbors.len())])));
        }
    }

    next
}

/// Feature rows for a hop; padding slots stay zero
fn gather_features(graph: &Graph, nodes: &[Option<NodeIndex>]) -> Array2<f32> {
    let mut features = Array2::zeros((nodes.len(), graph.feature_dim()));
    for (mut row, slot) in features.rows_mut().into_iter().zip(nodes) {
        if let Some(node) = slot {
            row.assign(&graph.node_features_for(*node));
        }
    }
    features
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Path 0-1-2 plus an isolated node 3; features encode the node id
    fn small_graph() -> Arc<Graph> {
        let ids = (0..4).map(|i| i.to_string()).collect();
        let features =
            Array2::from_shape_vec((4, 2), vec![1.0, 0.0, 2.0, 0.0, 3.0, 0.0, 4.0, 0.0]).unwrap();
        Arc::new(Graph::new(ids, features, vec![(0, 1), (1, 2)]).unwrap())
    }

    #[test]
    fn test_batch_hop_shapes() {
        let generator = LinkGenerator::new(small_graph(), 2, vec![3, 2], 42).unwrap();
        let mut flow = generator
            .flow(vec![(0, 1), (2, 3), (0, 2)], vec![1.0, 0.0, 0.0], false)
            .unwrap();

        assert_eq!(flow.len(), 2);
        let batch = flow.batch(0).unwrap();
        assert_eq!(batch.size(), 2);
        assert_eq!(batch.hops.len(), 3);
        assert_eq!(batch.hops[0].dim(), (4, 2));
        assert_eq!(batch.hops[1].dim(), (12, 2));
        assert_eq!(batch.hops[2].dim(), (24, 2));

        // Heads are sources then targets, unshuffled
        assert_eq!(batch.hops[0].column(0).to_vec(), vec![1.0, 3.0, 2.0, 4.0]);
        assert_eq!(batch.labels.to_vec(), vec![1.0, 0.0]);

        let last = flow.batch(1).unwrap();
        assert_eq!(last.size(), 1);
        assert_eq!(last.hops[1].nrows(), 6);
        assert!(flow.batch(2).is_err());
    }

    #[test]
    fn test_isolated_node_expands_to_padding() {
        let generator = LinkGenerator::new(small_graph(), 1, vec![2, 2], 1).unwrap();
        let mut flow = generator.flow(vec![(3, 0)], vec![0.0], false).unwrap();
        let batch = flow.batch(0).unwrap();

        // hop 1: 2 slots for node 3 (padding) then 2 neighbours of node 0 (always node 1)
        let hop1 = batch.hops[1].column(0).to_vec();
        assert_eq!(hop1, vec![0.0, 0.0, 2.0, 2.0]);

        // padding expands into padding
        let hop2 = batch.hops[2].column(0).to_vec();
        assert!(hop2[..4].iter().all(|&v| v == 0.0));
        assert!(hop2[4..].iter().all(|&v| v == 1.0 || v == 3.0));
    }

    #[test]
    fn test_sampling_is_deterministic() {
        let generator = LinkGenerator::new(small_graph(), 2, vec![4, 3], 9).unwrap();
        let links = vec![(0, 1), (1, 2), (2, 0), (3, 1)];
        let labels = vec![1.0, 1.0, 0.0, 0.0];

        let mut a = generator.flow(links.clone(), labels.clone(), true).unwrap();
        let mut b = generator.flow(links, labels, true).unwrap();
        for i in 0..a.len() {
            let (x, y) = (a.batch(i).unwrap(), b.batch(i).unwrap());
            assert_eq!(x.labels, y.labels);
            assert_eq!(x.hops, y.hops);
        }
    }

    #[test]
    fn test_epoch_end_reshuffles_only_when_enabled() {
        let generator = LinkGenerator::new(small_graph(), 1, vec![1], 3).unwrap();
        let links: Vec<_> = (0..20).map(|i| (i % 3, (i + 1) % 3)).collect();
        let labels: Vec<f32> = (0..20).map(|i| i as f32).collect();

        let mut fixed = generator.flow(links.clone(), labels.clone(), false).unwrap();
        let before: Vec<f32> = (0..20).map(|i| fixed.batch(i).unwrap().labels[0]).collect();
        fixed.on_epoch_end();
        let after: Vec<f32> = (0..20).map(|i| fixed.batch(i).unwrap().labels[0]).collect();
        assert_eq!(before, labels);
        assert_eq!(before, after);

        let mut shuffled = generator.flow(links, labels.clone(), true).unwrap();
        let first: Vec<f32> = (0..20).map(|i| shuffled.batch(i).unwrap().labels[0]).collect();
        shuffled.on_epoch_end();
        let second: Vec<f32> = (0..20).map(|i| shuffled.batch(i).unwrap().labels[0]).collect();
        assert_ne!(first, second);

        let mut sorted = second.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(sorted, labels);
    }

    #[test]
    fn test_invalid_flows_rejected() {
        let generator = LinkGenerator::new(small_graph(), 2, vec![1], 0).unwrap();
        assert!(generator.flow(vec![(0, 1)], vec![], false).is_err());
        assert!(generator.flow(vec![(0, 9)], vec![1.0], false).is_err());
        assert!(LinkGenerator::new(small_graph(), 0, vec![1], 0).is_err());
        assert!(LinkGenerator::new(small_graph(), 1, vec![], 0).is_err());
    }
}
