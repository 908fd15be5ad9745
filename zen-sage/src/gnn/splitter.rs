/**
 * @file zen-sage/src/gnn/splitter.rs
 * @brief Edge splitting into labelled link sets
 *
 * `EdgeSplitter` removes a fraction of a graph's edges as positive links and
 * samples an equal number of non-edges as negative links. With
 * `keep_connected`, edges of a spanning forest are never removed, so every
 * connected component of the input stays connected in the reduced graph.
 *
 * ## Algorithm (global method):
 *
 * 1. `n = floor(p * num_edges)` positives are requested
 * 2. Edges are grouped by unordered endpoint pair; parallel copies are
 *    removed together so a positive pair never survives in the reduced graph
 * 3. A Kruskal pass over the pairs in input order marks the spanning forest
 * 4. Non-forest pairs are shuffled and the first `n` become positives
 * 5. Negatives are drawn uniformly over all node pairs, rejecting self pairs,
 *    existing edges, duplicates and the splitter's exclusion set
 */

use std::collections::{HashMap, HashSet};

use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use super::data::{unordered, DisjointSet, Graph, NodeIndex};
use super::{seeded_rng, streams};
use crate::config::SplitMethod;
use crate::errors::{GNNError, GNNResult};

/// Result of one split: the reduced graph plus labelled links
#[derive(Debug, Clone)]
pub struct LinkSplit {
    /// Input graph with the positive links removed
    pub graph: Graph,

    /// Positive links first, then negatives
    pub links: Vec<(NodeIndex, NodeIndex)>,

    /// 1.0 for positives, 0.0 for negatives
    pub labels: Vec<f32>,
}

impl LinkSplit {
    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn num_positive(&self) -> usize {
        self.labels.iter().filter(|&&label| label > 0.5).count()
    }

    /// Unordered pairs of every link in the split
    pub fn pairs(&self) -> impl Iterator<Item = (NodeIndex, NodeIndex)> + '_ {
        self.links.iter().map(|&(a, b)| unordered(a, b))
    }
}

/// Splits a graph's edges into positive and negative link samples
#[derive(Debug, Clone)]
pub struct EdgeSplitter<'a> {
    graph: &'a Graph,
    exclusions: HashSet<(NodeIndex, NodeIndex)>,
}

impl<'a> EdgeSplitter<'a> {
    pub fn new(graph: &'a Graph) -> Self {
        Self {
            graph,
            exclusions: HashSet::new(),
        }
    }

    /// Pairs that must not be sampled as links (in either direction)
    pub fn with_exclusions(
        mut self,
        pairs: impl IntoIterator<Item = (NodeIndex, NodeIndex)>,
    ) -> Self {
        self.exclusions
            .extend(pairs.into_iter().map(|(a, b)| unordered(a, b)));
        self
    }

    /**
     * Split off `floor(p * num_edges)` positive links and as many negatives.
     *
     * @param p Fraction of the graph's edges to remove as positives
     * @param method Negative sampling strategy
     * @param keep_connected Whether spanning-forest edges are protected
     * @param seed Seed of the split's random stream
     */
    pub fn train_test_split(
        &self,
        p: f64,
        method: SplitMethod,
        keep_connected: bool,
        seed: u64,
    ) -> GNNResult<LinkSplit> {
        let num_edges = self.graph.num_edges();
        let requested = (p * num_edges as f64).floor() as usize;
        if requested == 0 {
            return Err(GNNError::EmptySplit { ratio: p, num_edges });
        }

        let mut rng = seeded_rng(seed, streams::SPLIT);

        let (positive_pairs, removed) = self.sample_positive(requested, keep_connected, &mut rng)?;
        let negatives = match method {
            SplitMethod::Global => self.sample_negative_global(requested, &mut rng)?,
        };

        let reduced = self.graph.without_edges(&removed);

        info!(
            "Edge split: {} positive and {} negative links from {} edges ({} removed)",
            positive_pairs.len(),
            negatives.len(),
            num_edges,
            removed.len()
        );

        let mut labels = vec![1.0; positive_pairs.len()];
        labels.resize(positive_pairs.len() + negatives.len(), 0.0);

        let mut links = positive_pairs;
        links.extend(negatives);

        Ok(LinkSplit {
            graph: reduced,
            links,
            labels,
        })
    }

    /// Every edge position grouped by unordered pair, pairs in first-seen order
    fn group_pairs(&self) -> Vec<((NodeIndex, NodeIndex), Vec<usize>)> {
        let mut order: Vec<((NodeIndex, NodeIndex), Vec<usize>)> = Vec::new();
        let mut slot: HashMap<(NodeIndex, NodeIndex), usize> = HashMap::new();

        for (position, &(source, target)) in self.graph.edges().iter().enumerate() {
            let key = unordered(source, target);
            match slot.get(&key) {
                Some(&idx) => order[idx].1.push(position),
                None => {
                    slot.insert(key, order.len());
                    order.push(((source, target), vec![position]));
                }
            }
        }

        order
    }

    fn sample_positive(
        &self,
        requested: usize,
        keep_connected: bool,
        rng: &mut ChaCha8Rng,
    ) -> GNNResult<(Vec<(NodeIndex, NodeIndex)>, HashSet<usize>)> {
        let groups = self.group_pairs();

        let mut protected = vec![false; groups.len()];
        if keep_connected {
            let mut forest = DisjointSet::new(self.graph.num_nodes());
            for (idx, ((source, target), _)) in groups.iter().enumerate() {
                if source != target && forest.union(*source, *target) {
                    protected[idx] = true;
                }
            }
        }

        let mut candidates: Vec<usize> = groups
            .iter()
            .enumerate()
            .filter(|(idx, ((source, target), _))| {
                !protected[*idx]
                    && source != target
                    && !self.exclusions.contains(&unordered(*source, *target))
            })
            .map(|(idx, _)| idx)
            .collect();

        if candidates.len() < requested {
            return Err(GNNError::InsufficientEdges {
                kind: "positive",
                requested,
                available: candidates.len(),
            });
        }

        candidates.shuffle(rng);
        candidates.truncate(requested);

        let mut removed = HashSet::new();
        let mut positives = Vec::with_capacity(requested);
        for idx in candidates {
            let (pair, positions) = &groups[idx];
            positives.push(*pair);
            removed.extend(positions.iter().copied());
        }

        Ok((positives, removed))
    }

    fn sample_negative_global(
        &self,
        requested: usize,
        rng: &mut ChaCha8Rng,
    ) -> GNNResult<Vec<(NodeIndex, NodeIndex)>> {
        let num_nodes = self.graph.num_nodes();
        let total_pairs = num_nodes * num_nodes.saturating_sub(1) / 2;

        let occupied: HashSet<(NodeIndex, NodeIndex)> = self
            .graph
            .edges()
            .iter()
            .filter(|(a, b)| a != b)
            .map(|&(a, b)| unordered(a, b))
            .chain(self.exclusions.iter().copied())
            .collect();
        let available = total_pairs.saturating_sub(occupied.len());

        if available < requested {
            return Err(GNNError::InsufficientEdges {
                kind: "negative",
                requested,
                available,
            });
        }

        // Dense graphs are enumerated, sparse graphs sampled by rejection
        if available * 4 < total_pairs {
            debug!(available, "enumerating negative candidates");
            let mut pool: Vec<(NodeIndex, NodeIndex)> = (0..num_nodes)
                .flat_map(|a| ((a + 1)..num_nodes).map(move |b| (a, b)))
                .filter(|pair| !occupied.contains(pair))
                .collect();
            pool.shuffle(rng);
            pool.truncate(requested);
            return Ok(pool);
        }

        let mut sampled = HashSet::with_capacity(requested);
        let mut negatives = Vec::with_capacity(requested);
        let budget = requested.saturating_mul(100).max(10_000);

        for _ in 0..budget {
            if negatives.len() == requested {
                break;
            }
            let a = rng.gen_range(0..num_nodes);
            let b = rng.gen_range(0..num_nodes);
            if a == b {
                continue;
            }
            let key = unordered(a, b);
            if occupied.contains(&key) || !sampled.insert(key) {
                continue;
            }
            negatives.push((a, b));
        }

        if negatives.len() < requested {
            return Err(GNNError::InsufficientEdges {
                kind: "negative",
                requested,
                available: negatives.len(),
            });
        }

        Ok(negatives)
    }
}
