/**
 * @file zen-sage/src/gnn/data.rs
 * @brief Graph data structure for link prediction
 *
 * `Graph` is the read-only union of the node table and the edge table. It is
 * undirected: every edge shows up in the neighbour lists of both endpoints
 * (a self loop shows up once). Node ids and the feature matrix sit behind
 * `Arc`s so reduced graphs produced by the edge splitter share them with the
 * full graph instead of copying.
 */

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ndarray::{Array2, ArrayView1};

use crate::errors::{GNNError, GNNResult};

/// Node feature matrix type: [num_nodes, node_feature_dim]
pub type NodeFeatures = Array2<f32>;

/// Node indices type for adjacency lists
pub type NodeIndex = usize;

/// Undirected graph with dense node features
#[derive(Debug, Clone)]
pub struct Graph {
    node_ids: Arc<Vec<String>>,
    id_index: Arc<HashMap<String, NodeIndex>>,
    features: Arc<NodeFeatures>,

    /// Edge list in input order, parallel edges kept
    edges: Vec<(NodeIndex, NodeIndex)>,

    /// Undirected neighbour lists built from `edges`
    neighbors: Vec<Vec<NodeIndex>>,

    /// Unordered endpoint pairs for O(1) membership queries
    pairs: HashSet<(NodeIndex, NodeIndex)>,
}

impl Graph {
    /**
     * Create a graph from node ids, their features and index-based edges.
     *
     * @param node_ids One id per feature row, unique
     * @param features Feature matrix [num_nodes, feature_dim]
     * @param edges (source, target) node indices
     */
    pub fn new(
        node_ids: Vec<String>,
        features: NodeFeatures,
        edges: Vec<(NodeIndex, NodeIndex)>,
    ) -> GNNResult<Self> {
        if node_ids.is_empty() {
            return Err(GNNError::InvalidInput(
                "Graph must contain at least one node".to_string(),
            ));
        }

        if node_ids.len() != features.nrows() {
            return Err(GNNError::DimensionMismatch(format!(
                "{} node ids but {} feature rows",
                node_ids.len(),
                features.nrows()
            )));
        }

        let mut id_index = HashMap::with_capacity(node_ids.len());
        for (idx, id) in node_ids.iter().enumerate() {
            if id_index.insert(id.clone(), idx).is_some() {
                return Err(GNNError::DuplicateNode(id.clone()));
            }
        }

        let num_nodes = node_ids.len();
        if let Some(&(source, target)) = edges
            .iter()
            .find(|(source, target)| *source >= num_nodes || *target >= num_nodes)
        {
            return Err(GNNError::InvalidInput(format!(
                "Invalid edge ({}, {}): node indices must be in range [0, {})",
                source, target, num_nodes
            )));
        }

        Ok(Self::assemble(
            Arc::new(node_ids),
            Arc::new(id_index),
            Arc::new(features),
            edges,
        ))
    }

    /// Create a graph whose edges reference nodes by id.
    ///
    /// Edge rows are numbered from 1 in error messages, matching the data
    /// row numbering of the CSV file they usually come from.
    pub fn from_named_edges(
        node_ids: Vec<String>,
        features: NodeFeatures,
        named_edges: &[(String, String)],
    ) -> GNNResult<Self> {
        let empty = Self::new(node_ids, features, Vec::new())?;

        let mut edges = Vec::with_capacity(named_edges.len());
        for (row, (source, target)) in named_edges.iter().enumerate() {
            let lookup = |id: &String| {
                empty.node_index(id).ok_or_else(|| GNNError::UnknownNode {
                    row: row + 1,
                    node: id.clone(),
                })
            };
            edges.push((lookup(source)?, lookup(target)?));
        }

        Ok(empty.with_edges(edges))
    }

    fn assemble(
        node_ids: Arc<Vec<String>>,
        id_index: Arc<HashMap<String, NodeIndex>>,
        features: Arc<NodeFeatures>,
        edges: Vec<(NodeIndex, NodeIndex)>,
    ) -> Self {
        let mut neighbors = vec![Vec::new(); node_ids.len()];
        let mut pairs = HashSet::with_capacity(edges.len());

        for &(source, target) in &edges {
            neighbors[source].push(target);
            if source != target {
                neighbors[target].push(source);
            }
            pairs.insert(unordered(source, target));
        }

        Self {
            node_ids,
            id_index,
            features,
            edges,
            neighbors,
            pairs,
        }
    }

    /// Same nodes and features, different edge set
    pub fn with_edges(&self, edges: Vec<(NodeIndex, NodeIndex)>) -> Self {
        Self::assemble(
            Arc::clone(&self.node_ids),
            Arc::clone(&self.id_index),
            Arc::clone(&self.features),
            edges,
        )
    }

    /// Copy of the graph without the edges at the given positions
    pub fn without_edges(&self, removed: &HashSet<usize>) -> Self {
        let edges = self
            .edges
            .iter()
            .enumerate()
            .filter(|(idx, _)| !removed.contains(idx))
            .map(|(_, &edge)| edge)
            .collect();
        self.with_edges(edges)
    }

    /// Get number of nodes in the graph
    pub fn num_nodes(&self) -> usize {
        self.node_ids.len()
    }

    /// Get number of edges in the graph
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Get node feature dimension
    pub fn feature_dim(&self) -> usize {
        self.features.ncols()
    }

    pub fn features(&self) -> &NodeFeatures {
        &self.features
    }

    pub fn node_features_for(&self, node: NodeIndex) -> ArrayView1<'_, f32> {
        self.features.row(node)
    }

    pub fn node_id(&self, node: NodeIndex) -> Option<&str> {
        self.node_ids.get(node).map(String::as_str)
    }

    pub fn node_index(&self, id: &str) -> Option<NodeIndex> {
        self.id_index.get(id).copied()
    }

    pub fn edges(&self) -> &[(NodeIndex, NodeIndex)] {
        &self.edges
    }

    pub fn neighbors(&self, node: NodeIndex) -> &[NodeIndex] {
        &self.neighbors[node]
    }

    pub fn degree(&self, node: NodeIndex) -> usize {
        self.neighbors[node].len()
    }

    /// Whether an edge joins the two nodes, in either direction
    pub fn has_edge(&self, a: NodeIndex, b: NodeIndex) -> bool {
        self.pairs.contains(&unordered(a, b))
    }

    /// Whether both graphs share the same feature storage
    pub fn shares_features_with(&self, other: &Graph) -> bool {
        Arc::ptr_eq(&self.features, &other.features)
    }

    /// Number of connected components, isolated nodes included
    pub fn num_components(&self) -> usize {
        let mut components = DisjointSet::new(self.num_nodes());
        for &(source, target) in &self.edges {
            components.union(source, target);
        }
        components.num_sets()
    }
}

/// Normalised key for an undirected node pair
pub fn unordered(a: NodeIndex, b: NodeIndex) -> (NodeIndex, NodeIndex) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Union-find with path halving and union by size
#[derive(Debug, Clone)]
pub(crate) struct DisjointSet {
    parent: Vec<usize>,
    size: Vec<usize>,
    sets: usize,
}

impl DisjointSet {
    pub(crate) fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            size: vec![1; n],
            sets: n,
        }
    }

    pub(crate) fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Merge the sets of `a` and `b`; false if they were already joined
    pub(crate) fn union(&mut self, a: usize, b: usize) -> bool {
        let (mut ra, mut rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        if self.size[ra] < self.size[rb] {
            std::mem::swap(&mut ra, &mut rb);
        }
        self.parent[rb] = ra;
        self.size[ra] += self.size[rb];
        self.sets -= 1;
        true
    }

    pub(crate) fn num_sets(&self) -> usize {
        self.sets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle_with_tail() -> Graph {
        let ids = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        let features = Array2::from_shape_vec(
            (4, 2),
            vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0, 0.5, 0.5],
        )
        .unwrap();
        Graph::new(ids, features, vec![(0, 1), (1, 2), (2, 0), (2, 3)]).unwrap()
    }

    #[test]
    fn test_graph_is_undirected() {
        let graph = triangle_with_tail();
        assert_eq!(graph.num_nodes(), 4);
        assert_eq!(graph.num_edges(), 4);
        assert_eq!(graph.feature_dim(), 2);
        assert_eq!(graph.degree(2), 3);
        assert!(graph.has_edge(3, 2));
        assert!(graph.has_edge(0, 2));
        assert!(!graph.has_edge(0, 3));
        assert_eq!(graph.neighbors(3), &[2]);
    }

    #[test]
    fn test_self_loop_listed_once() {
        let ids = vec!["x".to_string(), "y".to_string()];
        let graph = Graph::new(ids, Array2::zeros((2, 1)), vec![(0, 0), (0, 1)]).unwrap();
        assert_eq!(graph.neighbors(0), &[0, 1]);
        assert_eq!(graph.neighbors(1), &[0]);
    }

    #[test]
    fn test_without_edges_shares_features() {
        let graph = triangle_with_tail();
        let reduced = graph.without_edges(&HashSet::from([0, 3]));

        assert_eq!(reduced.num_edges(), 2);
        assert!(!reduced.has_edge(0, 1));
        assert!(!reduced.has_edge(2, 3));
        assert!(reduced.has_edge(1, 2));
        assert!(reduced.shares_features_with(&graph));
        assert_eq!(reduced.num_components(), 2);
    }

    #[test]
    fn test_named_edges_resolve_ids() {
        let ids = vec!["10".to_string(), "20".to_string(), "30".to_string()];
        let named = vec![
            ("10".to_string(), "20".to_string()),
            ("30".to_string(), "10".to_string()),
        ];
        let graph = Graph::from_named_edges(ids, Array2::zeros((3, 1)), &named).unwrap();
        assert_eq!(graph.edges(), &[(0, 1), (2, 0)]);
        assert_eq!(graph.node_id(2), Some("30"));
        assert_eq!(graph.node_index("20"), Some(1));
    }

    #[test]
    fn test_unknown_and_duplicate_nodes_rejected() {
        let ids = vec!["1".to_string(), "2".to_string()];
        let named = vec![
            ("1".to_string(), "2".to_string()),
            ("2".to_string(), "9".to_string()),
        ];
        let err = Graph::from_named_edges(ids, Array2::zeros((2, 1)), &named).unwrap_err();
        assert!(matches!(err, GNNError::UnknownNode { row: 2, ref node } if node == "9"));

        let dup = vec!["1".to_string(), "1".to_string()];
        let err = Graph::new(dup, Array2::zeros((2, 1)), vec![]).unwrap_err();
        assert!(matches!(err, GNNError::DuplicateNode(ref id) if id == "1"));
    }

    #[test]
    fn test_out_of_range_edge_rejected() {
        let ids = vec!["1".to_string()];
        let err = Graph::new(ids, Array2::zeros((1, 1)), vec![(0, 1)]).unwrap_err();
        assert!(matches!(err, GNNError::InvalidInput(_)));
    }

    #[test]
    fn test_disjoint_set_counts_components() {
        let mut set = DisjointSet::new(5);
        assert!(set.union(0, 1));
        assert!(set.union(3, 4));
        assert!(!set.union(1, 0));
        assert_eq!(set.num_sets(), 3);
        assert_eq!(set.find(0), set.find(1));
        assert_ne!(set.find(0), set.find(3));
    }
}
