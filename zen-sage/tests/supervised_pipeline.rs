/**
 * @fileoverview End-to-end tests for the supervised link prediction pipeline
 *
 * Every test writes a small synthetic graph to CSV files, loads it through the
 * public API and drives a full session: initialize, fit, evaluate, and weight
 * persistence.
 */
use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::PathBuf;

use tempfile::TempDir;

use zen_sage::gnn::EdgeSplitter;
use zen_sage::{
    load_graph, GNNError, HyperParameters, ModelWeights, SessionConfig, SplitMethod,
    SupervisedModel,
};

/// Two communities of 30 nodes joined by a few bridges
pub struct GraphFixture {
    pub dir: TempDir,
    pub nodes: PathBuf,
    pub edges: PathBuf,
}

impl GraphFixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let per_community = 30;

        let mut nodes = String::from("id,f0,f1,f2,f3\n");
        for i in 0..2 * per_community {
            let community = (i / per_community) as f32;
            let phase = i as f32 * 0.37;
            writeln!(
                nodes,
                "{},{},{},{:.4},{:.4}",
                100 + i,
                community,
                1.0 - community,
                phase.sin(),
                phase.cos()
            )
            .unwrap();
        }

        // Index column, weight column and reversed column order are ignored
        let mut edges = String::from(",target,source,weight\n");
        let mut row = 0;
        let mut push = |edges: &mut String, a: usize, b: usize| {
            writeln!(edges, "{},{},{},1.0", row, 100 + b, 100 + a).unwrap();
            row += 1;
        };
        for c in 0..2 {
            let base = c * per_community;
            for i in 0..per_community {
                for k in [1, 3, 7] {
                    push(&mut edges, base + i, base + (i + k) % per_community);
                }
            }
        }
        for bridge in 0..4 {
            push(&mut edges, bridge * 5, per_community + bridge * 5);
        }

        let nodes_path = dir.path().join("nodes.csv");
        let edges_path = dir.path().join("edges.csv");
        std::fs::write(&nodes_path, nodes).unwrap();
        std::fs::write(&edges_path, edges).unwrap();

        Self {
            dir,
            nodes: nodes_path,
            edges: edges_path,
        }
    }

    pub fn config(&self, seed: u64) -> SessionConfig {
        SessionConfig {
            seed,
            hyper: HyperParameters {
                batch_size: 10,
                num_samples: vec![4, 2],
                layer_sizes: vec![8, 8],
                ..HyperParameters::default()
            },
            ..SessionConfig::default()
        }
    }

    pub fn session(&self, seed: u64) -> SupervisedModel {
        let graph = load_graph(&self.nodes, &self.edges).unwrap();
        SupervisedModel::new(graph, self.config(seed)).unwrap()
    }
}

#[test]
fn test_graph_loads_from_csv() {
    let fixture = GraphFixture::new();
    let graph = load_graph(&fixture.nodes, &fixture.edges).unwrap();

    assert_eq!(graph.num_nodes(), 60);
    assert_eq!(graph.num_edges(), 2 * 30 * 3 + 4);
    assert_eq!(graph.feature_dim(), 4);
    assert_eq!(graph.num_components(), 1);
    assert!(graph.has_edge(graph.node_index("100").unwrap(), graph.node_index("101").unwrap()));
}

#[test]
fn test_two_stage_split_is_disjoint_and_balanced() {
    let fixture = GraphFixture::new();
    let graph = load_graph(&fixture.nodes, &fixture.edges).unwrap();

    let test = EdgeSplitter::new(&graph)
        .train_test_split(0.05, SplitMethod::Global, true, 42)
        .unwrap();
    let train = EdgeSplitter::new(&test.graph)
        .with_exclusions(test.pairs())
        .train_test_split(0.1, SplitMethod::Global, true, 42)
        .unwrap();

    assert_eq!(test.num_positive() * 2, test.len());
    assert_eq!(train.num_positive() * 2, train.len());

    let test_pairs: HashSet<_> = test.pairs().collect();
    assert!(train.pairs().all(|pair| !test_pairs.contains(&pair)));

    for (&(a, b), &label) in train.links.iter().zip(&train.labels) {
        // Positives are gone from the sampling graph, negatives never were edges
        assert!(!train.graph.has_edge(a, b));
        if label == 0.0 {
            assert!(!graph.has_edge(a, b));
        }
    }
    assert_eq!(train.graph.num_components(), graph.num_components());
    assert!(train.graph.shares_features_with(&graph));
}

#[test]
fn test_full_session_trains_and_persists_weights() {
    let fixture = GraphFixture::new();
    let mut model = fixture.session(42);

    let sizes = model.initialize().unwrap();
    // 184 edges: test floor(1.84) = 1 positive, train floor(18.3) = 18 positives
    assert_eq!(sizes.test, 2);
    assert_eq!(sizes.train, 36);

    let (weights, history) = model.fit(3).unwrap();
    assert_eq!(history.len(), 3);
    assert!(history.epochs.iter().all(|e| e.loss.is_finite()));

    let path = fixture.dir.path().join("weights.bin");
    weights.save(&path).unwrap();
    let loaded = ModelWeights::load(&path).unwrap();
    assert_eq!(loaded, weights);

    // A fresh session with a different seed adopts the saved weights exactly
    let mut other = fixture.session(1);
    other.initialize().unwrap();
    assert_ne!(other.get_weights().unwrap(), weights);
    other.set_weights(&loaded).unwrap();
    assert_eq!(other.get_weights().unwrap(), weights);

    let (train, test) = model.evaluate().unwrap();
    for metrics in [train, test] {
        assert!(metrics.loss.is_finite());
        assert!((0.0..=1.0).contains(&metrics.auc));
        assert!((0.0..=1.0).contains(&metrics.f1()));
    }
}

#[test]
fn test_sessions_are_reproducible() {
    let fixture = GraphFixture::new();
    let run = || {
        let mut model = fixture.session(42);
        let sizes = model.initialize().unwrap();
        let (weights, history) = model.fit(2).unwrap();
        (sizes, weights, history.epochs.iter().map(|e| e.loss).collect::<Vec<_>>())
    };

    let (sizes_a, weights_a, losses_a) = run();
    let (sizes_b, weights_b, losses_b) = run();
    assert_eq!(sizes_a, sizes_b);
    assert_eq!(weights_a, weights_b);
    assert_eq!(losses_a, losses_b);
}

#[test]
fn test_mismatched_initial_weights_rejected() {
    let fixture = GraphFixture::new();
    let mut model = fixture.session(42);
    model.initialize().unwrap();

    let mut wider = fixture.config(42);
    wider.hyper.layer_sizes = vec![12, 8];
    let graph = load_graph(&fixture.nodes, &fixture.edges).unwrap();
    let mut other = SupervisedModel::new(graph, wider).unwrap();
    other.initialize().unwrap();

    let err = model.set_weights(&other.get_weights().unwrap()).unwrap_err();
    assert!(matches!(err, GNNError::DimensionMismatch(_)));
}

#[test]
fn test_tiny_graph_cannot_be_split() {
    let dir = tempfile::tempdir().unwrap();
    let nodes = dir.path().join("nodes.csv");
    let edges = dir.path().join("edges.csv");
    std::fs::write(&nodes, "id,f\n1,0.0\n2,1.0\n3,0.5\n").unwrap();
    std::fs::write(&edges, "source,target\n1,2\n2,3\n").unwrap();

    let graph = load_graph(&nodes, &edges).unwrap();
    let mut model = SupervisedModel::new(graph, SessionConfig::default()).unwrap();
    assert!(matches!(model.initialize(), Err(GNNError::EmptySplit { .. })));
}
