//! CSV loading of graph tables
//!
//! ## Node CSV Format
//!
//! ```csv
//! id,f0,f1,f2
//! 0,0.1,0.0,1.0
//! 1,0.0,0.3,0.2
//! ```
//!
//! - First column is the node id (header name is free, value is an opaque string)
//! - Every remaining column is a numeric feature
//!
//! ## Edge CSV Format
//!
//! ```csv
//! ,source,target
//! 0,0,1
//! 1,1,2
//! ```
//!
//! - `source` and `target` columns are required, in any position
//! - Other columns (row indices, weights, types) are ignored

use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use ndarray::Array2;
use tracing::{debug, info};

use super::data::{Graph, NodeFeatures};
use crate::errors::{GNNError, GNNResult};

/// Node table: ids in row order and the feature matrix
#[derive(Debug, Clone)]
pub struct NodeTable {
    pub ids: Vec<String>,
    pub feature_names: Vec<String>,
    pub features: NodeFeatures,
}

/// Loads the node table from a CSV file.
///
/// # Errors
/// - `InvalidInput` when the file has no feature columns or no rows
/// - `InvalidFeature` when a feature cell is not a number
pub fn load_nodes(path: impl AsRef<Path>) -> GNNResult<NodeTable> {
    let path = path.as_ref();
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    if headers.len() < 2 {
        return Err(GNNError::InvalidInput(format!(
            "Node table {} needs an id column and at least one feature column",
            path.display()
        )));
    }
    let feature_names: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();
    let feature_dim = feature_names.len();

    let mut ids = Vec::new();
    let mut values = Vec::new();
    let mut record = StringRecord::new();
    let mut row = 0;

    while reader.read_record(&mut record)? {
        row += 1;
        ids.push(record[0].to_string());

        for (column, cell) in feature_names.iter().zip(record.iter().skip(1)) {
            let value = cell.parse::<f32>().map_err(|_| GNNError::InvalidFeature {
                row,
                column: column.clone(),
                value: cell.to_string(),
            })?;
            values.push(value);
        }
    }

    if ids.is_empty() {
        return Err(GNNError::InvalidInput(format!(
            "Node table {} contains no rows",
            path.display()
        )));
    }

    let features = Array2::from_shape_vec((ids.len(), feature_dim), values)?;
    debug!(nodes = ids.len(), feature_dim, "loaded node table");

    Ok(NodeTable {
        ids,
        feature_names,
        features,
    })
}

/// Loads (source, target) id pairs from an edge CSV file
pub fn load_edges(path: impl AsRef<Path>) -> GNNResult<Vec<(String, String)>> {
    let path = path.as_ref();
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|header| header == name)
            .ok_or_else(|| GNNError::MissingColumn {
                column: name.to_string(),
                path: path.to_path_buf(),
            })
    };
    let source_col = column("source")?;
    let target_col = column("target")?;

    let mut edges = Vec::new();
    let mut record = StringRecord::new();
    while reader.read_record(&mut record)? {
        edges.push((
            record[source_col].to_string(),
            record[target_col].to_string(),
        ));
    }

    debug!(edges = edges.len(), "loaded edge table");
    Ok(edges)
}

/// Loads both tables and assembles the graph
pub fn load_graph(nodes_path: impl AsRef<Path>, edges_path: impl AsRef<Path>) -> GNNResult<Graph> {
    let nodes = load_nodes(nodes_path)?;
    let edges = load_edges(edges_path)?;
    let graph = Graph::from_named_edges(nodes.ids, nodes.features, &edges)?;

    info!(
        "Graph loaded: {} nodes, {} edges, {} features",
        graph.num_nodes(),
        graph.num_edges(),
        graph.feature_dim()
    );
    Ok(graph)
}
