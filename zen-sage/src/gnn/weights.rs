//! Ordered model weight arrays and their binary persistence
//!
//! The order is fixed by the model: for every encoder layer, `w_self`,
//! `w_neigh`, then the bias when the model uses one. Files are plain bincode
//! of the serde form of the arrays, with no version header.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::GNNResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelWeights {
    arrays: Vec<ArrayD<f32>>,
}

impl ModelWeights {
    pub fn new(arrays: Vec<ArrayD<f32>>) -> Self {
        Self { arrays }
    }

    pub fn arrays(&self) -> &[ArrayD<f32>] {
        &self.arrays
    }

    pub fn into_arrays(self) -> Vec<ArrayD<f32>> {
        self.arrays
    }

    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }

    pub fn shapes(&self) -> Vec<Vec<usize>> {
        self.arrays.iter().map(|a| a.shape().to_vec()).collect()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> GNNResult<()> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        bincode::serialize_into(&mut writer, self)?;
        writer.flush()?;
        debug!(path = %path.display(), arrays = self.len(), "saved model weights");
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> GNNResult<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let weights: Self = bincode::deserialize_from(reader)?;
        debug!(path = %path.display(), arrays = weights.len(), "loaded model weights");
        Ok(weights)
    }
}
