//! Node-indexed field storage.
//!
//! State and coefficients are stored as row-major 2D arrays: one row per
//! channel (or doping ring), one column per spatial node. Rows are contiguous
//! so kernels can operate on whole-fiber slices.

use serde::{Deserialize, Serialize};

/// Shape of a node field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Number of rows (channels or rings)
    pub rows: usize,
    /// Number of spatial nodes
    pub nodes: usize,
}

impl Dimensions {
    /// Create new dimensions.
    pub fn new(rows: usize, nodes: usize) -> Self {
        Self { rows, nodes }
    }

    /// Total number of values.
    #[inline]
    pub fn total(&self) -> usize {
        self.rows * self.nodes
    }

    /// Convert (row, node) to a linear index.
    #[inline]
    pub fn to_linear(&self, row: usize, node: usize) -> usize {
        row * self.nodes + node
    }
}

/// Dense row-major field of `f64` values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeField {
    dims: Dimensions,
    data: Vec<f64>,
}

impl NodeField {
    /// Create a zero-filled field.
    pub fn new(dims: Dimensions) -> Self {
        Self {
            dims,
            data: vec![0.0; dims.total()],
        }
    }

    /// Build a field from rows. All rows must have the same length.
    pub fn from_rows(rows: &[Vec<f64>]) -> crate::Result<Self> {
        let nodes = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != nodes) {
            return Err(crate::Error::Config(
                "All rows of a node field must have the same length".into(),
            ));
        }
        let mut field = Self::new(Dimensions::new(rows.len(), nodes));
        for (i, row) in rows.iter().enumerate() {
            field.row_mut(i).copy_from_slice(row);
        }
        Ok(field)
    }

    /// Field shape.
    #[inline]
    pub fn dimensions(&self) -> Dimensions {
        self.dims
    }

    #[inline]
    pub fn get(&self, row: usize, node: usize) -> f64 {
        self.data[self.dims.to_linear(row, node)]
    }

    #[inline]
    pub fn set(&mut self, row: usize, node: usize, value: f64) {
        let idx = self.dims.to_linear(row, node);
        self.data[idx] = value;
    }

    #[inline]
    pub fn add(&mut self, row: usize, node: usize, value: f64) {
        let idx = self.dims.to_linear(row, node);
        self.data[idx] += value;
    }

    /// Contiguous slice of one row.
    #[inline]
    pub fn row(&self, row: usize) -> &[f64] {
        let start = row * self.dims.nodes;
        &self.data[start..start + self.dims.nodes]
    }

    /// Mutable contiguous slice of one row.
    #[inline]
    pub fn row_mut(&mut self, row: usize) -> &mut [f64] {
        let start = row * self.dims.nodes;
        &mut self.data[start..start + self.dims.nodes]
    }

    /// Iterate over rows.
    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        // chunks_exact panics on a zero chunk size
        self.data.chunks_exact(self.dims.nodes.max(1))
    }

    /// Copy every row into an owned `Vec`.
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.rows().map(<[f64]>::to_vec).collect()
    }

    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn fill(&mut self, value: f64) {
        self.data.fill(value);
    }

    pub fn clear(&mut self) {
        self.fill(0.0);
    }

    /// True if every value is finite.
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }

    /// Position of the first non-finite value as (row, node).
    pub fn first_non_finite(&self) -> Option<(usize, usize)> {
        self.data
            .iter()
            .position(|v| !v.is_finite())
            .map(|idx| (idx / self.dims.nodes, idx % self.dims.nodes))
    }
}
