//! Detection Mask
//!
//! A 2-D grid of 0/1 labels produced by the segmentation step. Row `i`
//! corresponds to `GridAxes::latitudes[i]`, column `j` to
//! `GridAxes::longitudes[j]`.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::SteerError;

/// Pixel adjacency used when labeling regions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    /// Edge neighbours only (N, S, E, W)
    #[default]
    Four,
    /// Edge and corner neighbours
    Eight,
}

const FOUR_NEIGHBOURS: [(isize, isize); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

const EIGHT_NEIGHBOURS: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

impl Connectivity {
    /// Row/column offsets of the neighbours of a pixel
    pub fn offsets(self) -> &'static [(isize, isize)] {
        match self {
            Connectivity::Four => &FOUR_NEIGHBOURS,
            Connectivity::Eight => &EIGHT_NEIGHBOURS,
        }
    }
}

/// Boolean detection mask over a fixed geographic grid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionMask {
    cells: DMatrix<u8>,
}

impl DetectionMask {
    /// Create an all-zero mask
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            cells: DMatrix::zeros(rows, cols),
        }
    }

    /// Build a mask from row-major labels. Any non-zero label counts as foreground.
    pub fn from_row_slice(rows: usize, cols: usize, data: &[u8]) -> Result<Self, SteerError> {
        if data.len() != rows * cols {
            return Err(SteerError::GridMismatch {
                mask_rows: rows,
                mask_cols: if rows == 0 { 0 } else { data.len() / rows },
                lat_len: rows,
                lon_len: cols,
            });
        }
        let normalized: Vec<u8> = data.iter().map(|&v| u8::from(v != 0)).collect();
        Ok(Self {
            cells: DMatrix::from_row_slice(rows, cols, &normalized),
        })
    }

    /// Build a mask from a list of rows; rows must all have the same length
    pub fn from_rows(rows: &[Vec<u8>]) -> Result<Self, SteerError> {
        let n_rows = rows.len();
        let n_cols = rows.first().map(|r| r.len()).unwrap_or(0);
        if let Some(bad) = rows.iter().find(|r| r.len() != n_cols) {
            return Err(SteerError::GridMismatch {
                mask_rows: n_rows,
                mask_cols: bad.len(),
                lat_len: n_rows,
                lon_len: n_cols,
            });
        }
        let flat: Vec<u8> = rows.iter().flatten().copied().collect();
        Self::from_row_slice(n_rows, n_cols, &flat)
    }

    pub fn rows(&self) -> usize {
        self.cells.nrows()
    }

    pub fn cols(&self) -> usize {
        self.cells.ncols()
    }

    /// True if the pixel at (row, col) is foreground
    pub fn get(&self, row: usize, col: usize) -> bool {
        self.cells[(row, col)] != 0
    }

    pub fn set(&mut self, row: usize, col: usize, on: bool) {
        self.cells[(row, col)] = u8::from(on);
    }

    /// Number of foreground pixels
    pub fn count(&self) -> usize {
        self.cells.iter().filter(|&&v| v != 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Iterate foreground pixels in row-major order
    pub fn foreground(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let cols = self.cols();
        (0..self.rows() * cols)
            .map(move |i| (i / cols, i % cols))
            .filter(move |&(r, c)| self.get(r, c))
    }

    /// In-bounds neighbours of (row, col) under the given connectivity
    pub fn neighbours(
        &self,
        row: usize,
        col: usize,
        connectivity: Connectivity,
    ) -> impl Iterator<Item = (usize, usize)> + '_ {
        let rows = self.rows() as isize;
        let cols = self.cols() as isize;
        connectivity.offsets().iter().filter_map(move |&(dr, dc)| {
            let r = row as isize + dr;
            let c = col as isize + dc;
            if r >= 0 && r < rows && c >= 0 && c < cols {
                Some((r as usize, c as usize))
            } else {
                None
            }
        })
    }
}
