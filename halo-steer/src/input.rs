//! Detection input files
//!
//! A detection is a JSON document holding a boundary mask and the
//! geographic axes of its grid:
//!
//! ```json
//! {
//!   "latitudes":  [41.72, 41.71, 41.70],
//!   "longitudes": [-88.01, -88.00, -87.99],
//!   "mask": [[0, 1, 1], [0, 1, 1], [0, 0, 0]],
//!   "connectivity": "four"
//! }
//! ```
//!
//! Row `i` of the mask lies at `latitudes[i]`, column `j` at
//! `longitudes[j]`. `connectivity` is optional.

use std::path::Path;

use anyhow::{Context, Result};
use halo_steer_core::{Connectivity, DetectionMask, GridAxes};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct DetectionDocument {
    latitudes: Vec<f64>,
    longitudes: Vec<f64>,
    mask: Vec<Vec<u8>>,
    #[serde(default)]
    connectivity: Option<Connectivity>,
}

/// A validated detection: mask and axes agree in shape
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub mask: DetectionMask,
    pub axes: GridAxes,
    /// Connectivity requested by the producer, if any
    pub connectivity: Option<Connectivity>,
}

impl Detection {
    pub fn from_json(text: &str) -> Result<Self> {
        let doc: DetectionDocument = serde_json::from_str(text).context("Invalid detection document")?;
        let mask = DetectionMask::from_rows(&doc.mask)?;
        let axes = GridAxes::new(doc.latitudes, doc.longitudes);
        axes.check(&mask)?;
        log::debug!(
            "Detection grid {}x{} with {} foreground pixels",
            mask.rows(),
            mask.cols(),
            mask.count()
        );
        Ok(Detection {
            mask,
            axes,
            connectivity: doc.connectivity,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read detection file {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("In detection file {}", path.display()))
    }
}
