//! Region Resolution
//!
//! Labels connected components of a [`DetectionMask`], removes speckle
//! below an area threshold, and picks the dominant (largest) region whose
//! centroid is used for steering.
//!
//! # Example
//!
//! ```
//! use halo_steer_core::mask::{Connectivity, DetectionMask};
//! use halo_steer_core::region::resolve;
//!
//! let mask = DetectionMask::from_rows(&[
//!     vec![1, 1, 0, 0],
//!     vec![1, 1, 0, 1],
//! ]).unwrap();
//! let resolved = resolve(&mask, 2, Connectivity::Four).unwrap();
//! assert_eq!(resolved.dominant.area, 4);
//! assert!(!resolved.filtered.get(1, 3)); // speckle removed
//! ```

use std::collections::VecDeque;

use crate::error::SteerError;
use crate::mask::{Connectivity, DetectionMask};

/// Default minimum region area in pixels
pub const DEFAULT_AREA_THRESHOLD: usize = 20;

/// A connected component of the mask
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    /// 1-based label, assigned in row-major order of first pixel
    pub label: usize,
    /// Number of pixels
    pub area: usize,
    /// Mean row of member pixels
    pub centroid_row: f64,
    /// Mean column of member pixels
    pub centroid_col: f64,
    /// Member pixels in discovery order
    pub pixels: Vec<(usize, usize)>,
}

impl Region {
    /// Centroid snapped to the nearest grid cell
    pub fn centroid_index(&self) -> (usize, usize) {
        (
            self.centroid_row.round() as usize,
            self.centroid_col.round() as usize,
        )
    }
}

/// Output of [`resolve`]
#[derive(Debug, Clone)]
pub struct ResolvedRegion {
    /// Input mask with sub-threshold regions zeroed
    pub filtered: DetectionMask,
    /// Largest surviving region
    pub dominant: Region,
    /// Every labeled region, surviving or not, in label order
    pub regions: Vec<Region>,
}

/// Label all connected components in row-major scan order.
///
/// Labels start at 1 and follow the position of each component's first
/// pixel, so output is deterministic for a given mask.
pub fn label(mask: &DetectionMask, connectivity: Connectivity) -> Vec<Region> {
    let rows = mask.rows();
    let cols = mask.cols();
    let mut visited = vec![false; rows * cols];
    let mut regions = Vec::new();
    let mut queue = VecDeque::new();

    for (row, col) in mask.foreground() {
        if visited[row * cols + col] {
            continue;
        }
        visited[row * cols + col] = true;
        queue.push_back((row, col));

        let mut pixels = Vec::new();
        let mut sum_row = 0usize;
        let mut sum_col = 0usize;

        while let Some((r, c)) = queue.pop_front() {
            pixels.push((r, c));
            sum_row += r;
            sum_col += c;
            for (nr, nc) in mask.neighbours(r, c, connectivity) {
                let idx = nr * cols + nc;
                if !visited[idx] && mask.get(nr, nc) {
                    visited[idx] = true;
                    queue.push_back((nr, nc));
                }
            }
        }

        let area = pixels.len();
        regions.push(Region {
            label: regions.len() + 1,
            area,
            centroid_row: sum_row as f64 / area as f64,
            centroid_col: sum_col as f64 / area as f64,
            pixels,
        });
    }

    regions
}

/// Zero every region smaller than `area_threshold`.
///
/// Idempotent for a fixed threshold and connectivity.
pub fn filter_speckle(
    mask: &DetectionMask,
    area_threshold: usize,
    connectivity: Connectivity,
) -> DetectionMask {
    let mut filtered = mask.clone();
    for region in label(mask, connectivity) {
        if region.area < area_threshold {
            for &(r, c) in &region.pixels {
                filtered.set(r, c, false);
            }
        }
    }
    filtered
}

/// Resolve the dominant region of `mask`.
///
/// The largest region wins; ties go to the lowest label. Fails with
/// [`SteerError::NoRegionFound`] when nothing survives filtering.
pub fn resolve(
    mask: &DetectionMask,
    area_threshold: usize,
    connectivity: Connectivity,
) -> Result<ResolvedRegion, SteerError> {
    let regions = label(mask, connectivity);
    let mut filtered = mask.clone();
    let mut largest: Option<usize> = None;

    for (index, region) in regions.iter().enumerate() {
        if region.area < area_threshold {
            for &(r, c) in &region.pixels {
                filtered.set(r, c, false);
            }
            continue;
        }
        // Strict comparison keeps the first-encountered label on ties
        match largest {
            Some(best) if regions[best].area >= region.area => {}
            _ => largest = Some(index),
        }
    }

    if filtered.is_empty() {
        log::debug!(
            "No region survives area threshold {} ({} candidates)",
            area_threshold,
            regions.len()
        );
        return Err(SteerError::NoRegionFound);
    }
    let best = largest.ok_or(SteerError::NoRegionFound)?;
    let dominant = regions[best].clone();
    log::debug!(
        "Dominant region label {} area {} centroid ({:.2}, {:.2}) of {} regions",
        dominant.label,
        dominant.area,
        dominant.centroid_row,
        dominant.centroid_col,
        regions.len()
    );

    Ok(ResolvedRegion {
        filtered,
        dominant,
        regions,
    })
}
