//! Grid geometry: bearing and distance from the instrument to a region
//!
//! Positions are projected onto a local tangent plane centred at the grid
//! midpoint using the equirectangular approximation. Bearings are compass
//! bearings (clockwise from north), not mathematical angles.

use serde::{Deserialize, Serialize};

use crate::error::SteerError;
use crate::mask::DetectionMask;
use crate::region::Region;

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Geographic position of the steered instrument
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InstrumentLocation {
    pub latitude: f64,
    pub longitude: f64,
}

impl InstrumentLocation {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Latitude/longitude axes of the detection grid and their projection
#[derive(Debug, Clone, PartialEq)]
pub struct GridAxes {
    latitudes: Vec<f64>,
    longitudes: Vec<f64>,
    /// Easting of each longitude, meters from the grid midpoint
    x: Vec<f64>,
    /// Northing of each latitude, meters from the grid midpoint
    y: Vec<f64>,
    lat0: f64,
    lon0: f64,
}

fn midpoint(values: &[f64]) -> f64 {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    (min + max) / 2.0
}

/// Index of the value closest to `target`; first one wins on ties
fn nearest_index(values: &[f64], target: f64) -> usize {
    let mut best = 0;
    let mut best_diff = f64::INFINITY;
    for (i, v) in values.iter().enumerate() {
        let diff = (v - target).abs();
        if diff < best_diff {
            best = i;
            best_diff = diff;
        }
    }
    best
}

impl GridAxes {
    /// Build axes and project them around the grid midpoint
    pub fn new(latitudes: Vec<f64>, longitudes: Vec<f64>) -> Self {
        let lat0 = midpoint(&latitudes);
        let lon0 = midpoint(&longitudes);
        let cos_lat0 = lat0.to_radians().cos();
        let x = longitudes
            .iter()
            .map(|lon| EARTH_RADIUS_M * (lon - lon0).to_radians() * cos_lat0)
            .collect();
        let y = latitudes
            .iter()
            .map(|lat| EARTH_RADIUS_M * (lat - lat0).to_radians())
            .collect();
        Self {
            latitudes,
            longitudes,
            x,
            y,
            lat0,
            lon0,
        }
    }

    pub fn latitudes(&self) -> &[f64] {
        &self.latitudes
    }

    pub fn longitudes(&self) -> &[f64] {
        &self.longitudes
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    /// Projection origin (latitude, longitude)
    pub fn origin(&self) -> (f64, f64) {
        (self.lat0, self.lon0)
    }

    /// Check that the axes describe `mask`
    pub fn check(&self, mask: &DetectionMask) -> Result<(), SteerError> {
        if mask.rows() != self.latitudes.len()
            || mask.cols() != self.longitudes.len()
            || mask.rows() == 0
            || mask.cols() == 0
        {
            return Err(SteerError::GridMismatch {
                mask_rows: mask.rows(),
                mask_cols: mask.cols(),
                lat_len: self.latitudes.len(),
                lon_len: self.longitudes.len(),
            });
        }
        Ok(())
    }

    /// Nearest grid cell (row, col) to a geographic position
    pub fn nearest_cell(&self, location: InstrumentLocation) -> (usize, usize) {
        (
            nearest_index(&self.latitudes, location.latitude),
            nearest_index(&self.longitudes, location.longitude),
        )
    }

    /// Whether `location` lies within the span of both axes
    pub fn contains(&self, location: InstrumentLocation) -> bool {
        let within = |values: &[f64], v: f64| {
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            v >= min && v <= max
        };
        within(&self.latitudes, location.latitude) && within(&self.longitudes, location.longitude)
    }

    /// Project a geographic position onto the grid plane
    pub fn project(&self, location: InstrumentLocation) -> (f64, f64) {
        let cos_lat0 = self.lat0.to_radians().cos();
        (
            EARTH_RADIUS_M * (location.longitude - self.lon0).to_radians() * cos_lat0,
            EARTH_RADIUS_M * (location.latitude - self.lat0).to_radians(),
        )
    }

    /// Projected (x, y) of a grid cell
    pub fn cell_xy(&self, row: usize, col: usize) -> (f64, f64) {
        (self.x[col], self.y[row])
    }
}

/// Compass bearing in degrees, [0, 360), from `from` to `to` in tangent-plane coordinates
pub fn compass_bearing(from: (f64, f64), to: (f64, f64)) -> f64 {
    let dx = to.0 - from.0;
    let dy = to.1 - from.1;
    // atan2(dx, dy): zero points north and angles grow clockwise
    let degrees = dx.atan2(dy).to_degrees();
    let normalized = (degrees + 360.0) % 360.0;
    if normalized >= 360.0 {
        0.0
    } else {
        normalized
    }
}

/// Bearing, region position, and distance relative to the instrument
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bearing {
    /// Compass bearing to the region centroid, [0, 360)
    pub azimuth_degrees: f64,
    pub region_latitude: f64,
    pub region_longitude: f64,
    /// Distance to the nearest foreground pixel of the filtered mask
    pub distance_m: f64,
}

/// Compute bearing to the region centroid and distance to the nearest
/// surviving pixel.
///
/// Distance is to the nearest pixel, not the centroid.
pub fn bearing_and_distance(
    instrument: InstrumentLocation,
    axes: &GridAxes,
    filtered: &DetectionMask,
    region: &Region,
) -> Result<Bearing, SteerError> {
    axes.check(filtered)?;
    if filtered.is_empty() {
        return Err(SteerError::NoRegionFound);
    }

    // Snap to the nearest cell only when the instrument is on the grid
    let (inst_row, inst_col) = axes.nearest_cell(instrument);
    let instrument_xy = if axes.contains(instrument) {
        axes.cell_xy(inst_row, inst_col)
    } else {
        log::debug!(
            "Instrument ({}, {}) lies outside the grid",
            instrument.latitude,
            instrument.longitude
        );
        axes.project(instrument)
    };

    let (center_row, center_col) = region.centroid_index();
    let center_row = center_row.min(axes.latitudes.len() - 1);
    let center_col = center_col.min(axes.longitudes.len() - 1);
    let center_xy = axes.cell_xy(center_row, center_col);

    let azimuth_degrees = compass_bearing(instrument_xy, center_xy);

    let distance_m = filtered
        .foreground()
        .map(|(r, c)| {
            let (x, y) = axes.cell_xy(r, c);
            (x - instrument_xy.0).hypot(y - instrument_xy.1)
        })
        .fold(f64::INFINITY, f64::min);

    log::debug!(
        "Instrument cell ({}, {}), region cell ({}, {}), azimuth {:.2} deg, distance {:.0} m",
        inst_row,
        inst_col,
        center_row,
        center_col,
        azimuth_degrees,
        distance_m
    );

    Ok(Bearing {
        azimuth_degrees,
        region_latitude: axes.latitudes[center_row],
        region_longitude: axes.longitudes[center_col],
        distance_m,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::Connectivity;
    use crate::region::resolve;

    fn axes_3x3() -> GridAxes {
        GridAxes::new(vec![42.0, 41.9, 41.8], vec![-88.1, -88.0, -87.9])
    }

    #[test]
    fn test_projection_centered() {
        let axes = axes_3x3();
        let (lat0, lon0) = axes.origin();
        assert!((lat0 - 41.9).abs() < 1e-9);
        assert!((lon0 + 88.0).abs() < 1e-9);
        assert!(axes.x()[1].abs() < 1e-6);
        assert!(axes.y()[1].abs() < 1e-6);
        // North of the midpoint is positive y, east is positive x
        assert!(axes.y()[0] > 0.0);
        assert!(axes.x()[2] > 0.0);
        let expected_dy = EARTH_RADIUS_M * 0.1f64.to_radians();
        assert!((axes.y()[0] - expected_dy).abs() < 1e-3);
    }

    #[test]
    fn test_nearest_cell() {
        let axes = axes_3x3();
        let cell = axes.nearest_cell(InstrumentLocation::new(41.81, -87.93));
        assert_eq!(cell, (2, 2));
    }

    #[test]
    fn test_project_matches_cell_and_extends_past_grid() {
        let axes = axes_3x3();
        let (x, y) = axes.project(InstrumentLocation::new(42.0, -87.9));
        assert!((x - axes.x()[2]).abs() < 1e-6);
        assert!((y - axes.y()[0]).abs() < 1e-6);

        let west = InstrumentLocation::new(41.9, -90.0);
        assert!(!axes.contains(west));
        assert!(axes.contains(InstrumentLocation::new(41.85, -88.05)));
        let (x, _) = axes.project(west);
        assert!(x < axes.x()[0] - 100_000.0);
    }

    #[test]
    fn test_instrument_off_grid_is_not_snapped_to_edge() {
        let axes = axes_3x3();
        let mask = DetectionMask::from_rows(&[vec![1, 0, 0], vec![1, 0, 0], vec![1, 0, 0]]).unwrap();
        let resolved = resolve(&mask, 1, Connectivity::Four).unwrap();
        let bearing = bearing_and_distance(
            InstrumentLocation::new(41.9, -90.0),
            &axes,
            &resolved.filtered,
            &resolved.dominant,
        )
        .unwrap();
        let (x, _) = axes.project(InstrumentLocation::new(41.9, -90.0));
        assert!((bearing.distance_m - (axes.x()[0] - x)).abs() < 1e-6);
        assert!((bearing.azimuth_degrees - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_compass_bearing_cardinal() {
        let origin = (0.0, 0.0);
        assert_eq!(compass_bearing(origin, (0.0, 10.0)), 0.0);
        assert!((compass_bearing(origin, (10.0, 0.0)) - 90.0).abs() < 1e-9);
        assert!((compass_bearing(origin, (0.0, -10.0)) - 180.0).abs() < 1e-9);
        assert!((compass_bearing(origin, (-10.0, 0.0)) - 270.0).abs() < 1e-9);
        assert!((compass_bearing(origin, (-10.0, 10.0)) - 315.0).abs() < 1e-9);
    }

    #[test]
    fn test_region_north_east_of_instrument() {
        let axes = axes_3x3();
        let mask = DetectionMask::from_rows(&[vec![0, 0, 1], vec![0, 0, 0], vec![0, 0, 0]]).unwrap();
        let resolved = resolve(&mask, 1, Connectivity::Four).unwrap();
        let bearing = bearing_and_distance(
            InstrumentLocation::new(41.8, -88.1),
            &axes,
            &resolved.filtered,
            &resolved.dominant,
        )
        .unwrap();
        assert!(bearing.azimuth_degrees > 0.0 && bearing.azimuth_degrees < 90.0);
        assert_eq!(bearing.region_latitude, 42.0);
        assert_eq!(bearing.region_longitude, -87.9);
        let dx = axes.x()[2] - axes.x()[0];
        let dy = axes.y()[0] - axes.y()[2];
        assert!((bearing.distance_m - dx.hypot(dy)).abs() < 1e-6);
    }

    #[test]
    fn test_distance_uses_nearest_pixel() {
        let axes = GridAxes::new(
            vec![42.0, 41.9, 41.8, 41.7, 41.6],
            vec![-88.0, -87.9, -87.8, -87.7, -87.6],
        );
        // Wide region spanning columns 1..=4 on row 0, instrument under column 1
        let mask = DetectionMask::from_rows(&[
            vec![0, 1, 1, 1, 1],
            vec![0, 0, 0, 0, 0],
            vec![0, 0, 0, 0, 0],
            vec![0, 0, 0, 0, 0],
            vec![0, 0, 0, 0, 0],
        ])
        .unwrap();
        let resolved = resolve(&mask, 1, Connectivity::Four).unwrap();
        let bearing = bearing_and_distance(
            InstrumentLocation::new(41.9, -87.9),
            &axes,
            &resolved.filtered,
            &resolved.dominant,
        )
        .unwrap();
        let expected = axes.y()[0] - axes.y()[1];
        assert!((bearing.distance_m - expected).abs() < 1e-6);
        // Centroid sits at column 2.5 -> 3, east of north
        assert!(bearing.azimuth_degrees > 0.0 && bearing.azimuth_degrees < 90.0);
    }

    #[test]
    fn test_instrument_inside_region() {
        let axes = axes_3x3();
        let mask = DetectionMask::from_rows(&[vec![1, 1, 1], vec![1, 1, 1], vec![1, 1, 1]]).unwrap();
        let resolved = resolve(&mask, 1, Connectivity::Four).unwrap();
        let bearing = bearing_and_distance(
            InstrumentLocation::new(41.9, -88.0),
            &axes,
            &resolved.filtered,
            &resolved.dominant,
        )
        .unwrap();
        assert_eq!(bearing.distance_m, 0.0);
        assert_eq!(bearing.azimuth_degrees, 0.0);
    }

    #[test]
    fn test_grid_mismatch() {
        let axes = axes_3x3();
        let mask = DetectionMask::zeros(2, 3);
        assert!(matches!(
            axes.check(&mask),
            Err(SteerError::GridMismatch { mask_rows: 2, .. })
        ));
    }
}
