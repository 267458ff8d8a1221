//! Halo Photonics CSM scan strategy encoding
//!
//! Pure functions for building the scanner's native command-sequence (CSM)
//! file. No I/O operations - just returns lines ready to upload.
//!
//! # File layout
//!
//! ```text
//! 7                                               <- repeat count   (static mode only)
//! 2                                               <- point count    (static mode only)
//! 20                                              <- rays per point (static mode only)
//! A.1=30,S.1=1389,P.1=-125000*A.2=30,S.2=1389,P.2=0
//! W0
//! ...
//! ```
//!
//! Every line ends in `\r\n`; the instrument's parser rejects bare `\n`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SteerError;

/// Line terminator expected by the scanner
pub const LINE_END: &str = "\r\n";

/// Azimuth encoder counts per full rotation
pub const AZ_COUNTS_PER_ROTATION: i64 = 500_000;

/// Elevation encoder counts per full rotation
pub const EL_COUNTS_PER_ROTATION: i64 = 250_000;

pub const DEFAULT_AZIMUTH_SPEED: f64 = 1.0;
pub const DEFAULT_ELEVATION_SPEED: f64 = 0.1;
pub const DEFAULT_ACCELERATION: i64 = 30;
pub const DEFAULT_REPEAT: u32 = 7;
pub const DEFAULT_RAYS_PER_POINT: u32 = 20;

/// Upper bound on points in one scan file
pub const MAX_SCAN_POINTS: usize = 10_000;

// =============================================================================
// Tick conversion
// =============================================================================

/// Convert degrees (or degrees per second) to encoder ticks
///
/// `ticks = round(degrees * counts_per_rotation / 360)`
pub fn degrees_to_ticks(degrees: f64, counts_per_rotation: i64) -> i64 {
    (degrees * (counts_per_rotation as f64 / 360.0)).round() as i64
}

/// Target-angle ticks. The hardware axis runs opposite to geographic
/// azimuth, so the sign is inverted.
pub fn position_ticks(degrees: f64, counts_per_rotation: i64) -> i64 {
    -degrees_to_ticks(degrees, counts_per_rotation)
}

// =============================================================================
// Scan request
// =============================================================================

/// Motion parameters and hardware constants shared by every point of a scan
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanMotion {
    /// Azimuth speed, degrees per second
    pub azimuth_speed: f64,
    /// Elevation speed, degrees per second
    pub elevation_speed: f64,
    /// Dwell after each point, milliseconds
    pub wait_ms: u32,
    /// Acceleration applied to both axes
    pub acceleration: i64,
    /// Times the instrument repeats the whole sequence (static mode header)
    pub repeat_count: u32,
    /// Rays collected per point (static mode header)
    pub rays_per_point: u32,
    pub az_counts_per_rotation: i64,
    pub el_counts_per_rotation: i64,
}

impl Default for ScanMotion {
    fn default() -> Self {
        ScanMotion {
            azimuth_speed: DEFAULT_AZIMUTH_SPEED,
            elevation_speed: DEFAULT_ELEVATION_SPEED,
            wait_ms: 0,
            acceleration: DEFAULT_ACCELERATION,
            repeat_count: DEFAULT_REPEAT,
            rays_per_point: DEFAULT_RAYS_PER_POINT,
            az_counts_per_rotation: AZ_COUNTS_PER_ROTATION,
            el_counts_per_rotation: EL_COUNTS_PER_ROTATION,
        }
    }
}

/// Everything needed to encode one scan file
///
/// A PPI uses a fixed elevation set and an azimuth range; an RHI uses a
/// fixed azimuth and an elevation range. The encoder does not care which:
/// elevations are always the outer loop and azimuths the inner loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRequest {
    pub elevations: Vec<f64>,
    pub azimuths: Vec<f64>,
    #[serde(default)]
    pub motion: ScanMotion,
    /// Dynamic CSM mode: no header, consumed incrementally by the instrument
    #[serde(default)]
    pub dynamic_mode: bool,
}

impl ScanRequest {
    pub fn new(elevations: Vec<f64>, azimuths: Vec<f64>) -> Self {
        ScanRequest {
            elevations,
            azimuths,
            motion: ScanMotion::default(),
            dynamic_mode: false,
        }
    }

    /// PPI sweeping azimuth from `az_start` to `az_end` at each elevation
    pub fn ppi(elevations: Vec<f64>, az_start: f64, az_end: f64) -> Self {
        Self::new(elevations, vec![az_start, az_end])
    }

    /// RHI sweeping elevation from `el_start` to `el_end` at a fixed azimuth
    pub fn rhi(azimuth: f64, el_start: f64, el_end: f64) -> Self {
        Self::new(vec![el_start, el_end], vec![azimuth])
    }

    pub fn with_motion(mut self, motion: ScanMotion) -> Self {
        self.motion = motion;
        self
    }

    pub fn with_dynamic_mode(mut self, dynamic_mode: bool) -> Self {
        self.dynamic_mode = dynamic_mode;
        self
    }

    /// Total points: elevations x azimuths
    pub fn point_count(&self) -> usize {
        self.elevations.len() * self.azimuths.len()
    }

    fn validate(&self) -> Result<(), SteerError> {
        let invalid = |msg: String| Err(SteerError::InvalidScanRequest(msg));
        if self.elevations.is_empty() {
            return invalid("elevation list is empty".to_string());
        }
        if self.azimuths.is_empty() {
            return invalid("azimuth list is empty".to_string());
        }
        if self.point_count() > MAX_SCAN_POINTS {
            return invalid(format!(
                "{} points exceeds the limit of {}",
                self.point_count(),
                MAX_SCAN_POINTS
            ));
        }
        if let Some(bad) = self.elevations.iter().chain(&self.azimuths).find(|a| !a.is_finite()) {
            return invalid(format!("angle {} is not finite", bad));
        }
        let m = &self.motion;
        if m.az_counts_per_rotation <= 0 || m.el_counts_per_rotation <= 0 {
            return invalid(format!(
                "counts per rotation must be positive (azimuth {}, elevation {})",
                m.az_counts_per_rotation, m.el_counts_per_rotation
            ));
        }
        if !(m.azimuth_speed.is_finite() && m.azimuth_speed > 0.0)
            || !(m.elevation_speed.is_finite() && m.elevation_speed > 0.0)
        {
            return invalid(format!(
                "speeds must be positive (azimuth {}, elevation {})",
                m.azimuth_speed, m.elevation_speed
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Point lines
// =============================================================================

/// One motion command, already in tick units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanPoint {
    pub az_acceleration: i64,
    pub az_speed: i64,
    pub az_position: i64,
    pub el_acceleration: i64,
    pub el_speed: i64,
    pub el_position: i64,
}

impl ScanPoint {
    /// Parse a point line: `A.1=<a>,S.1=<s>,P.1=<p>*A.2=<a>,S.2=<s>,P.2=<p>`
    pub fn parse(line: &str) -> Option<ScanPoint> {
        let line = line.trim_end_matches(LINE_END);
        let (az, el) = line.split_once('*')?;
        let (az_acceleration, az_speed, az_position) = parse_axis(az, '1')?;
        let (el_acceleration, el_speed, el_position) = parse_axis(el, '2')?;
        Some(ScanPoint {
            az_acceleration,
            az_speed,
            az_position,
            el_acceleration,
            el_speed,
            el_position,
        })
    }
}

fn parse_axis(part: &str, axis: char) -> Option<(i64, i64, i64)> {
    let mut values = [0i64; 3];
    let mut fields = part.split(',');
    for (slot, key) in values.iter_mut().zip(['A', 'S', 'P']) {
        let field = fields.next()?;
        let value = field.strip_prefix(&format!("{}.{}=", key, axis))?;
        *slot = value.parse().ok()?;
    }
    if fields.next().is_some() {
        return None;
    }
    Some((values[0], values[1], values[2]))
}

impl fmt::Display for ScanPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "A.1={},S.1={},P.1={}*A.2={},S.2={},P.2={}",
            self.az_acceleration,
            self.az_speed,
            self.az_position,
            self.el_acceleration,
            self.el_speed,
            self.el_position
        )
    }
}

/// Format the dwell line that follows every point
pub fn format_wait(wait_ms: u32) -> String {
    format!("W{}", wait_ms)
}

// =============================================================================
// Encoded file
// =============================================================================

/// Static-mode header values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsmHeader {
    pub repeat_count: u32,
    pub point_count: usize,
    pub rays_per_point: u32,
}

/// Encoded scan file: ordered command lines without terminators
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedScanFile {
    lines: Vec<String>,
    header: Option<CsmHeader>,
}

impl EncodedScanFile {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Header, present only in static mode
    pub fn header(&self) -> Option<CsmHeader> {
        self.header
    }

    pub fn is_dynamic(&self) -> bool {
        self.header.is_none()
    }

    /// Parsed point lines in file order
    pub fn points(&self) -> Vec<ScanPoint> {
        self.lines.iter().filter_map(|l| ScanPoint::parse(l)).collect()
    }

    /// Wire bytes, each line terminated by CRLF
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    /// Parse an existing CSM file, e.g. one written earlier by [`encode`].
    ///
    /// Accepts CRLF or LF terminators. A file whose first line is a point
    /// is taken as dynamic; otherwise three header lines must precede the
    /// body and the declared point count must match.
    pub fn parse(text: &str) -> Result<Self, SteerError> {
        let invalid = |msg: String| SteerError::InvalidScanRequest(msg);
        let lines: Vec<String> = text
            .lines()
            .map(|l| l.trim_end_matches('\r').to_string())
            .filter(|l| !l.is_empty())
            .collect();
        if lines.is_empty() {
            return Err(invalid("scan file is empty".to_string()));
        }

        let header = if ScanPoint::parse(&lines[0]).is_some() {
            None
        } else {
            Some(CsmHeader {
                repeat_count: header_field(&lines, 0, "repeat count")?,
                point_count: header_field(&lines, 1, "point count")?,
                rays_per_point: header_field(&lines, 2, "rays per point")?,
            })
        };

        let body_start = if header.is_some() { 3 } else { 0 };
        let mut points = 0usize;
        for (i, line) in lines.iter().enumerate().skip(body_start) {
            if ScanPoint::parse(line).is_some() {
                points += 1;
            } else if !line.strip_prefix('W').is_some_and(|ms| ms.parse::<u32>().is_ok()) {
                return Err(invalid(format!("line {} is neither a point nor a wait: {}", i + 1, line)));
            }
        }
        if points == 0 {
            return Err(invalid("scan file has no points".to_string()));
        }
        if let Some(h) = header {
            if h.point_count != points {
                return Err(invalid(format!(
                    "header declares {} points, file has {}",
                    h.point_count, points
                )));
            }
        }

        Ok(EncodedScanFile { lines, header })
    }
}

/// Header line `i` parsed as its own type; out-of-range values are rejected
fn header_field<T: FromStr>(lines: &[String], i: usize, name: &str) -> Result<T, SteerError> {
    lines
        .get(i)
        .and_then(|l| l.trim().parse().ok())
        .ok_or_else(|| {
            SteerError::InvalidScanRequest(format!(
                "header line {} ({}) is not a valid number",
                i + 1,
                name
            ))
        })
}

impl fmt::Display for EncodedScanFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            f.write_str(line)?;
            f.write_str(LINE_END)?;
        }
        Ok(())
    }
}

/// Encode a scan request into a CSM file.
///
/// Azimuth traversal alternates direction after each elevation
/// (serpentine), so consecutive elevations start where the previous one
/// ended.
///
/// # Example
/// ```
/// use halo_steer_core::protocol::halo::csm::{encode, ScanRequest};
/// let mut request = ScanRequest::new(vec![0.0, 90.0], vec![90.0]);
/// request.motion.elevation_speed = 2.0;
/// let file = encode(&request).unwrap();
/// assert!(file.to_string().starts_with("7\r\n2\r\n20\r\n"));
/// ```
pub fn encode(request: &ScanRequest) -> Result<EncodedScanFile, SteerError> {
    request.validate()?;
    let m = &request.motion;

    let az_speed = degrees_to_ticks(m.azimuth_speed, m.az_counts_per_rotation);
    let el_speed = degrees_to_ticks(m.elevation_speed, m.el_counts_per_rotation);

    let point_count = request.point_count();
    let mut lines = Vec::with_capacity(3 + 2 * point_count);

    let header = if request.dynamic_mode {
        None
    } else {
        let header = CsmHeader {
            repeat_count: m.repeat_count,
            point_count,
            rays_per_point: m.rays_per_point,
        };
        lines.push(header.repeat_count.to_string());
        lines.push(header.point_count.to_string());
        lines.push(header.rays_per_point.to_string());
        Some(header)
    };

    let wait = format_wait(m.wait_ms);
    let mut forward = true;
    for &el in &request.elevations {
        let el_position = position_ticks(el, m.el_counts_per_rotation);
        let sweep: Box<dyn Iterator<Item = &f64>> = if forward {
            Box::new(request.azimuths.iter())
        } else {
            Box::new(request.azimuths.iter().rev())
        };
        for &az in sweep {
            let point = ScanPoint {
                az_acceleration: m.acceleration,
                az_speed,
                az_position: position_ticks(az, m.az_counts_per_rotation),
                el_acceleration: m.acceleration,
                el_speed,
                el_position,
            };
            lines.push(point.to_string());
            lines.push(wait.clone());
        }
        forward = !forward;
    }

    log::debug!(
        "Encoded {} CSM with {} points ({} lines)",
        if request.dynamic_mode { "dynamic" } else { "static" },
        point_count,
        lines.len()
    );

    Ok(EncodedScanFile { lines, header })
}
