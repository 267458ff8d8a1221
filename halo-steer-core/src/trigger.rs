//! Trigger Pipeline
//!
//! Region resolution -> geometry -> gate -> encode -> deliver, strictly in
//! that order. The gate runs before any encoding or network I/O; when it
//! declines, the caller still gets the computed geometry in a
//! [`TriggerResult`] with `triggered == false`.
//!
//! # Example
//!
//! ```rust,ignore
//! use halo_steer_core::trigger::{trigger_rhi, TriggerConfig};
//! use halo_steer_core::transport::{Credentials, RemoteDelivery, RemotePaths, SessionSource};
//!
//! let delivery = RemoteDelivery::new(connector, RemotePaths::default());
//! let creds = Credentials::new("192.168.1.20", "halo", "password");
//! let fired = trigger_rhi(
//!     &mask, &axes, lidar, &[0.0, 45.0],
//!     &TriggerConfig::default(), &delivery, SessionSource::Connect(&creds),
//! )?;
//! ```

use serde::{Deserialize, Serialize};

use crate::error::SteerError;
use crate::gate::{TriggerGate, DEFAULT_MAX_DISTANCE_M};
use crate::geometry::{bearing_and_distance, GridAxes, InstrumentLocation};
use crate::mask::{Connectivity, DetectionMask};
use crate::protocol::halo::{csm, EncodedScanFile, ScanMotion, ScanRequest, DEFAULT_FILE_NAME};
use crate::region::{self, DEFAULT_AREA_THRESHOLD};
use crate::transport::{Connector, DestinationMode, RemoteDelivery, SessionSource};

pub const DEFAULT_AZ_WIDTH: f64 = 30.0;
pub const DEFAULT_AZ_RES: f64 = 2.0;

/// Outcome of evaluating one detection against the instrument
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TriggerResult {
    /// Compass bearing from the instrument to the region centroid, [0, 360)
    pub azimuth_degrees: f64,
    pub region_latitude: f64,
    pub region_longitude: f64,
    /// Distance to the nearest surviving pixel, meters
    pub distance_m: f64,
    /// Whether the distance gate allowed a scan
    pub triggered: bool,
}

/// Policy and scan settings for a trigger evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Minimum region area in pixels
    pub area_threshold: usize,
    pub connectivity: Connectivity,
    /// Maximum distance that still triggers, meters (inclusive)
    pub max_distance_m: f64,
    /// PPI sector width centred on the region bearing, degrees
    pub az_width: f64,
    /// PPI azimuth step, degrees
    pub az_res: f64,
    pub motion: ScanMotion,
    /// Remote file name for the scan
    pub file_name: String,
    /// Use dynamic CSM mode and directory
    pub dynamic: bool,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        TriggerConfig {
            area_threshold: DEFAULT_AREA_THRESHOLD,
            connectivity: Connectivity::default(),
            max_distance_m: DEFAULT_MAX_DISTANCE_M,
            az_width: DEFAULT_AZ_WIDTH,
            az_res: DEFAULT_AZ_RES,
            motion: ScanMotion::default(),
            file_name: DEFAULT_FILE_NAME.to_string(),
            dynamic: false,
        }
    }
}

impl TriggerConfig {
    pub fn destination(&self) -> DestinationMode {
        DestinationMode::from_dynamic(self.dynamic)
    }
}

/// Resolve the dominant region and apply the distance gate.
///
/// Uses 4-connectivity; see [`resolve_trigger_with`] to choose.
pub fn resolve_trigger(
    mask: &DetectionMask,
    axes: &GridAxes,
    instrument: InstrumentLocation,
    area_threshold: usize,
    max_distance_m: f64,
) -> Result<TriggerResult, SteerError> {
    resolve_trigger_with(
        mask,
        axes,
        instrument,
        area_threshold,
        Connectivity::Four,
        max_distance_m,
    )
}

pub fn resolve_trigger_with(
    mask: &DetectionMask,
    axes: &GridAxes,
    instrument: InstrumentLocation,
    area_threshold: usize,
    connectivity: Connectivity,
    max_distance_m: f64,
) -> Result<TriggerResult, SteerError> {
    axes.check(mask)?;
    let resolved = region::resolve(mask, area_threshold, connectivity)?;
    let bearing = bearing_and_distance(instrument, axes, &resolved.filtered, &resolved.dominant)?;
    let triggered = TriggerGate::new(max_distance_m).decide(bearing.distance_m);
    Ok(TriggerResult {
        azimuth_degrees: bearing.azimuth_degrees,
        region_latitude: bearing.region_latitude,
        region_longitude: bearing.region_longitude,
        distance_m: bearing.distance_m,
        triggered,
    })
}

/// Encode a scan request into a CSM file
pub fn build_scan_file(request: &ScanRequest) -> Result<EncodedScanFile, SteerError> {
    csm::encode(request)
}

/// Deliver an encoded scan file
pub fn send_scan<C: Connector>(
    delivery: &RemoteDelivery<C>,
    file: &EncodedScanFile,
    mode: DestinationMode,
    file_name: &str,
    source: SessionSource<'_, C::Session>,
) -> Result<(), SteerError> {
    delivery.deliver(file, mode, file_name, source)?;
    Ok(())
}

/// Azimuths of a PPI sector: `center - width/2` stepping by `res`, stopping
/// before `center + width/2`
pub fn ppi_azimuths(center: f64, width: f64, res: f64) -> Result<Vec<f64>, SteerError> {
    if !(res.is_finite() && res > 0.0) || !width.is_finite() {
        return Err(SteerError::InvalidScanRequest(format!(
            "azimuth width {} / resolution {} invalid",
            width, res
        )));
    }
    let steps = (width / res).ceil();
    if steps > csm::MAX_SCAN_POINTS as f64 {
        return Err(SteerError::InvalidScanRequest(format!(
            "azimuth width {} at resolution {} exceeds {} points",
            width, res, csm::MAX_SCAN_POINTS
        )));
    }
    let start = center - width / 2.0;
    let end = center + width / 2.0;
    let mut azimuths = Vec::with_capacity(steps.max(0.0) as usize);
    let mut k = 0usize;
    loop {
        let az = start + k as f64 * res;
        if az >= end {
            break;
        }
        azimuths.push(az);
        k += 1;
    }
    Ok(azimuths)
}

/// Shape of the scan aimed at the region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum ScanPlan {
    /// Sector of azimuths around the bearing at each elevation
    Ppi { elevations: Vec<f64> },
    /// Elevation sweep at the bearing
    Rhi { elevations: Vec<f64> },
}

impl ScanPlan {
    /// Scan request aimed at `azimuth`
    pub fn request(&self, azimuth: f64, config: &TriggerConfig) -> Result<ScanRequest, SteerError> {
        let (elevations, azimuths) = match self {
            ScanPlan::Ppi { elevations } => (
                elevations.clone(),
                ppi_azimuths(azimuth, config.az_width, config.az_res)?,
            ),
            ScanPlan::Rhi { elevations } => (elevations.clone(), vec![azimuth]),
        };
        Ok(ScanRequest::new(elevations, azimuths)
            .with_motion(config.motion)
            .with_dynamic_mode(config.dynamic))
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScanPlan::Ppi { .. } => "PPI",
            ScanPlan::Rhi { .. } => "RHI",
        }
    }
}

/// Result of [`run_trigger`]: geometry plus the file that was delivered
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerOutcome {
    pub result: TriggerResult,
    /// Delivered scan file; `None` when the gate declined
    pub scan: Option<EncodedScanFile>,
}

/// Full pipeline: resolve, gate, encode, deliver.
///
/// Structural errors abort before any network call. When the gate
/// declines, no session is opened and nothing is uploaded.
pub fn run_trigger<C: Connector>(
    mask: &DetectionMask,
    axes: &GridAxes,
    instrument: InstrumentLocation,
    plan: &ScanPlan,
    config: &TriggerConfig,
    delivery: &RemoteDelivery<C>,
    source: SessionSource<'_, C::Session>,
) -> Result<TriggerOutcome, SteerError> {
    let result = resolve_trigger_with(
        mask,
        axes,
        instrument,
        config.area_threshold,
        config.connectivity,
        config.max_distance_m,
    )?;

    if !result.triggered {
        log::info!(
            "Not triggering {}: region at {:.1} deg is {:.0} m away (max {:.0} m)",
            plan.name(),
            result.azimuth_degrees,
            result.distance_m,
            config.max_distance_m
        );
        return Ok(TriggerOutcome { result, scan: None });
    }

    let request = plan.request(result.azimuth_degrees, config)?;
    let scan = build_scan_file(&request)?;
    log::info!(
        "Triggering {} toward {:.1} deg ({:.0} m away), {} points",
        plan.name(),
        result.azimuth_degrees,
        result.distance_m,
        request.point_count()
    );
    send_scan(delivery, &scan, config.destination(), &config.file_name, source)?;

    Ok(TriggerOutcome {
        result,
        scan: Some(scan),
    })
}

/// PPI aimed at the dominant region. Returns whether a scan was sent.
///
/// `config.max_distance_m` gates the trigger; `config.az_width` sets the
/// sector width.
pub fn trigger_ppi<C: Connector>(
    mask: &DetectionMask,
    axes: &GridAxes,
    instrument: InstrumentLocation,
    elevations: &[f64],
    config: &TriggerConfig,
    delivery: &RemoteDelivery<C>,
    source: SessionSource<'_, C::Session>,
) -> Result<bool, SteerError> {
    let plan = ScanPlan::Ppi {
        elevations: elevations.to_vec(),
    };
    let outcome = run_trigger(mask, axes, instrument, &plan, config, delivery, source)?;
    Ok(outcome.result.triggered)
}

/// RHI aimed at the dominant region. Returns whether a scan was sent.
pub fn trigger_rhi<C: Connector>(
    mask: &DetectionMask,
    axes: &GridAxes,
    instrument: InstrumentLocation,
    elevations: &[f64],
    config: &TriggerConfig,
    delivery: &RemoteDelivery<C>,
    source: SessionSource<'_, C::Session>,
) -> Result<bool, SteerError> {
    let plan = ScanPlan::Rhi {
        elevations: elevations.to_vec(),
    };
    let outcome = run_trigger(mask, axes, instrument, &plan, config, delivery, source)?;
    Ok(outcome.result.triggered)
}
