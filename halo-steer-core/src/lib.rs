//! Platform-independent lidar steering library
//!
//! Turns a segmentation mask of a detected atmospheric boundary into a
//! scan program for a Halo Photonics Doppler lidar, and decides whether
//! that program should be sent at all.
//!
//! # Modules
//!
//! - [`mask`]: detection mask and pixel connectivity
//! - [`region`]: connected regions, speckle filtering, dominant region
//! - [`geometry`]: grid projection, bearing, distance
//! - [`gate`]: maximum-distance trigger policy
//! - [`protocol`]: CSM scan file encoding
//! - [`transport`]: session traits and delivery
//! - [`trigger`]: the end-to-end pipeline
//!
//! No network I/O happens in this crate; the `halo-steer` crate provides
//! the SSH/SFTP [`transport::Connector`].

pub mod error;
pub mod gate;
pub mod geometry;
pub mod mask;
pub mod protocol;
pub mod region;
pub mod transport;
pub mod trigger;

pub use error::{SteerError, TransportError};
pub use geometry::{GridAxes, InstrumentLocation};
pub use mask::{Connectivity, DetectionMask};
pub use protocol::halo::{EncodedScanFile, ScanMotion, ScanRequest};
pub use trigger::{
    build_scan_file, resolve_trigger, run_trigger, send_scan, trigger_ppi, trigger_rhi,
    ScanPlan, TriggerConfig, TriggerOutcome, TriggerResult,
};
