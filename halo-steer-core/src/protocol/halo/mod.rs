//! Halo Photonics Stream Line Doppler lidar
//!
//! The scanner accepts motion programs as CSM text files uploaded over SFTP.
//! Static CSM files are staged in the scan parameters directory; dynamic CSM
//! files are dropped into the DynScan directory and consumed incrementally.

pub mod csm;

pub use csm::{encode, EncodedScanFile, ScanMotion, ScanPoint, ScanRequest};

/// Remote directory for static scan files
pub const STATIC_SCAN_DIR: &str = "/C:/Lidar/System/Scan parameters/";

/// Remote directory for dynamic scan files
pub const DYNAMIC_SCAN_DIR: &str = "/C:/Users/End User/DynScan/";

/// Remote root of processed data files
pub const DATA_ROOT: &str = "/C:/Lidar/Data/Proc";

/// Default remote scan file name
pub const DEFAULT_FILE_NAME: &str = "user.txt";
