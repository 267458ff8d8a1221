//! Error types for the steering pipeline
//!
//! Structural errors (no region, bad grid, bad scan request) abort the
//! pipeline before any network call is attempted. Transport errors are
//! always surfaced to the caller, never retried.
//!
//! A gate that declines to trigger is not an error; it is reported as
//! [`TriggerResult::triggered`](crate::trigger::TriggerResult) `== false`.

use thiserror::Error;

/// Errors raised by a [`RemoteSession`](crate::transport::RemoteSession)
/// or [`Connector`](crate::transport::Connector).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// TCP connect or protocol handshake failed
    #[error("Connect to {host} failed: {reason}")]
    Connect { host: String, reason: String },

    /// The remote side rejected our credentials
    #[error("Authentication as {username} failed: {reason}")]
    Auth { username: String, reason: String },

    /// Whole-file upload failed; remote state is undefined
    #[error("Upload to {path} failed: {reason}")]
    Upload { path: String, reason: String },

    /// Download of a remote file failed
    #[error("Download of {path} failed: {reason}")]
    Download { path: String, reason: String },

    /// Remote directory listing failed
    #[error("Listing {path} failed: {reason}")]
    List { path: String, reason: String },

    /// The session was used after it was closed
    #[error("Session already closed")]
    SessionClosed,
}

impl TransportError {
    /// True for authentication failures, as opposed to delivery faults
    pub fn is_auth(&self) -> bool {
        matches!(self, TransportError::Auth { .. })
    }
}

/// Errors from the trigger pipeline
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SteerError {
    /// Mask has no qualifying foreground after speckle filtering
    #[error("No region found above the area threshold")]
    NoRegionFound,

    /// Mask dimensions disagree with the grid axes
    #[error("Grid mismatch: mask is {mask_rows}x{mask_cols}, axes are {lat_len} latitudes x {lon_len} longitudes")]
    GridMismatch {
        mask_rows: usize,
        mask_cols: usize,
        lat_len: usize,
        lon_len: usize,
    },

    /// Empty angle list, non-finite angle, or non-positive rotation constant
    #[error("Invalid scan request: {0}")]
    InvalidScanRequest(String),

    /// Connection, authentication, or upload failure
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::Upload {
            path: "/C:/Lidar/System/Scan parameters/user.txt".to_string(),
            reason: "disk full".to_string(),
        };
        assert_eq!(
            format!("{}", err),
            "Upload to /C:/Lidar/System/Scan parameters/user.txt failed: disk full"
        );
    }

    #[test]
    fn test_is_auth() {
        let auth = TransportError::Auth {
            username: "halo".to_string(),
            reason: "bad password".to_string(),
        };
        assert!(auth.is_auth());
        assert!(!TransportError::SessionClosed.is_auth());
    }

    #[test]
    fn test_transport_error_converts() {
        let err: SteerError = TransportError::SessionClosed.into();
        assert_eq!(err, SteerError::Transport(TransportError::SessionClosed));
        assert_eq!(format!("{}", err), "Session already closed");
    }
}
