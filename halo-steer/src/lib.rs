//! Native side of the Halo lidar steering tool
//!
//! Provides the SSH/SFTP [`Connector`](halo_steer_core::transport::Connector)
//! for real instruments, configuration loading, detection input parsing and
//! processed-data retrieval. The steering logic itself lives in
//! `halo-steer-core`.

pub mod config;
pub mod fetch;
pub mod input;
pub mod ssh_io;

pub use config::Config;
pub use fetch::fetch_recent_files;
pub use input::Detection;
pub use ssh_io::{SshConnector, SshSession};
