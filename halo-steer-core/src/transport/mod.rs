//! Remote delivery of scan files
//!
//! The core never opens sockets itself. Network access goes through the
//! [`Connector`] and [`RemoteSession`] traits, implemented natively over
//! SSH/SFTP by the `halo-steer` crate and in memory by [`memory`].
//!
//! # Session ownership
//!
//! A caller either lends an open session ([`SessionSource::Existing`]),
//! which is used as-is and left open, or supplies credentials
//! ([`SessionSource::Connect`]), in which case a fresh session is opened
//! for exactly one operation and closed before returning, success or
//! failure.
//!
//! ```rust,ignore
//! let delivery = RemoteDelivery::new(connector, RemotePaths::default());
//!
//! // One-shot: connect, upload, close
//! delivery.deliver(&file, DestinationMode::Static, "user.txt", SessionSource::Connect(&creds))?;
//!
//! // Batch: caller keeps the session open across deliveries
//! let mut session = delivery.connector().connect(&creds)?;
//! delivery.deliver(&a, DestinationMode::Static, "a.txt", SessionSource::Existing(&mut session))?;
//! delivery.deliver(&b, DestinationMode::Static, "b.txt", SessionSource::Existing(&mut session))?;
//! session.close();
//! ```

pub mod memory;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TransportError;
use crate::protocol::halo::{EncodedScanFile, DYNAMIC_SCAN_DIR, STATIC_SCAN_DIR};

/// An authenticated file-transfer session with the instrument
///
/// Sessions are not safe for concurrent deliveries; callers sharing one
/// across trigger evaluations must serialize access.
pub trait RemoteSession {
    /// Write `contents` to `remote_path`, replacing any existing file
    fn put(&mut self, remote_path: &str, contents: &[u8]) -> Result<(), TransportError>;

    /// Read the whole of `remote_path`
    fn get(&mut self, remote_path: &str) -> Result<Vec<u8>, TransportError>;

    /// Names of the entries in `remote_dir`
    fn list_dir(&mut self, remote_dir: &str) -> Result<Vec<String>, TransportError>;

    /// Tear the session down. Further calls fail with `SessionClosed`.
    fn close(&mut self);
}

/// Opens new authenticated sessions
pub trait Connector {
    type Session: RemoteSession;

    fn connect(&self, credentials: &Credentials) -> Result<Self::Session, TransportError>;
}

/// Login details for the instrument
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: String,
}

fn default_port() -> u16 {
    22
}

impl Credentials {
    pub fn new(host: &str, username: &str, password: &str) -> Self {
        Credentials {
            host: host.to_string(),
            port: default_port(),
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    /// `host:port` for connecting
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Which directory family a scan file goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestinationMode {
    /// Complete pre-staged scan file
    #[default]
    Static,
    /// Incrementally consumed dynamic CSM
    Dynamic,
}

impl DestinationMode {
    pub fn from_dynamic(dynamic: bool) -> Self {
        if dynamic {
            DestinationMode::Dynamic
        } else {
            DestinationMode::Static
        }
    }
}

/// Remote directories for each destination mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemotePaths {
    pub static_dir: String,
    pub dynamic_dir: String,
}

impl Default for RemotePaths {
    fn default() -> Self {
        RemotePaths {
            static_dir: STATIC_SCAN_DIR.to_string(),
            dynamic_dir: DYNAMIC_SCAN_DIR.to_string(),
        }
    }
}

/// Join a remote directory and a file name with exactly one `/`
pub fn join_remote(dir: &str, name: &str) -> String {
    format!("{}/{}", dir.trim_end_matches('/'), name.trim_start_matches('/'))
}

impl RemotePaths {
    /// Full remote path for `file_name` in the directory for `mode`
    pub fn path_for(&self, mode: DestinationMode, file_name: &str) -> String {
        let dir = match mode {
            DestinationMode::Static => &self.static_dir,
            DestinationMode::Dynamic => &self.dynamic_dir,
        };
        join_remote(dir, file_name)
    }
}

/// Where the session for one operation comes from
pub enum SessionSource<'a, S> {
    /// Caller-owned session; used as-is and not closed
    Existing(&'a mut S),
    /// Open a new session, use it once, close it
    Connect(&'a Credentials),
}

/// Run `op` on a session from `source`, honouring the ownership rules.
///
/// An owned session is closed whether `op` succeeds or fails.
pub fn with_session<C, T, F>(
    connector: &C,
    source: SessionSource<'_, C::Session>,
    op: F,
) -> Result<T, TransportError>
where
    C: Connector,
    F: FnOnce(&mut C::Session) -> Result<T, TransportError>,
{
    match source {
        SessionSource::Existing(session) => op(session),
        SessionSource::Connect(credentials) => {
            let mut session = connector.connect(credentials)?;
            log::debug!("Connected to {} as {}", credentials.host, credentials.username);
            let result = op(&mut session);
            session.close();
            log::debug!("Closed session to {}", credentials.host);
            result
        }
    }
}

/// Delivers encoded scan files to the instrument
#[derive(Debug, Clone)]
pub struct RemoteDelivery<C> {
    connector: C,
    paths: RemotePaths,
}

impl<C: Connector> RemoteDelivery<C> {
    pub fn new(connector: C, paths: RemotePaths) -> Self {
        Self { connector, paths }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn paths(&self) -> &RemotePaths {
        &self.paths
    }

    /// Upload `file` as `file_name` into the directory for `mode`.
    ///
    /// Whole-file overwrite, no retry. A failed upload leaves the remote
    /// file in an undefined state and is reported as an error.
    pub fn deliver(
        &self,
        file: &EncodedScanFile,
        mode: DestinationMode,
        file_name: &str,
        source: SessionSource<'_, C::Session>,
    ) -> Result<(), TransportError> {
        if file.is_dynamic() != (mode == DestinationMode::Dynamic) {
            log::warn!(
                "Delivering a {} scan file to the {:?} directory",
                if file.is_dynamic() { "dynamic" } else { "static" },
                mode
            );
        }
        let remote_path = self.paths.path_for(mode, file_name);
        let contents = file.to_bytes();
        with_session(&self.connector, source, |session| {
            log::info!("Writing {} ({} bytes) on lidar", remote_path, contents.len());
            session.put(&remote_path, &contents)
        })
    }
}
