//! SSH/SFTP implementation of the remote session traits.
//!
//! `SshConnector` opens a blocking TCP connection to the instrument,
//! authenticates with username and password, and starts an SFTP subsystem.
//! All calls block; the binary runs them on tokio's blocking pool.
//!
//! # Usage
//!
//! ```rust,ignore
//! use halo_steer::ssh_io::SshConnector;
//! use halo_steer_core::transport::{Connector, RemoteSession};
//!
//! let connector = SshConnector::new(Duration::from_secs(10));
//! let mut session = connector.connect(&credentials)?;
//! session.put("/C:/Lidar/System/Scan parameters/user.txt", &bytes)?;
//! session.close();
//! ```

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use halo_steer_core::transport::{Connector, Credentials, RemoteSession};
use halo_steer_core::TransportError;
use ssh2::{HashType, Session, Sftp};

/// Opens password-authenticated SFTP sessions
#[derive(Debug, Clone)]
pub struct SshConnector {
    connect_timeout: Duration,
}

impl SshConnector {
    /// `connect_timeout` bounds the TCP connect and each blocking SSH call
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    fn open_tcp(&self, credentials: &Credentials) -> Result<TcpStream, TransportError> {
        let connect_err = |reason: String| TransportError::Connect {
            host: credentials.address(),
            reason,
        };

        let addrs: Vec<SocketAddr> = credentials
            .address()
            .to_socket_addrs()
            .map_err(|e| connect_err(format!("Cannot resolve: {}", e)))?
            .collect();

        let mut last_error = "no addresses".to_string();
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => {
                    log::debug!("TCP connected to {}", addr);
                    return Ok(stream);
                }
                Err(e) => {
                    log::debug!("TCP connect to {} failed: {}", addr, e);
                    last_error = e.to_string();
                }
            }
        }
        Err(connect_err(last_error))
    }
}

impl Default for SshConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl Connector for SshConnector {
    type Session = SshSession;

    fn connect(&self, credentials: &Credentials) -> Result<SshSession, TransportError> {
        let connect_err = |reason: String| TransportError::Connect {
            host: credentials.address(),
            reason,
        };

        let tcp = self.open_tcp(credentials)?;
        let mut session = Session::new().map_err(|e| connect_err(e.to_string()))?;
        session.set_tcp_stream(tcp);
        session.set_timeout(self.connect_timeout.as_millis().min(u32::MAX as u128) as u32);
        session
            .handshake()
            .map_err(|e| connect_err(format!("SSH handshake failed: {}", e)))?;

        // The instrument's host key is not pinned; record it for the log
        if let Some(hash) = session.host_key_hash(HashType::Sha256) {
            let fingerprint: String = hash.iter().map(|b| format!("{:02x}", b)).collect();
            log::debug!("{} host key SHA256 {}", credentials.host, fingerprint);
        }

        session
            .userauth_password(&credentials.username, &credentials.password)
            .map_err(|e| TransportError::Auth {
                username: credentials.username.clone(),
                reason: e.to_string(),
            })?;
        if !session.authenticated() {
            return Err(TransportError::Auth {
                username: credentials.username.clone(),
                reason: "not authenticated".to_string(),
            });
        }

        let sftp = session
            .sftp()
            .map_err(|e| connect_err(format!("SFTP subsystem unavailable: {}", e)))?;
        log::info!("Connected to lidar at {}", credentials.host);

        Ok(SshSession {
            session,
            sftp: Some(sftp),
        })
    }
}

/// Live SFTP session. Closed explicitly with [`RemoteSession::close`] or
/// when dropped.
pub struct SshSession {
    session: Session,
    sftp: Option<Sftp>,
}

impl SshSession {
    fn sftp(&self) -> Result<&Sftp, TransportError> {
        self.sftp.as_ref().ok_or(TransportError::SessionClosed)
    }
}

/// Write `contents` and close the handle; some write failures only surface
/// on close
fn write_and_close<W, E>(
    mut file: W,
    contents: &[u8],
    close: impl FnOnce(&mut W) -> Result<(), E>,
) -> Result<(), String>
where
    W: Write,
    E: std::fmt::Display,
{
    file.write_all(contents).map_err(|e| e.to_string())?;
    file.flush().map_err(|e| e.to_string())?;
    close(&mut file).map_err(|e| format!("close failed: {}", e))
}

impl RemoteSession for SshSession {
    fn put(&mut self, remote_path: &str, contents: &[u8]) -> Result<(), TransportError> {
        let upload_err = |reason: String| TransportError::Upload {
            path: remote_path.to_string(),
            reason,
        };
        let file = self
            .sftp()?
            .create(Path::new(remote_path))
            .map_err(|e| upload_err(e.to_string()))?;
        write_and_close(file, contents, |f| f.close()).map_err(upload_err)?;
        log::debug!("Wrote {} bytes to {}", contents.len(), remote_path);
        Ok(())
    }

    fn get(&mut self, remote_path: &str) -> Result<Vec<u8>, TransportError> {
        let download_err = |reason: String| TransportError::Download {
            path: remote_path.to_string(),
            reason,
        };
        let mut file = self
            .sftp()?
            .open(Path::new(remote_path))
            .map_err(|e| download_err(e.to_string()))?;
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)
            .map_err(|e| download_err(e.to_string()))?;
        log::debug!("Read {} bytes from {}", contents.len(), remote_path);
        Ok(contents)
    }

    fn list_dir(&mut self, remote_dir: &str) -> Result<Vec<String>, TransportError> {
        let entries = self
            .sftp()?
            .readdir(Path::new(remote_dir))
            .map_err(|e| TransportError::List {
                path: remote_dir.to_string(),
                reason: e.to_string(),
            })?;
        Ok(entries
            .into_iter()
            .filter_map(|(path, _stat)| {
                path.file_name()
                    .map(|name| name.to_string_lossy().into_owned())
            })
            .collect())
    }

    fn close(&mut self) {
        if self.sftp.take().is_some() {
            if let Err(e) = self.session.disconnect(None, "closing", None) {
                log::debug!("SSH disconnect failed: {}", e);
            }
        }
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        self.close();
    }
}
