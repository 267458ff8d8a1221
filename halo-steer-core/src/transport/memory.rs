//! In-memory remote session
//!
//! Stands in for the instrument in tests and dry runs. All sessions opened
//! by one [`MemoryConnector`] share a file store and a set of counters, so
//! callers can inspect what was uploaded after the session is gone.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{join_remote, Connector, Credentials, RemoteSession};
use crate::error::TransportError;

/// Operation counters for a [`MemoryConnector`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub connects: usize,
    pub uploads: usize,
    pub downloads: usize,
    pub closes: usize,
}

#[derive(Debug, Default)]
struct Store {
    files: BTreeMap<String, Vec<u8>>,
    stats: MemoryStats,
    fail_uploads: bool,
}

/// Connector that opens [`MemorySession`]s over a shared store
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    store: Arc<Mutex<Store>>,
    password: Option<String>,
}

fn lock(store: &Mutex<Store>) -> MutexGuard<'_, Store> {
    store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryConnector {
    /// Accept any credentials
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject logins whose password differs from `password`
    pub fn with_password(password: &str) -> Self {
        MemoryConnector {
            store: Arc::default(),
            password: Some(password.to_string()),
        }
    }

    /// Make every subsequent upload fail
    pub fn fail_uploads(&self, fail: bool) {
        lock(&self.store).fail_uploads = fail;
    }

    /// Pre-load a remote file, e.g. to serve downloads
    pub fn insert_file(&self, remote_path: &str, contents: &[u8]) {
        lock(&self.store)
            .files
            .insert(remote_path.to_string(), contents.to_vec());
    }

    pub fn file(&self, remote_path: &str) -> Option<Vec<u8>> {
        lock(&self.store).files.get(remote_path).cloned()
    }

    /// All stored files by remote path
    pub fn files(&self) -> BTreeMap<String, Vec<u8>> {
        lock(&self.store).files.clone()
    }

    pub fn stats(&self) -> MemoryStats {
        lock(&self.store).stats
    }
}

impl Connector for MemoryConnector {
    type Session = MemorySession;

    fn connect(&self, credentials: &Credentials) -> Result<MemorySession, TransportError> {
        if let Some(expected) = &self.password {
            if *expected != credentials.password {
                return Err(TransportError::Auth {
                    username: credentials.username.clone(),
                    reason: "password rejected".to_string(),
                });
            }
        }
        lock(&self.store).stats.connects += 1;
        Ok(MemorySession {
            store: Arc::clone(&self.store),
            open: true,
        })
    }
}

/// Session over a [`MemoryConnector`]'s store
#[derive(Debug)]
pub struct MemorySession {
    store: Arc<Mutex<Store>>,
    open: bool,
}

impl MemorySession {
    fn store(&self) -> Result<MutexGuard<'_, Store>, TransportError> {
        if !self.open {
            return Err(TransportError::SessionClosed);
        }
        Ok(lock(&self.store))
    }

    pub fn is_open(&self) -> bool {
        self.open
    }
}

impl RemoteSession for MemorySession {
    fn put(&mut self, remote_path: &str, contents: &[u8]) -> Result<(), TransportError> {
        let mut store = self.store()?;
        if store.fail_uploads {
            return Err(TransportError::Upload {
                path: remote_path.to_string(),
                reason: "simulated failure".to_string(),
            });
        }
        store.files.insert(remote_path.to_string(), contents.to_vec());
        store.stats.uploads += 1;
        Ok(())
    }

    fn get(&mut self, remote_path: &str) -> Result<Vec<u8>, TransportError> {
        let mut store = self.store()?;
        let contents = store
            .files
            .get(remote_path)
            .cloned()
            .ok_or_else(|| TransportError::Download {
                path: remote_path.to_string(),
                reason: "no such file".to_string(),
            })?;
        store.stats.downloads += 1;
        Ok(contents)
    }

    fn list_dir(&mut self, remote_dir: &str) -> Result<Vec<String>, TransportError> {
        let store = self.store()?;
        let prefix = join_remote(remote_dir, "");
        let names: Vec<String> = store
            .files
            .keys()
            .filter_map(|path| path.strip_prefix(&prefix))
            .filter(|rest| !rest.is_empty() && !rest.contains('/'))
            .map(str::to_string)
            .collect();
        if names.is_empty() {
            return Err(TransportError::List {
                path: remote_dir.to_string(),
                reason: "no such directory".to_string(),
            });
        }
        Ok(names)
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            lock(&self.store).stats.closes += 1;
        }
    }
}
