//! Credential storage
//!
//! The server core only needs two operations from persistence: load every
//! known `(userID, password)` pair at startup, and append a pair after a
//! successful registration. `FileCredentialStore` keeps one record per line in
//! the `(<userID>, <password>)` format; `MemoryCredentialStore` keeps nothing
//! on disk and backs tests and `--ephemeral` runs.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{ChatError, Result};

/// A stored credential pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub user_id: String,
    pub password: String,
}

impl Credential {
    pub fn new(user_id: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            password: password.into(),
        }
    }
}

/// Persistence for registered accounts
pub trait CredentialStore: Send + Sync {
    /// Load every stored credential
    fn load_all(&self) -> Result<Vec<Credential>>;

    /// Persist a newly registered credential
    fn append(&self, user_id: &str, password: &str) -> Result<()>;
}

/// Credential file with one `(<userID>, <password>)` record per line
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    /// Serializes appends from concurrent registrations
    write_lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn store_error(&self, e: impl std::fmt::Display) -> ChatError {
        ChatError::CredentialStore {
            path: self.path.clone(),
            message: e.to_string(),
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn load_all(&self) -> Result<Vec<Credential>> {
        // A missing file just means nobody has registered yet
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path).map_err(|e| self.store_error(e))?;
        let mut credentials = Vec::new();
        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match parse_record(line) {
                Some(credential) => credentials.push(credential),
                None => {
                    tracing::warn!(
                        "Skipping malformed credential record at {}:{}",
                        self.path.display(),
                        index + 1
                    );
                }
            }
        }
        Ok(credentials)
    }

    fn append(&self, user_id: &str, password: &str) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.store_error(e))?;
        file.write_all(format_record(user_id, password).as_bytes())
            .map_err(|e| self.store_error(e))?;
        Ok(())
    }
}

/// In-memory store; registrations live only as long as the process
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    records: Mutex<Vec<Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing accounts
    pub fn with_credentials(credentials: impl IntoIterator<Item = Credential>) -> Self {
        Self {
            records: Mutex::new(credentials.into_iter().collect()),
        }
    }

    /// Snapshot of everything appended so far
    pub fn records(&self) -> Vec<Credential> {
        self.records.lock().clone()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load_all(&self) -> Result<Vec<Credential>> {
        Ok(self.records.lock().clone())
    }

    fn append(&self, user_id: &str, password: &str) -> Result<()> {
        self.records.lock().push(Credential::new(user_id, password));
        Ok(())
    }
}

/// Format a record as written to the credential file
pub fn format_record(user_id: &str, password: &str) -> String {
    format!("({}, {})\n", user_id, password)
}

/// Parse one `(<userID>, <password>)` line.
///
/// The user ID is everything between the opening `(` and the first `,`; the
/// password is the next whitespace-delimited token with its closing `)`
/// removed.
pub fn parse_record(line: &str) -> Option<Credential> {
    let line = line.trim_end_matches(['\r', '\n']);
    let rest = line.strip_prefix('(')?;
    let (user_id, tail) = rest.split_once(',')?;
    let token = tail.split_whitespace().next()?;
    let password = token.strip_suffix(')')?;

    if user_id.is_empty() || password.is_empty() {
        return None;
    }
    Some(Credential::new(user_id, password))
}
