// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Run state bookkeeping.
//!
//! Remember when identities were last synchronized, and which key each one
//! was synchronized with. The run state is created on the first sync, and
//! updated at the end of every sync after that.

use crate::store::write_atomic;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::read_to_string,
    io::ErrorKind,
    path::{Path, PathBuf},
};

/// Current layout version of the run state file.
pub const STATE_VERSION: &str = "1.0";

/// Persisted record of past syncs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunState {
    pub version: String,

    /// Time of last completed sync.
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,

    #[serde(default)]
    pub identities: BTreeMap<String, IdentityState>,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION.into(),
            last_sync: None,
            identities: BTreeMap::new(),
        }
    }
}

/// Per-identity slice of run state.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityState {
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ssh_key_fingerprint: String,
}

impl RunState {
    /// Load run state, or start fresh if none was saved yet.
    ///
    /// # Errors
    ///
    /// - Return [`StateError::Read`] if state file exists but cannot be read.
    /// - Return [`StateError::Parse`] if state file is malformed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = match read_to_string(path) {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(StateError::Read {
                    source,
                    path: path.to_path_buf(),
                })
            }
        };

        serde_json::from_str(&data).map_err(|source| StateError::Parse {
            source,
            path: path.to_path_buf(),
        })
    }

    /// Save run state in indented form.
    ///
    /// # Errors
    ///
    /// - Return [`StateError::Write`] if state file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut data = serde_json::to_string_pretty(self).map_err(StateError::Serialize)?;
        data.push('\n');
        write_atomic(path, data).map_err(|source| StateError::Write {
            source,
            path: path.to_path_buf(),
        })
    }

    /// Record successful sync of an identity.
    pub fn record(&mut self, name: impl Into<String>, fingerprint: Option<String>, now: DateTime<Utc>) {
        let entry = self.identities.entry(name.into()).or_default();
        entry.last_sync = Some(now);
        entry.ssh_key_fingerprint = fingerprint.unwrap_or_default();
    }

    /// Drop everything known about an identity.
    pub fn forget(&mut self, name: &str) -> bool {
        self.identities.remove(name).is_some()
    }

    pub fn last_sync_of(&self, name: &str) -> Option<DateTime<Utc>> {
        self.identities.get(name).and_then(|entry| entry.last_sync)
    }
}

/// Run state error types.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("failed to read run state at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    #[error("failed to parse run state at {:?}", path.display())]
    Parse {
        #[source]
        source: serde_json::Error,
        path: PathBuf,
    },

    #[error("failed to serialize run state")]
    Serialize(#[source] serde_json::Error),

    #[error("failed to write run state at {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
type Result<T, E = StateError> = std::result::Result<T, E>;
