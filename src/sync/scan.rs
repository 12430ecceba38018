// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Managed artifact discovery.
//!
//! Find SSH keys and git configs on disk that carry an ownership
//! [marker](crate::sync::marker), and compare the identities that own them
//! against the identity store to find __orphans__.
//!
//! Orphan detection is a plain set difference. Renaming an identity in the
//! identity store makes the old name an orphan, and the new name a fresh
//! identity with a fresh key.

use crate::{config::Identities, path::Layout, sync::marker::parse_marker};

use std::{
    collections::{BTreeMap, BTreeSet},
    fs::{read_dir, read_to_string},
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};

const GIT_CONFIG_PREFIX: &str = ".gitconfig-";

/// Find SSH keys carrying an ownership marker.
///
/// Maps identity name to path of private key, i.e., the public key path
/// without its ".pub" extension. Unreadable or foreign keys are skipped. A
/// missing SSH directory yields nothing.
///
/// # Errors
///
/// - Return [`ScanError::ReadDir`] if SSH directory exists but cannot be
///   listed.
#[instrument(level = "debug")]
pub fn find_managed_keys(ssh_dir: &Path) -> Result<BTreeMap<String, PathBuf>> {
    let mut keys = BTreeMap::new();
    for path in list_files(ssh_dir)? {
        let Some(base) = path.to_str().and_then(|path| path.strip_suffix(".pub")) else {
            continue;
        };

        let Ok(content) = read_to_string(&path) else {
            debug!("skip unreadable key {:?}", path.display());
            continue;
        };

        if let Some(name) = parse_marker(&content) {
            debug!("found key of {name} at {:?}", path.display());
            keys.insert(name.to_string(), PathBuf::from(base));
        }
    }

    Ok(keys)
}

/// Find per-identity git configs carrying an ownership marker.
///
/// Only files named `.gitconfig-<name>` whose marker names that same identity
/// count. A hand-written `.gitconfig-<name>` is never treated as managed.
///
/// # Errors
///
/// - Return [`ScanError::ReadDir`] if home directory cannot be listed.
#[instrument(level = "debug")]
pub fn find_managed_git_configs(home: &Path) -> Result<BTreeMap<String, PathBuf>> {
    let mut configs = BTreeMap::new();
    for path in list_files(home)? {
        let Some(name) = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.strip_prefix(GIT_CONFIG_PREFIX))
            .filter(|name| !name.is_empty())
        else {
            continue;
        };

        let Ok(content) = read_to_string(&path) else {
            debug!("skip unreadable git config {:?}", path.display());
            continue;
        };

        if parse_marker(&content) == Some(name) {
            debug!("found git config of {name} at {:?}", path.display());
            configs.insert(name.to_string(), path.clone());
        }
    }

    Ok(configs)
}

/// Managed artifacts found on disk, keyed by owning identity.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ManagedArtifacts {
    /// Private key paths.
    pub keys: BTreeMap<String, PathBuf>,

    /// Per-identity git config paths.
    pub git_configs: BTreeMap<String, PathBuf>,
}

impl ManagedArtifacts {
    /// Scan SSH directory and home directory of layout.
    ///
    /// # Errors
    ///
    /// - Return [`ScanError::ReadDir`] if a scanned directory cannot be
    ///   listed.
    pub fn scan(layout: &Layout) -> Result<Self> {
        Ok(Self {
            keys: find_managed_keys(&layout.ssh_dir())?,
            git_configs: find_managed_git_configs(layout.home())?,
        })
    }

    /// Names owning artifacts that are not configured, sorted by name.
    pub fn orphans(&self, identities: &Identities) -> Vec<String> {
        self.keys
            .keys()
            .chain(self.git_configs.keys())
            .filter(|name| !identities.contains(name))
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Every file belonging to an identity.
    ///
    /// Covers both the scanned artifacts and the paths derived from the
    /// identity's name, without duplicates. Files may not exist.
    pub fn files_of(&self, layout: &Layout, name: &str) -> Vec<PathBuf> {
        let mut files = vec![layout.private_key(name), layout.public_key(name)];
        if let Some(private) = self.keys.get(name) {
            let mut public = private.clone().into_os_string();
            public.push(".pub");
            files.extend([private.clone(), PathBuf::from(public)]);
        }
        files.push(layout.identity_git_config(name));
        if let Some(config) = self.git_configs.get(name) {
            files.push(config.clone());
        }

        let mut unique = Vec::with_capacity(files.len());
        for file in files {
            if !unique.contains(&file) {
                unique.push(file);
            }
        }

        unique
    }
}

/// Determine identities that own artifacts on disk, but are no longer
/// configured.
///
/// Result is sorted by name.
///
/// # Errors
///
/// - Return [`ScanError::ReadDir`] if a scanned directory cannot be listed.
pub fn detect_orphans(layout: &Layout, identities: &Identities) -> Result<Vec<String>> {
    Ok(ManagedArtifacts::scan(layout)?.orphans(identities))
}

fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(ScanError::ReadDir {
                source,
                path: dir.to_path_buf(),
            })
        }
    };

    Ok(entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|kind| kind.is_file()).unwrap_or(false))
        .map(|entry| entry.path())
        .collect())
}

/// Artifact discovery error types.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("failed to list directory {:?}", path.display())]
    ReadDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = ScanError> = std::result::Result<T, E>;
