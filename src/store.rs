// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Identity store management.
//!
//! Gitid keeps all identities in one hand-edited JSON file called the
//! __identity store__, which lives at `~/.git-identities.json` by default.
//! The store is loaded and validated at the start of every command that
//! needs it. Gitid itself only ever writes the store once: when it does not
//! exist yet, and an example needs to be generated for the user to edit.

use crate::config::{ConfigError, Identity, IdentityConfig};

use std::{
    fs::read_to_string,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

/// Handle to identity store file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityStore {
    path: PathBuf,
}

impl IdentityStore {
    /// Construct new identity store handle.
    ///
    /// Does not touch the file system.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Load and validate identity store.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::NotFound`] if store file does not exist.
    /// - Return [`StoreError::Read`] if store file cannot be read.
    /// - Return [`StoreError::Config`] if store file cannot be parsed, or
    ///   contains an invalid identity.
    #[instrument(skip(self), level = "debug")]
    pub fn load(&self) -> Result<IdentityConfig> {
        debug!("load identity store {:?}", self.path.display());
        let data = read_to_string(&self.path).map_err(|source| match source.kind() {
            ErrorKind::NotFound => StoreError::NotFound {
                path: self.path.clone(),
            },
            _ => StoreError::Read {
                source,
                path: self.path.clone(),
            },
        })?;

        data.parse().map_err(|source| StoreError::Config {
            source,
            path: self.path.clone(),
        })
    }

    /// Save identity store in indented form.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Write`] if store file cannot be written.
    #[instrument(skip(self, config), level = "debug")]
    pub fn save(&self, config: &IdentityConfig) -> Result<()> {
        write_atomic(&self.path, config.to_string()).map_err(|source| StoreError::Write {
            source,
            path: self.path.clone(),
        })
    }

    /// Write example identity store for user to edit.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Write`] if store file cannot be written.
    pub fn create_example(&self) -> Result<IdentityConfig> {
        let config = example_config();
        self.save(&config)?;
        Ok(config)
    }
}

/// Identity store written when none exists yet.
pub fn example_config() -> IdentityConfig {
    let identities = [
        Identity::new(
            "github-work",
            "Your GitHub Work Username",
            "work@company.com",
            "github.com",
            ["~/Work/Github"],
        ),
        Identity::new(
            "github-personal",
            "Your GitHub Personal Username",
            "personal@example.com",
            "github.com",
            ["~/Personal/Github"],
        ),
        Identity::new(
            "gitlab",
            "Your GitLab Username",
            "user@gitlab.com",
            "gitlab.com",
            ["~/Gitlab"],
        ),
        Identity::new(
            "codeberg",
            "Your Codeberg Username",
            "username@noreply.codeberg.org",
            "codeberg.org",
            ["~/Codeberg"],
        ),
    ];

    IdentityConfig {
        identities: identities.into_iter().collect(),
    }
}

/// Replace file contents in one step.
///
/// Contents are written to a temporary sibling file that is renamed over the
/// target once complete. The temporary file is removed on every error path.
/// A symlinked target is followed, so the link survives and the file it
/// points to is replaced instead.
pub(crate) fn write_atomic(path: &Path, contents: impl AsRef<[u8]>) -> std::io::Result<()> {
    let resolved;
    let path = match path.canonicalize() {
        Ok(real) => {
            resolved = real;
            resolved.as_path()
        }
        Err(err) if err.kind() == ErrorKind::NotFound => path,
        Err(err) => return Err(err),
    };

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    mkdirp::mkdirp(parent)?;

    let mut file = NamedTempFile::new_in(parent)?;
    file.write_all(contents.as_ref())?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|err| err.error)?;

    Ok(())
}

/// All possible error types for identity store interaction.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("identity store not found at {:?}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read identity store at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    #[error("failed to load identity store at {:?}", path.display())]
    Config {
        #[source]
        source: ConfigError,
        path: PathBuf,
    },

    #[error("failed to write identity store at {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
type Result<T, E = StoreError> = std::result::Result<T, E>;
