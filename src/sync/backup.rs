// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Backup before delete.
//!
//! Orphaned keys and configs are never removed without first being archived
//! into a compressed tarball under the backup directory. Archives are named
//! `gitid-orphans-<timestamp>.tar.gz` so that they sort by creation time, and
//! only the most recent few are kept around.
//!
//! # Pitfalls
//!
//! Archives are flat. Every file is stored under its base name, so two
//! orphaned files from different directories sharing a base name would
//! shadow one another inside the same archive.

use chrono::{DateTime, Local};
use flate2::{write::GzEncoder, Compression};
use std::{
    fs::{metadata, remove_file},
    path::{Path, PathBuf},
    time::SystemTime,
};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};

pub const BACKUP_PREFIX: &str = "gitid-orphans-";
pub const BACKUP_SUFFIX: &str = ".tar.gz";

/// Number of archives kept by default.
pub const DEFAULT_KEEP: usize = 10;

/// Archive files into new timestamped tarball inside backup directory.
///
/// Files that do not exist are skipped. The archive only appears at its final
/// path once it has been written in full.
///
/// # Errors
///
/// - Return [`BackupError::EmptyFileList`] if none of the files exist.
/// - Return [`BackupError::Archive`] if archive cannot be written.
#[instrument(skip(files, now), level = "debug")]
pub fn backup(files: &[PathBuf], backup_dir: &Path, now: DateTime<Local>) -> Result<PathBuf> {
    let files = files.iter().filter(|path| path.is_file()).collect::<Vec<_>>();
    if files.is_empty() {
        return Err(BackupError::EmptyFileList);
    }

    let archive = archive_path(backup_dir, now);
    write_archive(&files, backup_dir, &archive).map_err(|source| BackupError::Archive {
        source,
        path: archive.clone(),
    })?;
    info!("backed up {} files to {:?}", files.len(), archive.display());

    Ok(archive)
}

fn archive_path(backup_dir: &Path, now: DateTime<Local>) -> PathBuf {
    let stamp = now.format("%Y%m%d-%H%M%S");
    let mut path = backup_dir.join(format!("{BACKUP_PREFIX}{stamp}{BACKUP_SUFFIX}"));

    // INVARIANT: Never clobber an archive made within the same second.
    let mut attempt = 1;
    while path.exists() {
        path = backup_dir.join(format!("{BACKUP_PREFIX}{stamp}-{attempt}{BACKUP_SUFFIX}"));
        attempt += 1;
    }

    path
}

fn write_archive(files: &[&PathBuf], backup_dir: &Path, archive: &Path) -> std::io::Result<()> {
    mkdirp::mkdirp(backup_dir)?;

    let staging = NamedTempFile::new_in(backup_dir)?;
    let encoder = GzEncoder::new(staging, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for path in files {
        let name = path.file_name().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{:?} has no file name", path.display()),
            )
        })?;
        debug!("archive {:?}", path.display());
        builder.append_path_with_name(path, name)?;
    }

    let staging = builder.into_inner()?.finish()?;
    staging.as_file().sync_all()?;
    staging.persist(archive).map_err(|err| err.error)?;

    Ok(())
}

/// Keep only the `keep` most recently modified archives in directory.
///
/// Rotation does not stop at the first archive that cannot be removed. Every
/// stale archive is attempted, and the first failure is reported afterwards.
///
/// # Errors
///
/// - Return [`BackupError::Pattern`] if directory cannot be globbed.
/// - Return [`BackupError::Rotate`] if a stale archive cannot be removed.
#[instrument(level = "debug")]
pub fn rotate(dir: &Path, keep: usize) -> Result<Vec<PathBuf>> {
    let pattern = format!(
        "{}/{BACKUP_PREFIX}*{BACKUP_SUFFIX}",
        glob::Pattern::escape(&dir.to_string_lossy())
    );

    let mut archives = glob::glob(&pattern)?
        .filter_map(|entry| entry.ok())
        .map(|path| {
            let modified = metadata(&path)
                .and_then(|meta| meta.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, path)
        })
        .collect::<Vec<_>>();

    // INVARIANT: Newest first, ties broken by name so the order is total.
    archives.sort_by(|a, b| b.cmp(a));

    let mut removed = Vec::new();
    let mut failure = None;
    for (_, path) in archives.into_iter().skip(keep) {
        match remove_file(&path) {
            Ok(()) => {
                debug!("rotated out {:?}", path.display());
                removed.push(path);
            }
            Err(source) => {
                warn!("failed to remove old backup {:?}: {source}", path.display());
                failure.get_or_insert(BackupError::Rotate { source, path });
            }
        }
    }

    match failure {
        Some(error) => Err(error),
        None => Ok(removed),
    }
}

/// Backup error types.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("no files to back up")]
    EmptyFileList,

    #[error("failed to write backup archive {:?}", path.display())]
    Archive {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    #[error(transparent)]
    Pattern(#[from] glob::PatternError),

    #[error("failed to remove old backup archive {:?}", path.display())]
    Rotate {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = BackupError> = std::result::Result<T, E>;
