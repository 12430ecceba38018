// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Identity detection by folder.
//!
//! A directory is governed by the first identity, in declaration order, that
//! has a folder containing it. Overlapping folders are not an error. The
//! earlier identity simply wins.

use crate::{
    config::{Identities, Identity},
    path::Layout,
};

use std::path::{Path, PathBuf};
use tracing::debug;

/// Identity governing a directory, and the folder pattern that matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderMatch<'a> {
    pub identity: &'a Identity,

    /// Folder pattern as written in the identity store.
    pub pattern: &'a str,

    /// Expanded form of pattern.
    pub folder: PathBuf,
}

/// Find identity governing `dir`.
///
/// Matching is done per path component, so `~/Work` governs `~/Work/api`,
/// but not `~/Workshop`. Folder patterns that fail to expand are skipped. A
/// folder that exists on disk is also matched through its canonical form, so
/// symlinked folders still govern the real directories behind them.
pub fn detect_identity<'a>(
    layout: &Layout,
    identities: &'a Identities,
    dir: impl AsRef<Path>,
) -> Option<FolderMatch<'a>> {
    let dir = dir.as_ref();
    for identity in identities {
        for pattern in &identity.folders {
            let folder = match layout.expand(pattern) {
                Ok(folder) => folder,
                Err(error) => {
                    debug!("skip folder {pattern:?} of {}: {error}", identity.name);
                    continue;
                }
            };

            let canonical = folder.canonicalize().ok();
            if dir.starts_with(&folder) || canonical.is_some_and(|real| dir.starts_with(real)) {
                return Some(FolderMatch {
                    identity,
                    pattern,
                    folder,
                });
            }
        }
    }

    None
}
