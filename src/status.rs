// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Read-only inspection of identities.
//!
//! Nothing here writes to disk. These are the queries behind the listing,
//! status, info, and where commands.

use crate::{config::Identity, path::Layout, sync::key::ManagedKey};

use chrono::{DateTime, Utc};
use git2::Repository;
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::read_dir,
    path::Path,
};
use tracing::debug;

/// Health of an identity's managed artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityStatus {
    /// Keypair and git config are present.
    Active,

    /// Keypair is incomplete or absent.
    KeyMissing,

    /// Keypair is present, but git config is not.
    ConfigMissing,
}

impl IdentityStatus {
    /// Determine status of identity from files on disk.
    pub fn of(layout: &Layout, identity: &Identity) -> Self {
        if !ManagedKey::of(layout, &identity.name).exists() {
            return Self::KeyMissing;
        }

        if !layout.identity_git_config(&identity.name).is_file() {
            return Self::ConfigMissing;
        }

        Self::Active
    }

    pub fn is_active(self) -> bool {
        self == Self::Active
    }
}

impl Display for IdentityStatus {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Active => write!(fmt, "✓ Active"),
            Self::KeyMissing => write!(fmt, "⚠ Key missing"),
            Self::ConfigMissing => write!(fmt, "✗ Config error"),
        }
    }
}

/// Legend explaining each [`IdentityStatus`].
pub const STATUS_LEGEND: &str = "\
Status Legend:
  ✓ Active       - Fully configured and ready
  ⚠ Key missing  - SSH key not found (run: gitid sync)
  ✗ Config error - Git config file missing (run: gitid sync)";

/// Count git repositories directly inside of directory.
///
/// Only immediate subdirectories are considered. An unreadable directory
/// counts as zero.
pub fn count_git_repos(dir: impl AsRef<Path>) -> usize {
    let Ok(entries) = read_dir(dir.as_ref()) else {
        return 0;
    };

    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .filter(|path| Repository::open(path).is_ok())
        .count()
}

/// Effective commit author of a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitAuthor {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl GitAuthor {
    /// Author matches identity exactly.
    pub fn matches(&self, identity: &Identity) -> bool {
        self.name.as_deref() == Some(identity.user.as_str())
            && self.email.as_deref() == Some(identity.email.as_str())
    }
}

/// Read effective `user.name` and `user.email` of repository containing
/// `dir`.
///
/// Return `None` if `dir` is not inside of a git repository.
pub fn effective_author(dir: impl AsRef<Path>) -> Option<GitAuthor> {
    let repository = match Repository::discover(dir.as_ref()) {
        Ok(repository) => repository,
        Err(error) => {
            debug!("no repository at {:?}: {error}", dir.as_ref().display());
            return None;
        }
    };

    let config = repository.config().and_then(|mut config| config.snapshot());
    let Ok(config) = config else {
        return Some(GitAuthor {
            name: None,
            email: None,
        });
    };

    Some(GitAuthor {
        name: config.get_string("user.name").ok(),
        email: config.get_string("user.email").ok(),
    })
}

/// Describe how long ago `then` was, relative to `now`.
pub fn humanize_since(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - then).num_seconds();
    if seconds < 0 {
        return "in the future".into();
    }

    let (amount, unit) = match seconds {
        0..=59 => return "just now".into(),
        60..=3_599 => (seconds / 60, "minute"),
        3_600..=86_399 => (seconds / 3_600, "hour"),
        86_400..=2_591_999 => (seconds / 86_400, "day"),
        2_592_000..=31_535_999 => (seconds / 2_592_000, "month"),
        _ => (seconds / 31_536_000, "year"),
    };

    if amount == 1 {
        format!("1 {unit} ago")
    } else {
        format!("{amount} {unit}s ago")
    }
}

/// Shorten text to at most `max` characters, marking cuts with "...".
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }

    let keep = max.saturating_sub(3);
    let mut short = text.chars().take(keep).collect::<String>();
    short.push_str("...");
    short
}
