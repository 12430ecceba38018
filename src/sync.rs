// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Reconciliation of on-disk state with the identity store.
//!
//! A __sync__ brings every managed artifact into agreement with the declared
//! identities. It runs in three phases:
//!
//! 1. __Orphan cleanup__: artifacts whose owning identity is gone are backed
//!    up into one archive, and then removed.
//! 2. __Per-identity steps__: folders, keypair, public key copy, git config,
//!    agent registration, and a connectivity probe, in that order.
//! 3. __Global writers__: `~/.gitconfig`, `~/.ssh/config`, and
//!    `~/.ssh/allowed_signers` are regenerated from the full identity set.
//!
//! Every step detects work that is already done, so running sync again over
//! unchanged identities changes nothing.
//!
//! # Failure Policy
//!
//! Failing to generate a key or write a git config stops the remaining steps
//! of that one identity, and is recorded in [`SyncResult::failed`]. Failing to
//! scan for orphans, load run state, or write a global file aborts the whole
//! sync. Everything else is logged at warn level and skipped.

pub mod backup;
pub mod key;
pub mod marker;
pub mod render;
pub mod scan;
pub mod tools;

use crate::{
    config::{Identity, IdentityConfig},
    path::Layout,
    state::{RunState, StateError},
    sync::{
        backup::{BackupError, DEFAULT_KEEP},
        key::{fingerprint_of, ManagedKey},
        marker::key_comment,
        render::RenderError,
        scan::{ManagedArtifacts, ScanError},
        tools::{classify, ProbeVerdict, SystemToolchain, ToolError, Toolchain},
    },
};

use chrono::{Local, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use std::{
    collections::BTreeMap,
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{read, remove_dir, remove_file, DirBuilder},
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, info, instrument, warn};

/// Outcome of one sync run.
#[derive(Debug, Default)]
pub struct SyncResult {
    /// Orphaned identities whose artifacts were removed.
    pub orphans_removed: Vec<String>,

    /// Identities that received a freshly generated keypair.
    pub created: Vec<String>,

    /// Identities whose connectivity probe succeeded.
    pub verified: Vec<String>,

    /// Identities that hit a hard stop, with the error that stopped them.
    pub failed: BTreeMap<String, IdentityError>,
}

impl SyncResult {
    /// No identity hit a hard stop.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

impl Display for SyncResult {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        writeln!(fmt, "Sync complete:")?;
        writeln!(fmt, "  orphans removed: {}", self.orphans_removed.len())?;
        writeln!(fmt, "  keys created:    {}", self.created.len())?;
        writeln!(fmt, "  verified:        {}", self.verified.len())?;
        writeln!(fmt, "  failed:          {}", self.failed.len())?;

        for (name, error) in &self.failed {
            writeln!(fmt, "  ✗ {name}: {}", report(error))?;
        }

        if !self.created.is_empty() {
            writeln!(fmt)?;
            writeln!(fmt, "Next steps:")?;
            writeln!(fmt, "  add each new public key to its forge as an authentication and signing key:")?;
            for name in &self.created {
                writeln!(fmt, "    {name}: ~/{name}_key.pub")?;
            }
        }

        Ok(())
    }
}

/// Render error together with its chain of sources on one line.
pub fn report(error: &dyn Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Drive reconciliation of managed artifacts.
#[derive(Debug)]
pub struct Reconciler<T = SystemToolchain>
where
    T: Toolchain,
{
    pub(crate) layout: Layout,
    pub(crate) tools: T,
    pub(crate) keep_backups: usize,
}

impl<T> Reconciler<T>
where
    T: Toolchain,
{
    /// Construct new reconciler over layout using toolchain.
    pub fn new(layout: Layout, tools: T) -> Self {
        Self {
            layout,
            tools,
            keep_backups: DEFAULT_KEEP,
        }
    }

    /// Number of orphan backup archives to retain.
    pub fn keep_backups(mut self, keep: usize) -> Self {
        self.keep_backups = keep;
        self
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn tools(&self) -> &T {
        &self.tools
    }

    /// Reconcile on-disk state with identity configuration.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::State`] if run state cannot be read.
    /// - Return [`SyncError::Scan`] if managed artifacts cannot be scanned.
    /// - Return [`SyncError::SshDir`] if SSH directory cannot be created.
    /// - Return [`SyncError::Global`] if a global config cannot be written.
    #[instrument(skip(self, config), level = "debug")]
    pub fn sync(&self, config: &IdentityConfig) -> Result<SyncResult> {
        let mut state = RunState::load(self.layout.state_file())?;
        let mut result = SyncResult::default();

        let artifacts = ManagedArtifacts::scan(&self.layout)?;
        let orphans = artifacts.orphans(&config.identities);
        if !orphans.is_empty() {
            info!("remove orphaned identities: {}", orphans.join(", "));
            self.remove_orphans(&artifacts, &orphans, &mut state);
            result.orphans_removed = orphans;
        }

        for identity in &config.identities {
            info!("sync identity {}", identity.name);
            let mut outcome = Outcome::default();
            let status = self.sync_one(identity, &mut outcome);

            // INVARIANT: A key generated before a hard stop still counts as created.
            if outcome.created {
                result.created.push(identity.name.clone());
            }

            match status {
                Ok(()) => {
                    if outcome.verified {
                        result.verified.push(identity.name.clone());
                    }
                }
                Err(error) => {
                    warn!("identity {} failed: {}", identity.name, report(&error));
                    result.failed.insert(identity.name.clone(), error);
                }
            }
        }

        self.write_globals(config)?;

        let now = Utc::now();
        state.last_sync = Some(now);
        for identity in &config.identities {
            if result.failed.contains_key(&identity.name) {
                continue;
            }

            let fingerprint = fingerprint_of(self.layout.public_key(&identity.name));
            state.record(identity.name.clone(), fingerprint, now);
        }

        if let Err(error) = state.save(self.layout.state_file()) {
            warn!("{}", report(&error));
        }

        Ok(result)
    }

    /// Back up and remove every artifact of orphaned identities.
    ///
    /// Backup happens strictly before any removal. Removal is still attempted
    /// if backup fails.
    fn remove_orphans(&self, artifacts: &ManagedArtifacts, orphans: &[String], state: &mut RunState) {
        let mut files = Vec::new();
        for name in orphans {
            files.extend(artifacts.files_of(&self.layout, name));
            files.push(self.layout.public_key_copy(name));
        }

        let backup_dir = self.layout.backup_dir();
        match backup::backup(&files, &backup_dir, Local::now()) {
            Ok(_) => {}
            Err(BackupError::EmptyFileList) => debug!("no orphaned files left to back up"),
            Err(error) => warn!("backup failed: {}", report(&error)),
        }

        if let Err(error) = backup::rotate(&backup_dir, self.keep_backups) {
            warn!("backup rotation failed: {}", report(&error));
        }

        for file in &files {
            match remove_file(file) {
                Ok(()) => info!("removed {:?}", file.display()),
                Err(error) if error.kind() == ErrorKind::NotFound => {}
                Err(error) => warn!("failed to remove {:?}: {error}", file.display()),
            }
        }

        for name in orphans {
            self.remove_service_folder(name);
            state.forget(name);
        }
    }

    fn remove_service_folder(&self, name: &str) {
        let folder = self.layout.service_folder(name);
        match remove_dir(&folder) {
            Ok(()) => info!("removed empty folder {:?}", folder.display()),
            Err(error) if error.kind() == ErrorKind::NotFound => {}
            Err(error) if error.kind() == ErrorKind::DirectoryNotEmpty => {
                warn!("folder {:?} is not empty, leaving it in place", folder.display())
            }
            Err(error) => warn!("failed to remove folder {:?}: {error}", folder.display()),
        }
    }

    /// Run per-identity steps, stopping at the first hard failure.
    ///
    /// Progress is tracked in `outcome` as steps complete, so it stays
    /// accurate on the error path too.
    #[instrument(skip(self, identity, outcome), fields(identity = %identity.name), level = "debug")]
    fn sync_one(&self, identity: &Identity, outcome: &mut Outcome) -> Result<(), IdentityError> {
        self.ensure_folders(identity);

        let key = ManagedKey::of(&self.layout, &identity.name);
        if self.ensure_key(identity, &key)? {
            outcome.created = true;
            self.publish_public_key(&identity.name, &key);
        }

        let path = render::write_identity_git_config(&self.layout, identity)
            .map_err(IdentityError::GitConfig)?;
        debug!("wrote {:?}", path.display());

        self.register_with_agent(&key);
        outcome.verified = self.test_connection(identity, &key);

        Ok(())
    }

    fn ensure_folders(&self, identity: &Identity) {
        for pattern in &identity.folders {
            let folder = match self.layout.expand(pattern) {
                Ok(folder) => folder,
                Err(error) => {
                    warn!("skip folder {pattern:?}: {}", report(&error));
                    continue;
                }
            };

            match mkdirp::mkdirp(&folder) {
                Ok(Some(_)) => info!("created folder {:?}", folder.display()),
                Ok(None) => debug!("folder {:?} exists", folder.display()),
                Err(error) => warn!("failed to create folder {:?}: {error}", folder.display()),
            }
        }
    }

    /// Generate keypair unless both halves exist. Return true if generated.
    fn ensure_key(&self, identity: &Identity, key: &ManagedKey) -> Result<bool, IdentityError> {
        if key.exists() {
            debug!("key {:?} exists", key.private.display());
            return Ok(false);
        }

        // INVARIANT: ssh-keygen refuses to overwrite, so clear any lone half.
        for half in [&key.private, &key.public] {
            if let Err(error) = remove_file(half) {
                if error.kind() != ErrorKind::NotFound {
                    warn!("failed to remove stale {:?}: {error}", half.display());
                }
            }
        }

        let ssh_dir = self.layout.ssh_dir();
        create_private_dir(&ssh_dir).map_err(|source| IdentityError::SshDir {
            source,
            path: ssh_dir,
        })?;

        let comment = key_comment(&identity.email, &identity.name);
        self.tools
            .generate_key(&key.private, &comment)
            .map_err(IdentityError::KeyGeneration)?;
        info!("generated key {:?}", key.private.display());

        Ok(true)
    }

    fn publish_public_key(&self, name: &str, key: &ManagedKey) {
        let copy = self.layout.public_key_copy(name);
        let content = match read(&key.public) {
            Ok(content) => content,
            Err(error) => {
                warn!("failed to read {:?}: {error}", key.public.display());
                return;
            }
        };

        if read(&copy).is_ok_and(|existing| existing == content) {
            debug!("public key copy {:?} is current", copy.display());
            return;
        }

        match std::fs::write(&copy, content) {
            Ok(()) => info!("copied public key to {:?}", copy.display()),
            Err(error) => warn!("failed to copy public key to {:?}: {error}", copy.display()),
        }
    }

    fn register_with_agent(&self, key: &ManagedKey) {
        let _ = self.tools.agent_remove(&key.private);
        if let Err(error) = self.tools.agent_add(&key.private) {
            warn!("failed to add {:?} to ssh agent: {}", key.private.display(), report(&error));
        }
    }

    /// Probe forge from first existing folder. Return true on success.
    fn test_connection(&self, identity: &Identity, key: &ManagedKey) -> bool {
        let Some(cwd) = first_existing_folder(&self.layout, identity) else {
            debug!("no folder of {} exists, skip connectivity test", identity.name);
            return false;
        };

        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(format!("test connection to {}", identity.domain));
        bar.enable_steady_tick(Duration::from_millis(100));
        let output = self.tools.probe(&identity.domain, &key.private, &cwd);
        bar.finish_and_clear();

        let output = match output {
            Ok(output) => output,
            Err(error) => {
                warn!("connection test of {} failed: {}", identity.name, report(&error));
                return false;
            }
        };

        match classify(&output.text, output.success) {
            ProbeVerdict::Success => {
                info!("authenticated to {} as {}", identity.domain, identity.name);
                true
            }
            ProbeVerdict::PermissionDenied => {
                warn!(
                    "permission denied by {}, add {:?} to your account",
                    identity.domain,
                    key.public.display()
                );
                false
            }
            ProbeVerdict::Other => {
                warn!("connection test of {} failed: {}", identity.name, output.text);
                false
            }
        }
    }

    fn write_globals(&self, config: &IdentityConfig) -> Result<()> {
        let ssh_dir = self.layout.ssh_dir();
        create_private_dir(&ssh_dir).map_err(|source| SyncError::SshDir {
            source,
            path: ssh_dir,
        })?;

        let identities = &config.identities;
        for path in [
            render::write_global_git_config(&self.layout, identities),
            render::write_ssh_config(&self.layout, identities),
            render::write_allowed_signers(&self.layout, identities),
        ] {
            let path = path.map_err(SyncError::Global)?;
            info!("wrote {:?}", path.display());
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Outcome {
    created: bool,
    verified: bool,
}

fn first_existing_folder(layout: &Layout, identity: &Identity) -> Option<PathBuf> {
    identity
        .folders
        .iter()
        .filter_map(|pattern| layout.expand(pattern).ok())
        .find(|folder| folder.is_dir())
}

fn create_private_dir(path: &Path) -> std::io::Result<()> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(path)
}

/// Hard stop of a single identity.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("failed to generate ssh key")]
    KeyGeneration(#[source] ToolError),

    #[error("failed to create ssh directory {:?}", path.display())]
    SshDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    #[error("failed to write git config")]
    GitConfig(#[source] RenderError),
}

/// Sync error types.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error("failed to create ssh directory {:?}", path.display())]
    SshDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    #[error("failed to write global config")]
    Global(#[source] RenderError),
}

/// Friendly result alias :3
pub type Result<T, E = SyncError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn report_walks_source_chain() {
        let error = IdentityError::SshDir {
            source: std::io::Error::new(ErrorKind::PermissionDenied, "denied"),
            path: PathBuf::from("/home/jane/.ssh"),
        };
        assert_eq!(
            report(&error),
            "failed to create ssh directory \"/home/jane/.ssh\": denied"
        );
    }

    #[test]
    fn summary_lists_failures_and_next_steps() {
        let mut result = SyncResult {
            orphans_removed: vec!["old".into()],
            created: vec!["work".into()],
            verified: vec![],
            failed: BTreeMap::new(),
        };
        result.failed.insert(
            "play".into(),
            IdentityError::KeyGeneration(ToolError::Failed {
                program: "ssh-keygen".into(),
                message: "boom".into(),
            }),
        );

        let summary = result.to_string();
        assert!(summary.contains("orphans removed: 1"));
        assert!(summary.contains("keys created:    1"));
        assert!(summary.contains("failed:          1"));
        assert!(summary.contains("✗ play: failed to generate ssh key"));
        assert!(summary.contains("work: ~/work_key.pub"));
        assert!(!result.is_success());
    }
}
