// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! External tool invocation.
//!
//! Key generation, SSH agent registration, and connectivity probing are all
//! left to the OpenSSH binaries already installed on the system. The
//! [`Toolchain`] trait is the only way the reconciler reaches them, which
//! keeps the reconciler testable without touching a real SSH agent or forge.

use std::{
    ffi::{OsStr, OsString},
    path::Path,
    process::Command,
};
use tracing::{debug, instrument};

/// Layer of indirection for external SSH tooling.
pub trait Toolchain {
    /// Generate passphrase-less ed25519 keypair at `private` with `comment`.
    fn generate_key(&self, private: &Path, comment: &str) -> Result<()>;

    /// Remove key from SSH agent.
    fn agent_remove(&self, private: &Path) -> Result<()>;

    /// Add key to SSH agent.
    fn agent_add(&self, private: &Path) -> Result<()>;

    /// Attempt authentication-only SSH session against `domain` from `cwd`.
    fn probe(&self, domain: &str, private: &Path, cwd: &Path) -> Result<ProbeOutput>;
}

/// Toolchain backed by OpenSSH binaries on the `PATH`.
#[derive(Debug, Default, Clone)]
pub struct SystemToolchain;

impl Toolchain for SystemToolchain {
    #[instrument(skip(self), level = "debug")]
    fn generate_key(&self, private: &Path, comment: &str) -> Result<()> {
        let args: [&OsStr; 8] = [
            OsStr::new("-t"),
            OsStr::new("ed25519"),
            OsStr::new("-N"),
            OsStr::new(""),
            OsStr::new("-C"),
            OsStr::new(comment),
            OsStr::new("-f"),
            private.as_os_str(),
        ];
        let output = syscall_non_interactive("ssh-keygen", args, None)?;
        output.into_result("ssh-keygen").map(|_| ())
    }

    #[instrument(skip(self), level = "debug")]
    fn agent_remove(&self, private: &Path) -> Result<()> {
        let output = syscall_non_interactive("ssh-add", [OsStr::new("-d"), private.as_os_str()], None)?;
        output.into_result("ssh-add").map(|_| ())
    }

    #[instrument(skip(self), level = "debug")]
    fn agent_add(&self, private: &Path) -> Result<()> {
        let output = syscall_non_interactive("ssh-add", [private.as_os_str()], None)?;
        output.into_result("ssh-add").map(|_| ())
    }

    #[instrument(skip(self), level = "debug")]
    fn probe(&self, domain: &str, private: &Path, cwd: &Path) -> Result<ProbeOutput> {
        let target = format!("git@{domain}");
        let args: [&OsStr; 9] = [
            OsStr::new("-T"),
            OsStr::new("-o"),
            OsStr::new("BatchMode=yes"),
            OsStr::new("-o"),
            OsStr::new("IdentitiesOnly=yes"),
            OsStr::new("-o"),
            OsStr::new("StrictHostKeyChecking=accept-new"),
            OsStr::new("-i"),
            private.as_os_str(),
        ];
        let args = args.into_iter().chain([OsStr::new(&target)]);
        syscall_non_interactive("ssh", args, Some(cwd))
    }
}

/// Combined output and exit status of an external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutput {
    pub text: String,
    pub success: bool,
}

impl ProbeOutput {
    pub fn new(text: impl Into<String>, success: bool) -> Self {
        Self {
            text: text.into(),
            success,
        }
    }

    fn into_result(self, program: &str) -> Result<String> {
        if !self.success {
            return Err(ToolError::Failed {
                program: program.into(),
                message: self.text,
            });
        }

        Ok(self.text)
    }
}

/// Verdict on connectivity probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeVerdict {
    Success,
    PermissionDenied,
    Other,
}

/// Phrases forges greet a successfully authenticated session with.
const GREETINGS: [&str; 3] = ["successfully authenticated", "Hi ", "Welcome to "];

/// Classify output of connectivity probe.
///
/// This is a heuristic. Forges close authentication-only sessions with a
/// non-zero exit status even on success, so the greeting text decides first,
/// and the exit status only matters when nothing recognizable was printed.
pub fn classify(output: &str, success: bool) -> ProbeVerdict {
    if GREETINGS.iter().any(|greeting| output.contains(greeting)) {
        return ProbeVerdict::Success;
    }

    if output.contains("Permission denied") {
        return ProbeVerdict::PermissionDenied;
    }

    if success {
        ProbeVerdict::Success
    } else {
        ProbeVerdict::Other
    }
}

fn syscall_non_interactive(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
    cwd: Option<&Path>,
) -> Result<ProbeOutput> {
    let mut command = Command::new(cmd.as_ref());
    command.args(args);
    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }

    debug!("run {command:?}");
    let output = command.output().map_err(|source| ToolError::Spawn {
        source,
        program: cmd.as_ref().to_os_string(),
    })?;

    let stdout = String::from_utf8_lossy(output.stdout.as_slice());
    let stderr = String::from_utf8_lossy(output.stderr.as_slice());
    let mut message = String::new();
    message.push_str(stdout.as_ref());
    message.push_str(stderr.as_ref());

    // INVARIANT: Chomp trailing newlines.
    let message = message.trim_end_matches(['\r', '\n']).to_string();

    Ok(ProbeOutput::new(message, output.status.success()))
}

/// External tool error types.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("failed to run {program:?}")]
    Spawn {
        #[source]
        source: std::io::Error,
        program: OsString,
    },

    #[error("{program} failed: {message}")]
    Failed { program: String, message: String },
}

/// Friendly result alias :3
pub type Result<T, E = ToolError> = std::result::Result<T, E>;
