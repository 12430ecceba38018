// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Generated configuration files.
//!
//! Every file here is rendered from scratch out of the full identity set by a
//! pure function, and then written in one step. Nothing is patched
//! incrementally, so running a sync twice over the same identities produces
//! byte-identical files.
//!
//! # Managed Blocks
//!
//! The per-identity git configs and `~/.ssh/allowed_signers` belong to gitid
//! outright. However, `~/.gitconfig` and `~/.ssh/config` belong to the user.
//! Gitid only owns a __managed block__ inside of them, delimited by
//! [`BLOCK_BEGIN`] and [`BLOCK_END`]. Only that block is regenerated. Anything
//! outside of it is left alone byte for byte.

use crate::{
    config::{Identities, Identity},
    path::{Layout, PathError},
    store::write_atomic,
    sync::{key::ManagedKey, marker::format_marker},
};

use std::{
    fmt::Write as _,
    fs::read_to_string,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

pub const BLOCK_BEGIN: &str = "# >>> gitid managed block >>>";
pub const BLOCK_END: &str = "# <<< gitid managed block <<<";

/// Render git config of a single identity.
pub fn render_identity_git_config(layout: &Layout, identity: &Identity) -> String {
    let name = identity.name.as_str();
    let mut out = String::new();
    let _ = writeln!(out, "# Managed by gitid {}. Regenerated on every sync.", format_marker(name));
    let _ = writeln!(out, "[user]");
    let _ = writeln!(out, "\tname = {}", quote_git_value(&identity.user));
    let _ = writeln!(out, "\temail = {}", identity.email);
    let _ = writeln!(out, "\tsigningkey = {}", layout.public_key(name).display());
    let _ = writeln!(out, "[core]");
    let _ = writeln!(
        out,
        "\tsshCommand = ssh -i {} -o IdentitiesOnly=yes",
        layout.private_key(name).display()
    );
    let _ = writeln!(out, "[gpg]");
    let _ = writeln!(out, "\tformat = ssh");
    let _ = writeln!(out, "[gpg \"ssh\"]");
    let _ = writeln!(out, "\tallowedSignersFile = {}", layout.allowed_signers().display());
    let _ = writeln!(out, "[commit]");
    let _ = writeln!(out, "\tgpgsign = true");
    let _ = writeln!(out, "[tag]");
    let _ = writeln!(out, "\tgpgsign = true");
    out
}

/// Render managed block of conditional includes for `~/.gitconfig`.
///
/// One `includeIf` section per folder of every identity.
///
/// # Errors
///
/// - Return [`RenderError::Expand`] if a folder pattern cannot be expanded.
pub fn render_global_git_block(layout: &Layout, identities: &Identities) -> Result<String> {
    let mut out = String::new();
    let _ = writeln!(out, "{BLOCK_BEGIN}");
    let _ = writeln!(out, "# Generated by gitid. Edits inside this block are lost on sync.");
    for identity in identities {
        for folder in &identity.folders {
            let folder = layout.expand(folder)?;
            let _ = writeln!(out, "[includeIf \"gitdir:{}\"]", dir_pattern(&folder));
            let _ = writeln!(
                out,
                "\tpath = {}",
                layout.identity_git_config(&identity.name).display()
            );
        }
    }
    let _ = writeln!(out, "{BLOCK_END}");
    Ok(out)
}

/// Render managed block of host aliases for `~/.ssh/config`.
///
/// Each identity gets a `<name>.<domain>` alias bound to its own key. The
/// block ends with `Match all` so that whatever follows it in the file is not
/// swallowed by the last host alias.
pub fn render_ssh_block(layout: &Layout, identities: &Identities) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{BLOCK_BEGIN}");
    let _ = writeln!(out, "# Generated by gitid. Edits inside this block are lost on sync.");
    for identity in identities {
        let _ = writeln!(out, "Host {}.{}", identity.name, identity.domain);
        let _ = writeln!(out, "    HostName {}", identity.domain);
        let _ = writeln!(out, "    User git");
        let _ = writeln!(out, "    IdentityFile {}", layout.private_key(&identity.name).display());
        let _ = writeln!(out, "    IdentitiesOnly yes");
        let _ = writeln!(out);
    }
    let _ = writeln!(out, "Match all");
    let _ = writeln!(out, "{BLOCK_END}");
    out
}

/// Render allowed signers file from identity emails and their public keys.
///
/// Identities without a readable public key are skipped by the caller.
pub fn render_allowed_signers<'a>(entries: impl IntoIterator<Item = (&'a str, String)>) -> String {
    let mut out = String::from("# Generated by gitid. Regenerated on every sync.\n");
    for (email, key) in entries {
        let _ = writeln!(out, "{email} namespaces=\"git\" {key}");
    }
    out
}

/// Replace managed block inside of existing file content.
///
/// Appends block if file has none yet. A block missing its end delimiter
/// extends to the end of the file.
pub fn splice_managed_block(existing: &str, block: &str) -> String {
    let lines = existing.split_inclusive('\n').collect::<Vec<_>>();
    let Some(begin) = lines.iter().position(|line| line.trim_end() == BLOCK_BEGIN) else {
        let mut out = existing.to_string();
        if !out.is_empty() {
            if !out.ends_with('\n') {
                out.push('\n');
            }
            out.push('\n');
        }
        out.push_str(block);
        return out;
    };

    let end = lines[begin..]
        .iter()
        .position(|line| line.trim_end() == BLOCK_END)
        .map(|offset| begin + offset + 1)
        .unwrap_or(lines.len());

    let mut out = String::with_capacity(existing.len() + block.len());
    out.extend(lines[..begin].iter().copied());
    out.push_str(block);
    out.extend(lines[end..].iter().copied());
    out
}

/// Write git config of a single identity.
///
/// # Errors
///
/// - Return [`RenderError::Write`] if file cannot be written.
pub fn write_identity_git_config(layout: &Layout, identity: &Identity) -> Result<PathBuf> {
    let path = layout.identity_git_config(&identity.name);
    write(&path, render_identity_git_config(layout, identity))?;
    Ok(path)
}

/// Regenerate managed block of `~/.gitconfig`.
///
/// # Errors
///
/// - Return [`RenderError::Expand`] if a folder pattern cannot be expanded.
/// - Return [`RenderError::Read`] if existing file cannot be read.
/// - Return [`RenderError::Write`] if file cannot be written.
pub fn write_global_git_config(layout: &Layout, identities: &Identities) -> Result<PathBuf> {
    let path = layout.global_git_config();
    let block = render_global_git_block(layout, identities)?;
    write(&path, splice_managed_block(&read_or_empty(&path)?, &block))?;
    Ok(path)
}

/// Regenerate managed block of `~/.ssh/config`.
///
/// # Errors
///
/// - Return [`RenderError::Read`] if existing file cannot be read.
/// - Return [`RenderError::Write`] if file cannot be written.
pub fn write_ssh_config(layout: &Layout, identities: &Identities) -> Result<PathBuf> {
    let path = layout.ssh_config();
    let block = render_ssh_block(layout, identities);
    write(&path, splice_managed_block(&read_or_empty(&path)?, &block))?;
    Ok(path)
}

/// Regenerate `~/.ssh/allowed_signers` in full.
///
/// # Errors
///
/// - Return [`RenderError::Write`] if file cannot be written.
pub fn write_allowed_signers(layout: &Layout, identities: &Identities) -> Result<PathBuf> {
    let mut entries = Vec::with_capacity(identities.len());
    for identity in identities {
        match ManagedKey::of(layout, &identity.name).read_public() {
            Ok(key) => entries.push((identity.email.as_str(), key.key_material())),
            Err(err) => warn!("no allowed signer for {}: {err}", identity.name),
        }
    }

    let path = layout.allowed_signers();
    write(&path, render_allowed_signers(entries))?;
    Ok(path)
}

fn dir_pattern(folder: &Path) -> String {
    format!("{}/", folder.to_string_lossy().trim_end_matches('/'))
}

fn quote_git_value(value: &str) -> String {
    if value.starts_with(' ') || value.ends_with(' ') || value.contains(['#', ';', '"', '\\']) {
        let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
        return format!("\"{escaped}\"");
    }

    value.to_string()
}

fn read_or_empty(path: &Path) -> Result<String> {
    match read_to_string(path) {
        Ok(data) => Ok(data),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(source) => Err(RenderError::Read {
            source,
            path: path.to_path_buf(),
        }),
    }
}

fn write(path: &Path, contents: String) -> Result<()> {
    debug!("write {:?}", path.display());
    write_atomic(path, contents).map_err(|source| RenderError::Write {
        source,
        path: path.to_path_buf(),
    })
}

/// Configuration rendering error types.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    Expand(#[from] PathError),

    #[error("failed to read {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    #[error("failed to write {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = RenderError> = std::result::Result<T, E>;
