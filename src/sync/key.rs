// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Managed SSH keypairs.

use crate::path::Layout;

use base64::{
    engine::general_purpose::{STANDARD, STANDARD_NO_PAD},
    Engine as _,
};
use sha2::{Digest, Sha256};
use std::{
    fs::read_to_string,
    path::{Path, PathBuf},
};

/// Private and public key files of an identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedKey {
    pub private: PathBuf,
    pub public: PathBuf,
}

impl ManagedKey {
    pub fn of(layout: &Layout, name: &str) -> Self {
        Self {
            private: layout.private_key(name),
            public: layout.public_key(name),
        }
    }

    /// Both halves of keypair are present.
    pub fn exists(&self) -> bool {
        self.private.is_file() && self.public.is_file()
    }

    /// Read and parse public half of keypair.
    pub fn read_public(&self) -> std::io::Result<PublicKey> {
        let data = read_to_string(&self.public)?;
        PublicKey::parse(&data).ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("malformed public key at {:?}", self.public.display()),
            )
        })
    }
}

/// OpenSSH public key line, i.e., `<algorithm> <base64 blob> [comment]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    pub algorithm: String,
    pub blob: String,
    pub comment: Option<String>,
}

impl PublicKey {
    /// Parse first non-empty line of public key file.
    pub fn parse(data: &str) -> Option<Self> {
        let line = data.lines().map(str::trim).find(|line| !line.is_empty())?;
        let mut fields = line.splitn(3, char::is_whitespace);
        let algorithm = fields.next()?.to_string();
        let blob = fields.next()?.to_string();
        let comment = fields
            .next()
            .map(str::trim)
            .filter(|comment| !comment.is_empty())
            .map(ToString::to_string);

        Some(Self {
            algorithm,
            blob,
            comment,
        })
    }

    /// OpenSSH style SHA256 fingerprint of key blob.
    ///
    /// Same value as `ssh-keygen -l` reports, e.g., `SHA256:uNi...`.
    pub fn fingerprint(&self) -> Option<String> {
        let blob = STANDARD.decode(self.blob.as_bytes()).ok()?;
        let digest = Sha256::digest(&blob);
        Some(format!("SHA256:{}", STANDARD_NO_PAD.encode(digest)))
    }

    /// Key without comment, as used in allowed signers entries.
    pub fn key_material(&self) -> String {
        format!("{} {}", self.algorithm, self.blob)
    }
}

/// Fingerprint public key at path, if it exists and is well formed.
pub fn fingerprint_of(path: impl AsRef<Path>) -> Option<String> {
    read_to_string(path)
        .ok()
        .as_deref()
        .and_then(PublicKey::parse)
        .and_then(|key| key.fingerprint())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // Well-formed ed25519 public key line, not tied to any private key.
    const KEY: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIGq7hV3x0mHF0yMZ9oUq0QeF1kqF4cJ7VvLhJ7OZyC8e jane@company.com [gitid:work]\n";

    #[test]
    fn parse_public_key() {
        let key = PublicKey::parse(KEY).unwrap();
        assert_eq!(key.algorithm, "ssh-ed25519");
        assert_eq!(
            key.blob,
            "AAAAC3NzaC1lZDI1NTE5AAAAIGq7hV3x0mHF0yMZ9oUq0QeF1kqF4cJ7VvLhJ7OZyC8e"
        );
        assert_eq!(key.comment.as_deref(), Some("jane@company.com [gitid:work]"));
        assert_eq!(
            key.key_material(),
            "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIGq7hV3x0mHF0yMZ9oUq0QeF1kqF4cJ7VvLhJ7OZyC8e"
        );
    }

    #[test]
    fn fingerprint_matches_ssh_keygen() {
        // Value printed by `ssh-keygen -lf` for the same key.
        let key = PublicKey::parse(KEY).unwrap();
        assert_eq!(
            key.fingerprint().as_deref(),
            Some("SHA256:hpyDY1EfH43BMjn7LP4KGG+WYPR2d9uV+xSX4oje6no")
        );
    }

    #[test]
    fn reject_garbage() {
        assert_eq!(PublicKey::parse(""), None);
        assert_eq!(PublicKey::parse("ssh-ed25519"), None);
        let key = PublicKey::parse("ssh-ed25519 not*base64").unwrap();
        assert_eq!(key.fingerprint(), None);
    }
}
