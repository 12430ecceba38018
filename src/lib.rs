// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Folder-scoped git identities.
//!
//! Gitid keeps several git identities side by side on one machine. Each
//! __identity__ names a commit author, a forge domain, and a set of folders.
//! Every repository living under one of those folders commits as that
//! identity, and signs its commits with an SSH key that gitid generated for
//! it.
//!
//! # Managed Artifacts
//!
//! Everything gitid writes is derived from the identity store at
//! `~/.git-identities.json`:
//!
//! - One ed25519 keypair per identity at `~/.ssh/<name>_key`, whose comment
//!   carries an ownership [marker](sync::marker).
//! - One git config per identity at `~/.gitconfig-<name>`.
//! - A managed block of conditional includes in `~/.gitconfig`.
//! - A managed block of host aliases in `~/.ssh/config`.
//! - The whole of `~/.ssh/allowed_signers`.
//!
//! The marker is what lets a later [sync](sync::Reconciler::sync) recognize
//! keys and configs whose identity has since been deleted from the store, so
//! they can be backed up and removed.

pub mod config;
pub mod detect;
pub mod path;
pub mod state;
pub mod status;
pub mod store;
pub mod sync;

pub use config::{Identities, Identity, IdentityConfig};
pub use path::Layout;
pub use store::IdentityStore;
pub use sync::{Reconciler, SyncResult};
