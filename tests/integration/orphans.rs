// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{identity_config, FakeToolchain, HomeFixture};

use gitid::{state::RunState, Layout};

use anyhow::Result;
use flate2::read::GzDecoder;
use indoc::indoc;
use pretty_assertions::assert_eq;
use std::{
    collections::BTreeSet,
    fs::{create_dir_all, read, read_dir, remove_dir_all, write, File},
    path::PathBuf,
};

const WORK: &str = indoc! {r#"
    {
      "identities": {
        "work": {
          "user": "Jane Doe",
          "email": "jane@company.com",
          "domain": "github.com",
          "folders": ["~/Work"]
        }
      }
    }
"#};

const WORK_AND_OLD: &str = indoc! {r#"
    {
      "identities": {
        "work": {
          "user": "Jane Doe",
          "email": "jane@company.com",
          "domain": "github.com",
          "folders": ["~/Work"]
        },
        "old": {
          "user": "Jane Doe",
          "email": "jane@oldjob.com",
          "domain": "gitlab.com",
          "folders": ["~/Old"]
        }
      }
    }
"#};

fn archives(layout: &Layout) -> Result<Vec<PathBuf>> {
    let mut archives = Vec::new();
    for entry in read_dir(layout.backup_dir())? {
        archives.push(entry?.path());
    }
    archives.sort();
    Ok(archives)
}

fn entry_names(archive: &PathBuf) -> Result<BTreeSet<String>> {
    let mut names = BTreeSet::new();
    let mut archive = tar::Archive::new(GzDecoder::new(File::open(archive)?));
    for entry in archive.entries()? {
        names.insert(entry?.path()?.to_string_lossy().into_owned());
    }
    Ok(names)
}

#[test]
fn removed_identity_is_backed_up_then_deleted() -> Result<()> {
    let home = HomeFixture::new()?;
    let layout = home.layout();
    let reconciler = home.reconciler(FakeToolchain::new());

    reconciler.sync(&identity_config(WORK_AND_OLD)?)?;
    assert!(layout.private_key("old").is_file());
    assert!(RunState::load(layout.state_file())?.identities.contains_key("old"));
    let work_key = read(layout.private_key("work"))?;

    let result = reconciler.sync(&identity_config(WORK)?)?;
    assert_eq!(result.orphans_removed, ["old"]);
    assert!(result.created.is_empty());

    for gone in [
        layout.private_key("old"),
        layout.public_key("old"),
        layout.public_key_copy("old"),
        layout.identity_git_config("old"),
        layout.service_folder("old"),
    ] {
        assert!(!gone.exists(), "{gone:?} should be removed");
    }
    assert_eq!(read(layout.private_key("work"))?, work_key);

    let archives = archives(layout)?;
    assert_eq!(archives.len(), 1);
    let names = entry_names(&archives[0])?;
    for name in ["old_key", "old_key.pub", ".gitconfig-old"] {
        assert!(names.contains(name), "archive lacks {name}");
    }

    let state = RunState::load(layout.state_file())?;
    assert!(!state.identities.contains_key("old"));
    assert!(state.identities.contains_key("work"));

    let global = home.read(layout.global_git_config())?;
    assert!(!global.contains(".gitconfig-old"));

    Ok(())
}

#[test]
fn orphan_cleanup_runs_once() -> Result<()> {
    let home = HomeFixture::new()?;
    let layout = home.layout();
    let reconciler = home.reconciler(FakeToolchain::new());

    reconciler.sync(&identity_config(WORK_AND_OLD)?)?;
    reconciler.sync(&identity_config(WORK)?)?;
    let result = reconciler.sync(&identity_config(WORK)?)?;

    assert!(result.orphans_removed.is_empty());
    assert_eq!(archives(layout)?.len(), 1);

    Ok(())
}

#[test]
fn non_empty_service_folder_is_kept() -> Result<()> {
    let home = HomeFixture::new()?;
    let layout = home.layout();
    let reconciler = home.reconciler(FakeToolchain::new());

    reconciler.sync(&identity_config(WORK_AND_OLD)?)?;
    let notes = layout.service_folder("old").join("notes.txt");
    write(&notes, "still mine")?;

    reconciler.sync(&identity_config(WORK)?)?;
    assert_eq!(home.read(&notes)?, "still mine");
    assert!(!layout.private_key("old").exists());

    Ok(())
}

#[test]
fn unmarked_keys_are_left_alone() -> Result<()> {
    let home = HomeFixture::new()?;
    let layout = home.layout();
    let reconciler = home.reconciler(FakeToolchain::new());

    reconciler.sync(&identity_config(WORK)?)?;
    let personal = layout.ssh_dir().join("id_ed25519.pub");
    write(&personal, "ssh-ed25519 AAAA me@laptop\n")?;

    let result = reconciler.sync(&identity_config(WORK)?)?;
    assert!(result.orphans_removed.is_empty());
    assert!(personal.is_file());

    Ok(())
}

#[test]
fn keys_at_unexpected_paths_are_cleaned_up() -> Result<()> {
    let home = HomeFixture::new()?;
    let layout = home.layout();
    let reconciler = home.reconciler(FakeToolchain::new());

    reconciler.sync(&identity_config(WORK)?)?;
    let moved = layout.ssh_dir().join("legacy");
    let moved_pub = layout.ssh_dir().join("legacy.pub");
    write(&moved, "private")?;
    write(&moved_pub, "ssh-ed25519 AAAA jane@oldjob.com [gitid:legacy]\n")?;

    let result = reconciler.sync(&identity_config(WORK)?)?;
    assert_eq!(result.orphans_removed, ["legacy"]);
    assert!(!moved.exists());
    assert!(!moved_pub.exists());

    let names = entry_names(&archives(layout)?[0])?;
    assert_eq!(names, BTreeSet::from(["legacy".to_string(), "legacy.pub".to_string()]));

    Ok(())
}

#[test]
fn failed_backup_does_not_block_cleanup() -> Result<()> {
    let home = HomeFixture::new()?;
    let layout = home.layout();
    let reconciler = home.reconciler(FakeToolchain::new());

    reconciler.sync(&identity_config(WORK_AND_OLD)?)?;
    let backup_dir = layout.backup_dir();
    if backup_dir.exists() {
        remove_dir_all(&backup_dir)?;
    }
    if let Some(parent) = backup_dir.parent() {
        create_dir_all(parent)?;
    }
    write(&backup_dir, "not a directory")?;

    let result = reconciler.sync(&identity_config(WORK)?)?;
    assert_eq!(result.orphans_removed, ["old"]);
    assert!(result.is_success());
    assert!(!layout.private_key("old").exists());
    assert!(!layout.identity_git_config("old").exists());
    assert_eq!(home.read(&backup_dir)?, "not a directory");

    Ok(())
}
