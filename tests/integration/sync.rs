// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{identity_config, Call, FakeToolchain, HomeFixture, KEY_BLOB};

use gitid::{state::RunState, sync::tools::ProbeOutput};

use anyhow::Result;
use indoc::indoc;
use pretty_assertions::assert_eq;
use std::fs::{create_dir_all, read, write};

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

const WORK_AND_PLAY: &str = indoc! {r#"
    {
      "identities": {
        "work": {
          "user": "Jane Doe",
          "email": "jane@company.com",
          "domain": "github.com",
          "folders": ["~/Work"]
        },
        "play": {
          "user": "jdoe",
          "email": "jdoe@example.org",
          "domain": "codeberg.org",
          "folders": ["~/Play"]
        }
      }
    }
"#};

#[test]
fn fresh_identity_is_created() -> Result<()> {
    let home = HomeFixture::new()?;
    let layout = home.layout();
    let reconciler = home.reconciler(FakeToolchain::new());

    let result = reconciler.sync(&identity_config(WORK)?)?;
    assert_eq!(result.created, ["work"]);
    assert_eq!(result.verified, ["work"]);
    assert!(result.orphans_removed.is_empty());
    assert!(result.is_success());

    assert!(layout.home().join("Work").is_dir());
    assert!(layout.private_key("work").is_file());
    let public = home.read(layout.public_key("work"))?;
    assert_eq!(public, format!("ssh-ed25519 {KEY_BLOB} jane@company.com [gitid:work]\n"));
    assert_eq!(home.read(layout.public_key_copy("work"))?, public);

    let git_config = home.read(layout.identity_git_config("work"))?;
    assert!(git_config.starts_with("# Managed by gitid [gitid:work]."));
    assert!(git_config.contains("\temail = jane@company.com\n"));

    let global = home.read(layout.global_git_config())?;
    let include = format!("[includeIf \"gitdir:{}/\"]", layout.home().join("Work").display());
    assert!(global.contains(&include));

    let ssh_config = home.read(layout.ssh_config())?;
    assert!(ssh_config.contains("Host work.github.com\n"));

    let signers = home.read(layout.allowed_signers())?;
    let entry = format!("jane@company.com namespaces=\"git\" ssh-ed25519 {KEY_BLOB}\n");
    assert!(signers.contains(&entry));

    let state = RunState::load(layout.state_file())?;
    assert!(state.last_sync.is_some());
    assert_eq!(
        state.identities["work"].ssh_key_fingerprint,
        "SHA256:hpyDY1EfH43BMjn7LP4KGG+WYPR2d9uV+xSX4oje6no"
    );

    let private = layout.private_key("work");
    let expect = vec![
        Call::GenerateKey(private.clone()),
        Call::AgentRemove(private.clone()),
        Call::AgentAdd(private.clone()),
        Call::Probe("github.com".into(), private),
    ];
    assert_eq!(reconciler.tools().calls(), expect);

    Ok(())
}

#[test]
fn second_sync_changes_nothing() -> Result<()> {
    let home = HomeFixture::new()?;
    let layout = home.layout();
    let reconciler = home.reconciler(FakeToolchain::new());
    let config = identity_config(WORK_AND_PLAY)?;

    reconciler.sync(&config)?;
    let globals = [
        layout.global_git_config(),
        layout.ssh_config(),
        layout.allowed_signers(),
        layout.identity_git_config("work"),
        layout.identity_git_config("play"),
    ];
    let before = globals.iter().map(read).collect::<Result<Vec<_>, _>>()?;

    let result = reconciler.sync(&config)?;
    assert!(result.created.is_empty());
    assert!(result.orphans_removed.is_empty());
    assert_eq!(result.verified, ["work", "play"]);
    assert_eq!(reconciler.tools().keygen_count(), 2);

    let after = globals.iter().map(read).collect::<Result<Vec<_>, _>>()?;
    assert_eq!(after, before);

    Ok(())
}

#[test]
fn existing_key_is_never_regenerated() -> Result<()> {
    let home = HomeFixture::new()?;
    let layout = home.layout();
    create_dir_all(layout.ssh_dir())?;
    write(layout.private_key("work"), "my precious private key")?;
    write(
        layout.public_key("work"),
        format!("ssh-ed25519 {KEY_BLOB} jane@company.com [gitid:work]\n"),
    )?;

    let reconciler = home.reconciler(FakeToolchain::new());
    let result = reconciler.sync(&identity_config(WORK)?)?;

    assert!(result.created.is_empty());
    assert_eq!(reconciler.tools().keygen_count(), 0);
    assert_eq!(home.read(layout.private_key("work"))?, "my precious private key");
    assert!(!layout.public_key_copy("work").exists());
    assert!(layout.identity_git_config("work").is_file());

    Ok(())
}

#[test]
fn lone_key_half_is_replaced() -> Result<()> {
    let home = HomeFixture::new()?;
    let layout = home.layout();
    create_dir_all(layout.ssh_dir())?;
    write(layout.private_key("work"), "half a keypair")?;

    let reconciler = home.reconciler(FakeToolchain::new());
    let result = reconciler.sync(&identity_config(WORK)?)?;

    assert_eq!(result.created, ["work"]);
    assert!(layout.public_key("work").is_file());
    assert_ne!(home.read(layout.private_key("work"))?, "half a keypair");

    Ok(())
}

#[test]
fn failed_keygen_stops_only_that_identity() -> Result<()> {
    let home = HomeFixture::new()?;
    let layout = home.layout();
    let tools = FakeToolchain::new().break_keygen(layout.private_key("play"));
    let reconciler = home.reconciler(tools);

    let result = reconciler.sync(&identity_config(WORK_AND_PLAY)?)?;
    assert_eq!(result.created, ["work"]);
    assert_eq!(result.verified, ["work"]);
    assert_eq!(result.failed.keys().collect::<Vec<_>>(), ["play"]);
    assert!(!result.is_success());

    assert!(layout.home().join("Play").is_dir());
    assert!(!layout.identity_git_config("play").exists());
    assert!(layout.identity_git_config("work").is_file());

    let signers = home.read(layout.allowed_signers())?;
    assert!(signers.contains("jane@company.com"));
    assert!(!signers.contains("jdoe@example.org"));

    let state = RunState::load(layout.state_file())?;
    assert!(state.identities.contains_key("work"));
    assert!(!state.identities.contains_key("play"));

    Ok(())
}

#[test]
fn denied_probe_is_not_a_failure() -> Result<()> {
    let home = HomeFixture::new()?;
    let tools = FakeToolchain::new().reply(ProbeOutput::new(
        "git@github.com: Permission denied (publickey).",
        false,
    ));
    let reconciler = home.reconciler(tools);

    let result = reconciler.sync(&identity_config(WORK)?)?;
    assert_eq!(result.created, ["work"]);
    assert!(result.verified.is_empty());
    assert!(result.is_success());

    Ok(())
}

#[test]
fn user_content_of_shared_configs_is_preserved() -> Result<()> {
    let home = HomeFixture::new()?;
    let layout = home.layout();
    create_dir_all(layout.ssh_dir())?;
    write(layout.global_git_config(), "[core]\n\teditor = vim\n")?;
    write(layout.ssh_config(), "Host *\n    AddKeysToAgent yes\n")?;

    let reconciler = home.reconciler(FakeToolchain::new());
    reconciler.sync(&identity_config(WORK)?)?;

    let global = home.read(layout.global_git_config())?;
    assert!(global.starts_with("[core]\n\teditor = vim\n\n# >>> gitid managed block >>>\n"));

    let ssh_config = home.read(layout.ssh_config())?;
    assert!(ssh_config.starts_with("Host *\n    AddKeysToAgent yes\n\n# >>> gitid managed block >>>\n"));

    Ok(())
}

#[test]
fn key_created_before_hard_stop_is_still_reported() -> Result<()> {
    let home = HomeFixture::new()?;
    let layout = home.layout();
    let blocker = layout.identity_git_config("work");
    create_dir_all(blocker.join("in-the-way"))?;

    let reconciler = home.reconciler(FakeToolchain::new());
    let result = reconciler.sync(&identity_config(WORK)?)?;
    assert_eq!(result.created, ["work"]);
    assert!(result.verified.is_empty());
    assert_eq!(result.failed.keys().collect::<Vec<_>>(), ["work"]);
    assert!(layout.private_key("work").is_file());

    let summary = result.to_string();
    assert!(summary.contains("keys created:    1"));
    assert!(summary.contains("Next steps:"));
    assert!(summary.contains("work: ~/work_key.pub"));

    std::fs::remove_dir_all(&blocker)?;
    let result = reconciler.sync(&identity_config(WORK)?)?;
    assert!(result.created.is_empty());
    assert!(result.is_success());
    assert_eq!(reconciler.tools().keygen_count(), 1);
    assert!(blocker.is_file());

    Ok(())
}
