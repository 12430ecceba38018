// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{identity_config, HomeFixture};

use gitid::detect::detect_identity;

use anyhow::Result;
use indoc::indoc;
use simple_test_case::test_case;

const WORK_FIRST: &str = indoc! {r#"
    {
      "identities": {
        "work": { "user": "Jane", "email": "jane@company.com", "domain": "github.com", "folders": ["~/Work"] },
        "client": { "user": "Jane", "email": "jane@client.io", "domain": "gitlab.com", "folders": ["~/Work/client"] }
      }
    }
"#};

const CLIENT_FIRST: &str = indoc! {r#"
    {
      "identities": {
        "client": { "user": "Jane", "email": "jane@client.io", "domain": "gitlab.com", "folders": ["~/Work/client"] },
        "work": { "user": "Jane", "email": "jane@company.com", "domain": "github.com", "folders": ["~/Work"] }
      }
    }
"#};

#[test_case(WORK_FIRST, "work"; "work declared first")]
#[test_case(CLIENT_FIRST, "client"; "client declared first")]
#[test]
fn overlapping_folders_resolve_in_declaration_order(json: &str, expect: &str) {
    let home = HomeFixture::new().unwrap();
    let config = identity_config(json).unwrap();
    let dir = home.layout().home().join("Work/client/app");

    let found = detect_identity(home.layout(), &config.identities, dir);
    pretty_assertions::assert_eq!(found.map(|found| found.identity.name.as_str()), Some(expect));
}

#[test]
fn unmanaged_directory_has_no_identity() -> Result<()> {
    let home = HomeFixture::new()?;
    let config = identity_config(WORK_FIRST)?;
    let dir = home.layout().home().join("Downloads");

    assert!(detect_identity(home.layout(), &config.identities, dir).is_none());

    Ok(())
}
