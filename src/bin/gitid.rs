// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use gitid::{
    detect::detect_identity,
    path::Layout,
    state::RunState,
    status::{count_git_repos, effective_author, humanize_since, truncate, IdentityStatus, STATUS_LEGEND},
    store::{IdentityStore, StoreError},
    sync::{key::fingerprint_of, tools::SystemToolchain},
    IdentityConfig, Reconciler,
};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use std::{path::PathBuf, process::exit};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const EXAMPLE_IDENTITY: &str = r#"{
  "identities": {
    "github-work": {
      "user": "your-username",
      "email": "work@company.com",
      "domain": "github.com",
      "folders": ["~/Work/Github"]
    }
  }
}"#;

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "gitid [options] <gitid-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to identity store instead of "~/.git-identities.json".
    #[arg(short, long, global = true, value_name = "path")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let layout = Layout::try_default()?;
        let store = match self.config {
            Some(path) => IdentityStore::new(path),
            None => IdentityStore::new(layout.store_file()),
        };

        match self.command {
            Command::Sync(opts) => run_sync(layout, store, opts),
            Command::Where(opts) => run_where(layout, store, opts),
            Command::Ls(opts) => run_ls(layout, store, opts),
            Command::Status(opts) => run_status(layout, store, opts),
            Command::Info(opts) => run_info(layout, store, opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Synchronize keys and git configs with identity store.
    #[command(override_usage = "gitid sync [options]")]
    Sync(SyncOptions),

    /// Show which identity governs a directory.
    #[command(override_usage = "gitid where [options] [path]")]
    Where(WhereOptions),

    /// List all identities.
    #[command(override_usage = "gitid ls [options]")]
    Ls(LsOptions),

    /// Show status of all identities with their last sync time.
    #[command(override_usage = "gitid status [options]")]
    Status(StatusOptions),

    /// Show detailed information about one identity.
    #[command(override_usage = "gitid info [options] <identity>")]
    Info(InfoOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SyncOptions {
    /// Number of orphan backup archives to keep.
    #[arg(short, long, value_name = "count", default_value_t = 10)]
    pub keep_backups: usize,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct WhereOptions {
    /// Directory to inspect instead of the current directory.
    #[arg(value_name = "path")]
    pub path: Option<PathBuf>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct LsOptions {}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct StatusOptions {}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct InfoOptions {
    /// Name of identity to describe.
    #[arg(required = true, value_name = "identity")]
    pub identity: String,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}

fn run_sync(layout: Layout, store: IdentityStore, opts: SyncOptions) -> Result<()> {
    if !store.exists() {
        store.create_example()?;
        info!("created example identity store at {:?}", store.path().display());
        println!("Edit {} with your identities, then run 'gitid sync' again.", store.path().display());
        return Ok(());
    }

    let config = match store.load() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("Fix the identity store, then run 'gitid sync' again.");
            eprintln!();
            eprintln!("Example identity structure:");
            eprintln!("{EXAMPLE_IDENTITY}");
            return Err(error.into());
        }
    };

    let reconciler = Reconciler::new(layout, SystemToolchain).keep_backups(opts.keep_backups);
    let result = reconciler.sync(&config)?;
    print!("{result}");

    if !result.is_success() {
        return Err(anyhow!("{} identities failed to sync", result.failed.len()));
    }

    Ok(())
}

fn run_where(layout: Layout, store: IdentityStore, opts: WhereOptions) -> Result<()> {
    let config = load(&store)?;
    let dir = match opts.path {
        Some(path) => path,
        None => std::env::current_dir()?,
    };
    let dir = dir.canonicalize().unwrap_or(dir);

    let Some(found) = detect_identity(&layout, &config.identities, &dir) else {
        println!("⚠ No identity detected for {}", dir.display());
        println!();
        println!("Available identities:");
        for identity in &config.identities {
            println!("  {}: {}", identity.name, identity.folders.join(", "));
        }
        println!();
        println!("Move your repository into one of these folders to use an identity.");
        return Err(anyhow!("no identity governs {:?}", dir.display()));
    };

    let identity = found.identity;
    let name = identity.name.as_str();
    println!("✓ Identity detected: {name}");
    println!();
    println!("User:        {}", identity.user);
    println!("Email:       {}", identity.email);
    println!("Domain:      {}", identity.domain);
    println!("SSH Key:     {}", layout.tildify(layout.private_key(name)));
    println!("Folder:      {} (matches {})", dir.display(), found.pattern);
    println!();
    println!("Git config:  {}", layout.tildify(layout.identity_git_config(name)));
    println!("Applied via: [includeIf \"gitdir:{}/\"]", found.folder.display());
    println!();

    println!("Verification:");
    match effective_author(&dir) {
        Some(author) if author.matches(identity) => println!("  ✓ Git configuration matches identity"),
        Some(_) => println!("  ⚠ Git configuration does not match (run 'gitid sync')"),
        None => println!("  ℹ Not in a git repository"),
    }

    if IdentityStatus::of(&layout, identity) == IdentityStatus::KeyMissing {
        println!("  ⚠ SSH key missing (run 'gitid sync')");
    } else {
        println!("  ✓ SSH key exists");
    }

    Ok(())
}

fn run_ls(layout: Layout, store: IdentityStore, _: LsOptions) -> Result<()> {
    let config = load(&store)?;
    if config.identities.is_empty() {
        println!("No identities configured");
        return Ok(());
    }

    print_table(&layout, &config, None);
    println!();
    println!("{STATUS_LEGEND}");

    Ok(())
}

fn run_status(layout: Layout, store: IdentityStore, _: StatusOptions) -> Result<()> {
    let config = load(&store)?;
    let state = match RunState::load(layout.state_file()) {
        Ok(state) => Some(state),
        Err(error) => {
            warn!("could not load run state: {error}");
            None
        }
    };

    if config.identities.is_empty() {
        println!("No identities configured");
        return Ok(());
    }

    let now = Utc::now();
    print_table(&layout, &config, Some((state.as_ref(), now)));
    println!();

    let active = config
        .identities
        .iter()
        .filter(|identity| IdentityStatus::of(&layout, identity).is_active())
        .count();
    match state.as_ref().and_then(|state| state.last_sync) {
        Some(last) => println!(
            "Summary: {active} identities active | Last global sync: {}",
            humanize_since(last, now)
        ),
        None => println!("Summary: {active} identities active | Never synced"),
    }

    println!();
    println!("{STATUS_LEGEND}");

    Ok(())
}

fn run_info(layout: Layout, store: IdentityStore, opts: InfoOptions) -> Result<()> {
    let config = load(&store)?;
    let Some(identity) = config.identities.get(&opts.identity) else {
        eprintln!("Available identities:");
        for name in config.identities.names() {
            eprintln!("  - {name}");
        }
        return Err(anyhow!("identity {:?} not found", opts.identity));
    };

    let name = identity.name.as_str();
    println!("Identity: {name}");
    println!("Domain:   {}", identity.domain);
    println!("User:     {}", identity.user);
    println!("Email:    {}", identity.email);
    println!();

    let private = layout.private_key(name);
    let public = layout.public_key(name);
    println!("SSH Key:        {}", layout.tildify(&private));
    match private.metadata().and_then(|meta| meta.modified()) {
        Ok(modified) => {
            if let Some(fingerprint) = fingerprint_of(&public) {
                println!("  Fingerprint:  {fingerprint}");
            }
            let modified = DateTime::<Local>::from(modified);
            println!("  Modified:     {}", modified.format("%Y-%m-%d %H:%M:%S"));
        }
        Err(_) => println!("  Status:       ⚠ Not found"),
    }
    println!("  Public key:   {}", layout.tildify(&public));
    println!();

    let git_config = layout.identity_git_config(name);
    println!("Git Config:     {}", layout.tildify(&git_config));
    if git_config.is_file() {
        println!("  Status:       ✓ Exists");
        println!("  Signing:      Enabled (SSH)");
        println!("  SSH command:  ssh -i {}", layout.tildify(&private));
    } else {
        println!("  Status:       ⚠ Not found");
    }
    println!();

    println!("Folders ({}):", identity.folders.len());
    for (index, pattern) in identity.folders.iter().enumerate() {
        let state = match layout.expand(pattern) {
            Ok(folder) if folder.is_dir() => match count_git_repos(&folder) {
                0 => "✓ exists".to_string(),
                repos => format!("✓ exists ({repos} repos)"),
            },
            Ok(_) => "⚠ does not exist".to_string(),
            Err(error) => format!("✗ {error}"),
        };
        println!("  {}. {pattern}  {state}", index + 1);
    }
    println!();

    let status = match IdentityStatus::of(&layout, identity) {
        IdentityStatus::Active => "✓ Fully configured",
        IdentityStatus::KeyMissing => "⚠ SSH key missing",
        IdentityStatus::ConfigMissing => "⚠ Git config missing",
    };
    println!("Status: {status}");
    if !IdentityStatus::of(&layout, identity).is_active() {
        println!();
        println!("Run 'gitid sync' to fix issues");
    }

    Ok(())
}

fn load(store: &IdentityStore) -> Result<IdentityConfig> {
    match store.load() {
        Ok(config) => Ok(config),
        Err(error @ StoreError::NotFound { .. }) => {
            eprintln!("Run 'gitid sync' to create an example identity store.");
            Err(error.into())
        }
        Err(error) => Err(error.into()),
    }
}

fn print_table(layout: &Layout, config: &IdentityConfig, last_sync: Option<(Option<&RunState>, DateTime<Utc>)>) {
    let mut header = format!(
        "{:<20} {:<15} {:<25} {:<15} {:<20} {:<15}",
        "IDENTITY", "USER", "EMAIL", "DOMAIN", "FOLDERS", "STATUS"
    );
    if last_sync.is_some() {
        header.push_str(" LAST SYNC");
    }
    println!("{}", header.trim_end());
    println!("{}", "-".repeat(header.chars().count()));

    for identity in &config.identities {
        let first = identity.folders.first().map(String::as_str).unwrap_or_default();
        let mut row = format!(
            "{:<20} {:<15} {:<25} {:<15} {:<20} {:<15}",
            identity.name,
            truncate(&identity.user, 15),
            truncate(&identity.email, 25),
            identity.domain,
            truncate(first, 20),
            IdentityStatus::of(layout, identity).to_string(),
        );

        if let Some((state, now)) = last_sync {
            let when = state
                .and_then(|state| state.last_sync_of(&identity.name))
                .map(|then| humanize_since(then, now))
                .unwrap_or_else(|| "Never".into());
            row.push(' ');
            row.push_str(&when);
        }
        println!("{}", row.trim_end());

        for folder in identity.folders.iter().skip(1) {
            println!("{:<20} {:<15} {:<25} {:<15} {}", "", "", "", "", truncate(folder, 20));
        }
    }
}
