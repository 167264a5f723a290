//! Repowatch — track new issues and pull requests across GitHub repositories.
//!
//! CLI commands edit the tracked list and options; the `watch` subcommand
//! runs a background process that reconciles every repository on an
//! interval, keeps the badge count current, and renders notifications for
//! items past each repository's watermark.

mod bus;
mod config;
mod github;
mod ipc;
mod model;
mod notify;
mod reconcile;
mod store;
mod watch;
mod window;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use std::path::{Path, PathBuf};

use crate::bus::{EventBus, UpdateOrigin};
use crate::config::WatchConfig;
use crate::github::{ActivityFetcher, GitHubFetcher};
use crate::model::TrackedRepository;
use crate::notify::{BadgeDisplay, NotifyMode};
use crate::store::Store;

/// Repowatch — GitHub repository activity tracker.
#[derive(Parser)]
#[command(name = "repowatch", version, about)]
struct Cli {
    /// Data directory (defaults to the platform data dir).
    #[arg(short = 'C', long = "data-dir", global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize the data directory and default config.
    Init,

    /// Track a repository.
    Add {
        /// Repository slug, e.g. rust-lang/cargo.
        repo: String,
    },

    /// Stop tracking a repository.
    Remove {
        /// Repository slug, name, or ID prefix.
        repo: String,
    },

    /// List tracked repositories and their cached items.
    List,

    /// Show data dir, watcher, and badge status.
    Status,

    /// Show or change stored options.
    Options {
        #[command(subcommand)]
        action: Option<OptionsAction>,
    },

    /// Run one reconciliation pass now.
    Refresh,

    /// Manage the background watcher.
    Watch {
        #[command(subcommand)]
        action: WatchAction,
    },
}

#[derive(Subcommand)]
enum OptionsAction {
    /// Set the GitHub API key (validated upstream). An empty value clears it.
    SetKey {
        /// Personal access token.
        key: String,
    },
    /// Turn notifications on or off.
    Notifications {
        /// "on" or "off".
        state: String,
    },
}

#[derive(Subcommand)]
enum WatchAction {
    /// Start the watcher (backgrounds by default).
    Start {
        /// Run in foreground instead of daemonizing.
        #[arg(long)]
        foreground: bool,
    },
    /// Stop the running watcher.
    Stop,
    /// Restart the watcher.
    Restart,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let data_dir = resolve_data_dir(cli.data_dir)?;

    match cli.command {
        Command::Init => cmd_init(&data_dir),
        Command::Add { repo } => cmd_add(&data_dir, &repo).await,
        Command::Remove { repo } => cmd_remove(&data_dir, &repo),
        Command::List => cmd_list(&data_dir),
        Command::Status => cmd_status(&data_dir),
        Command::Options { action } => match action {
            None => cmd_options_show(&data_dir),
            Some(OptionsAction::SetKey { key }) => cmd_set_key(&data_dir, &key).await,
            Some(OptionsAction::Notifications { state }) => {
                cmd_notifications(&data_dir, &state)
            }
        },
        Command::Refresh => cmd_refresh(&data_dir).await,
        Command::Watch { action } => match action {
            WatchAction::Start { foreground } => watch::start(&data_dir, foreground).await,
            WatchAction::Stop => watch::stop(&data_dir),
            WatchAction::Restart => {
                let _ = watch::stop(&data_dir);
                watch::start(&data_dir, false).await
            }
        },
    }
}

/// Resolve the data directory: `-C` verbatim, else the platform data dir,
/// else `.repowatch` in the working directory.
fn resolve_data_dir(flag: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = flag {
        return Ok(dir);
    }
    match dirs::data_dir() {
        Some(base) => Ok(base.join("repowatch")),
        None => {
            let cwd = std::env::current_dir().wrap_err("failed to get current directory")?;
            Ok(cwd.join(".repowatch"))
        }
    }
}

/// Initialize the data directory, store keys, and default config.
fn cmd_init(data_dir: &Path) -> Result<()> {
    let store = Store::new(data_dir);
    store.initialize()?;
    let config_path = WatchConfig::write_default(data_dir)?;

    println!("Initialized data dir: {}", data_dir.display());
    println!("Config: {}", config_path.display());
    println!("Run `repowatch add owner/name` to track a repository.");
    Ok(())
}

/// Track a new repository. Fetches once up front so a bad owner/name is
/// rejected here instead of sitting in the list as a permanent error; the
/// fetched backlog is cached but stays out of notifications (`just_added`).
async fn cmd_add(data_dir: &Path, input: &str) -> Result<()> {
    let (owner, name) = model::parse_slug(input)
        .ok_or_else(|| color_eyre::eyre::eyre!("expected owner/name, got {input:?}"))?;

    let store = Store::new(data_dir);
    store.initialize()?;
    let mut repositories = store.repositories()?;

    let slug = format!("{owner}/{name}");
    if repositories.iter().any(|r| r.slug() == slug) {
        color_eyre::eyre::bail!("{slug} is already tracked");
    }

    let options = store.options()?;
    let mut repo = TrackedRepository::blank(owner, name);
    let fetcher = GitHubFetcher::new()?;
    let outcome = fetcher
        .fetch(&repo, &options.api_key)
        .await
        .wrap_err_with(|| format!("failed to reach GitHub for {slug}"))?;
    if let Some(error) = outcome.error {
        color_eyre::eyre::bail!("cannot track {slug}: {error}");
    }
    let cached = outcome.items.len();
    repo.items = outcome.items;
    repo.cache_token = outcome.cache_token;

    let id = repo.id.clone();
    repositories.push(repo);
    store.set_repositories(&repositories)?;
    EventBus::new(data_dir).publish(UpdateOrigin::Foreground)?;

    println!("Tracking {slug} (ID: {id})");
    println!("{cached} item(s) from the last day cached; new activity will notify.");
    Ok(())
}

/// Stop tracking a repository, matched by slug, name, or ID prefix.
fn cmd_remove(data_dir: &Path, target: &str) -> Result<()> {
    let store = Store::new(data_dir);
    let mut repositories = store.repositories()?;

    // An exact slug match wins; otherwise fall back to name or ID prefix.
    let mut matching: Vec<usize> = repositories
        .iter()
        .enumerate()
        .filter(|(_, r)| r.slug() == target)
        .map(|(i, _)| i)
        .collect();
    if matching.is_empty() {
        matching = repositories
            .iter()
            .enumerate()
            .filter(|(_, r)| r.name == target || r.id.starts_with(target))
            .map(|(i, _)| i)
            .collect();
    }

    match matching.len() {
        0 => {
            color_eyre::eyre::bail!("no tracked repository matches {target:?}");
        }
        1 => {
            let repo = repositories.remove(matching[0]);
            store.set_repositories(&repositories)?;
            EventBus::new(data_dir).publish(UpdateOrigin::Foreground)?;
            println!("Removed {} (ID: {})", repo.slug(), repo.id);
        }
        _ => {
            eprintln!("Multiple repositories match {target:?}:");
            for &i in &matching {
                eprintln!("  {} (ID: {})", repositories[i].slug(), repositories[i].id);
            }
            color_eyre::eyre::bail!("ambiguous repository");
        }
    }

    Ok(())
}

/// List tracked repositories and their cached items.
fn cmd_list(data_dir: &Path) -> Result<()> {
    let store = Store::new(data_dir);
    let repositories = store.repositories()?;

    if repositories.is_empty() {
        println!("No repositories. Run `repowatch add owner/name` to track one.");
        return Ok(());
    }

    for repo in &repositories {
        let state = match (&repo.error, repo.items.len()) {
            (Some(error), _) => error.clone(),
            (None, 0) => "no recent activity".to_owned(),
            (None, n) => format!("{n} item(s) in the last day"),
        };
        println!("{}  [{}]  {state}", repo.slug(), repo.id);
        for item in &repo.items {
            println!(
                "  ➤ {} #{}[{}]  {}",
                repo.name,
                item.number,
                item.kind.label(),
                item.title
            );
        }
    }

    Ok(())
}

/// Show data dir, watcher, badge, and repository status.
fn cmd_status(data_dir: &Path) -> Result<()> {
    let store = Store::new(data_dir);
    let repositories = store.repositories()?;
    let options = store.options()?;
    let badge = store.badge_number()?;

    println!("Data dir: {}", data_dir.display());
    match watch::running_pid(data_dir) {
        Some(pid) => println!("Watcher: running (PID {pid})"),
        None => println!("Watcher: stopped"),
    }
    println!("Badge: {badge}");
    println!(
        "Notifications: {}",
        if options.enable_notifications { "on" } else { "off" }
    );
    println!(
        "API key: {}",
        if options.api_key.is_empty() { "(not set)" } else { "set" }
    );

    if repositories.is_empty() {
        println!("\nNo repositories. Run `repowatch add owner/name` to track one.");
    } else {
        println!("\nRepositories:");
        for repo in &repositories {
            match &repo.error {
                Some(error) => println!("  - {}  ({error})", repo.slug()),
                None => println!("  - {}  ({} cached)", repo.slug(), repo.items.len()),
            }
        }
    }

    Ok(())
}

/// Show stored options.
fn cmd_options_show(data_dir: &Path) -> Result<()> {
    let store = Store::new(data_dir);
    let options = store.options()?;

    println!(
        "Notifications: {}",
        if options.enable_notifications { "on" } else { "off" }
    );
    if options.api_key.is_empty() {
        println!("API key: (not set)");
    } else {
        println!("API key: set ({} chars)", options.api_key.len());
    }
    Ok(())
}

/// Validate and store the API key. An empty value clears it.
async fn cmd_set_key(data_dir: &Path, key: &str) -> Result<()> {
    let store = Store::new(data_dir);
    store.initialize()?;

    let key = key.trim();
    if !key.is_empty() {
        let fetcher = GitHubFetcher::new()?;
        if let Some(message) = fetcher.validate_key(key).await? {
            color_eyre::eyre::bail!("API key rejected: {message}");
        }
    }

    let mut options = store.options()?;
    options.api_key = key.to_owned();
    store.set_options(&options)?;

    if key.is_empty() {
        println!("API key cleared.");
    } else {
        println!("API key validated and saved.");
    }
    Ok(())
}

/// Toggle notifications.
fn cmd_notifications(data_dir: &Path, state: &str) -> Result<()> {
    let enabled = match state {
        "on" => true,
        "off" => false,
        other => color_eyre::eyre::bail!("expected on or off, got {other:?}"),
    };

    let store = Store::new(data_dir);
    store.initialize()?;
    let mut options = store.options()?;
    options.enable_notifications = enabled;
    store.set_options(&options)?;

    println!(
        "Notifications {}.",
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

/// Run one reconciliation pass and print the result.
async fn cmd_refresh(data_dir: &Path) -> Result<()> {
    let store = Store::new(data_dir);
    store.initialize()?;
    let config = WatchConfig::load(data_dir)?;
    let mode = NotifyMode::from_config(&config.output.mode, config.output.path.as_ref(), data_dir)?;
    let fetcher = GitHubFetcher::new()?;
    let bus = EventBus::new(data_dir);
    let display = BadgeDisplay::new(data_dir);

    let report = reconcile::run_pass(
        &store,
        &fetcher,
        &bus,
        &display,
        mode.sink(),
        config.notification_clear_ms,
    )
    .await?;

    if !report.fetched {
        println!("No repositories. Run `repowatch add owner/name` to track one.");
        return Ok(());
    }

    println!("Badge: {}", report.badge_number);
    println!("New items: {}", report.new_item_count);
    // The dismissal timer dies with the process; a one-shot pass does not
    // wait ten seconds for it.
    drop(report.notification);
    Ok(())
}
