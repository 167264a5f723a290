//! Watcher mode — periodic reconciliation passes in a background process.
//!
//! The watcher runs a `tokio::select!` loop over three sources:
//! 1. The pass timer (one reconciliation pass per tick)
//! 2. Update events published by CLI commands (badge recount, no fetch)
//! 3. Shutdown signals (SIGTERM/SIGINT)

use color_eyre::eyre::{Result, WrapErr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::bus::{EventBus, UpdateEvent, UpdateOrigin};
use crate::config::WatchConfig;
use crate::github::GitHubFetcher;
use crate::ipc::JsonlReader;
use crate::notify::{BadgeDisplay, NotificationSink, NotifyMode};
use crate::reconcile::{self, count_all_items};
use crate::store::Store;

/// How often the watcher drains the event feed, in seconds.
const BUS_POLL_INTERVAL_SECS: u64 = 2;

// ---------------------------------------------------------------------------
// PID file helpers
// ---------------------------------------------------------------------------

fn pid_path(data_dir: &Path) -> PathBuf {
    data_dir.join("watch.pid")
}

fn write_pid(data_dir: &Path) -> Result<()> {
    let path = pid_path(data_dir);
    std::fs::write(&path, std::process::id().to_string())
        .wrap_err_with(|| format!("failed to write PID file {}", path.display()))
}

fn read_pid(data_dir: &Path) -> Option<u32> {
    std::fs::read_to_string(pid_path(data_dir))
        .ok()
        .and_then(|s| s.trim().parse().ok())
}

fn remove_pid(data_dir: &Path) {
    let _ = std::fs::remove_file(pid_path(data_dir));
}

fn is_process_alive(pid: u32) -> bool {
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}

/// PID of a live watcher for this data dir, if any.
pub fn running_pid(data_dir: &Path) -> Option<u32> {
    read_pid(data_dir).filter(|&pid| is_process_alive(pid))
}

// ---------------------------------------------------------------------------
// Public API: start / stop
// ---------------------------------------------------------------------------

fn log_path(data_dir: &Path) -> PathBuf {
    data_dir.join("watch.log")
}

/// Start the watcher.
///
/// By default, spawns a background child process with output redirected to
/// `watch.log` and returns immediately. With `foreground: true`, runs the
/// event loop inline (blocking).
pub async fn start(data_dir: &Path, foreground: bool) -> Result<()> {
    std::fs::create_dir_all(data_dir)
        .wrap_err_with(|| format!("failed to create {}", data_dir.display()))?;

    // Check for stale PID file.
    if let Some(pid) = read_pid(data_dir) {
        if is_process_alive(pid) {
            color_eyre::eyre::bail!("watcher already running (PID {pid})");
        }
        eprintln!("[watch] Removing stale PID file (PID {pid} is not running)");
        remove_pid(data_dir);
    }

    if !foreground {
        return spawn_background(data_dir);
    }

    // Foreground mode — write PID and run inline.
    write_pid(data_dir)?;
    let pid = std::process::id();
    eprintln!("[watch] Started (PID {pid})");

    let config = WatchConfig::load(data_dir)?;
    eprintln!("[watch] Data dir: {}", data_dir.display());
    eprintln!("[watch] Poll interval: {}s", config.poll_interval_secs);
    eprintln!("[watch] Output mode: {}", config.output.mode);

    let mut runner = WatchRunner::new(data_dir.to_path_buf(), config)?;
    runner.run().await?;

    // Clean up PID file before exit.
    remove_pid(data_dir);
    eprintln!("[watch] PID file removed");

    Ok(())
}

/// Spawn `repowatch watch start --foreground` as a detached background
/// process, with stdout/stderr redirected to `watch.log`.
fn spawn_background(data_dir: &Path) -> Result<()> {
    let exe = std::env::current_exe().wrap_err("failed to find repowatch executable")?;
    let log = log_path(data_dir);

    let log_file = std::fs::File::create(&log)
        .wrap_err_with(|| format!("failed to create log file {}", log.display()))?;
    let stderr_file = log_file
        .try_clone()
        .wrap_err("failed to clone log file handle")?;

    let mut cmd = std::process::Command::new(exe);
    cmd.args(["watch", "start", "--foreground"]);
    // Pin the resolved data dir so the child agrees on paths.
    cmd.args(["-C", &data_dir.display().to_string()]);
    cmd.stdout(log_file);
    cmd.stderr(stderr_file);
    cmd.stdin(std::process::Stdio::null());

    // Detach from parent process group so it survives our exit.
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let child = cmd.spawn().wrap_err("failed to spawn watcher process")?;
    let pid = child.id();

    println!("watcher started (PID {pid})");
    println!("logs: {}", log.display());

    Ok(())
}

/// Stop the running watcher by reading its PID file and sending SIGTERM.
pub fn stop(data_dir: &Path) -> Result<()> {
    let pid = match read_pid(data_dir) {
        Some(pid) => pid,
        None => {
            eprintln!("watcher is not running (no PID file)");
            return Ok(());
        }
    };

    if !is_process_alive(pid) {
        eprintln!("watcher is not running (PID {pid} is stale), removing PID file");
        remove_pid(data_dir);
        return Ok(());
    }

    // Send SIGTERM.
    let _ = std::process::Command::new("kill")
        .args([&pid.to_string()])
        .status();

    // Wait up to 5 seconds for the process to exit.
    for _ in 0..50 {
        if !is_process_alive(pid) {
            remove_pid(data_dir);
            eprintln!("watcher stopped (PID {pid})");
            return Ok(());
        }
        std::thread::sleep(std::time::Duration::from_millis(100));
    }

    // Still alive — force kill.
    let _ = std::process::Command::new("kill")
        .args(["-9", &pid.to_string()])
        .status();
    remove_pid(data_dir);
    eprintln!("watcher killed (PID {pid})");

    Ok(())
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

struct WatchRunner {
    config: WatchConfig,
    store: Store,
    fetcher: GitHubFetcher,
    bus: EventBus,
    events: JsonlReader<UpdateEvent>,
    display: BadgeDisplay,
    sink: Arc<dyn NotificationSink>,
}

impl WatchRunner {
    fn new(data_dir: PathBuf, config: WatchConfig) -> Result<Self> {
        let store = Store::new(&data_dir);
        store.initialize()?;

        let mode = NotifyMode::from_config(
            &config.output.mode,
            config.output.path.as_ref(),
            &data_dir,
        )?;
        let sink = mode.sink();

        let bus = EventBus::new(&data_dir);
        let mut events = bus.subscribe();
        // Only react to events published after startup.
        events.skip_to_end()?;

        Ok(Self {
            config,
            store,
            fetcher: GitHubFetcher::new()?,
            bus,
            events,
            display: BadgeDisplay::new(&data_dir),
            sink,
        })
    }

    async fn run(&mut self) -> Result<()> {
        let cancel = CancellationToken::new();

        // Set up SIGTERM/SIGINT handler.
        let shutdown_cancel = cancel.clone();
        tokio::spawn(async move {
            let ctrl_c = tokio::signal::ctrl_c();
            #[cfg(unix)]
            {
                let mut sigterm =
                    tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                        .expect("failed to install SIGTERM handler");
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            #[cfg(not(unix))]
            {
                let _ = ctrl_c.await;
            }
            eprintln!("\n[watch] Shutdown signal received");
            shutdown_cancel.cancel();
        });

        let pass_interval =
            std::time::Duration::from_secs(self.config.poll_interval_secs.max(1));
        let mut pass_timer = tokio::time::interval(pass_interval);
        pass_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // First tick fires immediately, so the initial pass runs at startup.

        let mut bus_timer =
            tokio::time::interval(std::time::Duration::from_secs(BUS_POLL_INTERVAL_SECS));
        bus_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // Skip the first immediate tick.
        bus_timer.tick().await;

        eprintln!(
            "[watch] Ready. Reconciling every {}s.",
            self.config.poll_interval_secs.max(1)
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    eprintln!("[watch] Shutting down...");
                    break;
                }

                _ = pass_timer.tick() => {
                    if let Err(e) = self.run_pass().await {
                        eprintln!("[watch] Pass error: {e}");
                    }
                }

                _ = bus_timer.tick() => {
                    if let Err(e) = self.poll_events() {
                        eprintln!("[watch] Event poll error: {e}");
                    }
                }
            }
        }

        eprintln!("[watch] Goodbye.");
        Ok(())
    }

    async fn run_pass(&mut self) -> Result<()> {
        let report = reconcile::run_pass(
            &self.store,
            &self.fetcher,
            &self.bus,
            &self.display,
            self.sink.clone(),
            self.config.notification_clear_ms,
        )
        .await?;

        if report.fetched {
            eprintln!(
                "[watch] Pass complete: badge {}, {} new",
                report.badge_number, report.new_item_count
            );
        }
        Ok(())
    }

    /// Drain the event feed. Foreground events mean a CLI command changed
    /// the stored list, so the badge is recounted from the cached items
    /// without fetching; the next pass fetches. Background events are the
    /// watcher's own completion broadcasts and are ignored.
    fn poll_events(&mut self) -> Result<()> {
        let events = self.events.poll()?;
        if events
            .iter()
            .any(|event| event.origin == UpdateOrigin::Foreground)
        {
            self.recount_badge()?;
        }
        Ok(())
    }

    fn recount_badge(&self) -> Result<()> {
        let repositories = self.store.repositories()?;
        let badge = count_all_items(&repositories);
        self.store.set_badge_number(badge)?;
        self.display.set(&badge.to_string())?;
        eprintln!("[watch] List changed; badge now {badge}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ItemKind, TrackedItem, TrackedRepository};
    use chrono::Utc;
    use tempfile::TempDir;

    #[test]
    fn test_pid_file_roundtrip() {
        let dir = TempDir::new().unwrap();
        assert!(read_pid(dir.path()).is_none());

        write_pid(dir.path()).unwrap();
        assert_eq!(read_pid(dir.path()), Some(std::process::id()));
        // Our own process is alive, so the PID counts as running.
        assert_eq!(running_pid(dir.path()), Some(std::process::id()));

        remove_pid(dir.path());
        assert!(read_pid(dir.path()).is_none());
    }

    #[test]
    fn test_running_pid_ignores_stale_entries() {
        let dir = TempDir::new().unwrap();
        std::fs::write(pid_path(dir.path()), "999999999").unwrap();
        assert!(running_pid(dir.path()).is_none());
    }

    #[test]
    fn test_stop_without_pid_file_is_a_noop() {
        let dir = TempDir::new().unwrap();
        stop(dir.path()).unwrap();
    }

    fn seeded_repo() -> TrackedRepository {
        let mut repo = TrackedRepository::blank("rust-lang", "cargo");
        repo.just_added = false;
        repo.items = vec![
            TrackedItem {
                number: 1,
                title: "a".into(),
                author: "octocat".into(),
                created_at: Utc::now(),
                kind: ItemKind::Issue,
            },
            TrackedItem {
                number: 2,
                title: "b".into(),
                author: "octocat".into(),
                created_at: Utc::now(),
                kind: ItemKind::PullRequest,
            },
        ];
        repo
    }

    #[tokio::test]
    async fn test_foreground_event_triggers_badge_recount() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path());
        store.set_repositories(&[seeded_repo()]).unwrap();

        let mut runner =
            WatchRunner::new(dir.path().to_path_buf(), WatchConfig::default()).unwrap();

        EventBus::new(dir.path())
            .publish(UpdateOrigin::Foreground)
            .unwrap();
        runner.poll_events().unwrap();

        assert_eq!(store.badge_number().unwrap(), 2);
        let badge = std::fs::read_to_string(dir.path().join("badge")).unwrap();
        assert_eq!(badge, "2");
    }

    #[tokio::test]
    async fn test_background_events_do_not_recount() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path());
        store.set_repositories(&[seeded_repo()]).unwrap();

        let mut runner =
            WatchRunner::new(dir.path().to_path_buf(), WatchConfig::default()).unwrap();

        EventBus::new(dir.path())
            .publish(UpdateOrigin::Background)
            .unwrap();
        runner.poll_events().unwrap();

        // Still the initialized value; no recount happened.
        assert_eq!(store.badge_number().unwrap(), 0);
    }
}
