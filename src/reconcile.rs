//! The reconciliation pass.
//!
//! One pass walks every tracked repository, fetches its activity through an
//! [`ActivityFetcher`], writes the outcome back onto the repository record,
//! then advances the per-repository watermark and collects items past it
//! into the notification batch. The badge number is recomputed from scratch
//! on every pass as the total of cached items across repositories.
//!
//! [`run_pass`] wraps one pass with persistence, the badge display, the
//! notification render, and the completion broadcast. Both the daemon tick
//! and the one-shot `refresh` command go through it, so the two surfaces
//! cannot drift apart.

use chrono::{DateTime, Utc};
use color_eyre::eyre::Result;
use std::mem;
use std::sync::Arc;

use crate::bus::{EventBus, UpdateOrigin};
use crate::github::{ActivityFetcher, ERROR_UNREACHABLE, FetchOutcome, STATUS_NOT_MODIFIED};
use crate::model::{TrackedItem, TrackedRepository};
use crate::notify::{self, BadgeDisplay, ListItem, NotificationSink};
use crate::store::Store;
use crate::window;

/// What one reconciliation pass produced across all repositories.
#[derive(Debug, Default)]
pub struct PassOutcome {
    /// Items past their repository's watermark, in repository order. Drives
    /// the notification title. Excludes suppressed first fetches.
    pub new_items: Vec<TrackedItem>,
    /// The same items formatted as notification list entries.
    pub notification_items: Vec<ListItem>,
    /// Total cached items across all repositories after the pass.
    pub badge_number: u64,
}

/// Summary of one [`run_pass`] invocation.
#[derive(Debug)]
pub struct PassReport {
    /// False when the repository list was empty and no fetch happened.
    pub fetched: bool,
    pub badge_number: u64,
    pub new_item_count: usize,
    /// Dismissal timer for the rendered notification, when one was shown.
    /// The daemon drops it; tests await it.
    pub notification: Option<tokio::task::JoinHandle<()>>,
}

/// Reconcile every repository against its upstream.
///
/// Each repository is handled independently; an error on one never blocks
/// the others. Ownership of the list stays with the caller, which persists
/// it afterwards.
pub async fn reconcile(
    repositories: &mut [TrackedRepository],
    fetcher: &dyn ActivityFetcher,
    api_key: &str,
) -> PassOutcome {
    let mut outcome = PassOutcome::default();

    for repo in repositories.iter_mut() {
        let fetched = match fetcher.fetch(repo, api_key).await {
            Ok(fetched) => fetched,
            Err(e) => {
                eprintln!("[reconcile] {}: {e:#}", repo.slug());
                // Transport failures get the generic classification and
                // keep the cache token, same as any other failed attempt.
                FetchOutcome {
                    items: Vec::new(),
                    cache_token: repo.cache_token.clone(),
                    status: 0,
                    error: Some(ERROR_UNREACHABLE.to_owned()),
                }
            }
        };

        let status = fetched.status;
        repo.cache_token = fetched.cache_token;
        repo.error = fetched.error;
        // A 304 carries no payload, so the cached items are re-filtered
        // against the sliding window instead of being replaced.
        repo.items = if status == STATUS_NOT_MODIFIED {
            window::filter_last_day(mem::take(&mut repo.items))
        } else {
            fetched.items
        };

        if repo.error.is_some() || (status == STATUS_NOT_MODIFIED && !repo.just_added) {
            repo.just_added = false;
            continue;
        }

        let (new_items, watermark) = new_since_watermark(repo);
        repo.most_recent = watermark;

        if repo.just_added {
            // First fetch seeds the watermark but stays silent.
            repo.just_added = false;
        } else if !new_items.is_empty() {
            outcome
                .notification_items
                .extend(notify::list_items(&new_items, &repo.name));
            outcome.new_items.extend(new_items);
        }
    }

    outcome.badge_number = count_all_items(repositories);
    outcome
}

/// Split out the items newer than the repository's watermark and compute
/// the advanced watermark.
///
/// A missing watermark compares as the Unix epoch, so everything cached
/// counts as new. Only strictly newer items qualify; the returned watermark
/// is the maximum date seen, or the old one when nothing qualified.
pub fn new_since_watermark(
    repo: &TrackedRepository,
) -> (Vec<TrackedItem>, Option<DateTime<Utc>>) {
    let last_record = repo.most_recent.unwrap_or(DateTime::UNIX_EPOCH);
    let mut best = repo.most_recent;
    let mut fresh = Vec::new();

    for item in &repo.items {
        if item.created_at > last_record {
            fresh.push(item.clone());
            if best.map_or(true, |b| item.created_at > b) {
                best = Some(item.created_at);
            }
        }
    }

    (fresh, best)
}

/// Total cached items across all repositories. This is the badge number.
pub fn count_all_items(repositories: &[TrackedRepository]) -> u64 {
    repositories.iter().map(|repo| repo.items.len() as u64).sum()
}

/// Run one full pass: fetch, persist, badge, notify, broadcast.
///
/// With an empty repository list the pass skips fetching entirely and only
/// resets a stale nonzero badge; a second empty pass writes nothing at all.
pub async fn run_pass(
    store: &Store,
    fetcher: &dyn ActivityFetcher,
    bus: &EventBus,
    display: &BadgeDisplay,
    sink: Arc<dyn NotificationSink>,
    clear_after_ms: u64,
) -> Result<PassReport> {
    let mut repositories = store.repositories()?;

    if repositories.is_empty() {
        let previous = store.badge_number()?;
        if previous != 0 {
            store.set_badge_number(0)?;
            display.set("0")?;
            bus.publish(UpdateOrigin::Background)?;
        }
        return Ok(PassReport {
            fetched: false,
            badge_number: 0,
            new_item_count: 0,
            notification: None,
        });
    }

    let options = store.options()?;
    let outcome = reconcile(&mut repositories, fetcher, &options.api_key).await;

    store.set_repositories(&repositories)?;
    store.set_badge_number(outcome.badge_number)?;
    display.set(&outcome.badge_number.to_string())?;

    let notification = if options.enable_notifications && !outcome.new_items.is_empty() {
        let title = notify::title_for_batch(&outcome.new_items);
        Some(notify::render(
            sink,
            title,
            outcome.notification_items,
            clear_after_ms,
        )?)
    } else {
        None
    };

    bus.publish(UpdateOrigin::Background)?;

    Ok(PassReport {
        fetched: true,
        badge_number: outcome.badge_number,
        new_item_count: outcome.new_items.len(),
        notification,
    })
}
