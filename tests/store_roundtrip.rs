//! Cross-instance persistence tests. Every CLI invocation constructs a
//! fresh `Store` over the same data dir, so state must survive instance
//! churn, and writes must leave no temp files behind.

use chrono::{Duration, Utc};
use repowatch::bus::{EventBus, UpdateOrigin};
use repowatch::model::{ItemKind, Options, TrackedItem, TrackedRepository};
use repowatch::store::Store;
use tempfile::TempDir;

fn tracked_repo() -> TrackedRepository {
    let mut repo = TrackedRepository::blank("rust-lang", "cargo");
    repo.just_added = false;
    repo.cache_token = "W/\"abc123\"".into();
    repo.most_recent = Some(Utc::now() - Duration::hours(2));
    repo.items = vec![TrackedItem {
        number: 42,
        title: "Speed up resolver".into(),
        author: "octocat".into(),
        created_at: Utc::now() - Duration::hours(2),
        kind: ItemKind::PullRequest,
    }];
    repo
}

// ---- Keyed state ----

#[test]
fn repositories_survive_instance_churn() {
    let dir = TempDir::new().unwrap();
    let repo = tracked_repo();

    Store::new(dir.path()).set_repositories(&[repo.clone()]).unwrap();

    let loaded = Store::new(dir.path()).repositories().unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].id, repo.id);
    assert_eq!(loaded[0].slug(), "rust-lang/cargo");
    assert_eq!(loaded[0].cache_token, repo.cache_token);
    assert_eq!(loaded[0].most_recent, repo.most_recent);
    assert_eq!(loaded[0].items, repo.items);
    assert!(!loaded[0].just_added);
}

#[test]
fn options_and_badge_survive_instance_churn() {
    let dir = TempDir::new().unwrap();

    let options = Options {
        api_key: "ghp_testtoken".into(),
        enable_notifications: false,
    };
    let writer = Store::new(dir.path());
    writer.set_options(&options).unwrap();
    writer.set_badge_number(17).unwrap();

    let reader = Store::new(dir.path());
    let loaded = reader.options().unwrap();
    assert_eq!(loaded.api_key, "ghp_testtoken");
    assert!(!loaded.enable_notifications);
    assert_eq!(reader.badge_number().unwrap(), 17);
}

#[test]
fn initialize_seeds_only_missing_keys() {
    let dir = TempDir::new().unwrap();
    let store = Store::new(dir.path());
    store.set_badge_number(7).unwrap();

    store.initialize().unwrap();

    // Existing state kept, missing keys seeded.
    assert_eq!(store.badge_number().unwrap(), 7);
    assert!(store.repositories().unwrap().is_empty());
    let options = store.options().unwrap();
    assert!(options.api_key.is_empty());
    assert!(options.enable_notifications);
    assert!(dir.path().join("repositories.json").exists());
    assert!(dir.path().join("options.json").exists());
}

#[test]
fn writes_leave_no_temp_files() {
    let dir = TempDir::new().unwrap();
    let store = Store::new(dir.path());
    store.set_repositories(&[tracked_repo()]).unwrap();
    store.set_badge_number(3).unwrap();

    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty(), "temp files left behind: {leftovers:?}");
}

// ---- Event feed ----

#[test]
fn subscriber_tails_only_new_events() {
    let dir = TempDir::new().unwrap();
    let bus = EventBus::new(dir.path());

    bus.publish(UpdateOrigin::Foreground).unwrap();
    bus.publish(UpdateOrigin::Background).unwrap();

    let mut tail = bus.subscribe();
    tail.skip_to_end().unwrap();
    assert!(tail.poll().unwrap().is_empty());

    bus.publish(UpdateOrigin::Foreground).unwrap();
    let events = tail.poll().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].origin, UpdateOrigin::Foreground);

    // A fresh subscriber replays the whole feed.
    let mut replay = bus.subscribe();
    assert_eq!(replay.poll().unwrap().len(), 3);
}

#[test]
fn publishers_on_separate_instances_share_the_feed() {
    let dir = TempDir::new().unwrap();

    EventBus::new(dir.path())
        .publish(UpdateOrigin::Foreground)
        .unwrap();
    EventBus::new(dir.path())
        .publish(UpdateOrigin::Background)
        .unwrap();

    let mut reader = EventBus::new(dir.path()).subscribe();
    let events = reader.poll().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].origin, UpdateOrigin::Foreground);
    assert_eq!(events[1].origin, UpdateOrigin::Background);
}
