//! Notification presenter, sinks, and the badge display.
//!
//! The presenter turns a batch of newly seen items into a titled list
//! payload. Sinks render it: stdout for humans, a JSONL file for other
//! tooling. Every rendered notification is dismissed by a one-shot timer
//! after a configurable delay, independent of the reconciliation cadence.

use chrono::{DateTime, Utc};
use color_eyre::eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::Duration;

use crate::ipc::JsonlWriter;
use crate::model::{ItemKind, TrackedItem, random_id};

/// Body text shown under every notification title.
pub const NOTIFICATION_MESSAGE: &str = "Recent GitHub Repository Activity";

/// File name of the JSONL sink under the data dir.
const NOTIFICATIONS_FILE: &str = "notifications.jsonl";

/// Length of notification ids.
const NOTIFICATION_ID_LEN: usize = 4;

/// One line of a list notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListItem {
    /// Entry title, e.g. `➤ cargo #91[PR]`.
    pub title: String,
    /// Entry body — the item's own title text.
    pub message: String,
}

/// A rendered notification payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Short random base-36 token identifying this notification.
    pub id: String,
    pub title: String,
    pub message: String,
    pub items: Vec<ListItem>,
    pub created_at: DateTime<Utc>,
}

/// Compose the notification title for a batch of new items.
///
/// Counts pull requests and issues separately and pluralizes each count;
/// the empty-batch fallback exists for shape only, callers never present
/// an empty batch.
pub fn title_for_batch(items: &[TrackedItem]) -> String {
    let pulls = items
        .iter()
        .filter(|item| item.kind == ItemKind::PullRequest)
        .count();
    let issues = items.len() - pulls;

    let pull_s = if pulls > 1 { "s" } else { "" };
    let issue_s = if issues > 1 { "s" } else { "" };

    if pulls > 0 && issues > 0 {
        format!("{pulls} new PR{pull_s} and {issues} new Issue{issue_s}:")
    } else if pulls > 0 {
        format!("{pulls} new PR{pull_s}:")
    } else if issues > 0 {
        format!("{issues} new Issue{issue_s}:")
    } else {
        "New Events: ".to_owned()
    }
}

/// Format a repository's new items as notification list entries.
pub fn list_items(items: &[TrackedItem], repo_name: &str) -> Vec<ListItem> {
    items
        .iter()
        .map(|item| ListItem {
            title: format!(
                "➤ {repo_name} #{number}[{label}]",
                number = item.number,
                label = item.kind.label(),
            ),
            message: item.title.clone(),
        })
        .collect()
}

/// Where rendered notifications go.
pub trait NotificationSink: Send + Sync {
    fn create(&self, notification: &Notification) -> Result<()>;
    fn clear(&self, id: &str) -> Result<()>;
}

/// Prints notifications to stdout.
pub struct StdoutSink;

impl NotificationSink for StdoutSink {
    fn create(&self, notification: &Notification) -> Result<()> {
        println!("{}", notification.title);
        println!("{}", notification.message);
        for item in &notification.items {
            println!("  {}  {}", item.title, item.message);
        }
        Ok(())
    }

    fn clear(&self, _id: &str) -> Result<()> {
        // Nothing to dismiss on a terminal.
        Ok(())
    }
}

/// One line in the JSONL sink file.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SinkRecord {
    Created {
        #[serde(flatten)]
        notification: Notification,
    },
    Cleared {
        id: String,
    },
}

/// Appends created/cleared records to a JSONL file.
pub struct FileSink {
    writer: JsonlWriter<SinkRecord>,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            writer: JsonlWriter::new(path),
        }
    }
}

impl NotificationSink for FileSink {
    fn create(&self, notification: &Notification) -> Result<()> {
        self.writer.append(&SinkRecord::Created {
            notification: notification.clone(),
        })
    }

    fn clear(&self, id: &str) -> Result<()> {
        self.writer.append(&SinkRecord::Cleared { id: id.to_owned() })
    }
}

/// Notification output destination, parsed from config.
#[derive(Debug, Clone)]
pub enum NotifyMode {
    Stdout,
    File(PathBuf),
}

impl NotifyMode {
    /// Parse from config strings. File mode without an explicit path falls
    /// back to `notifications.jsonl` under the data dir.
    pub fn from_config(mode: &str, path: Option<&PathBuf>, data_dir: &Path) -> Result<Self> {
        match mode {
            "stdout" => Ok(Self::Stdout),
            "file" => {
                let path = path
                    .cloned()
                    .unwrap_or_else(|| data_dir.join(NOTIFICATIONS_FILE));
                Ok(Self::File(path))
            }
            other => Err(color_eyre::eyre::eyre!("unknown output mode: {other}")),
        }
    }

    pub fn sink(&self) -> Arc<dyn NotificationSink> {
        match self {
            Self::Stdout => Arc::new(StdoutSink),
            Self::File(path) => Arc::new(FileSink::new(path)),
        }
    }
}

/// Render a notification and schedule its dismissal.
///
/// Creates the notification on the sink immediately, then spawns a one-shot
/// timer that clears it after `clear_after_ms`. Returns the timer's join
/// handle; daemon callers drop it, tests await it.
pub fn render(
    sink: Arc<dyn NotificationSink>,
    title: String,
    items: Vec<ListItem>,
    clear_after_ms: u64,
) -> Result<tokio::task::JoinHandle<()>> {
    let notification = Notification {
        id: random_id(NOTIFICATION_ID_LEN),
        title,
        message: NOTIFICATION_MESSAGE.to_owned(),
        items,
        created_at: Utc::now(),
    };
    sink.create(&notification)?;

    let id = notification.id;
    let handle = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(clear_after_ms)).await;
        if let Err(e) = sink.clear(&id) {
            eprintln!("[notify] failed to clear notification {id}: {e}");
        }
    });
    Ok(handle)
}

/// The badge display — a text file holding the decimal badge string.
pub struct BadgeDisplay {
    path: PathBuf,
}

impl BadgeDisplay {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("badge"),
        }
    }

    /// Set the display to the given text (the literal decimal string of
    /// the badge number, no separators, no capping).
    pub fn set(&self, text: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .wrap_err_with(|| format!("failed to create {}", parent.display()))?;
        }
        std::fs::write(&self.path, text)
            .wrap_err_with(|| format!("failed to write {}", self.path.display()))
    }
}
