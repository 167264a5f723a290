//! Update-event feed — how the CLI and the watch daemon signal each other.
//!
//! Mutating a shared store from two surfaces needs a nudge channel: when the
//! CLI adds or removes a repository it publishes a foreground event, and the
//! daemon reacts by re-reading the list and recounting the badge; after each
//! reconciliation pass the daemon publishes a background event so any other
//! surface knows to re-read. Events carry no payload beyond the origin tag.

use chrono::{DateTime, Utc};
use color_eyre::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::ipc::{JsonlReader, JsonlWriter};

/// File name of the event feed under the data dir.
const EVENTS_FILE: &str = "events.jsonl";

/// Which surface performed the update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateOrigin {
    /// A CLI command (add/remove) changed the repository list.
    Foreground,
    /// A reconciliation pass updated repositories and badge.
    Background,
}

/// One entry in the event feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateEvent {
    pub origin: UpdateOrigin,
    pub timestamp: DateTime<Utc>,
}

/// Publishes and subscribes to the update feed in a data dir.
pub struct EventBus {
    path: PathBuf,
}

impl EventBus {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(EVENTS_FILE),
        }
    }

    /// Append an update event for the given origin.
    pub fn publish(&self, origin: UpdateOrigin) -> Result<()> {
        let writer = JsonlWriter::<UpdateEvent>::new(&self.path);
        writer.append(&UpdateEvent {
            origin,
            timestamp: Utc::now(),
        })
    }

    /// A reader positioned at the start of the feed. Callers that only care
    /// about future events should `skip_to_end` first.
    pub fn subscribe(&self) -> JsonlReader<UpdateEvent> {
        JsonlReader::new(&self.path)
    }
}
