//! Domain types — tracked repositories, their items, and user options.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Kind of a tracked item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemKind {
    #[serde(rename = "pr")]
    PullRequest,
    #[serde(rename = "issue")]
    Issue,
}

impl ItemKind {
    /// Display label used in notification list entries ("PR" / "Issue").
    pub fn label(&self) -> &'static str {
        match self {
            Self::PullRequest => "PR",
            Self::Issue => "Issue",
        }
    }
}

/// A single issue or pull request summary, immutable once produced by the
/// fetcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedItem {
    /// Issue/PR number.
    pub number: u64,
    /// Item title.
    pub title: String,
    /// Author login.
    pub author: String,
    /// When the item was created upstream.
    pub created_at: DateTime<Utc>,
    /// Whether this is a pull request or an issue.
    pub kind: ItemKind,
}

/// A repository being tracked.
///
/// Mutated in place by each reconciliation pass: the fetcher writes back
/// `cache_token`, `items`, and `error`; the pass advances `most_recent` and
/// clears `just_added`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedRepository {
    /// Short random base-36 identifier.
    pub id: String,
    /// Repository owner (lowercased at add time).
    pub owner: String,
    /// Repository name (lowercased at add time).
    pub name: String,
    /// Last fetch error, None when healthy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Conditional-fetch validator (HTTP entity tag). Empty = none yet.
    #[serde(default)]
    pub cache_token: String,
    /// Watermark: creation timestamp of the most recent item already
    /// accounted for notification purposes. None = never fetched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub most_recent: Option<DateTime<Utc>>,
    /// Currently cached items, in fetch order.
    #[serde(default)]
    pub items: Vec<TrackedItem>,
    /// True between creation and the first reconciliation pass; suppresses
    /// notification for the add-time backlog.
    #[serde(default)]
    pub just_added: bool,
}

impl TrackedRepository {
    /// Create a blank repository about to be added: fresh id, no cache
    /// token, no watermark, `just_added` set.
    pub fn blank(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: random_id(5),
            owner: owner.into(),
            name: name.into(),
            error: None,
            cache_token: String::new(),
            most_recent: None,
            items: Vec::new(),
            just_added: true,
        }
    }

    /// "owner/name" form used in output and remove targets.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// User options, stored under the `options` key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Options {
    /// GitHub API key. Empty = anonymous (low rate limit).
    #[serde(default)]
    pub api_key: String,
    /// Whether to render notifications for new items.
    #[serde(default = "default_enable_notifications")]
    pub enable_notifications: bool,
}

fn default_enable_notifications() -> bool {
    true
}

impl Default for Options {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            enable_notifications: true,
        }
    }
}

/// Parse an "owner/name" slug as typed by the user. Trims surrounding
/// whitespace and lowercases both segments; rejects anything that is not
/// exactly two nonempty, slash-free segments.
pub fn parse_slug(input: &str) -> Option<(String, String)> {
    let (owner, name) = input.trim().split_once('/')?;
    if owner.is_empty() || name.is_empty() || name.contains('/') {
        return None;
    }
    if owner.chars().any(char::is_whitespace) || name.chars().any(char::is_whitespace) {
        return None;
    }
    Some((owner.to_lowercase(), name.to_lowercase()))
}

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Generate a random base-36 string of `len` characters.
pub fn random_id(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect()
}
