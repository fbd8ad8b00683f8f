//! Recent-change event shapes.
//!
//! Two wire sources describe the same edits in incompatible schemas:
//! [`sse::SseChangeEvent`] (JSON from the event stream) and
//! [`irc::IrcChangeEvent`] (regex captures from the IRC broadcast). Both
//! implement [`Normalize`] and reduce to one [`NormalizedChangeEvent`], the
//! unit that flows through the bus and into deduplication.

pub mod irc;
pub mod sentinel;
pub mod sse;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::NormalizeError;

pub use irc::IrcChangeEvent;
pub use sse::SseChangeEvent;

/// Kind of change carried by a normalized event. Log, categorize and external
/// entries never reach this shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Edit,
    New,
}

/// Which wire source produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Sse,
    Irc,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Sse => write!(f, "sse"),
            Source::Irc => write!(f, "irc"),
        }
    }
}

impl std::str::FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            crate::constants::SSE_SOURCE => Ok(Source::Sse),
            crate::constants::IRC_SOURCE => Ok(Source::Irc),
            other => Err(format!(
                "unknown source '{}', expected one of: {}",
                other,
                crate::constants::get_supported_sources().join(", ")
            )),
        }
    }
}

/// The (new, old) revision ids bracketing a change
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    #[serde(with = "sentinel", default)]
    pub new: Option<i64>,
    #[serde(with = "sentinel", default)]
    pub old: Option<i64>,
}

/// Canonical recent-change event shared by both sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedChangeEvent {
    /// Recent-change id (rcid). Written as -1 when absent.
    #[serde(with = "sentinel", default)]
    pub id: Option<i64>,
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub bot: bool,
    /// Short wiki name, e.g. `en`
    #[serde(default)]
    pub wiki: String,
    #[serde(default)]
    pub minor: bool,
    #[serde(default)]
    pub revision: Revision,
    pub source: Source,
}

impl NormalizedChangeEvent {
    /// Token identifying one logical change across sources: `<id>:<new revision>`.
    pub fn dedup_key(&self) -> String {
        format!(
            "{}:{}",
            sentinel::display(self.id),
            sentinel::display(self.revision.new)
        )
    }

    /// Revision to fetch a diff for, if this is an edit with a known new revision.
    pub fn fetchable_revision(&self) -> Option<i64> {
        match self.kind {
            ChangeKind::Edit => self.revision.new,
            ChangeKind::New => None,
        }
    }
}

/// Capability shared by every source schema: map onto the canonical event.
pub trait Normalize {
    fn normalize(&self) -> Result<NormalizedChangeEvent, NormalizeError>;
}

/// Closed set of source events the normalizer accepts.
#[derive(Debug, Clone)]
pub enum SourceEvent {
    Sse(SseChangeEvent),
    Irc(IrcChangeEvent),
}

impl SourceEvent {
    pub fn source(&self) -> Source {
        match self {
            SourceEvent::Sse(_) => Source::Sse,
            SourceEvent::Irc(_) => Source::Irc,
        }
    }
}

impl Normalize for SourceEvent {
    fn normalize(&self) -> Result<NormalizedChangeEvent, NormalizeError> {
        match self {
            SourceEvent::Sse(rc) => rc.normalize(),
            SourceEvent::Irc(rc) => rc.normalize(),
        }
    }
}

/// What a listener subscribes to and which changes it lets through.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenOptions {
    /// Drop changes flagged as bot edits before forwarding
    pub hidebots: bool,
    /// Short wiki names, e.g. `["en"]`
    pub wikis: Vec<String>,
}

impl Default for ListenOptions {
    fn default() -> Self {
        Self {
            hidebots: true,
            wikis: vec!["en".to_string()],
        }
    }
}

impl ListenOptions {
    /// Stream-side filter: configured wiki and bot policy.
    pub fn admits_sse(&self, rc: &SseChangeEvent) -> bool {
        if self.hidebots && rc.bot {
            return false;
        }
        self.wikis.iter().any(|w| rc.wiki == format!("{}wiki", w))
    }

    /// IRC-side filter: the channel join already scopes the wiki, so only the
    /// bot marker in the flag string matters here.
    pub fn admits_irc(&self, rc: &IrcChangeEvent) -> bool {
        !(self.hidebots && rc.is_bot())
    }

    /// IRC channel names to join, `#<wiki>.wikipedia`
    pub fn irc_channels(&self) -> Vec<String> {
        self.wikis
            .iter()
            .map(|w| format!("#{}.wikipedia", w))
            .collect()
    }
}
