//! Recent changes as delivered by the event stream.

use serde::{Deserialize, Serialize};

use super::{ChangeKind, Normalize, NormalizedChangeEvent, Revision, Source};
use crate::error::NormalizeError;

/// `rc_type` of a stream event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SseChangeType {
    Edit,
    New,
    Log,
    Categorize,
    External,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SseMeta {
    pub topic: String,
    pub uri: String,
    pub request_id: String,
    pub id: String,
    pub dt: String,
    pub domain: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SseLength {
    pub old: Option<i64>,
    pub new: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SseRevision {
    pub new: Option<i64>,
    pub old: Option<i64>,
}

/// A recent change from the stream, mirroring the upstream schema. Optional
/// ids are legitimately omitted for some event types, so they stay `Option`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SseChangeEvent {
    pub meta: SseMeta,
    /// rcid, null for some log entries
    pub id: Option<i64>,
    #[serde(rename = "type")]
    pub change_type: SseChangeType,
    pub title: String,
    pub namespace: i64,
    pub comment: String,
    pub parsedcomment: String,
    pub timestamp: i64,
    pub user: String,
    pub bot: bool,
    pub server_url: String,
    pub server_name: String,
    pub server_script_path: String,
    /// Database key of the wiki, e.g. `enwiki`
    pub wiki: String,
    pub minor: bool,
    pub patrolled: bool,
    pub length: SseLength,
    pub revision: SseRevision,
    pub log_id: Option<i64>,
    pub log_type: Option<String>,
    pub log_action: String,
    pub log_action_comment: Option<String>,
}

impl SseChangeEvent {
    pub fn from_json(data: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(data)
    }

    /// Only edits and page creations carry a diff worth normalizing.
    pub fn is_normalizable(&self) -> bool {
        matches!(self.change_type, SseChangeType::Edit | SseChangeType::New)
    }

    pub fn is_delete(&self) -> bool {
        self.change_type == SseChangeType::Log
            && self.log_action == crate::constants::LOG_ACTION_DELETE
    }
}

impl Normalize for SseChangeEvent {
    fn normalize(&self) -> Result<NormalizedChangeEvent, NormalizeError> {
        let kind = match self.change_type {
            SseChangeType::Edit => ChangeKind::Edit,
            SseChangeType::New => ChangeKind::New,
            other => {
                return Err(NormalizeError::UnsupportedType(
                    format!("{:?}", other).to_lowercase(),
                ))
            }
        };

        // The stream only numbers page creations consistently
        let id = match kind {
            ChangeKind::New => self.id,
            ChangeKind::Edit => None,
        };

        Ok(NormalizedChangeEvent {
            id,
            kind,
            title: self.title.clone(),
            comment: self.comment.clone(),
            user: self.user.clone(),
            bot: self.bot,
            wiki: self.wiki.replacen("wiki", "", 1),
            minor: self.minor,
            revision: Revision {
                new: self.revision.new,
                old: self.revision.old,
            },
            source: Source::Sse,
        })
    }
}
