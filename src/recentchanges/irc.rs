//! Recent changes as broadcast on the IRC feed.
//!
//! Each change arrives as one PRIVMSG decorated with mIRC formatting codes:
//!
//! ```text
//! PRIVMSG #en.wikipedia :[[Example]] N https://en.wikipedia.org/w/index.php?diff=111&oldid=100&rcid=5 * Alice * (+20) fixed typo
//! ```
//!
//! [`strip_control_codes`] removes the formatting, [`parse_line`] extracts the
//! fields and [`Normalize`] maps them onto the canonical event.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use url::Url;

use super::{ChangeKind, Normalize, NormalizedChangeEvent, Revision, Source};
use crate::error::NormalizeError;

// Bold, reset, reverse, italic/reverse, underline, and colour with optional fg[,bg]
static CONTROL_CODES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1f|\x02|\x12|\x0f|\x16|\x03(?:\d{1,2}(?:,\d{1,2})?)?")
        .expect("control code pattern is valid")
});

static CHANGE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"PRIVMSG (?P<channel>#[A-Za-z0-9._-]+) :",
        r"\[\[(?P<page>.+?)\]\] ",
        r"(?P<flags>.+)? ",
        r"(?P<url>https://[^ ]+) ",
        r"\* (?P<user>.+?) \* ",
        r"(?:(?P<changesize>\([^)]*\)) ?)?",
        r"(?P<comment>.+)?",
    ))
    .expect("change line pattern is valid")
});

/// A recent change parsed from one IRC line. Unmatched captures are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrcChangeEvent {
    pub channel: String,
    pub page: String,
    /// Markers such as `N` (new page), `M` (minor), `B` (bot)
    pub flags: String,
    pub url: String,
    pub user: String,
    pub change_size: String,
    pub comment: String,
}

impl IrcChangeEvent {
    pub fn is_bot(&self) -> bool {
        self.flags.contains('B')
    }

    pub fn is_minor(&self) -> bool {
        self.flags.contains('M')
    }

    pub fn is_new(&self) -> bool {
        self.flags.contains('N')
    }
}

/// Remove IRC formatting bytes from a line.
pub fn strip_control_codes(line: &str) -> Cow<'_, str> {
    CONTROL_CODES.replace_all(line, "")
}

/// Extract a recent change from a control-code-stripped line.
///
/// Returns `None` when the line is not a recent-change broadcast (no match or
/// an empty page title); callers discard those silently.
pub fn parse_line(line: &str) -> Option<IrcChangeEvent> {
    let caps = CHANGE_LINE.captures(line)?;
    let field = |name: &str| {
        caps.name(name)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default()
    };

    let rc = IrcChangeEvent {
        channel: field("channel"),
        page: field("page"),
        flags: field("flags"),
        url: field("url"),
        user: field("user"),
        change_size: field("changesize"),
        comment: field("comment"),
    };

    if rc.page.is_empty() {
        return None;
    }
    Some(rc)
}

fn query_id(url: &Url, key: &str) -> Option<i64> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .and_then(|(_, v)| v.parse::<i64>().ok())
        .filter(|v| *v >= 0)
}

impl Normalize for IrcChangeEvent {
    fn normalize(&self) -> Result<NormalizedChangeEvent, NormalizeError> {
        let url = Url::parse(&self.url).map_err(|e| NormalizeError::InvalidUrl(e.to_string()))?;

        let id = query_id(&url, "rcid");
        let new = query_id(&url, "diff");
        let old = query_id(&url, "oldid");

        let kind = if self.is_new() {
            ChangeKind::New
        } else if new.is_some() && old.is_some() {
            ChangeKind::Edit
        } else {
            return Err(NormalizeError::Unclassifiable {
                flags: self.flags.clone(),
            });
        };

        let wiki = url
            .host_str()
            .and_then(|host| host.split('.').next())
            .unwrap_or_default()
            .to_string();

        Ok(NormalizedChangeEvent {
            id,
            kind,
            title: self.page.clone(),
            comment: self.comment.clone(),
            user: self.user.clone(),
            bot: self.is_bot(),
            wiki,
            minor: self.is_minor(),
            revision: Revision { new, old },
            source: Source::Irc,
        })
    }
}
