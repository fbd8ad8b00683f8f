use serde::{Deserialize, Serialize};

use crate::error::DiffError;

/// One `compare` result from the MediaWiki API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Compare {
    #[serde(rename = "fromid")]
    pub from_id: i64,
    #[serde(rename = "fromrevid")]
    pub from_rev_id: i64,
    #[serde(rename = "fromns")]
    pub from_ns: i64,
    #[serde(rename = "fromtitle")]
    pub from_title: String,
    #[serde(rename = "toid")]
    pub to_id: i64,
    #[serde(rename = "torevid")]
    pub to_rev_id: i64,
    #[serde(rename = "tons")]
    pub to_ns: i64,
    #[serde(rename = "totitle")]
    pub to_title: String,
    /// Rendered HTML diff table
    #[serde(rename = "*")]
    pub body: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompareResult {
    pub compare: Compare,
}

/// Decode a compare-API response body.
///
/// The error carries the raw payload so it can be inspected in the logs.
pub fn parse_compare(input: &[u8]) -> Result<Compare, DiffError> {
    serde_json::from_slice::<CompareResult>(input)
        .map(|result| result.compare)
        .map_err(|_| DiffError::Decode {
            body: String::from_utf8_lossy(input).into_owned(),
        })
}
