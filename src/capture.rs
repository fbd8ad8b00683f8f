//! Raw stream capture for building test fixtures.

use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::error::Result;
use crate::listeners::SseConnection;

/// Write one raw payload to `<folder>/<unix nanos>.json`.
///
/// Returns `None` when the payload is empty or the target file already exists.
pub fn capture_payload(folder: &Path, data: &[u8]) -> Result<Option<PathBuf>> {
    if data.iter().all(u8::is_ascii_whitespace) {
        info!("Empty data: Discarding");
        return Ok(None);
    }

    let ts = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let path = folder.join(format!("{}.json", ts));
    if path.exists() {
        error!(file = %path.display(), "Skipping archiving: File exists");
        return Ok(None);
    }

    info!(file = %path.display(), "Archiving stream as test data");
    fs::create_dir_all(folder)?;
    fs::write(&path, data)?;
    Ok(Some(path))
}

/// Save up to `max` stream payloads into `folder`, returning how many were
/// written. Stops early if the stream ends.
pub async fn capture_stream(conn: &mut SseConnection, folder: &Path, max: usize) -> Result<usize> {
    let mut gathered = 0;
    while gathered < max {
        let Some(frame) = conn.next_frame().await? else {
            break;
        };
        if capture_payload(folder, frame.data.as_bytes())?.is_some() {
            gathered += 1;
        }
    }
    info!(max, gathered, "Gathered stream items");
    Ok(gathered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tempfile::tempdir;

    #[test]
    fn test_empty_payload_is_skipped() {
        let dir = tempdir().unwrap();
        assert!(capture_payload(dir.path(), b"").unwrap().is_none());
        assert!(capture_payload(dir.path(), b"  \n").unwrap().is_none());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_payload_written_as_json_file() {
        let dir = tempdir().unwrap();
        let path = capture_payload(dir.path(), br#"{"type":"edit"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(path.extension().unwrap(), "json");
        assert_eq!(fs::read(path).unwrap(), br#"{"type":"edit"}"#);
    }

    #[tokio::test]
    async fn test_capture_stops_at_max() {
        let dir = tempdir().unwrap();
        let body = "data: {\"n\":1}\n\ndata:\n\ndata: {\"n\":2}\n\ndata: {\"n\":3}\n\n";
        let chunks: Vec<reqwest::Result<Bytes>> = vec![Ok(Bytes::from(body))];
        let mut conn = SseConnection::from_stream(futures::stream::iter(chunks));

        let gathered = capture_stream(&mut conn, dir.path(), 2).await.unwrap();

        assert_eq!(gathered, 2);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }
}
