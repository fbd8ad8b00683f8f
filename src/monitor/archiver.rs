use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::Result;

/// Persists raw diff payloads keyed by revision id.
pub trait Archiver: Send + Sync {
    fn archive(&self, revision: i64, diff: &[u8]) -> Result<PathBuf>;
}

/// Writes each payload to `<folder>/<revision>`, replacing any earlier copy.
#[derive(Debug, Clone)]
pub struct FileArchiver {
    folder: PathBuf,
}

impl FileArchiver {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn path_for(&self, revision: i64) -> PathBuf {
        self.folder.join(revision.to_string())
    }
}

impl Archiver for FileArchiver {
    fn archive(&self, revision: i64, diff: &[u8]) -> Result<PathBuf> {
        let path = self.path_for(revision);
        info!(file = %path.display(), "Archiving revision");
        fs::create_dir_all(&self.folder)?;
        fs::write(&path, diff)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_archive_writes_revision_file() {
        let dir = tempdir().unwrap();
        let archiver = FileArchiver::new(dir.path().join("diffs"));

        let path = archiver.archive(903668373, b"{\"compare\":{}}").unwrap();

        assert_eq!(path, dir.path().join("diffs").join("903668373"));
        assert_eq!(fs::read(&path).unwrap(), b"{\"compare\":{}}");
    }

    #[test]
    fn test_archive_overwrites() {
        let dir = tempdir().unwrap();
        let archiver = FileArchiver::new(dir.path());

        archiver.archive(1, b"first").unwrap();
        archiver.archive(1, b"second").unwrap();

        assert_eq!(fs::read(archiver.path_for(1)).unwrap(), b"second");
    }

    #[test]
    fn test_unwritable_folder_is_error() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();

        let archiver = FileArchiver::new(blocker.join("nested"));
        assert!(archiver.archive(1, b"data").is_err());
    }
}
