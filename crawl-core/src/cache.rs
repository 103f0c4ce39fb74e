//! Flat-file page cache, keyed by a normalized form of the page's URL.
//!
//! The normalization rule: strip a leading `http(s)://` and replace every
//! `/` or `?` with `_`, so a whole URL becomes one valid filename.

use std::io;
use std::path::{Path, PathBuf};

use regex::Regex;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to create cache directory {0:?}")]
    CreateDir(PathBuf, #[source] io::Error),
    #[error("failed to read cache entry {0:?}")]
    Read(PathBuf, #[source] io::Error),
    #[error("failed to write cache entry {0:?}")]
    Write(PathBuf, #[source] io::Error),
    #[error("failed to list cache directory {0:?}")]
    ReadDir(PathBuf, #[source] io::Error),
}

/// Turn a URL into the filename it's stored under. The regexes are
/// compiled once and cached, not allocated per call.
pub fn normalize(key: &str) -> String {
    static SCHEME: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    static SEPARATORS: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();

    let scheme = SCHEME.get_or_init(|| Regex::new(r"^https?://").unwrap());
    let separators = SEPARATORS.get_or_init(|| Regex::new(r"[?/]").unwrap());

    let stripped = scheme.replace(key, "");
    separators.replace_all(&stripped, "_").into_owned()
}

/// A directory of cached page bodies, one file per URL.
pub struct FsCache {
    root: PathBuf,
}

impl FsCache {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, Error> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|err| Error::CreateDir(root.clone(), err))?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(normalize(key))
    }

    /// `None` if there is no cached entry for `key`.
    pub async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let path = self.path_for(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Error::Read(path, err)),
        }
    }

    pub async fn set(&self, key: &str, content: &str) -> Result<(), Error> {
        let path = self.path_for(key);
        tokio::fs::write(&path, content)
            .await
            .map_err(|err| Error::Write(path, err))
    }

    /// Iterate over every cached `(filename, content)` pair. Directory
    /// order is whatever the OS returns it in; callers must not rely on
    /// any particular order.
    pub async fn iter(&self) -> Result<Vec<(String, String)>, Error> {
        let mut dir = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|err| Error::ReadDir(self.root.clone(), err))?;

        let mut entries = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|err| Error::ReadDir(self.root.clone(), err))?
        {
            let path = entry.path();
            if !entry
                .file_type()
                .await
                .map_err(|err| Error::ReadDir(self.root.clone(), err))?
                .is_file()
            {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let content = tokio::fs::read_to_string(&path)
                .await
                .map_err(|err| Error::Read(path, err))?;
            entries.push((name, content));
        }
        Ok(entries)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_scheme_and_separators() {
        assert_eq!(normalize("https://example.com/a/b?c=1"), "example.com_a_b_c=1");
        assert_eq!(normalize("http://example.com"), "example.com");
    }

    #[tokio::test]
    async fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::open(dir.path()).await.unwrap();

        assert_eq!(cache.get("https://example.com/x").await.unwrap(), None);

        cache.set("https://example.com/x", "body").await.unwrap();
        assert_eq!(
            cache.get("https://example.com/x").await.unwrap(),
            Some("body".to_string())
        );

        let entries = cache.iter().await.unwrap();
        assert_eq!(entries, vec![("example.com_x".to_string(), "body".to_string())]);
    }

    #[tokio::test]
    async fn second_set_overwrites_the_first() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::open(dir.path()).await.unwrap();

        cache.set("https://example.com/x", "first").await.unwrap();
        cache.set("https://example.com/x", "second").await.unwrap();

        assert_eq!(
            cache.get("https://example.com/x").await.unwrap(),
            Some("second".to_string())
        );
        let entries = cache.iter().await.unwrap();
        assert_eq!(entries, vec![("example.com_x".to_string(), "second".to_string())]);
    }
}
