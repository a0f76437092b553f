//! Page cache: one file per page, named by zero-padded page number.
//!
//! ```text
//! parsed_patterns/
//!   page_009.json    completed page: JSON array of canonical patterns
//!   page_010.json
//!   page_011.error   failed page: raw error text
//! ```
//!
//! A page file is both the memoised result and the resume checkpoint: the
//! driver asks [`PageCache::state`] before doing any work and short-circuits
//! when the page is already [`CacheState::Cached`] or [`CacheState::Errored`].
//! Files are written to a sibling `.tmp` and renamed into place, so a killed
//! run never leaves a truncated page behind.
//!
//! Only one process may drive a given cache directory at a time; two
//! concurrent runs can both see a page as pending and fetch it twice.

use crate::error::{ExtractError, PageError};
use crate::model::{CanonicalPattern, PageResult};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

static RE_PAGE_FILE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^page_(\d+)\.json$").unwrap());

/// Cache status of a single page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// Nothing on disk yet; the page must be fetched.
    Pending,
    /// A completed `page_NNN.json` exists.
    Cached,
    /// A `page_NNN.error` marker exists and no completed file does.
    Errored,
}

/// Handle on a page-cache directory.
#[derive(Debug, Clone)]
pub struct PageCache {
    dir: PathBuf,
}

impl PageCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `page_009.json`
    pub fn result_path(&self, page: usize) -> PathBuf {
        self.dir.join(result_file_name(page))
    }

    /// `page_009.error`
    pub fn error_path(&self, page: usize) -> PathBuf {
        self.dir.join(format!("page_{page:03}.error"))
    }

    /// Create the cache directory if needed.
    pub async fn ensure_dir(&self) -> Result<(), ExtractError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| ExtractError::WriteFailed {
                path: self.dir.clone(),
                source: e,
            })
    }

    /// Current state of `page`. Completed results take precedence over
    /// error markers.
    pub async fn state(&self, page: usize) -> Result<CacheState, ExtractError> {
        if exists(&self.result_path(page)).await? {
            return Ok(CacheState::Cached);
        }
        if exists(&self.error_path(page)).await? {
            return Ok(CacheState::Errored);
        }
        Ok(CacheState::Pending)
    }

    /// Read a completed page.
    pub async fn load(&self, page: usize) -> Result<Vec<CanonicalPattern>, ExtractError> {
        let path = self.result_path(page);
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ExtractError::ReadFailed {
                path: path.clone(),
                source: e,
            })?;
        serde_json::from_str(&text).map_err(|e| ExtractError::CacheCorrupt {
            path,
            detail: e.to_string(),
        })
    }

    /// Read the text of a page's error marker.
    pub async fn load_error(&self, page: usize) -> Result<String, ExtractError> {
        let path = self.error_path(page);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ExtractError::ReadFailed { path, source: e })
    }

    /// Persist a completed page and drop any stale error marker.
    pub async fn store(&self, page: usize, patterns: &[CanonicalPattern]) -> Result<(), ExtractError> {
        let path = self.result_path(page);
        let mut json = serde_json::to_string_pretty(patterns)
            .map_err(|e| ExtractError::Internal(format!("serialise page {page}: {e}")))?;
        json.push('\n');
        write_atomic(&path, json.as_bytes()).await?;
        self.clear_error(page).await?;
        debug!("Cached page {} → {}", page, path.display());
        Ok(())
    }

    /// Persist the error marker for a failed page.
    pub async fn store_error(&self, page: usize, error: &PageError) -> Result<(), ExtractError> {
        let path = self.error_path(page);
        write_atomic(&path, error.to_string().as_bytes()).await
    }

    /// Remove a page's error marker if present. Returns whether one existed.
    pub async fn clear_error(&self, page: usize) -> Result<bool, ExtractError> {
        let path = self.error_path(page);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!("Removed error marker {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ExtractError::WriteFailed { path, source: e }),
        }
    }

    /// Page numbers with a completed result file, ascending.
    pub async fn completed_pages(&self) -> Result<Vec<usize>, ExtractError> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| ExtractError::ReadFailed {
                path: self.dir.clone(),
                source: e,
            })?;

        let mut pages = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ExtractError::ReadFailed {
                path: self.dir.clone(),
                source: e,
            })?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            // Only names `result_path` produces; `page_9.json` and
            // `page_0009.json` are skipped.
            if let Some(page) = RE_PAGE_FILE
                .captures(name)
                .and_then(|caps| caps[1].parse::<usize>().ok())
                .filter(|page| name == result_file_name(*page))
            {
                pages.push(page);
            }
        }
        pages.sort_unstable();
        pages.dedup();
        Ok(pages)
    }

    /// Every completed page, ascending by page number.
    pub async fn load_all(&self) -> Result<Vec<PageResult>, ExtractError> {
        let mut results = Vec::new();
        for page in self.completed_pages().await? {
            let patterns = self.load(page).await?;
            results.push(PageResult { page, patterns });
        }
        Ok(results)
    }
}

fn result_file_name(page: usize) -> String {
    format!("page_{page:03}.json")
}

async fn exists(path: &Path) -> Result<bool, ExtractError> {
    tokio::fs::try_exists(path)
        .await
        .map_err(|e| ExtractError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Write `bytes` to `path` via a sibling temp file and rename.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ExtractError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ExtractError::WriteFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    tokio::fs::write(&tmp_path, bytes)
        .await
        .map_err(|e| ExtractError::WriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| ExtractError::WriteFailed {
            path: path.to_path_buf(),
            source: e,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{silent_row, Instrument};

    fn pattern(id: &str) -> CanonicalPattern {
        CanonicalPattern {
            id: id.to_string(),
            name: id.to_string(),
            steps: Instrument::ALL.iter().map(|i| (*i, silent_row())).collect(),
        }
    }

    #[test]
    fn file_names_are_zero_padded() {
        let cache = PageCache::new("/cache");
        assert_eq!(cache.result_path(9), PathBuf::from("/cache/page_009.json"));
        assert_eq!(cache.error_path(97), PathBuf::from("/cache/page_097.error"));
        assert_eq!(cache.result_path(1234), PathBuf::from("/cache/page_1234.json"));
    }

    #[tokio::test]
    async fn state_transitions() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PageCache::new(dir.path());

        assert_eq!(cache.state(9).await.unwrap(), CacheState::Pending);

        let err = PageError::InvalidResponse {
            page: 9,
            detail: "not json".into(),
        };
        cache.store_error(9, &err).await.unwrap();
        assert_eq!(cache.state(9).await.unwrap(), CacheState::Errored);
        assert_eq!(cache.load_error(9).await.unwrap(), err.to_string());

        cache.store(9, &[pattern("rock-1")]).await.unwrap();
        assert_eq!(cache.state(9).await.unwrap(), CacheState::Cached);
        assert!(!cache.error_path(9).exists(), "stale marker removed");
    }

    #[tokio::test]
    async fn store_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PageCache::new(dir.path().join("nested"));
        let patterns = vec![pattern("rock-1"), pattern("rock-2")];

        cache.store(12, &patterns).await.unwrap();
        assert_eq!(cache.load(12).await.unwrap(), patterns);

        let text = std::fs::read_to_string(cache.result_path(12)).unwrap();
        assert!(text.ends_with("]\n"));
        assert!(!dir.path().join("nested/page_012.json.tmp").exists());
    }

    #[tokio::test]
    async fn empty_page_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PageCache::new(dir.path());
        cache.store(5, &[]).await.unwrap();
        assert_eq!(cache.state(5).await.unwrap(), CacheState::Cached);
        assert!(cache.load(5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn completed_pages_sorted_numerically() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PageCache::new(dir.path());
        for page in [100, 9, 42] {
            cache.store(page, &[]).await.unwrap();
        }
        std::fs::write(dir.path().join("page_050.error"), "boom").unwrap();
        std::fs::write(dir.path().join("page_051.json.tmp"), "[").unwrap();
        std::fs::write(dir.path().join("notes.json"), "{}").unwrap();

        assert_eq!(cache.completed_pages().await.unwrap(), vec![9, 42, 100]);
    }

    #[tokio::test]
    async fn non_canonical_page_names_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PageCache::new(dir.path());
        cache.store(12, &[]).await.unwrap();
        cache.store(1234, &[]).await.unwrap();
        std::fs::write(dir.path().join("page_9.json"), "[]").unwrap();
        std::fs::write(dir.path().join("page_0009.json"), "[]").unwrap();
        std::fs::write(dir.path().join("page_0012.json"), "[]").unwrap();

        assert_eq!(cache.completed_pages().await.unwrap(), vec![12, 1234]);
        let results = cache.load_all().await.unwrap();
        let pages: Vec<usize> = results.iter().map(|r| r.page).collect();
        assert_eq!(pages, vec![12, 1234]);
    }

    #[tokio::test]
    async fn corrupt_page_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PageCache::new(dir.path());
        std::fs::write(cache.result_path(3), "[{\"id\":").unwrap();
        let err = cache.load(3).await.unwrap_err();
        assert!(matches!(err, ExtractError::CacheCorrupt { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn clear_error_reports_presence() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PageCache::new(dir.path());
        assert!(!cache.clear_error(4).await.unwrap());
        std::fs::write(cache.error_path(4), "boom").unwrap();
        assert!(cache.clear_error(4).await.unwrap());
        assert_eq!(cache.state(4).await.unwrap(), CacheState::Pending);
    }
}
