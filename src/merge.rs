//! Catalog merge: fold every cached page into the persisted catalog.
//!
//! [`merge`] is pure and does the reconciliation. [`prepare_merge`] loads
//! the cache and catalog and checks the preconditions; [`commit_merge`]
//! performs the atomic catalog write. [`merge_cache`] runs both.
//!
//! Page results are flattened in ascending page order, so when two pages
//! produce the same id the later page wins. Merged values are written over
//! the `id`, `name` and `steps` of existing entries; any other fields on
//! those entries, and entries the pages do not mention, are kept as read.

use crate::cache::{write_atomic, PageCache};
use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::model::{overlay_entry, CanonicalPattern, Catalog, PageResult};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

/// Two distinct display names that slugified to the same id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlugCollision {
    pub id: String,
    pub earlier_page: usize,
    pub earlier_name: String,
    pub later_page: usize,
    pub later_name: String,
}

/// Outcome of a merge, real or dry-run.
#[derive(Debug, Clone, Serialize)]
pub struct MergeReport {
    /// Page results that took part.
    pub page_files: usize,
    /// Distinct ids across all page results.
    pub unique_patterns: usize,
    /// Ids absent from the existing catalog, sorted.
    pub new_ids: Vec<String>,
    /// Ids present in the existing catalog whose value changes, sorted.
    pub updated_ids: Vec<String>,
    /// Ids present in the existing catalog with an identical value, sorted.
    pub unchanged_ids: Vec<String>,
    /// Existing entries carried over without change.
    pub kept: usize,
    pub collisions: Vec<SlugCollision>,
    pub dry_run: bool,
    /// The catalog after the merge. Equal to the existing catalog on a dry run.
    #[serde(skip)]
    pub catalog: Catalog,
}

impl MergeReport {
    pub fn added(&self) -> usize {
        self.new_ids.len()
    }

    pub fn updated(&self) -> usize {
        self.updated_ids.len()
    }

    /// `true` when the merge leaves the catalog as it was.
    pub fn is_noop(&self) -> bool {
        self.new_ids.is_empty() && self.updated_ids.is_empty()
    }
}

/// Reconcile `page_results` against `existing`.
///
/// With `dry_run` the returned catalog is a copy of `existing`; the id lists
/// and counts still describe what a real merge would do.
pub fn merge(page_results: &[PageResult], existing: &Catalog, dry_run: bool) -> MergeReport {
    let mut ordered: Vec<&PageResult> = page_results.iter().collect();
    ordered.sort_by_key(|r| r.page);

    let mut merged: BTreeMap<String, (usize, &CanonicalPattern)> = BTreeMap::new();
    let mut collisions = Vec::new();

    for result in ordered {
        for pattern in &result.patterns {
            let previous = merged.insert(pattern.id.clone(), (result.page, pattern));
            if let Some((earlier_page, earlier)) = previous {
                if earlier.name != pattern.name {
                    warn!(
                        "Slug collision on '{}': '{}' (page {}) replaced by '{}' (page {})",
                        pattern.id, earlier.name, earlier_page, pattern.name, result.page
                    );
                    collisions.push(SlugCollision {
                        id: pattern.id.clone(),
                        earlier_page,
                        earlier_name: earlier.name.clone(),
                        later_page: result.page,
                        later_name: pattern.name.clone(),
                    });
                }
            }
        }
    }

    let mut new_ids = Vec::new();
    let mut updated_ids = Vec::new();
    let mut unchanged_ids = Vec::new();
    for (id, (_, pattern)) in &merged {
        match existing.entry(id) {
            None => new_ids.push(id.clone()),
            Some(current) if *current == overlay_entry(Some(current), pattern) => {
                unchanged_ids.push(id.clone())
            }
            Some(_) => updated_ids.push(id.clone()),
        }
    }

    let mut catalog = existing.clone();
    if !dry_run {
        for (_, pattern) in merged.values() {
            catalog.upsert(pattern);
        }
    }

    MergeReport {
        page_files: page_results.len(),
        unique_patterns: merged.len(),
        kept: existing.len() - updated_ids.len(),
        new_ids,
        updated_ids,
        unchanged_ids,
        collisions,
        dry_run,
        catalog,
    }
}

/// Merge every cached page into the catalog at `config.catalog_path`.
///
/// Equivalent to [`prepare_merge`] followed by [`commit_merge`]. Callers that
/// want to show the summary before the file changes call the two in turn.
///
/// # Errors
/// See [`prepare_merge`]; additionally fatal when the write fails.
pub async fn merge_cache(
    config: &ExtractionConfig,
    dry_run: bool,
) -> Result<MergeReport, ExtractError> {
    let report = prepare_merge(config, dry_run).await?;
    commit_merge(&report, config).await?;
    Ok(report)
}

/// Load the cache and the catalog and compute the merge without writing.
///
/// # Errors
/// Fatal when the cache directory is missing or holds no page files, and
/// when the catalog file is missing or does not parse.
pub async fn prepare_merge(
    config: &ExtractionConfig,
    dry_run: bool,
) -> Result<MergeReport, ExtractError> {
    let cache = PageCache::new(&config.cache_dir);
    if !tokio::fs::metadata(cache.dir())
        .await
        .is_ok_and(|m| m.is_dir())
    {
        return Err(ExtractError::CacheDirMissing {
            path: cache.dir().to_path_buf(),
        });
    }

    let page_results = cache.load_all().await?;
    if page_results.is_empty() {
        return Err(ExtractError::CacheEmpty {
            path: cache.dir().to_path_buf(),
        });
    }

    let existing = load_catalog(&config.catalog_path).await?;
    let report = merge(&page_results, &existing, dry_run);

    info!(
        "Found {} unique patterns from {} page files",
        report.unique_patterns, report.page_files
    );
    Ok(report)
}

/// Atomically write `report.catalog` to `config.catalog_path`. Does nothing
/// for a dry-run report.
pub async fn commit_merge(
    report: &MergeReport,
    config: &ExtractionConfig,
) -> Result<(), ExtractError> {
    if report.dry_run {
        return Ok(());
    }

    let json = report
        .catalog
        .to_json()
        .map_err(|e| ExtractError::Internal(format!("Catalog serialisation failed: {e}")))?;
    write_atomic(&config.catalog_path, json.as_bytes()).await?;
    info!(
        "Wrote {} patterns to {} (added {}, updated {}, kept {})",
        report.catalog.len(),
        config.catalog_path.display(),
        report.added(),
        report.updated(),
        report.kept
    );
    Ok(())
}

/// Read and parse the catalog file.
pub async fn load_catalog(path: &Path) -> Result<Catalog, ExtractError> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ExtractError::CatalogNotFound {
                path: path.to_path_buf(),
            })
        }
        Err(e) => {
            return Err(ExtractError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    Catalog::from_json(&text).map_err(|e| ExtractError::CatalogInvalid {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}
