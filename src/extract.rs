//! Extraction driver: walk a page range, fetching only what is not cached.
//!
//! Each page moves through an explicit state machine:
//!
//! ```text
//!            cache file exists ──────────────▶ Cached   (no external calls)
//!           /
//! Pending ──── error marker exists ─────────▶ Errored  (no external calls)
//!           \
//!            render ─▶ recognize ─▶ normalize ─▶ Cached  (page_NNN.json)
//!                 \          \
//!                  ╰──────────╰─ failure ───▶ Errored  (page_NNN.error)
//! ```
//!
//! Pages run strictly one after another in ascending order. A page failure
//! is written to its marker and the scan continues; only cache I/O errors
//! and precondition failures abort the run. A killed run resumes from the
//! first page without a cache file.

use crate::cache::{CacheState, PageCache};
use crate::config::ExtractionConfig;
use crate::error::{ExtractError, PageError};
use crate::model::{PageReport, PageState};
use crate::normalize::{normalize_all, NormalizePolicy};
use crate::pipeline::input;
use crate::pipeline::recognize::{PatternRecognizer, VisionRecognizer};
use crate::pipeline::render::{PageRenderer, PdfiumRenderer};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// Outcome of one extraction run.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionSummary {
    /// One report per page, ascending.
    pub pages: Vec<PageReport>,
    pub total_patterns: usize,
    /// Pages answered by an existing cache file.
    pub cached_pages: usize,
    /// Pages rendered and recognised during this run.
    pub fetched_pages: usize,
    /// Pages that failed in this run or carry an earlier error marker.
    pub errored_pages: usize,
    pub duration_ms: u64,
}

/// Extract the configured page range from the configured PDF.
///
/// Validates the source PDF, binds pdfium and resolves the vision provider,
/// then hands off to [`extract_pages_with`].
///
/// # Errors
/// Returns `Err(ExtractError)` only for fatal errors: PDF missing or not a
/// PDF, range past the end of the document, provider not configured, or a
/// cache file that cannot be written. Page failures are reported in the
/// summary instead.
pub async fn extract_pages(config: &ExtractionConfig) -> Result<ExtractionSummary, ExtractError> {
    extract_from_path(&config.source_pdf, config).await
}

/// Extract pages from PDF bytes held in memory.
///
/// The bytes are written to a managed [`tempfile`] that is removed when the
/// run returns; `config.source_pdf` is ignored. Page numbers and the cache
/// directory behave exactly as in [`extract_pages`].
pub async fn extract_pages_from_bytes(
    bytes: &[u8],
    config: &ExtractionConfig,
) -> Result<ExtractionSummary, ExtractError> {
    let mut tmp = tempfile::Builder::new()
        .suffix(".pdf")
        .tempfile()
        .map_err(|e| ExtractError::Internal(format!("tempfile: {e}")))?;
    tmp.write_all(bytes)
        .map_err(|e| ExtractError::Internal(format!("tempfile write: {e}")))?;
    // `tmp` is dropped (and the file deleted) when the run returns
    extract_from_path(tmp.path(), config).await
}

async fn extract_from_path(
    path: &Path,
    config: &ExtractionConfig,
) -> Result<ExtractionSummary, ExtractError> {
    let pdf_path = input::resolve_pdf(path)?;
    let renderer = PdfiumRenderer::open(&pdf_path, config).await?;
    let recognizer = VisionRecognizer::from_config(config)?;
    extract_pages_with(&renderer, &recognizer, config).await
}

/// Extract the configured page range with the given collaborators.
pub async fn extract_pages_with(
    renderer: &dyn PageRenderer,
    recognizer: &dyn PatternRecognizer,
    config: &ExtractionConfig,
) -> Result<ExtractionSummary, ExtractError> {
    let start = Instant::now();
    let range = config.pages;

    if let Some(total) = renderer.page_count() {
        if range.end > total {
            return Err(ExtractError::PageOutOfRange {
                page: range.end,
                total,
            });
        }
    }

    let cache = PageCache::new(&config.cache_dir);
    cache.ensure_dir().await?;

    if config.retry_errored {
        for page in range.iter() {
            cache.clear_error(page).await?;
        }
    }

    let policy = NormalizePolicy::from_config(config);
    let delay = Duration::from_millis(config.page_delay_ms);

    info!("Extracting pages {} into {}", range, cache.dir().display());
    if let Some(ref cb) = config.progress_callback {
        cb.on_run_start(range.start, range.end);
    }

    let mut reports = Vec::with_capacity(range.len());
    for page in range.iter() {
        let report = process_page(renderer, recognizer, &cache, &policy, config, page).await?;

        let pause = !delay.is_zero()
            && page < range.end
            && (!report.from_cache || config.delay_cached_pages);
        reports.push(report);
        if pause {
            sleep(delay).await;
        }
    }

    let count = |state: PageState| reports.iter().filter(|r| r.state == state).count();
    let summary = ExtractionSummary {
        total_patterns: reports.iter().map(|r| r.patterns.len()).sum(),
        cached_pages: count(PageState::Cached),
        fetched_pages: count(PageState::Fetched),
        errored_pages: count(PageState::Errored),
        duration_ms: start.elapsed().as_millis() as u64,
        pages: reports,
    };

    info!(
        "Done: {} patterns from pages {} ({} cached, {} fetched, {} errored)",
        summary.total_patterns,
        range,
        summary.cached_pages,
        summary.fetched_pages,
        summary.errored_pages
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_run_complete(summary.total_patterns, range.start, range.end);
    }

    Ok(summary)
}

/// Resolve one page: short-circuit on the cache, otherwise fetch it.
async fn process_page(
    renderer: &dyn PageRenderer,
    recognizer: &dyn PatternRecognizer,
    cache: &PageCache,
    policy: &NormalizePolicy,
    config: &ExtractionConfig,
    page: usize,
) -> Result<PageReport, ExtractError> {
    match cache.state(page).await? {
        CacheState::Cached => {
            let patterns = cache.load(page).await?;
            debug!("Page {}: already done, skipping", page);
            if let Some(ref cb) = config.progress_callback {
                cb.on_page_cached(page, patterns.len(), false);
            }
            Ok(PageReport {
                page,
                state: PageState::Cached,
                patterns,
                raw_count: 0,
                from_cache: true,
                error: None,
            })
        }
        CacheState::Errored => {
            let error = cache.load_error(page).await?;
            debug!("Page {}: error marker present, skipping", page);
            if let Some(ref cb) = config.progress_callback {
                cb.on_page_cached(page, 0, true);
            }
            Ok(PageReport {
                page,
                state: PageState::Errored,
                patterns: Vec::new(),
                raw_count: 0,
                from_cache: true,
                error: Some(error),
            })
        }
        CacheState::Pending => fetch_page(renderer, recognizer, cache, policy, config, page).await,
    }
}

/// Render, recognise, normalise and cache one pending page.
async fn fetch_page(
    renderer: &dyn PageRenderer,
    recognizer: &dyn PatternRecognizer,
    cache: &PageCache,
    policy: &NormalizePolicy,
    config: &ExtractionConfig,
    page: usize,
) -> Result<PageReport, ExtractError> {
    debug!("Page {}: rendering", page);
    let recognized = match renderer.render(page).await {
        Ok(png) => {
            if let Some(ref cb) = config.progress_callback {
                cb.on_page_rendered(page, png.len());
                cb.on_page_sent(page);
            }
            debug!("Page {}: sending {} bytes for recognition", page, png.len());
            recognizer.recognize(page, &png).await
        }
        Err(e) => Err(e),
    };

    let raw = match recognized {
        Ok(raw) => raw,
        Err(e) => return record_failure(cache, config, page, e).await,
    };

    let patterns = normalize_all(&raw, policy);
    cache.store(page, &patterns).await?;

    let report = PageReport {
        page,
        state: PageState::Fetched,
        patterns,
        raw_count: raw.len(),
        from_cache: false,
        error: None,
    };

    info!(
        "Page {}: {} patterns (skipped {}) {:?}",
        page,
        report.patterns.len(),
        report.skipped(),
        report.names()
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_page_complete(page, &report.names(), report.skipped());
    }

    Ok(report)
}

async fn record_failure(
    cache: &PageCache,
    config: &ExtractionConfig,
    page: usize,
    error: PageError,
) -> Result<PageReport, ExtractError> {
    let message = error.to_string();
    warn!("{}", message);
    cache.store_error(page, &error).await?;
    if let Some(ref cb) = config.progress_callback {
        cb.on_page_error(page, &message);
    }
    Ok(PageReport {
        page,
        state: PageState::Errored,
        patterns: Vec::new(),
        raw_count: 0,
        from_cache: false,
        error: Some(message),
    })
}
