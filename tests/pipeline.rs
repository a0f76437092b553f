//! Integration tests for the extraction driver.
//!
//! The renderer and recognizer are in-memory fakes that count calls, so
//! these tests cover caching, resumability and failure isolation without
//! pdfium or a live provider.

use async_trait::async_trait;
use drumgrid_extract::{
    extract_pages_with, ExtractError, ExtractionConfig, ExtractionProgressCallback, Instrument,
    PageCache, PageError, PageRange, PageRenderer, PageState, PatternRecognizer, RawRecord,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Fakes ────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct FakeRenderer {
    calls: AtomicUsize,
    fail: HashSet<usize>,
    total: Option<usize>,
}

#[async_trait]
impl PageRenderer for FakeRenderer {
    async fn render(&self, page: usize) -> Result<Vec<u8>, PageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.contains(&page) {
            return Err(PageError::RenderFailed {
                page,
                detail: "bitmap allocation failed".into(),
            });
        }
        Ok(vec![page as u8; 32])
    }

    fn page_count(&self) -> Option<usize> {
        self.total
    }
}

/// Answers each page from a script; unscripted pages have no grids.
#[derive(Default)]
struct FakeRecognizer {
    calls: AtomicUsize,
    seen: Mutex<Vec<usize>>,
    script: HashMap<usize, Result<Vec<RawRecord>, PageError>>,
}

impl FakeRecognizer {
    fn with(mut self, page: usize, answer: Result<Vec<RawRecord>, PageError>) -> Self {
        self.script.insert(page, answer);
        self
    }

    fn seen(&self) -> Vec<usize> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl PatternRecognizer for FakeRecognizer {
    async fn recognize(&self, page: usize, _png: &[u8]) -> Result<Vec<RawRecord>, PageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(page);
        self.script.get(&page).cloned().unwrap_or_else(|| Ok(Vec::new()))
    }
}

#[derive(Default)]
struct RecordingCallback {
    events: Mutex<Vec<String>>,
}

impl ExtractionProgressCallback for RecordingCallback {
    fn on_page_cached(&self, page: usize, pattern_count: usize, errored: bool) {
        self.events
            .lock()
            .unwrap()
            .push(format!("cached {page} {pattern_count} {errored}"));
    }
    fn on_page_rendered(&self, page: usize, _image_bytes: usize) {
        self.events.lock().unwrap().push(format!("rendered {page}"));
    }
    fn on_page_sent(&self, page: usize) {
        self.events.lock().unwrap().push(format!("sent {page}"));
    }
    fn on_page_complete(&self, page: usize, names: &[&str], skipped: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("complete {page} {} {skipped}", names.len()));
    }
    fn on_page_error(&self, page: usize, _error: &str) {
        self.events.lock().unwrap().push(format!("error {page}"));
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

const FOUR_ON_FLOOR: &str = "1000100010001000";
const BACKBEAT: &str = "0000100000001000";

fn record(name: &str) -> RawRecord {
    let mut steps = BTreeMap::new();
    steps.insert("BD".to_string(), FOUR_ON_FLOOR.to_string());
    steps.insert("SD".to_string(), BACKBEAT.to_string());
    steps.insert("CH".to_string(), "1010101010101010".to_string());
    RawRecord {
        name: name.to_string(),
        grid_width: 16,
        steps,
    }
}

fn config(cache_dir: &Path, pages: PageRange) -> ExtractionConfig {
    ExtractionConfig::builder()
        .cache_dir(cache_dir)
        .pages(pages)
        .page_delay_ms(0)
        .build()
        .unwrap()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_first_run_fetches_and_second_run_is_free() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = config(tmp.path(), PageRange::new(9, 11));

    let renderer = FakeRenderer::default();
    let recognizer = FakeRecognizer::default()
        .with(9, Ok(vec![record("Rock: 1"), record("Rock: 2")]))
        .with(10, Ok(vec![record("Afro-cub: 1")]));

    let first = extract_pages_with(&renderer, &recognizer, &cfg).await.unwrap();
    assert_eq!(first.fetched_pages, 3);
    assert_eq!(first.total_patterns, 3);
    assert_eq!(renderer.calls.load(Ordering::SeqCst), 3);
    assert_eq!(recognizer.calls.load(Ordering::SeqCst), 3);

    let cache = PageCache::new(tmp.path());
    assert!(cache.result_path(9).exists());
    assert!(cache.result_path(11).exists());

    let renderer2 = FakeRenderer::default();
    let recognizer2 = FakeRecognizer::default();
    let second = extract_pages_with(&renderer2, &recognizer2, &cfg).await.unwrap();

    assert_eq!(renderer2.calls.load(Ordering::SeqCst), 0);
    assert_eq!(recognizer2.calls.load(Ordering::SeqCst), 0);
    assert_eq!(second.cached_pages, 3);
    assert_eq!(second.fetched_pages, 0);
    for (a, b) in first.pages.iter().zip(&second.pages) {
        assert_eq!(a.patterns, b.patterns, "page {} changed on re-run", a.page);
        assert_eq!(b.state, PageState::Cached);
    }
}

#[tokio::test]
async fn test_pages_are_processed_in_ascending_order() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = config(tmp.path(), PageRange::new(20, 24));
    let recognizer = FakeRecognizer::default();

    let summary = extract_pages_with(&FakeRenderer::default(), &recognizer, &cfg)
        .await
        .unwrap();

    assert_eq!(recognizer.seen(), vec![20, 21, 22, 23, 24]);
    let pages: Vec<usize> = summary.pages.iter().map(|p| p.page).collect();
    assert_eq!(pages, vec![20, 21, 22, 23, 24]);
}

#[tokio::test]
async fn test_resume_skips_pages_cached_by_an_interrupted_run() {
    let tmp = tempfile::tempdir().unwrap();

    // An earlier run got through pages 9 and 10 before it was killed.
    let first = FakeRecognizer::default().with(9, Ok(vec![record("Disco: 1")]));
    extract_pages_with(
        &FakeRenderer::default(),
        &first,
        &config(tmp.path(), PageRange::new(9, 10)),
    )
    .await
    .unwrap();

    let recognizer = FakeRecognizer::default();
    let summary = extract_pages_with(
        &FakeRenderer::default(),
        &recognizer,
        &config(tmp.path(), PageRange::new(9, 12)),
    )
    .await
    .unwrap();

    assert_eq!(recognizer.seen(), vec![11, 12]);
    assert_eq!(summary.cached_pages, 2);
    assert_eq!(summary.fetched_pages, 2);
    assert_eq!(summary.pages[0].patterns[0].id, "disco-1");
}

#[tokio::test]
async fn test_recognition_failure_is_isolated_to_its_page() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = config(tmp.path(), PageRange::new(9, 11));
    let recognizer = FakeRecognizer::default()
        .with(9, Ok(vec![record("Rock: 1")]))
        .with(
            10,
            Err(PageError::InvalidResponse {
                page: 10,
                detail: "no JSON array in response".into(),
            }),
        )
        .with(11, Ok(vec![record("Rock: 2")]));

    let summary = extract_pages_with(&FakeRenderer::default(), &recognizer, &cfg)
        .await
        .unwrap();

    assert_eq!(summary.fetched_pages, 2);
    assert_eq!(summary.errored_pages, 1);
    assert_eq!(summary.total_patterns, 2);

    let failed = &summary.pages[1];
    assert_eq!(failed.state, PageState::Errored);
    assert!(failed.patterns.is_empty());
    assert!(failed.error.as_deref().unwrap().contains("no JSON array"));

    let cache = PageCache::new(tmp.path());
    assert!(!cache.result_path(10).exists());
    let marker = std::fs::read_to_string(cache.error_path(10)).unwrap();
    assert!(marker.starts_with("Page 10:"));
}

#[tokio::test]
async fn test_render_failure_writes_error_marker() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = config(tmp.path(), PageRange::new(9, 10));
    let renderer = FakeRenderer {
        fail: HashSet::from([9]),
        ..Default::default()
    };
    let recognizer = FakeRecognizer::default();

    let summary = extract_pages_with(&renderer, &recognizer, &cfg).await.unwrap();

    assert_eq!(summary.pages[0].state, PageState::Errored);
    assert_eq!(summary.pages[1].state, PageState::Fetched);
    assert_eq!(recognizer.seen(), vec![10]);
    assert!(PageCache::new(tmp.path()).error_path(9).exists());
}

#[tokio::test]
async fn test_errored_pages_stay_skipped_until_retry_requested() {
    let tmp = tempfile::tempdir().unwrap();
    let failing = FakeRecognizer::default().with(
        9,
        Err(PageError::RecognitionFailed {
            page: 9,
            retries: 2,
            detail: "429 Too Many Requests".into(),
        }),
    );
    let cfg = config(tmp.path(), PageRange::single(9));
    extract_pages_with(&FakeRenderer::default(), &failing, &cfg)
        .await
        .unwrap();

    // Plain re-run: the marker short-circuits the page.
    let idle = FakeRecognizer::default();
    let summary = extract_pages_with(&FakeRenderer::default(), &idle, &cfg)
        .await
        .unwrap();
    assert_eq!(idle.calls.load(Ordering::SeqCst), 0);
    assert_eq!(summary.errored_pages, 1);
    assert!(summary.pages[0].error.as_deref().unwrap().contains("429"));

    // Retry run: the marker is cleared and the page fetched again.
    let retry_cfg = ExtractionConfig::builder()
        .cache_dir(tmp.path())
        .pages(PageRange::single(9))
        .page_delay_ms(0)
        .retry_errored(true)
        .build()
        .unwrap();
    let healthy = FakeRecognizer::default().with(9, Ok(vec![record("Rock: 1")]));
    let summary = extract_pages_with(&FakeRenderer::default(), &healthy, &retry_cfg)
        .await
        .unwrap();

    assert_eq!(healthy.calls.load(Ordering::SeqCst), 1);
    assert_eq!(summary.fetched_pages, 1);
    let cache = PageCache::new(tmp.path());
    assert!(cache.result_path(9).exists());
    assert!(!cache.error_path(9).exists());
}

#[tokio::test]
async fn test_normalization_filters_and_repairs_records() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = config(tmp.path(), PageRange::single(30));

    let mut narrow = record("Waltz: 1");
    narrow.grid_width = 12;
    let mut broken_row = record("New Wave: 1");
    broken_row.steps.insert("CPS".into(), "10101".into());

    let recognizer = FakeRecognizer::default().with(
        30,
        Ok(vec![narrow, record("Break: 2"), broken_row]),
    );

    let summary = extract_pages_with(&FakeRenderer::default(), &recognizer, &cfg)
        .await
        .unwrap();

    let report = &summary.pages[0];
    assert_eq!(report.raw_count, 3);
    assert_eq!(report.skipped(), 2);
    assert_eq!(report.names(), vec!["New Wave 1"]);

    let pattern = &report.patterns[0];
    assert_eq!(pattern.id, "new-wave-1");
    assert!(pattern.is_well_formed());
    assert_eq!(pattern.steps[&Instrument::Cp], "0000000000000000");
    assert_eq!(pattern.steps[&Instrument::Bd], FOUR_ON_FLOOR);
    assert_eq!(pattern.steps[&Instrument::Cb], "0000000000000000");

    let cached = PageCache::new(tmp.path()).load(30).await.unwrap();
    assert_eq!(&cached, &report.patterns);
}

#[tokio::test]
async fn test_range_past_document_end_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let cache_dir = tmp.path().join("cache");
    let cfg = config(&cache_dir, PageRange::new(95, 99));
    let renderer = FakeRenderer {
        total: Some(97),
        ..Default::default()
    };
    let recognizer = FakeRecognizer::default();

    let err = extract_pages_with(&renderer, &recognizer, &cfg)
        .await
        .unwrap_err();

    assert!(matches!(err, ExtractError::PageOutOfRange { page: 99, total: 97 }));
    assert_eq!(renderer.calls.load(Ordering::SeqCst), 0);
    assert!(!cache_dir.exists());
}

#[tokio::test]
async fn test_progress_events_follow_page_lifecycle() {
    let tmp = tempfile::tempdir().unwrap();
    let cb = Arc::new(RecordingCallback::default());
    let cfg = ExtractionConfig::builder()
        .cache_dir(tmp.path())
        .pages(PageRange::new(9, 10))
        .page_delay_ms(0)
        .progress_callback(cb.clone())
        .build()
        .unwrap();

    let recognizer = FakeRecognizer::default()
        .with(9, Ok(vec![record("Rock: 1"), record("Break: 1")]))
        .with(
            10,
            Err(PageError::InvalidResponse {
                page: 10,
                detail: "truncated".into(),
            }),
        );
    extract_pages_with(&FakeRenderer::default(), &recognizer, &cfg)
        .await
        .unwrap();
    extract_pages_with(&FakeRenderer::default(), &FakeRecognizer::default(), &cfg)
        .await
        .unwrap();

    let events = cb.events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            "rendered 9",
            "sent 9",
            "complete 9 1 1",
            "rendered 10",
            "sent 10",
            "error 10",
            "cached 9 1 false",
            "cached 10 0 true",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_delay_only_follows_pages_that_called_out() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = ExtractionConfig::builder()
        .cache_dir(tmp.path())
        .pages(PageRange::new(9, 11))
        .page_delay_ms(10_000)
        .build()
        .unwrap();

    // Three fetched pages: a pause after each but the last.
    let started = tokio::time::Instant::now();
    extract_pages_with(&FakeRenderer::default(), &FakeRecognizer::default(), &cfg)
        .await
        .unwrap();
    let elapsed = started.elapsed().as_secs();
    assert!((20..30).contains(&elapsed), "fetch run took {elapsed}s");

    // All cached: no pauses unless asked for.
    let started = tokio::time::Instant::now();
    extract_pages_with(&FakeRenderer::default(), &FakeRecognizer::default(), &cfg)
        .await
        .unwrap();
    assert!(started.elapsed().as_secs() < 10);

    let delay_cached = ExtractionConfig::builder()
        .cache_dir(tmp.path())
        .pages(PageRange::new(9, 11))
        .page_delay_ms(10_000)
        .delay_cached_pages(true)
        .build()
        .unwrap();
    let started = tokio::time::Instant::now();
    extract_pages_with(&FakeRenderer::default(), &FakeRecognizer::default(), &delay_cached)
        .await
        .unwrap();
    assert!(started.elapsed().as_secs() >= 20);
}
