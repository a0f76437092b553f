//! Configuration for page extraction and catalog merging.
//!
//! Every path and knob the pipeline uses lives in [`ExtractionConfig`], built
//! via [`ExtractionConfigBuilder`]. Nothing in the library reads a global
//! path constant, so tests can point the whole pipeline at a temp directory.

use crate::error::ExtractError;
use crate::model::Instrument;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// First page of the pattern section in the reference document.
pub const DEFAULT_PAGE_START: usize = 9;
/// Last page of the pattern section in the reference document.
pub const DEFAULT_PAGE_END: usize = 97;
/// Vision model used when neither the config nor the environment names one.
pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";

/// Configuration for an extraction or merge run.
///
/// # Example
/// ```rust
/// use drumgrid_extract::{ExtractionConfig, PageRange};
///
/// let config = ExtractionConfig::builder()
///     .source_pdf("patterns.pdf")
///     .pages(PageRange::new(9, 13))
///     .cache_dir("/tmp/parsed_patterns")
///     .page_delay_ms(0)
///     .build()
///     .unwrap();
/// assert_eq!(config.pages.len(), 5);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Scanned reference PDF.
    pub source_pdf: PathBuf,

    /// Inclusive, 1-indexed page range to process. Default: 9–97.
    pub pages: PageRange,

    /// Directory holding one `page_NNN.json` (or `page_NNN.error`) per page.
    pub cache_dir: PathBuf,

    /// Catalog document the merge step reads and rewrites.
    pub catalog_path: PathBuf,

    /// Pause after each page, in milliseconds. Default: 1000.
    ///
    /// Keeps the recognition service under its request-rate limit.
    pub page_delay_ms: u64,

    /// Also pause after pages served from the cache. Default: false.
    pub delay_cached_pages: bool,

    /// Remove error markers in the range and fetch those pages again. Default: false.
    pub retry_errored: bool,

    /// Rendering DPI. Range: 72–600. Default: 300.
    ///
    /// Grid cells are small; 300 DPI keeps single filled boxes legible.
    pub render_dpi: u32,

    /// Cap on either rendered dimension in pixels. Default: 4000.
    pub max_rendered_pixels: u32,

    /// Case-insensitive label substrings whose patterns are dropped. Default: `["break"]`.
    pub exclusion_terms: Vec<String>,

    /// Printed row labels and the instrument each one maps to.
    pub instrument_map: InstrumentMap,

    /// Instruments every catalog pattern must carry. Default: all twelve.
    pub required_instruments: BTreeSet<Instrument>,

    /// Vision model identifier. If None, uses [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// Provider name (e.g. "gemini", "openai").
    /// If None along with `provider`, the provider is detected from the environment.
    pub provider_name: Option<String>,

    /// Pre-constructed provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.0.
    pub temperature: f32,

    /// Output token limit per page. Default: 8192.
    ///
    /// A dense page holds six grids of twelve rows; truncated JSON fails to
    /// decode and costs the whole page.
    pub max_tokens: usize,

    /// Retry attempts on a failed recognition call. Default: 2.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 1000.
    pub retry_backoff_ms: u64,

    /// Custom recognition prompt. If None, uses the built-in prompt.
    pub system_prompt: Option<String>,

    /// Per-page progress events. Default: None.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            source_pdf: PathBuf::from("patterns.pdf"),
            pages: PageRange::default(),
            cache_dir: PathBuf::from("parsed_patterns"),
            catalog_path: PathBuf::from("src/app/data/patterns.json"),
            page_delay_ms: 1000,
            delay_cached_pages: false,
            retry_errored: false,
            render_dpi: 300,
            max_rendered_pixels: 4000,
            exclusion_terms: vec!["break".to_string()],
            instrument_map: InstrumentMap::default(),
            required_instruments: Instrument::ALL.into_iter().collect(),
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 8192,
            max_retries: 2,
            retry_backoff_ms: 1000,
            system_prompt: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("source_pdf", &self.source_pdf)
            .field("pages", &self.pages)
            .field("cache_dir", &self.cache_dir)
            .field("catalog_path", &self.catalog_path)
            .field("page_delay_ms", &self.page_delay_ms)
            .field("delay_cached_pages", &self.delay_cached_pages)
            .field("retry_errored", &self.retry_errored)
            .field("render_dpi", &self.render_dpi)
            .field("exclusion_terms", &self.exclusion_terms)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("max_retries", &self.max_retries)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ExtractionProgressCallback>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn source_pdf(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.source_pdf = path.into();
        self
    }

    pub fn pages(mut self, range: PageRange) -> Self {
        self.config.pages = range;
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.cache_dir = dir.into();
        self
    }

    pub fn catalog_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.catalog_path = path.into();
        self
    }

    pub fn page_delay_ms(mut self, ms: u64) -> Self {
        self.config.page_delay_ms = ms;
        self
    }

    pub fn delay_cached_pages(mut self, v: bool) -> Self {
        self.config.delay_cached_pages = v;
        self
    }

    pub fn retry_errored(mut self, v: bool) -> Self {
        self.config.retry_errored = v;
        self
    }

    pub fn render_dpi(mut self, dpi: u32) -> Self {
        self.config.render_dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn exclusion_terms<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.exclusion_terms = terms.into_iter().map(Into::into).collect();
        self
    }

    pub fn instrument_map(mut self, map: InstrumentMap) -> Self {
        self.config.instrument_map = map;
        self
    }

    pub fn required_instruments(mut self, set: BTreeSet<Instrument>) -> Self {
        self.config.required_instruments = set;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        let c = &self.config;
        if c.pages.start < 1 {
            return Err(ExtractError::InvalidConfig(format!(
                "Pages are 1-indexed, minimum is 1 (got {})",
                c.pages.start
            )));
        }
        if c.pages.start > c.pages.end {
            return Err(ExtractError::InvalidConfig(format!(
                "Invalid page range '{}': start must be <= end",
                c.pages
            )));
        }
        if c.required_instruments.is_empty() {
            return Err(ExtractError::InvalidConfig(
                "At least one required instrument must be set".into(),
            ));
        }
        if c.exclusion_terms.iter().any(|t| t.trim().is_empty()) {
            return Err(ExtractError::InvalidConfig(
                "Exclusion terms must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Page range ───────────────────────────────────────────────────────────

/// Inclusive, 1-indexed range of PDF pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    pub start: usize,
    pub end: usize,
}

impl Default for PageRange {
    fn default() -> Self {
        Self {
            start: DEFAULT_PAGE_START,
            end: DEFAULT_PAGE_END,
        }
    }
}

impl PageRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn single(page: usize) -> Self {
        Self {
            start: page,
            end: page,
        }
    }

    /// Pages in ascending order.
    pub fn iter(&self) -> std::ops::RangeInclusive<usize> {
        self.start..=self.end
    }

    pub fn len(&self) -> usize {
        (self.end + 1).saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, page: usize) -> bool {
        (self.start..=self.end).contains(&page)
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

// ── Instrument map ───────────────────────────────────────────────────────

/// Printed row labels (as they appear on the page) and their instruments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentMap {
    entries: Vec<(String, Instrument)>,
}

impl Default for InstrumentMap {
    /// Rows as printed, top to bottom.
    fn default() -> Self {
        Self::new([
            ("AC", Instrument::Ac),
            ("CY", Instrument::Cy),
            ("CH", Instrument::Ch),
            ("OH", Instrument::Oh),
            ("HT", Instrument::Ht),
            ("MT", Instrument::Mt),
            ("SD", Instrument::Sd),
            ("RS", Instrument::Rs),
            ("LT", Instrument::Lt),
            ("CPS", Instrument::Cp),
            ("CB", Instrument::Cb),
            ("BD", Instrument::Bd),
        ])
    }
}

impl InstrumentMap {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, Instrument)>,
        S: Into<String>,
    {
        Self {
            entries: entries.into_iter().map(|(l, i)| (l.into(), i)).collect(),
        }
    }

    /// Printed label for an instrument, if mapped.
    pub fn label_for(&self, instrument: Instrument) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, i)| *i == instrument)
            .map(|(l, _)| l.as_str())
    }

    /// Instrument for a printed label, if mapped.
    pub fn instrument_for(&self, label: &str) -> Option<Instrument> {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, i)| *i)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Instrument)> {
        self.entries.iter().map(|(l, i)| (l.as_str(), *i))
    }
}
