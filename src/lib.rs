//! # drumgrid-extract
//!
//! Extract drum machine step-sequencer patterns from a scanned pattern book
//! and merge them into a JSON catalog.
//!
//! The pattern grids in the book are images, so text extraction gets
//! nothing out of them. Each page is rasterised and read by a vision model,
//! which reports every grid as rows of hits. The rows are normalised into a
//! fixed 12-instrument, 16-step schema and cached per page, so a run can be
//! killed at any point and resumed without paying for a page twice.
//!
//! ## Pipeline Overview
//!
//! ```text
//! parse:  page ─▶ render ─▶ recognize ─▶ normalize ─▶ parsed_patterns/page_NNN.json
//!                  (pdfium)   (vision LLM)  (slug, rows)     or page_NNN.error
//!
//! merge:  parsed_patterns/*.json ─▶ dedupe (later page wins) ─▶ patterns.json
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use drumgrid_extract::{extract_pages, merge_cache, ExtractionConfig, PageRange};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from GEMINI_API_KEY / OPENAI_API_KEY / …
//!     let config = ExtractionConfig::builder()
//!         .source_pdf("200-drum-machine-patterns.pdf")
//!         .pages(PageRange::new(9, 20))
//!         .build()?;
//!
//!     let summary = extract_pages(&config).await?;
//!     eprintln!("{} patterns, {} pages errored", summary.total_patterns, summary.errored_pages);
//!
//!     let report = merge_cache(&config, true).await?;
//!     eprintln!("would add {:?}", report.new_ids);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `drumgrid` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! ```toml
//! drumgrid-extract = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cache;
pub mod config;
pub mod error;
pub mod extract;
pub mod merge;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod slug;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cache::{CacheState, PageCache};
pub use config::{ExtractionConfig, ExtractionConfigBuilder, InstrumentMap, PageRange};
pub use error::{ExtractError, PageError};
pub use extract::{extract_pages, extract_pages_from_bytes, extract_pages_with, ExtractionSummary};
pub use merge::{
    commit_merge, load_catalog, merge, merge_cache, prepare_merge, MergeReport, SlugCollision,
};
pub use model::{
    CanonicalPattern, Catalog, Instrument, PageReport, PageResult, PageState, RawRecord, STEP_COUNT,
};
pub use normalize::{normalize, normalize_all, NormalizePolicy};
pub use pipeline::recognize::{PatternRecognizer, VisionRecognizer};
pub use pipeline::render::{PageRenderer, PdfiumRenderer};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use slug::{display_name, slugify};
