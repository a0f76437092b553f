//! Error types for the drumgrid-extract library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ExtractError`] is **fatal**: the invocation cannot proceed at all
//!   (source PDF missing, catalog missing, provider not configured). Returned
//!   as `Err(ExtractError)` from [`crate::extract::extract_pages`] and
//!   [`crate::merge::merge_cache`].
//!
//! * [`PageError`] is **non-fatal**: a single page failed (render glitch,
//!   recognition call failed, undecodable response). It is persisted as the
//!   page's error marker and the range scan moves on to the next page.
//!
//! Malformed rows inside an otherwise good response are neither: they are
//! repaired in [`crate::normalize`] and only logged.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the drumgrid-extract library.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Source PDF was not found at the given path.
    #[error("PDF not found at '{path}'\nPass the document with --pdf <PATH>.")]
    PdfNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// PDF could not be opened by pdfium.
    #[error("PDF '{path}' could not be opened: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// The requested range reaches past the end of the document.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    // ── Cache errors ──────────────────────────────────────────────────────
    /// Merge was requested but the page cache directory does not exist.
    #[error("No page cache directory found at '{path}'. Run parsing first.")]
    CacheDirMissing { path: PathBuf },

    /// The page cache directory exists but holds no page files.
    #[error("No parsed page files found in '{path}'. Run parsing first.")]
    CacheEmpty { path: PathBuf },

    /// A completed page file could not be read or decoded.
    #[error("Page cache file '{path}' is unreadable: {detail}")]
    CacheCorrupt { path: PathBuf, detail: String },

    // ── Catalog errors ────────────────────────────────────────────────────
    /// The catalog file to merge into does not exist.
    #[error("Catalog not found at '{path}'\nCreate it or pass --catalog <PATH>.")]
    CatalogNotFound { path: PathBuf },

    /// The catalog file exists but does not hold a valid pattern document.
    #[error("Catalog '{path}' is invalid: {detail}")]
    CatalogInvalid { path: PathBuf, detail: String },

    // ── Recognition errors ────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("Recognition provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write a cache file or the catalog.
    #[error("Failed to write '{path}': {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not read a file or list a directory.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page.
///
/// The display text is written verbatim to the page's `.error` marker.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// Page rasterisation failed.
    #[error("Page {page}: rendering failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// Recognition call failed after retries.
    #[error("Page {page}: recognition failed after {retries} retries: {detail}")]
    RecognitionFailed {
        page: usize,
        retries: u32,
        detail: String,
    },

    /// The recognizer answered, but the answer is not a pattern list.
    #[error("Page {page}: could not decode recognition response: {detail}")]
    InvalidResponse { page: usize, detail: String },
}

impl PageError {
    /// Page number the error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::RenderFailed { page, .. }
            | PageError::RecognitionFailed { page, .. }
            | PageError::InvalidResponse { page, .. } => *page,
        }
    }
}
