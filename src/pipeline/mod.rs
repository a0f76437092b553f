//! Pipeline stages for turning one page into raw pattern records.
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ recognize ──▶ response
//! (check)   (pdfium)   (PNG/b64)  (vision LLM)  (JSON decode)
//! ```
//!
//! 1. [`input`]      validate the source PDF before any page work
//! 2. [`render`]     rasterise one page; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 3. [`encode`]     PNG-encode the page and base64-wrap it for the API
//! 4. [`recognize`]  drive the vision call with retry/backoff; the only
//!    stage with network I/O
//! 5. [`response`]   decode the model's answer into raw records, tolerating
//!    fences and prose
//!
//! [`render::PageRenderer`] and [`recognize::PatternRecognizer`] are the
//! seams the driver in [`crate::extract`] is generic over.

pub mod encode;
pub mod input;
pub mod recognize;
pub mod render;
pub mod response;
