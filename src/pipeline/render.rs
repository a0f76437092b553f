//! PDF rasterisation: render one page to PNG bytes.
//!
//! The driver only sees the [`PageRenderer`] trait, so rendering is a black
//! box that turns a page number into image bytes. [`PdfiumRenderer`] is the
//! production implementation.
//!
//! ## Threading
//!
//! pdfium is a C++ library with thread-local state and is not safe to call
//! from async contexts. Each render runs on tokio's blocking pool and opens
//! the document afresh, so no pdfium handle outlives the call.

use crate::config::ExtractionConfig;
use crate::error::{ExtractError, PageError};
use crate::pipeline::encode;
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Turns a 1-indexed page number into PNG bytes.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Rasterise `page`.
    async fn render(&self, page: usize) -> Result<Vec<u8>, PageError>;

    /// Number of pages in the document, when known.
    fn page_count(&self) -> Option<usize> {
        None
    }
}

/// Renders pages of a PDF through pdfium.
#[derive(Debug, Clone)]
pub struct PdfiumRenderer {
    pdf_path: PathBuf,
    dpi: u32,
    max_pixels: u32,
    page_count: usize,
}

impl PdfiumRenderer {
    /// Bind pdfium, open the document once and record its page count.
    pub async fn open(pdf_path: &Path, config: &ExtractionConfig) -> Result<Self, ExtractError> {
        let path = pdf_path.to_path_buf();
        let count_path = path.clone();
        let page_count = tokio::task::spawn_blocking(move || count_pages_blocking(&count_path))
            .await
            .map_err(|e| ExtractError::Internal(format!("Page-count task panicked: {e}")))??;

        info!("PDF loaded: {} pages", page_count);

        Ok(Self {
            pdf_path: path,
            dpi: config.render_dpi,
            max_pixels: config.max_rendered_pixels,
            page_count,
        })
    }
}

#[async_trait]
impl PageRenderer for PdfiumRenderer {
    async fn render(&self, page: usize) -> Result<Vec<u8>, PageError> {
        let path = self.pdf_path.clone();
        let (dpi, max_pixels) = (self.dpi, self.max_pixels);

        tokio::task::spawn_blocking(move || render_page_blocking(&path, page, dpi, max_pixels))
            .await
            .map_err(|e| PageError::RenderFailed {
                page,
                detail: format!("render task panicked: {e}"),
            })?
            .map_err(|detail| PageError::RenderFailed { page, detail })
    }

    fn page_count(&self) -> Option<usize> {
        Some(self.page_count)
    }
}

/// Bind to pdfium: `PDFIUM_LIB_PATH` if set, else the working directory,
/// else the system library.
fn bind_pdfium() -> Result<Pdfium, String> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(path) if !path.is_empty() => Pdfium::bind_to_library(&path),
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| format!("{e:?}"))?;
    Ok(Pdfium::new(bindings))
}

fn count_pages_blocking(pdf_path: &Path) -> Result<usize, ExtractError> {
    let pdfium = bind_pdfium().map_err(ExtractError::PdfiumBindingFailed)?;
    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| ExtractError::CorruptPdf {
            path: pdf_path.to_path_buf(),
            detail: format!("{e:?}"),
        })?;
    Ok(document.pages().len() as usize)
}

fn render_page_blocking(
    pdf_path: &Path,
    page: usize,
    dpi: u32,
    max_pixels: u32,
) -> Result<Vec<u8>, String> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| format!("{e:?}"))?;

    let pages = document.pages();
    let total = pages.len() as usize;
    if page == 0 || page > total {
        return Err(format!("page {page} out of range (document has {total} pages)"));
    }

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(dpi as f32 / 72.0)
        .set_maximum_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let pdf_page = pages
        .get((page - 1) as u16)
        .map_err(|e| format!("{e:?}"))?;
    let bitmap = pdf_page
        .render_with_config(&render_config)
        .map_err(|e| format!("{e:?}"))?;
    let image = bitmap.as_image();
    debug!("Rendered page {} → {}x{} px", page, image.width(), image.height());

    encode::encode_png(&image).map_err(|e| format!("PNG encoding failed: {e}"))
}
