//! Page rasterisation: turn pages of a paginated document into PNG bytes.
//!
//! [`PageRenderer`] is the seam to the rendering facility. The production
//! implementation, [`PdfiumRenderer`], wraps `pdfium-render`. pdfium keeps
//! thread-local state and blocks, so the extractor always calls renderers
//! from `tokio::task::spawn_blocking`.

use crate::error::RenderError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Rendering facility for paginated documents.
///
/// All methods are blocking.
pub trait PageRenderer: Send + Sync {
    /// Number of pages in the document.
    fn page_count(&self, document: &Path) -> Result<usize, RenderError>;

    /// Render one page (0-based) at `scale` × native size, as PNG bytes.
    fn render_page(
        &self,
        document: &Path,
        page_index: usize,
        scale: f32,
    ) -> Result<Vec<u8>, RenderError>;

    /// Render every page in ascending order.
    ///
    /// The default calls [`page_count`](Self::page_count) then
    /// [`render_page`](Self::render_page) per page; implementations that can
    /// keep the document open across pages should override it.
    fn render_document(&self, document: &Path, scale: f32) -> Result<Vec<Vec<u8>>, RenderError> {
        let total = self.page_count(document)?;
        (0..total)
            .map(|idx| self.render_page(document, idx, scale))
            .collect()
    }
}

/// [`PageRenderer`] backed by the pdfium library.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRenderer {
    /// Explicit library location (file or directory). Falls back to
    /// `PDFIUM_LIB_PATH`, then the working directory, then the system library.
    library_path: Option<PathBuf>,
    /// Cap on the longest rendered edge in pixels; 0 disables the cap.
    max_pixels: u32,
}

impl PdfiumRenderer {
    pub fn new(max_pixels: u32) -> Self {
        Self {
            library_path: None,
            max_pixels,
        }
    }

    pub fn with_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.library_path = Some(path.into());
        self
    }

    fn bind(&self) -> Result<Pdfium, RenderError> {
        let explicit = self
            .library_path
            .clone()
            .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));

        let bindings = match explicit {
            Some(path) if path.is_dir() => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&path))
            }
            Some(path) => Pdfium::bind_to_library(&path),
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| RenderError::Binding(format!("{e:?}")))?;

        Ok(Pdfium::new(bindings))
    }

    fn render_config(&self, scale: f32) -> PdfRenderConfig {
        let config = PdfRenderConfig::new().scale_page_by_factor(scale);
        if self.max_pixels > 0 {
            config
                .set_maximum_width(self.max_pixels as i32)
                .set_maximum_height(self.max_pixels as i32)
        } else {
            config
        }
    }
}

fn open_error(e: PdfiumError) -> RenderError {
    let detail = format!("{e:?}");
    if detail.contains("Password") || detail.contains("password") {
        RenderError::PasswordRequired
    } else {
        RenderError::Corrupt(detail)
    }
}

fn render_one(
    pages: &PdfPages<'_>,
    idx: usize,
    config: &PdfRenderConfig,
) -> Result<Vec<u8>, RenderError> {
    let page_err = |detail: String| RenderError::Page {
        page: idx + 1,
        detail,
    };

    let page = pages
        .get(idx as u16)
        .map_err(|e| page_err(format!("{e:?}")))?;
    let bitmap = page
        .render_with_config(config)
        .map_err(|e| page_err(format!("{e:?}")))?;

    let image = bitmap.as_image();
    debug!(
        "Rendered page {} → {}x{} px",
        idx + 1,
        image.width(),
        image.height()
    );

    encode_png(&image).map_err(|e| page_err(e.to_string()))
}

impl PageRenderer for PdfiumRenderer {
    fn page_count(&self, document: &Path) -> Result<usize, RenderError> {
        let pdfium = self.bind()?;
        let doc = pdfium
            .load_pdf_from_file(document, None)
            .map_err(open_error)?;
        Ok(doc.pages().len() as usize)
    }

    fn render_page(
        &self,
        document: &Path,
        page_index: usize,
        scale: f32,
    ) -> Result<Vec<u8>, RenderError> {
        let pdfium = self.bind()?;
        let doc = pdfium
            .load_pdf_from_file(document, None)
            .map_err(open_error)?;
        let pages = doc.pages();
        let total = pages.len() as usize;
        if page_index >= total {
            return Err(RenderError::Page {
                page: page_index + 1,
                detail: format!("out of range (document has {total} pages)"),
            });
        }
        render_one(&pages, page_index, &self.render_config(scale))
    }

    fn render_document(&self, document: &Path, scale: f32) -> Result<Vec<Vec<u8>>, RenderError> {
        let pdfium = self.bind()?;
        let doc = pdfium
            .load_pdf_from_file(document, None)
            .map_err(open_error)?;
        let pages = doc.pages();
        let total = pages.len() as usize;
        info!("Document loaded: {} pages", total);

        let config = self.render_config(scale);
        (0..total).map(|idx| render_one(&pages, idx, &config)).collect()
    }
}

/// Encode a rasterised page as PNG. Lossless keeps fine print legible.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}
