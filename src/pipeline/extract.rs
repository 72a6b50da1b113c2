//! Unit extraction: flatten a batch of documents into ordered page-images.
//!
//! Submission order is preserved across documents and page order within a
//! paginated document, so `sequence_index` equals list position. Rendered
//! pages are written as PNG files into the run's scratch directory; the
//! [`ExtractedBatch`] owns that directory and removes it on drop.
//!
//! Extraction is all-or-nothing: the first document that fails to open
//! aborts the batch before any analysis call is made.

use crate::error::{ExtractionCause, ExtractionError, ReportError};
use crate::pipeline::input::{self, DocumentKind, InputDocument, ResolvedDocument};
use crate::pipeline::render::PageRenderer;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info};
use uuid::Uuid;

/// One page-image to be analysed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisUnit {
    /// 0-based position in the batch; unique, contiguous over `[0, N)`.
    pub sequence_index: usize,
    /// Path of the page image: a scratch PNG or the submitted image itself.
    pub source_locator: PathBuf,
    /// Name of the originating document.
    pub document_name: String,
    /// 1-based page within a paginated document; `None` for images.
    pub page_number: Option<usize>,
}

impl AnalysisUnit {
    /// Caption naming where the unit came from, e.g. `plan.pdf, page 2`.
    pub fn source_label(&self) -> String {
        match self.page_number {
            Some(page) => format!("{}, page {}", self.document_name, page),
            None => self.document_name.clone(),
        }
    }
}

/// A run's private scratch directory.
///
/// Named after the run id so concurrent runs never share files. Removed when
/// dropped.
#[derive(Debug)]
pub struct ScratchSpace {
    dir: TempDir,
}

impl ScratchSpace {
    pub async fn create(root: &Path, run_id: Uuid) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(root).await?;
        let root = root.to_path_buf();
        let prefix = format!("pdf2report-{run_id}-");
        let dir = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new().prefix(&prefix).tempdir_in(&root)
        })
        .await
        .map_err(std::io::Error::other)??;
        debug!("Scratch directory: {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Ordered units plus the scratch space backing their images.
#[derive(Debug)]
pub struct ExtractedBatch {
    pub units: Vec<AnalysisUnit>,
    pub scratch: ScratchSpace,
}

/// Parameters for [`extract_units`].
#[derive(Clone)]
pub struct ExtractOptions {
    pub render_scale: f32,
    pub download_timeout_secs: u64,
}

/// Turn `documents` into an ordered list of analysis units.
///
/// Takes ownership of `scratch`; it is returned inside the batch on success
/// and dropped (deleted) on failure.
pub async fn extract_units(
    documents: &[InputDocument],
    renderer: Arc<dyn PageRenderer>,
    options: &ExtractOptions,
    scratch: ScratchSpace,
) -> Result<ExtractedBatch, ReportError> {
    let mut units: Vec<AnalysisUnit> = Vec::new();

    for (ordinal, doc) in documents.iter().enumerate() {
        let resolved = input::resolve_document(
            doc,
            ordinal,
            scratch.path(),
            options.download_timeout_secs,
        )
        .await?;

        match resolved.kind {
            DocumentKind::Paginated => {
                let pages = render_pages(&resolved, Arc::clone(&renderer), options.render_scale).await?;
                info!("'{}': {} page(s) rendered", resolved.name, pages.len());

                for (page_idx, png) in pages.into_iter().enumerate() {
                    let sequence_index = units.len();
                    let path = scratch
                        .path()
                        .join(format!("unit-{sequence_index:05}-p{}.png", page_idx + 1));
                    tokio::fs::write(&path, &png)
                        .await
                        .map_err(|e| ExtractionError::new(&resolved.name, ExtractionCause::Io(e)))?;

                    units.push(AnalysisUnit {
                        sequence_index,
                        source_locator: path,
                        document_name: resolved.name.clone(),
                        page_number: Some(page_idx + 1),
                    });
                }
            }
            DocumentKind::SingleImage => {
                input::sniff_image(&resolved.header)
                    .map_err(|cause| ExtractionError::new(&resolved.name, cause))?;
                debug!("'{}': standalone image", resolved.name);

                units.push(AnalysisUnit {
                    sequence_index: units.len(),
                    source_locator: resolved.path,
                    document_name: resolved.name,
                    page_number: None,
                });
            }
        }
    }

    if units.is_empty() {
        return Err(ReportError::EmptyBatch {
            documents: documents.len(),
        });
    }

    Ok(ExtractedBatch { units, scratch })
}

/// Count the units a batch would produce without rendering anything.
pub async fn plan_units(
    documents: &[InputDocument],
    renderer: Arc<dyn PageRenderer>,
    download_timeout_secs: u64,
    scratch: &ScratchSpace,
) -> Result<Vec<AnalysisUnit>, ReportError> {
    let mut units = Vec::new();

    for (ordinal, doc) in documents.iter().enumerate() {
        let resolved =
            input::resolve_document(doc, ordinal, scratch.path(), download_timeout_secs).await?;
        match resolved.kind {
            DocumentKind::Paginated => {
                let renderer = Arc::clone(&renderer);
                let path = resolved.path.clone();
                let count = tokio::task::spawn_blocking(move || renderer.page_count(&path))
                    .await
                    .map_err(|e| ReportError::Internal(format!("Page-count task panicked: {e}")))?
                    .map_err(|e| ExtractionError::new(&resolved.name, e.into()))?;
                for page in 1..=count {
                    units.push(AnalysisUnit {
                        sequence_index: units.len(),
                        source_locator: resolved.path.clone(),
                        document_name: resolved.name.clone(),
                        page_number: Some(page),
                    });
                }
            }
            DocumentKind::SingleImage => {
                input::sniff_image(&resolved.header)
                    .map_err(|cause| ExtractionError::new(&resolved.name, cause))?;
                units.push(AnalysisUnit {
                    sequence_index: units.len(),
                    source_locator: resolved.path,
                    document_name: resolved.name,
                    page_number: None,
                });
            }
        }
    }

    Ok(units)
}

async fn render_pages(
    doc: &ResolvedDocument,
    renderer: Arc<dyn PageRenderer>,
    scale: f32,
) -> Result<Vec<Vec<u8>>, ReportError> {
    let path = doc.path.clone();
    tokio::task::spawn_blocking(move || renderer.render_document(&path, scale))
        .await
        .map_err(|e| ReportError::Internal(format!("Render task panicked: {e}")))?
        .map_err(|e| ExtractionError::new(&doc.name, e.into()).into())
}
