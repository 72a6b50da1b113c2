//! Error types for the edgequake-pdf2report library.
//!
//! Two families of errors reflect the two failure modes of a run:
//!
//! * [`ReportError`] — **Fatal**: the run produces no report at all. Only
//!   extraction failures (before any analysis call is made) and assembly
//!   failures (after all analysis calls finished) end up here, plus
//!   configuration problems detected up front.
//!
//! * [`UnitError`] — **Non-fatal**: one page-image could not be analysed.
//!   The dispatcher turns it into an
//!   [`OutcomeStatus::Failed`](crate::output::OutcomeStatus) entry and the
//!   section is rendered with an error notice; sibling units are unaffected.
//!
//! [`RenderError`] and [`WriteError`] are the error types of the rendering
//! and report-writing seams. They are wrapped into the fatal errors above by
//! the extractor and the assembler respectively.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by a pipeline run.
#[derive(Debug, Error)]
pub enum ReportError {
    /// A document could not be turned into analysis units.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// The report could not be serialised or published.
    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    /// The batch contained no documents, or the documents contained no pages.
    #[error("Batch is empty: {documents} document(s) produced no analysis units")]
    EmptyBatch { documents: usize },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Unexpected internal error (task join failure, runtime creation).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A document failed to open or parse; the whole batch is abandoned before
/// any analysis call is made.
#[derive(Debug, Error)]
#[error("Failed to extract pages from '{document_name}': {cause}")]
pub struct ExtractionError {
    pub document_name: String,
    #[source]
    pub cause: ExtractionCause,
}

impl ExtractionError {
    pub fn new(document_name: impl Into<String>, cause: ExtractionCause) -> Self {
        Self {
            document_name: document_name.into(),
            cause,
        }
    }
}

/// Why a document could not be extracted.
#[derive(Debug, Error)]
pub enum ExtractionCause {
    /// Input file was not found at the given path.
    #[error("file not found: '{path}'")]
    NotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// HTTP download of a URL input failed or timed out.
    #[error("download of '{url}' failed: {reason}")]
    DownloadFailed { url: String, reason: String },

    /// A standalone image is not in a format the report can embed.
    #[error("not a supported image (first bytes: {magic:?})")]
    UnsupportedImage { magic: Vec<u8> },

    /// The rendering facility rejected the document.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Scratch-space or input I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The report could not be written or published.
///
/// When this is returned no report file exists at the destination.
#[derive(Debug, Error)]
pub enum AssemblyError {
    /// The report writer failed to serialise the document.
    #[error("Failed to write report: {0}")]
    Write(#[from] WriteError),

    /// The temporary report file could not be created or moved into place.
    #[error("Failed to publish report to '{path}': {source}")]
    Publish {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Outcomes handed to the assembler do not line up with the units.
    #[error("Outcome for unit {index} is missing or out of range ({units} units)")]
    OutcomeMismatch { index: usize, units: usize },
}

/// Errors raised by a [`crate::pipeline::render::PageRenderer`].
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    Binding(String),

    /// Document header/trailer/xref is corrupt and cannot be parsed.
    #[error("document is corrupt or unsupported: {0}")]
    Corrupt(String),

    /// Document requires a password.
    #[error("document is encrypted and requires a password")]
    PasswordRequired,

    /// A single page failed to rasterise.
    #[error("rasterisation failed for page {page}: {detail}")]
    Page { page: usize, detail: String },
}

/// Errors raised by a [`crate::pipeline::writer::ReportDraft`].
#[derive(Debug, Error)]
pub enum WriteError {
    /// Building or encoding the document structure failed.
    #[error("report encoding failed: {0}")]
    Encode(String),

    /// Writing the encoded bytes failed.
    #[error("report I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// A non-fatal error for a single analysis unit.
///
/// Never escapes the dispatcher: its `Display` text becomes the message of
/// the unit's `Failed` outcome.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum UnitError {
    /// The inference service returned an error.
    #[error("{0}")]
    Call(String),

    /// The call did not finish within the configured timeout.
    #[error("timeout after {secs}s")]
    Timeout { secs: u64 },

    /// The analysis future panicked.
    #[error("analysis panicked: {0}")]
    Panicked(String),

    /// The unit's page image could not be read from scratch or input.
    #[error("page image unreadable: {0}")]
    ImageUnreadable(String),

    /// The page image could not be prepared for the provider request.
    #[error("image encoding failed: {0}")]
    Encode(String),
}
