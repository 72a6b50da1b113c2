//! Input resolution: normalise submitted documents to local files.
//!
//! A batch may mix local paths, HTTP(S) URLs and named in-memory payloads.
//! pdfium and the report writer both need file-system paths, so URLs and
//! payloads are materialised inside the run's scratch directory and vanish
//! with it. The first bytes of every file decide whether it is a paginated
//! document or a standalone image.

use crate::error::{ExtractionCause, ExtractionError};
use image::ImageFormat;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

/// Bytes read from the head of each input for format sniffing.
const HEADER_LEN: usize = 16;

/// Where a submitted document's bytes come from.
#[derive(Debug, Clone)]
pub enum DocumentSource {
    /// A file already on disk.
    Path(PathBuf),
    /// An HTTP/HTTPS URL, downloaded into scratch.
    Url(String),
    /// An in-memory payload (e.g. an upload), written into scratch.
    Bytes(Vec<u8>),
}

/// One document of a batch, as submitted.
#[derive(Debug, Clone)]
pub struct InputDocument {
    /// Display name, used in section captions and error messages.
    pub name: String,
    pub source: DocumentSource,
}

impl InputDocument {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            name,
            source: DocumentSource::Path(path),
        }
    }

    pub fn from_url(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            name: filename_from_url(&url),
            source: DocumentSource::Url(url),
        }
    }

    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            source: DocumentSource::Bytes(bytes),
        }
    }

    /// Interpret a CLI argument as either a URL or a local path.
    pub fn parse(input: &str) -> Self {
        if is_url(input) {
            Self::from_url(input)
        } else {
            Self::from_path(input)
        }
    }
}

/// What kind of unit(s) a document yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Multi-page document: one unit per page.
    Paginated,
    /// Standalone image: exactly one unit.
    SingleImage,
}

/// A document available as a local file, with its kind decided.
#[derive(Debug, Clone)]
pub struct ResolvedDocument {
    pub name: String,
    pub path: PathBuf,
    pub kind: DocumentKind,
    /// Leading bytes of the file, kept for image-format checks.
    pub header: Vec<u8>,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Decide the document kind from its name and leading bytes.
///
/// `%PDF` magic wins; otherwise a `.pdf` extension still marks the file as
/// paginated so that a corrupt PDF is reported by the renderer rather than
/// as an unsupported image.
pub fn detect_kind(name: &str, header: &[u8]) -> DocumentKind {
    if header.starts_with(b"%PDF") || name.to_lowercase().ends_with(".pdf") {
        DocumentKind::Paginated
    } else {
        DocumentKind::SingleImage
    }
}

/// Verify that a standalone image is in a format the report can decode.
pub fn sniff_image(header: &[u8]) -> Result<ImageFormat, ExtractionCause> {
    match image::guess_format(header) {
        Ok(format) if format.reading_enabled() => Ok(format),
        _ => Err(ExtractionCause::UnsupportedImage {
            magic: header.iter().take(4).copied().collect(),
        }),
    }
}

/// Resolve a submitted document to a local file.
///
/// `ordinal` is the document's position in the batch; it prefixes any file
/// written into `scratch_dir` so two documents with the same name never
/// collide.
pub async fn resolve_document(
    doc: &InputDocument,
    ordinal: usize,
    scratch_dir: &Path,
    download_timeout_secs: u64,
) -> Result<ResolvedDocument, ExtractionError> {
    let path = match &doc.source {
        DocumentSource::Path(path) => path.clone(),
        DocumentSource::Url(url) => {
            let target = scratch_dir.join(scratch_name(ordinal, &doc.name));
            download_url(url, &target, download_timeout_secs)
                .await
                .map_err(|cause| ExtractionError::new(&doc.name, cause))?;
            target
        }
        DocumentSource::Bytes(bytes) => {
            let target = scratch_dir.join(scratch_name(ordinal, &doc.name));
            tokio::fs::write(&target, bytes)
                .await
                .map_err(|e| ExtractionError::new(&doc.name, ExtractionCause::Io(e)))?;
            target
        }
    };

    let header = read_header(&path)
        .await
        .map_err(|cause| ExtractionError::new(&doc.name, cause))?;
    let kind = detect_kind(&doc.name, &header);
    debug!("Resolved '{}' → {} ({:?})", doc.name, path.display(), kind);

    Ok(ResolvedDocument {
        name: doc.name.clone(),
        path,
        kind,
        header,
    })
}

/// Read the first bytes of a file, mapping open failures to extraction causes.
async fn read_header(path: &Path) -> Result<Vec<u8>, ExtractionCause> {
    let file = match tokio::fs::File::open(path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ExtractionCause::NotFound {
                path: path.to_path_buf(),
            });
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ExtractionCause::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(e) => return Err(ExtractionCause::Io(e)),
    };

    let mut header = Vec::with_capacity(HEADER_LEN);
    file.take(HEADER_LEN as u64).read_to_end(&mut header).await?;
    Ok(header)
}

/// Download a URL to `target`.
async fn download_url(url: &str, target: &Path, timeout_secs: u64) -> Result<(), ExtractionCause> {
    info!("Downloading document from: {}", url);

    let failed = |reason: String| ExtractionCause::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            failed(format!("timed out after {timeout_secs}s"))
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
    tokio::fs::write(target, &bytes).await?;

    info!("Downloaded {} bytes to: {}", bytes.len(), target.display());
    Ok(())
}

/// Extract a reasonable filename from a URL.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() {
                    return last.to_string();
                }
            }
        }
    }
    "downloaded".to_string()
}

/// File name for a document materialised in scratch.
fn scratch_name(ordinal: usize, name: &str) -> String {
    let safe: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("input-{ordinal:04}-{safe}")
}
