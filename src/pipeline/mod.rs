//! Pipeline stages for document-to-report runs.
//!
//! Each submodule implements one step. The three collaborator seams
//! ([`render::PageRenderer`], [`llm::Analyzer`], [`writer::ReportWriter`])
//! are traits so tests can run the whole pipeline without pdfium, a model or
//! a PDF parser.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ dispatch ──▶ assemble ──▶ report-{run_id}.pdf
//! (path/URL) (render)   (encode+llm)  (sanitize+writer)
//! ```
//!
//! 1. [`input`]    — materialise each submitted document as a local file and
//!    decide whether it is paginated or a standalone image
//! 2. [`extract`]  — flatten the batch into ordered [`extract::AnalysisUnit`]s;
//!    paginated documents are rasterised via [`render`] in `spawn_blocking`
//! 3. [`dispatch`] — run [`llm`] over every unit on a fixed-size worker pool;
//!    [`encode`] prepares each image for the request
//! 4. [`assemble`] — order outcomes by index, clean and [`sanitize`] text, and
//!    publish through [`writer`] atomically

pub mod assemble;
pub mod dispatch;
pub mod encode;
pub mod extract;
pub mod input;
pub mod llm;
pub mod render;
pub mod sanitize;
pub mod writer;
