//! # edgequake-pdf2report
//!
//! Turn a batch of drawings, scans and PDFs into one technical report, with
//! a Vision Language Model reading every page.
//!
//! ## Pipeline Overview
//!
//! ```text
//! documents (PDF / image / URL)
//!  │
//!  ├─ 1. Extract   flatten into ordered page-images (pdfium, spawn_blocking)
//!  ├─ 2. Dispatch  one VLM call per page, at most C in flight
//!  │               (a failed page never aborts its siblings)
//!  └─ 3. Assemble  one section per page in submission order,
//!                  text sanitized for the report font, published atomically
//!                  as report-{run_id}.pdf
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2report::{generate_report, InputDocument, ReportConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = ReportConfig::builder().output_root("reports").build()?;
//!     let docs = vec![
//!         InputDocument::from_path("bracket-assembly.pdf"),
//!         InputDocument::from_path("site-photo.jpg"),
//!     ];
//!     let output = generate_report(&docs, &config).await?;
//!     println!("{}", output.report_path.display());
//!     eprintln!("{}/{} pages analysed",
//!         output.stats.succeeded_units,
//!         output.stats.total_units);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2report` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-pdf2report = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod report;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ReportConfig, ReportConfigBuilder};
pub use error::{
    AssemblyError, ExtractionCause, ExtractionError, RenderError, ReportError, UnitError,
    WriteError,
};
pub use output::{AnalysisOutcome, OutcomeStatus, RunOutput, RunStats, UnitSummary};
pub use pipeline::extract::AnalysisUnit;
pub use pipeline::input::InputDocument;
pub use pipeline::llm::{AnalysisReply, Analyzer};
pub use pipeline::render::PageRenderer;
pub use pipeline::writer::{PdfReportWriter, ReportDraft, ReportSection, ReportWriter};
pub use progress::{NoopProgressCallback, ProgressCallback, ReportProgressCallback};
pub use report::{generate_report, generate_report_sync, inspect_batch, ReportPipeline};
