//! Run orchestration: documents in, published report out.
//!
//! [`ReportPipeline`] wires the three stages together for one batch:
//!
//! ```text
//! extract_units ──▶ Dispatcher::dispatch ──▶ assemble_report
//!   (all-or-nothing)   (failures isolated)     (atomic publish)
//! ```
//!
//! Extraction completes before the first analysis call and every outcome
//! exists before assembly starts. The run's scratch directory is dropped on
//! every exit path.

use crate::config::ReportConfig;
use crate::error::ReportError;
use crate::output::{RunOutput, RunStats, UnitSummary};
use crate::pipeline::assemble::assemble_report;
use crate::pipeline::dispatch::Dispatcher;
use crate::pipeline::extract::{extract_units, plan_units, ExtractOptions, ScratchSpace};
use crate::pipeline::input::InputDocument;
use crate::pipeline::llm::{Analyzer, LlmAnalyzer};
use crate::pipeline::render::{PageRenderer, PdfiumRenderer};
use crate::pipeline::writer::{PdfReportWriter, ReportWriter};
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;

/// One configured pipeline; reusable across batches.
pub struct ReportPipeline {
    config: ReportConfig,
    renderer: Arc<dyn PageRenderer>,
    analyzer: Arc<dyn Analyzer>,
    writer: Arc<dyn ReportWriter>,
}

impl ReportPipeline {
    pub fn new(
        config: ReportConfig,
        renderer: Arc<dyn PageRenderer>,
        analyzer: Arc<dyn Analyzer>,
        writer: Arc<dyn ReportWriter>,
    ) -> Self {
        Self {
            config,
            renderer,
            analyzer,
            writer,
        }
    }

    /// Production pipeline: pdfium rendering, the resolved LLM provider and
    /// the PDF writer.
    pub fn from_config(config: ReportConfig) -> Result<Self, ReportError> {
        let provider = resolve_provider(&config)?;
        let analyzer = LlmAnalyzer::new(provider, &config);
        let renderer = PdfiumRenderer::new(config.max_rendered_pixels);
        Ok(Self::new(
            config,
            Arc::new(renderer),
            Arc::new(analyzer),
            Arc::new(PdfReportWriter::new()),
        ))
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    /// Turn `documents` into one published report.
    ///
    /// # Errors
    /// Only fatal errors: a document that cannot be extracted (no analysis
    /// call is made), an empty batch, or a report that cannot be written.
    /// Failed analysis calls are reported in `RunOutput::outcomes`.
    pub async fn run(&self, documents: &[InputDocument]) -> Result<RunOutput, ReportError> {
        let total_start = Instant::now();
        if documents.is_empty() {
            return Err(ReportError::EmptyBatch { documents: 0 });
        }

        let run_id = Uuid::new_v4();
        info!("Run {}: {} document(s)", run_id, documents.len());

        // ── Step 1: Extract units ────────────────────────────────────────
        let extract_start = Instant::now();
        let scratch = ScratchSpace::create(&self.config.scratch_root, run_id)
            .await
            .map_err(|e| {
                ReportError::Internal(format!(
                    "Failed to create scratch directory under '{}': {e}",
                    self.config.scratch_root.display()
                ))
            })?;
        let options = ExtractOptions {
            render_scale: self.config.render_scale,
            download_timeout_secs: self.config.download_timeout_secs,
        };
        let batch = extract_units(documents, Arc::clone(&self.renderer), &options, scratch).await?;
        let extraction_duration_ms = extract_start.elapsed().as_millis() as u64;
        info!(
            "Run {}: {} unit(s) extracted in {}ms",
            run_id,
            batch.units.len(),
            extraction_duration_ms
        );

        // ── Step 2: Analyse every unit ───────────────────────────────────
        let analysis_start = Instant::now();
        let dispatcher = Dispatcher::new(
            Arc::clone(&self.analyzer),
            self.config.concurrency,
            self.config.effective_prompt(),
        )
        .with_timeout(Duration::from_secs(self.config.api_timeout_secs))
        .with_progress(self.config.progress_callback.clone());
        let outcomes = dispatcher.dispatch(&batch.units).await;
        let analysis_duration_ms = analysis_start.elapsed().as_millis() as u64;

        // ── Step 3: Assemble and publish ─────────────────────────────────
        let assembly_start = Instant::now();
        let (report_name, report_path) = {
            let units = batch.units.clone();
            let outcomes = outcomes.clone();
            let writer = Arc::clone(&self.writer);
            let title = self.config.report_title.clone();
            let output_root = self.config.output_root.clone();
            tokio::task::spawn_blocking(move || {
                assemble_report(&units, &outcomes, writer.as_ref(), &title, &output_root, run_id)
            })
            .await
            .map_err(|e| ReportError::Internal(format!("Assembly task panicked: {e}")))??
        };
        let assembly_duration_ms = assembly_start.elapsed().as_millis() as u64;

        let units: Vec<UnitSummary> = batch.units.iter().map(UnitSummary::from).collect();
        drop(batch);

        let mut stats = RunStats::from_outcomes(&outcomes);
        stats.extraction_duration_ms = extraction_duration_ms;
        stats.analysis_duration_ms = analysis_duration_ms;
        stats.assembly_duration_ms = assembly_duration_ms;
        stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

        if stats.failed_units > 0 {
            warn!(
                "Run {}: {}/{} unit(s) failed; see error sections in {}",
                run_id, stats.failed_units, stats.total_units, report_name
            );
        }
        info!(
            "Run {} complete: {} in {}ms ({} in / {} out tokens)",
            run_id,
            report_name,
            stats.total_duration_ms,
            stats.total_input_tokens,
            stats.total_output_tokens
        );

        Ok(RunOutput {
            run_id,
            report_name,
            report_path,
            units,
            outcomes,
            stats,
        })
    }

    /// The units a batch would produce, without rendering or calling a model.
    pub async fn plan(&self, documents: &[InputDocument]) -> Result<Vec<UnitSummary>, ReportError> {
        plan_with(documents, Arc::clone(&self.renderer), &self.config).await
    }
}

async fn plan_with(
    documents: &[InputDocument],
    renderer: Arc<dyn PageRenderer>,
    config: &ReportConfig,
) -> Result<Vec<UnitSummary>, ReportError> {
    let scratch = ScratchSpace::create(&config.scratch_root, Uuid::new_v4())
        .await
        .map_err(|e| ReportError::Internal(format!("Failed to create scratch directory: {e}")))?;
    let units = plan_units(documents, renderer, config.download_timeout_secs, &scratch).await?;
    Ok(units.iter().map(UnitSummary::from).collect())
}

/// Generate a report for `documents` with the production collaborators.
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdf2report::{generate_report, InputDocument, ReportConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let docs = vec![
///     InputDocument::from_path("assembly.pdf"),
///     InputDocument::from_path("detail.jpg"),
/// ];
/// let output = generate_report(&docs, &ReportConfig::default()).await?;
/// println!("{}", output.report_path.display());
/// # Ok(())
/// # }
/// ```
pub async fn generate_report(
    documents: &[InputDocument],
    config: &ReportConfig,
) -> Result<RunOutput, ReportError> {
    ReportPipeline::from_config(config.clone())?.run(documents).await
}

/// Synchronous wrapper around [`generate_report`].
///
/// Creates a temporary tokio runtime internally.
pub fn generate_report_sync(
    documents: &[InputDocument],
    config: &ReportConfig,
) -> Result<RunOutput, ReportError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ReportError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(generate_report(documents, config))
}

/// List the units a batch would produce.
///
/// Does not require an LLM provider or API key.
pub async fn inspect_batch(
    documents: &[InputDocument],
    config: &ReportConfig,
) -> Result<Vec<UnitSummary>, ReportError> {
    let renderer = Arc::new(PdfiumRenderer::new(config.max_rendered_pixels));
    plan_with(documents, renderer, config).await
}

// ── Provider resolution ──────────────────────────────────────────────────

/// Model used when a provider is named without one.
pub fn default_model(provider_name: &str) -> &'static str {
    match provider_name {
        "ollama" => "qwen2.5vl:3b",
        _ => "gpt-4.1-nano",
    }
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, ReportError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ReportError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`); the factory reads
///    the matching API key from the environment.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`),
///    both non-empty.
/// 4. **OpenAI** when `OPENAI_API_KEY` is set.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
pub fn resolve_provider(config: &ReportConfig) -> Result<Arc<dyn LLMProvider>, ReportError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(default_model(name));
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(default_model("openai"));
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ReportError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or run a local Ollama.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
