//! Pipeline tests with in-process collaborators.
//!
//! No pdfium, no model, no network: the renderer reads a page count out of
//! a fake `%PDF` file and emits `page-<doc>-<n>` as the "image" bytes; the
//! analyzer decides per unit (from those bytes) whether to answer, fail,
//! stall or panic. Section content is observed through a writer that records
//! every section and then delegates to the real PDF writer.

use async_trait::async_trait;
use edgequake_pdf2report::error::{AssemblyError, RenderError, ReportError, UnitError};
use edgequake_pdf2report::pipeline::extract::{extract_units, ExtractOptions, ScratchSpace};
use edgequake_pdf2report::{
    AnalysisReply, Analyzer, InputDocument, OutcomeStatus, PageRenderer, PdfReportWriter,
    ReportConfig, ReportDraft, ReportPipeline, ReportSection, ReportWriter, WriteError,
};
use image::{DynamicImage, Rgb, RgbImage};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

// ── Collaborators ────────────────────────────────────────────────────────────

/// Reads `pages=N` from the file; anything without it is corrupt.
struct FakePdfRenderer;

impl PageRenderer for FakePdfRenderer {
    fn page_count(&self, document: &Path) -> Result<usize, RenderError> {
        let text = std::fs::read_to_string(document).map_err(|e| RenderError::Corrupt(e.to_string()))?;
        text.split_whitespace()
            .find_map(|tok| tok.strip_prefix("pages=")?.parse().ok())
            .ok_or_else(|| RenderError::Corrupt("no xref table".into()))
    }

    fn render_page(&self, document: &Path, page_index: usize, _scale: f32) -> Result<Vec<u8>, RenderError> {
        let stem = document
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(format!("page-{stem}-{}", page_index + 1).into_bytes())
    }
}

#[derive(Clone)]
enum Behaviour {
    Answer(String),
    Fail(String),
    Stall,
    Panic,
}

/// Scripted analyzer keyed by the unit's image bytes.
///
/// Rendered pages arrive as `page-<doc>-<n>`; standalone images (real PNG
/// bytes) are keyed as `image`.
#[derive(Default)]
struct ScriptedAnalyzer {
    script: HashMap<String, Behaviour>,
    delays: HashMap<String, Duration>,
    calls: AtomicUsize,
}

impl ScriptedAnalyzer {
    fn key(image: &[u8]) -> String {
        match std::str::from_utf8(image) {
            Ok(s) if s.starts_with("page-") => s.to_string(),
            _ => "image".to_string(),
        }
    }

    fn with(mut self, key: &str, behaviour: Behaviour) -> Self {
        self.script.insert(key.to_string(), behaviour);
        self
    }

    fn delayed(mut self, key: &str, delay: Duration) -> Self {
        self.delays.insert(key.to_string(), delay);
        self
    }
}

#[async_trait]
impl Analyzer for ScriptedAnalyzer {
    async fn analyze(&self, image: &[u8], _prompt: &str) -> Result<AnalysisReply, UnitError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let key = Self::key(image);
        if let Some(delay) = self.delays.get(&key) {
            tokio::time::sleep(*delay).await;
        }
        let behaviour = self
            .script
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Behaviour::Answer(format!("- analysed {key}")));

        match behaviour {
            Behaviour::Answer(text) => Ok(AnalysisReply {
                text,
                input_tokens: 10,
                output_tokens: 5,
            }),
            Behaviour::Fail(message) => Err(UnitError::Call(message)),
            Behaviour::Stall => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(AnalysisReply::text("too late"))
            }
            Behaviour::Panic => panic!("decoder exploded on {key}"),
        }
    }
}

/// Records sections in arrival order, then writes a real PDF.
#[derive(Default)]
struct RecordingWriter {
    sections: Arc<Mutex<Vec<ReportSection>>>,
}

struct RecordingDraft {
    sections: Arc<Mutex<Vec<ReportSection>>>,
    inner: Box<dyn ReportDraft>,
}

impl ReportWriter for RecordingWriter {
    fn begin_report(&self, title: &str) -> Box<dyn ReportDraft> {
        Box::new(RecordingDraft {
            sections: Arc::clone(&self.sections),
            inner: PdfReportWriter::new().begin_report(title),
        })
    }
}

impl ReportDraft for RecordingDraft {
    fn add_section(&mut self, section: &ReportSection) -> Result<(), WriteError> {
        self.sections.lock().unwrap().push(section.clone());
        self.inner.add_section(section)
    }

    fn finish(self: Box<Self>, out: &mut dyn std::io::Write) -> Result<(), WriteError> {
        self.inner.finish(out)
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

struct Workspace {
    inputs: TempDir,
    scratch: TempDir,
    output: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            inputs: tempfile::tempdir().unwrap(),
            scratch: tempfile::tempdir().unwrap(),
            output: tempfile::tempdir().unwrap(),
        }
    }

    fn fake_pdf(&self, name: &str, pages: usize) -> InputDocument {
        let path = self.inputs.path().join(name);
        std::fs::write(&path, format!("%PDF-1.7 pages={pages}")).unwrap();
        InputDocument::from_path(path)
    }

    fn broken_pdf(&self, name: &str) -> InputDocument {
        let path = self.inputs.path().join(name);
        std::fs::write(&path, "%PDF-1.7 truncated").unwrap();
        InputDocument::from_path(path)
    }

    fn png(&self, name: &str) -> InputDocument {
        let path = self.inputs.path().join(name);
        DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 24, Rgb([10, 120, 200])))
            .save(&path)
            .unwrap();
        InputDocument::from_path(path)
    }

    fn config(&self, concurrency: usize) -> ReportConfig {
        ReportConfig::builder()
            .concurrency(concurrency)
            .scratch_root(self.scratch.path())
            .output_root(self.output.path())
            .api_timeout_secs(1)
            .build()
            .unwrap()
    }

    fn output_files(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.output.path())
            .map(|rd| rd.map(|e| e.unwrap().path()).collect())
            .unwrap_or_default()
    }

    fn scratch_is_empty(&self) -> bool {
        std::fs::read_dir(self.scratch.path()).unwrap().count() == 0
    }
}

fn pipeline(
    config: ReportConfig,
    analyzer: Arc<ScriptedAnalyzer>,
    writer: Arc<RecordingWriter>,
) -> ReportPipeline {
    ReportPipeline::new(config, Arc::new(FakePdfRenderer), analyzer, writer)
}

fn recorded(writer: &RecordingWriter) -> Vec<ReportSection> {
    writer.sections.lock().unwrap().clone()
}

// ── Extraction ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn paginated_document_yields_one_unit_per_page_in_order() {
    let ws = Workspace::new();
    let docs = vec![ws.fake_pdf("plan.pdf", 4), ws.png("photo.png")];
    let scratch = ScratchSpace::create(ws.scratch.path(), Uuid::new_v4())
        .await
        .unwrap();
    let options = ExtractOptions {
        render_scale: 1.5,
        download_timeout_secs: 5,
    };

    let batch = assert_ok!(extract_units(&docs, Arc::new(FakePdfRenderer), &options, scratch).await);

    assert_eq!(batch.units.len(), 5);
    for (i, unit) in batch.units.iter().enumerate() {
        assert_eq!(unit.sequence_index, i);
    }
    let pages: Vec<_> = batch.units[..4].iter().map(|u| u.page_number).collect();
    assert_eq!(pages, vec![Some(1), Some(2), Some(3), Some(4)]);
    assert_eq!(
        std::fs::read(&batch.units[2].source_locator).unwrap(),
        b"page-plan-3"
    );

    let image = &batch.units[4];
    assert_eq!(image.page_number, None);
    assert_eq!(image.document_name, "photo.png");
    assert!(image.source_locator.ends_with("photo.png"));
}

#[tokio::test]
async fn unreadable_image_fails_extraction() {
    let ws = Workspace::new();
    let path = ws.inputs.path().join("notes.txt");
    std::fs::write(&path, "just text").unwrap();
    let scratch = ScratchSpace::create(ws.scratch.path(), Uuid::new_v4())
        .await
        .unwrap();
    let options = ExtractOptions {
        render_scale: 1.5,
        download_timeout_secs: 5,
    };

    let err = assert_err!(
        extract_units(
            &[InputDocument::from_path(path)],
            Arc::new(FakePdfRenderer),
            &options,
            scratch
        )
        .await
    );
    match err {
        ReportError::Extraction(e) => assert_eq!(e.document_name, "notes.txt"),
        other => panic!("expected extraction error, got {other:?}"),
    }
    assert!(ws.scratch_is_empty());
}

// ── Dispatch & assembly ──────────────────────────────────────────────────────

#[tokio::test]
async fn sections_follow_submission_order_despite_inverted_completion() {
    let ws = Workspace::new();
    let mut analyzer = ScriptedAnalyzer::default();
    for page in 1..=5 {
        // Page 1 finishes last, page 5 first.
        analyzer = analyzer.delayed(
            &format!("page-doc-{page}"),
            Duration::from_millis((6 - page) * 40),
        );
    }
    let analyzer = Arc::new(analyzer);
    let writer = Arc::new(RecordingWriter::default());

    let output = pipeline(ws.config(5), Arc::clone(&analyzer), Arc::clone(&writer))
        .run(&[ws.fake_pdf("doc.pdf", 5)])
        .await
        .unwrap();

    let sections = recorded(&writer);
    assert_eq!(sections.len(), 5);
    for (i, section) in sections.iter().enumerate() {
        assert_eq!(section.heading, format!("Section {}: Technical Data", i + 1));
        assert_eq!(section.caption, format!("doc.pdf, page {}", i + 1));
        assert_eq!(section.body, format!("- analysed page-doc-{}", i + 1));
    }
    let indices: Vec<_> = output.outcomes.iter().map(|o| o.sequence_index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn one_failing_unit_becomes_an_error_section() {
    let ws = Workspace::new();
    let analyzer = Arc::new(
        ScriptedAnalyzer::default().with("page-doc-3", Behaviour::Fail("model overloaded".into())),
    );
    let writer = Arc::new(RecordingWriter::default());

    let output = pipeline(ws.config(3), Arc::clone(&analyzer), Arc::clone(&writer))
        .run(&[ws.fake_pdf("doc.pdf", 4)])
        .await
        .unwrap();

    assert_eq!(output.outcomes.len(), 4);
    assert_eq!(output.stats.succeeded_units, 3);
    assert_eq!(output.stats.failed_units, 1);
    assert_eq!(
        output.outcomes[2].status,
        OutcomeStatus::Failed("model overloaded".into())
    );

    let sections = recorded(&writer);
    assert_eq!(sections.len(), 4);
    assert_eq!(sections[2].body, "Error: model overloaded");
    for i in [0, 1, 3] {
        assert!(sections[i].body.starts_with("- analysed"), "{:?}", sections[i]);
    }
}

/// Every call in the first wave waits until `limit` calls are in flight,
/// which proves the limit is reached; the counter proves it is never exceeded.
struct GateAnalyzer {
    limit: usize,
    barrier: tokio::sync::Barrier,
    tickets: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    barrier_timed_out: AtomicUsize,
}

#[async_trait]
impl Analyzer for GateAnalyzer {
    async fn analyze(&self, _image: &[u8], _prompt: &str) -> Result<AnalysisReply, UnitError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if self.tickets.fetch_add(1, Ordering::SeqCst) < self.limit {
            let waited = tokio::time::timeout(Duration::from_millis(800), self.barrier.wait()).await;
            if waited.is_err() {
                self.barrier_timed_out.fetch_add(1, Ordering::SeqCst);
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(AnalysisReply::text("- ok"))
    }
}

#[tokio::test]
async fn in_flight_calls_reach_but_never_exceed_the_limit() {
    let ws = Workspace::new();
    let limit = 3;
    let analyzer = Arc::new(GateAnalyzer {
        limit,
        barrier: tokio::sync::Barrier::new(limit),
        tickets: AtomicUsize::new(0),
        in_flight: AtomicUsize::new(0),
        max_in_flight: AtomicUsize::new(0),
        barrier_timed_out: AtomicUsize::new(0),
    });

    let pipeline = ReportPipeline::new(
        ws.config(limit),
        Arc::new(FakePdfRenderer),
        Arc::clone(&analyzer) as Arc<dyn Analyzer>,
        Arc::new(PdfReportWriter::new()),
    );
    let output = pipeline.run(&[ws.fake_pdf("big.pdf", 10)]).await.unwrap();

    assert_eq!(output.stats.succeeded_units, 10);
    assert_eq!(analyzer.max_in_flight.load(Ordering::SeqCst), limit);
    assert_eq!(analyzer.barrier_timed_out.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn mixed_batch_with_timeout_end_to_end() {
    let ws = Workspace::new();
    let analyzer = Arc::new(ScriptedAnalyzer::default().with("page-a-2", Behaviour::Stall));
    let writer = Arc::new(RecordingWriter::default());

    let output = pipeline(ws.config(3), Arc::clone(&analyzer), Arc::clone(&writer))
        .run(&[ws.fake_pdf("a.pdf", 2), ws.png("b.png")])
        .await
        .unwrap();

    let sections = recorded(&writer);
    assert_eq!(sections.len(), 3);

    assert_eq!(sections[0].caption, "a.pdf, page 1");
    assert_eq!(sections[0].body, "- analysed page-a-1");

    assert_eq!(sections[1].caption, "a.pdf, page 2");
    assert!(sections[1].body.starts_with("Error: "));
    assert!(sections[1].body.contains("timeout"), "{}", sections[1].body);

    assert_eq!(sections[2].caption, "b.png");
    assert_eq!(sections[2].body, "- analysed image");

    // The published artifact is a real PDF with one page per short section.
    assert_eq!(output.report_name, format!("report-{}.pdf", output.run_id));
    assert_eq!(ws.output_files(), vec![output.report_path.clone()]);
    let doc = lopdf::Document::load(&output.report_path).unwrap();
    assert_eq!(doc.get_pages().len(), 3);

    assert!(ws.scratch_is_empty(), "scratch must be removed after the run");
}

#[tokio::test]
async fn malformed_document_aborts_before_any_analysis_call() {
    let ws = Workspace::new();
    let analyzer = Arc::new(ScriptedAnalyzer::default());
    let writer = Arc::new(RecordingWriter::default());

    let err = pipeline(ws.config(3), Arc::clone(&analyzer), Arc::clone(&writer))
        .run(&[ws.fake_pdf("good.pdf", 2), ws.broken_pdf("broken.pdf")])
        .await
        .unwrap_err();

    match err {
        ReportError::Extraction(e) => {
            assert_eq!(e.document_name, "broken.pdf");
            assert!(e.to_string().contains("no xref table"));
        }
        other => panic!("expected extraction error, got {other:?}"),
    }
    assert_eq!(analyzer.calls.load(Ordering::SeqCst), 0);
    assert!(recorded(&writer).is_empty());
    assert!(ws.output_files().is_empty());
    assert!(ws.scratch_is_empty(), "scratch must be removed after a failed run");
}

#[tokio::test]
async fn missing_input_is_an_extraction_error() {
    let ws = Workspace::new();
    let analyzer = Arc::new(ScriptedAnalyzer::default());
    let missing = InputDocument::from_path(ws.inputs.path().join("nowhere.pdf"));

    let err = pipeline(ws.config(3), Arc::clone(&analyzer), Arc::new(RecordingWriter::default()))
        .run(&[missing])
        .await
        .unwrap_err();

    assert!(matches!(err, ReportError::Extraction(_)));
    assert_eq!(analyzer.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn panicking_analysis_is_isolated() {
    let ws = Workspace::new();
    let analyzer = Arc::new(ScriptedAnalyzer::default().with("page-doc-2", Behaviour::Panic));
    let writer = Arc::new(RecordingWriter::default());

    let output = pipeline(ws.config(2), Arc::clone(&analyzer), Arc::clone(&writer))
        .run(&[ws.fake_pdf("doc.pdf", 3)])
        .await
        .unwrap();

    assert_eq!(output.outcomes.len(), 3);
    let message = output.outcomes[1].error_message().unwrap();
    assert!(message.contains("panicked"), "{message}");
    assert!(message.contains("decoder exploded"), "{message}");
    assert!(output.outcomes[0].is_success());
    assert!(output.outcomes[2].is_success());
    assert_eq!(analyzer.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn empty_and_unencodable_responses_are_rendered() {
    let ws = Workspace::new();
    let analyzer = Arc::new(
        ScriptedAnalyzer::default()
            .with("page-doc-1", Behaviour::Answer("   \n\n".into()))
            .with("page-doc-2", Behaviour::Answer("Ø 20 ± 0.1 → datum ⊥ A 🔧".into())),
    );
    let writer = Arc::new(RecordingWriter::default());

    let output = pipeline(ws.config(3), Arc::clone(&analyzer), Arc::clone(&writer))
        .run(&[ws.fake_pdf("doc.pdf", 2)])
        .await
        .unwrap();

    assert_eq!(output.stats.empty_units, 1);
    assert_eq!(output.stats.succeeded_units, 2);
    let sections = recorded(&writer);
    assert_eq!(sections[0].body, "No content was extracted from this page.");
    assert_eq!(sections[1].body, "Ø 20 ± 0.1 ? datum ? A ?");
}

#[tokio::test]
async fn unwritable_output_is_an_assembly_error_with_no_artifact() {
    let ws = Workspace::new();
    // A regular file where the output directory should be.
    let blocker = ws.output.path().join("blocked");
    std::fs::write(&blocker, b"").unwrap();
    let config = ReportConfig::builder()
        .scratch_root(ws.scratch.path())
        .output_root(blocker.join("reports"))
        .build()
        .unwrap();
    let analyzer = Arc::new(ScriptedAnalyzer::default());

    let err = pipeline(config, Arc::clone(&analyzer), Arc::new(RecordingWriter::default()))
        .run(&[ws.fake_pdf("doc.pdf", 2)])
        .await
        .unwrap_err();

    assert!(
        matches!(err, ReportError::Assembly(AssemblyError::Publish { .. })),
        "got {err:?}"
    );
    assert_eq!(analyzer.calls.load(Ordering::SeqCst), 2);
    assert_eq!(ws.output_files(), vec![blocker]);
    assert!(ws.scratch_is_empty());
}

#[tokio::test]
async fn concurrent_runs_publish_distinct_reports() {
    let ws = Workspace::new();
    let analyzer = Arc::new(ScriptedAnalyzer::default());
    let p = Arc::new(pipeline(
        ws.config(2),
        Arc::clone(&analyzer),
        Arc::new(RecordingWriter::default()),
    ));

    let docs_a = vec![ws.fake_pdf("a.pdf", 2)];
    let docs_b = vec![ws.fake_pdf("b.pdf", 3)];
    let (a, b) = tokio::join!(p.run(&docs_a), p.run(&docs_b));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_ne!(a.run_id, b.run_id);
    assert_ne!(a.report_path, b.report_path);
    assert_eq!(ws.output_files().len(), 2);
    assert_eq!(analyzer.calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn plan_lists_units_without_analysis() {
    let ws = Workspace::new();
    let analyzer = Arc::new(ScriptedAnalyzer::default());
    let units = pipeline(ws.config(3), Arc::clone(&analyzer), Arc::new(RecordingWriter::default()))
        .plan(&[ws.png("cover.png"), ws.fake_pdf("plan.pdf", 2)])
        .await
        .unwrap();

    let labels: Vec<_> = units
        .iter()
        .map(|u| (u.sequence_index, u.document_name.as_str(), u.page_number))
        .collect();
    assert_eq!(
        labels,
        vec![
            (0, "cover.png", None),
            (1, "plan.pdf", Some(1)),
            (2, "plan.pdf", Some(2)),
        ]
    );
    assert_eq!(analyzer.calls.load(Ordering::SeqCst), 0);
    assert!(ws.scratch_is_empty());
}
