//! CLI binary for edgequake-pdf2report.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ReportConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf2report::{
    generate_report, inspect_batch, InputDocument, ProgressCallback, ReportConfig,
    ReportProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per analysed unit. Units finish out
/// of order, so start times are keyed by index.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_batch_start` tells us how many units there are.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Extracting pages…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} units  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Analysing");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&index)
            .map(|t| t.elapsed().as_millis() as f64 / 1000.0)
            .unwrap_or(0.0)
    }
}

impl ReportProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_units: usize) {
        self.activate_bar(total_units);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Analysing {total_units} unit(s)…"))
        ));
    }

    fn on_unit_start(&self, index: usize, _total: usize) {
        self.start_times
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(index, Instant::now());
        self.bar.set_message(format!("unit {}", index + 1));
    }

    fn on_unit_complete(&self, index: usize, total: usize, text_len: usize) {
        let secs = self.elapsed_secs(index);
        self.bar.println(format!(
            "  {} Unit {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            index + 1,
            total,
            dim(&format!("{text_len:>5} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_unit_error(&self, index: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(index);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(std::iter::once('…')).collect()
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Unit {:>3}/{:<3}  {}  {}",
            red("✗"),
            index + 1,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_units: usize, success_count: usize) {
        let failed = total_units.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} unit(s) analysed successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} unit(s) analysed  ({} failed, shown as error sections)",
                if failed == total_units {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_units,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # One report from a drawing set and a photo
  pdf2report assembly.pdf detail.jpg

  # Choose output directory and title
  pdf2report -o out/ --title "Bracket Review" drawings/*.pdf

  # Local vision model via Ollama
  pdf2report --provider ollama --model qwen2.5vl:3b plan.pdf

  # Remote input
  pdf2report https://example.com/spec-sheet.pdf

  # Show how many sections a batch will produce (no API key needed)
  pdf2report --list-units a.pdf b.png

  # Machine-readable run summary
  pdf2report --json plan.pdf > run.json

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium if it is not installed system-wide
  RUST_LOG                Override the log filter (e.g. edgequake_pdf2report=debug)
"#;

/// Compile drawings, scans and PDFs into one analysed technical report.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2report",
    version,
    about = "Compile drawings, scans and PDFs into one analysed technical report",
    long_about = "Every page of every input is read by a Vision Language Model and the answers \
are compiled, in submission order, into a single PDF report. Pages that fail to analyse \
appear as error sections; they never abort the batch.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Documents to analyse: PDF files, images, or HTTP/HTTPS URLs.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Directory the report is published into.
    #[arg(short, long, env = "PDF2REPORT_OUTPUT_DIR", default_value = "reports")]
    output_dir: PathBuf,

    /// Directory under which the per-run scratch directory is created.
    #[arg(long, env = "PDF2REPORT_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,

    /// LLM model ID (e.g. gpt-4.1-nano, qwen2.5vl:3b).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Maximum concurrent analysis calls.
    #[arg(short, long, env = "PDF2REPORT_CONCURRENCY", default_value_t = 3)]
    concurrency: usize,

    /// Page render scale (0.25–4.0).
    #[arg(long, env = "PDF2REPORT_SCALE", default_value_t = 1.5)]
    scale: f32,

    /// Path to a text file containing a custom analysis prompt.
    #[arg(long, env = "PDF2REPORT_PROMPT_FILE")]
    prompt: Option<PathBuf>,

    /// Report title, printed as the running header.
    #[arg(long, env = "PDF2REPORT_TITLE", default_value = "Technical Analysis Report")]
    title: String,

    /// Max LLM output tokens per unit.
    #[arg(long, env = "PDF2REPORT_MAX_TOKENS", default_value_t = 2048)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PDF2REPORT_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Per-unit analysis timeout in seconds.
    #[arg(long, env = "PDF2REPORT_API_TIMEOUT", default_value_t = 300)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2REPORT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Print the run summary (RunOutput) as JSON on stdout.
    #[arg(long, env = "PDF2REPORT_JSON")]
    json: bool,

    /// List the units the batch would produce, then exit.
    #[arg(long)]
    list_units: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2REPORT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2REPORT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2REPORT_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.list_units;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let documents: Vec<InputDocument> = cli.inputs.iter().map(|s| InputDocument::parse(s)).collect();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ReportProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb).await?;

    // ── List-units mode ──────────────────────────────────────────────────
    if cli.list_units {
        let units = inspect_batch(&documents, &config)
            .await
            .context("Failed to inspect inputs")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&units).context("Failed to serialise units")?
            );
        } else {
            for unit in &units {
                match unit.page_number {
                    Some(page) => println!(
                        "{:>4}  {}  page {}",
                        unit.sequence_index + 1,
                        unit.document_name,
                        page
                    ),
                    None => println!("{:>4}  {}", unit.sequence_index + 1, unit.document_name),
                }
            }
            eprintln!("{} unit(s)", units.len());
        }
        return Ok(());
    }

    // ── Run ──────────────────────────────────────────────────────────────
    let output = generate_report(&documents, &config)
        .await
        .context("Report generation failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else {
        println!("{}", output.report_path.display());
    }

    if !cli.quiet && !cli.json {
        let stats = &output.stats;
        eprintln!(
            "{}  {}/{} units  {}ms  →  {}",
            if stats.failed_units == 0 {
                green("✔")
            } else {
                cyan("⚠")
            },
            stats.succeeded_units,
            stats.total_units,
            stats.total_duration_ms,
            bold(&output.report_name),
        );
        eprintln!(
            "   {} tokens in  /  {} tokens out",
            dim(&stats.total_input_tokens.to_string()),
            dim(&stats.total_output_tokens.to_string()),
        );
        if stats.empty_units > 0 {
            eprintln!("   {} unit(s) returned no content", stats.empty_units);
        }
    }

    Ok(())
}

/// Map CLI args to `ReportConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ReportConfig> {
    let mut builder = ReportConfig::builder()
        .concurrency(cli.concurrency)
        .render_scale(cli.scale)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout)
        .output_root(cli.output_dir.clone())
        .report_title(cli.title.clone());

    if let Some(ref path) = cli.prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt from {:?}", path))?;
        builder = builder.prompt(prompt.trim().to_string());
    }
    if let Some(ref dir) = cli.scratch_dir {
        builder = builder.scratch_root(dir.clone());
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
