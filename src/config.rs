//! Configuration types for a document-to-report run.
//!
//! Every knob lives in [`ReportConfig`], built via its
//! [`ReportConfigBuilder`]. The scratch and output roots are part of the
//! configuration rather than process-wide directories: each run creates its
//! own namespaced scratch directory under `scratch_root` and publishes its
//! report into `output_root`.

use crate::error::ReportError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for a document-to-report run.
///
/// # Example
/// ```rust
/// use edgequake_pdf2report::ReportConfig;
///
/// let config = ReportConfig::builder()
///     .concurrency(4)
///     .render_scale(2.0)
///     .output_root("out/reports")
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 4);
/// ```
#[derive(Clone)]
pub struct ReportConfig {
    /// Maximum number of analysis calls in flight at once. Default: 3.
    ///
    /// Local vision models (Ollama) saturate quickly; hosted APIs tolerate
    /// more. Lower this if the provider answers with `429`.
    pub concurrency: usize,

    /// Scale factor applied to native page size when rasterising paginated
    /// documents. Default: 1.5.
    pub render_scale: f32,

    /// Cap on the longest edge of a rendered page, in pixels. Default: 4000.
    ///
    /// Independent of `render_scale`: a 1.5× render of an A0 sheet would
    /// otherwise allocate hundreds of megabytes of pixels.
    pub max_rendered_pixels: u32,

    /// Prompt sent with every page image. If None, uses
    /// [`crate::prompts::DEFAULT_ANALYSIS_PROMPT`].
    pub prompt: Option<String>,

    /// LLM model identifier, e.g. "gpt-4.1-nano", "qwen2.5vl:3b".
    /// If None, uses the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens generated per page. Default: 2048.
    pub max_tokens: usize,

    /// Per-call timeout in seconds; an overlong call becomes a failed unit.
    /// Default: 300.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Directory under which each run creates its private scratch directory.
    /// Default: the system temp directory.
    pub scratch_root: PathBuf,

    /// Directory the finished report is published into. Default: `reports`.
    pub output_root: PathBuf,

    /// Title printed as running header on continuation pages.
    /// Default: "Technical Analysis Report".
    pub report_title: String,

    /// Optional progress callback fired as units are analysed.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            render_scale: 1.5,
            max_rendered_pixels: 4000,
            prompt: None,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 2048,
            api_timeout_secs: 300,
            download_timeout_secs: 120,
            scratch_root: std::env::temp_dir(),
            output_root: PathBuf::from("reports"),
            report_title: "Technical Analysis Report".to_string(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ReportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportConfig")
            .field("concurrency", &self.concurrency)
            .field("render_scale", &self.render_scale)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("prompt", &self.prompt)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("scratch_root", &self.scratch_root)
            .field("output_root", &self.output_root)
            .field("report_title", &self.report_title)
            .finish()
    }
}

impl ReportConfig {
    /// Create a new builder for `ReportConfig`.
    pub fn builder() -> ReportConfigBuilder {
        ReportConfigBuilder {
            config: Self::default(),
        }
    }

    /// The prompt actually sent with each page image.
    pub fn effective_prompt(&self) -> &str {
        self.prompt
            .as_deref()
            .unwrap_or(crate::prompts::DEFAULT_ANALYSIS_PROMPT)
    }
}

/// Builder for [`ReportConfig`].
pub struct ReportConfigBuilder {
    config: ReportConfig,
}

impl fmt::Debug for ReportConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ReportConfigBuilder {
    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn render_scale(mut self, scale: f32) -> Self {
        self.config.render_scale = scale;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.prompt = Some(prompt.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn scratch_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.scratch_root = dir.into();
        self
    }

    pub fn output_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_root = dir.into();
        self
    }

    pub fn report_title(mut self, title: impl Into<String>) -> Self {
        self.config.report_title = title.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ReportConfig, ReportError> {
        let c = &self.config;
        if !(0.25..=4.0).contains(&c.render_scale) {
            return Err(ReportError::InvalidConfig(format!(
                "Render scale must be 0.25–4.0, got {}",
                c.render_scale
            )));
        }
        if c.concurrency == 0 {
            return Err(ReportError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(ReportError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_policy() {
        let c = ReportConfig::default();
        assert_eq!(c.concurrency, 3);
        assert_eq!(c.render_scale, 1.5);
        assert_eq!(c.output_root, PathBuf::from("reports"));
        assert!(c.effective_prompt().contains("clearances"));
    }

    #[test]
    fn builder_clamps_concurrency() {
        let c = ReportConfig::builder().concurrency(0).build().unwrap();
        assert_eq!(c.concurrency, 1);
    }

    #[test]
    fn builder_rejects_absurd_scale() {
        let err = ReportConfig::builder().render_scale(12.0).build().unwrap_err();
        assert!(matches!(err, ReportError::InvalidConfig(_)));
    }

    #[test]
    fn custom_prompt_overrides_default() {
        let c = ReportConfig::builder().prompt("List part numbers.").build().unwrap();
        assert_eq!(c.effective_prompt(), "List part numbers.");
    }
}
