//! Result types: per-unit outcomes and the summary of a whole run.

use crate::pipeline::extract::AnalysisUnit;
use crate::pipeline::sanitize::is_blank_response;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// How a single unit's analysis call ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// The model answered; the raw response text.
    Succeeded(String),
    /// The call failed, timed out, or panicked; a human-readable message.
    Failed(String),
}

/// Result of running one [`AnalysisUnit`] through the analysis call.
///
/// Created exactly once per unit by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    /// Copy of the originating unit's index; the correlation key.
    pub sequence_index: usize,
    #[serde(flatten)]
    pub status: OutcomeStatus,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
}

impl AnalysisOutcome {
    pub fn succeeded(sequence_index: usize, text: impl Into<String>) -> Self {
        Self {
            sequence_index,
            status: OutcomeStatus::Succeeded(text.into()),
            input_tokens: 0,
            output_tokens: 0,
            duration_ms: 0,
        }
    }

    pub fn failed(sequence_index: usize, message: impl Into<String>) -> Self {
        Self {
            sequence_index,
            status: OutcomeStatus::Failed(message.into()),
            input_tokens: 0,
            output_tokens: 0,
            duration_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, OutcomeStatus::Succeeded(_))
    }

    /// A success whose response carries no visible text after cleanup
    /// (fences, invisible characters and whitespace removed).
    ///
    /// Counted separately in [`RunStats::empty_units`] and rendered with an
    /// explicit notice instead of a blank body.
    pub fn is_empty_success(&self) -> bool {
        match &self.status {
            OutcomeStatus::Succeeded(text) => is_blank_response(text),
            OutcomeStatus::Failed(_) => false,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.status {
            OutcomeStatus::Failed(msg) => Some(msg),
            OutcomeStatus::Succeeded(_) => None,
        }
    }
}

/// Serializable description of one unit, for JSON output and `--list-units`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSummary {
    pub sequence_index: usize,
    pub document_name: String,
    /// 1-based page within a paginated document; `None` for standalone images.
    pub page_number: Option<usize>,
}

impl From<&AnalysisUnit> for UnitSummary {
    fn from(unit: &AnalysisUnit) -> Self {
        Self {
            sequence_index: unit.sequence_index,
            document_name: unit.document_name.clone(),
            page_number: unit.page_number,
        }
    }
}

/// Aggregate statistics for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub total_units: usize,
    pub succeeded_units: usize,
    pub failed_units: usize,
    /// Successes whose response was empty (subset of `succeeded_units`).
    pub empty_units: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub extraction_duration_ms: u64,
    pub analysis_duration_ms: u64,
    pub assembly_duration_ms: u64,
    pub total_duration_ms: u64,
}

impl RunStats {
    /// Count outcomes; durations are filled in by the caller.
    pub fn from_outcomes(outcomes: &[AnalysisOutcome]) -> Self {
        Self {
            total_units: outcomes.len(),
            succeeded_units: outcomes.iter().filter(|o| o.is_success()).count(),
            failed_units: outcomes.iter().filter(|o| !o.is_success()).count(),
            empty_units: outcomes.iter().filter(|o| o.is_empty_success()).count(),
            total_input_tokens: outcomes.iter().map(|o| o.input_tokens as u64).sum(),
            total_output_tokens: outcomes.iter().map(|o| o.output_tokens as u64).sum(),
            ..Default::default()
        }
    }
}

/// Everything a successful run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutput {
    pub run_id: Uuid,
    /// File name of the published report, e.g. `report-<run_id>.pdf`.
    pub report_name: String,
    /// Full path of the published report.
    pub report_path: PathBuf,
    pub units: Vec<UnitSummary>,
    /// Outcomes in ascending `sequence_index` order.
    pub outcomes: Vec<AnalysisOutcome>,
    pub stats: RunStats,
}
