//! Report assembly: ordered (unit, outcome) pairs → one published report.
//!
//! Outcomes are matched to units by `sequence_index`, never by arrival
//! order, and sections are emitted strictly in ascending index order. The
//! report is serialised into a temporary file inside the output directory
//! and renamed to `report-{run_id}.pdf` only once it is complete, so the
//! destination either holds a whole report or nothing.

use crate::error::AssemblyError;
use crate::output::{AnalysisOutcome, OutcomeStatus};
use crate::pipeline::extract::AnalysisUnit;
use crate::pipeline::sanitize::prepare_body;
use crate::pipeline::writer::{ReportSection, ReportWriter};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

/// Body used for a successful call that returned no visible text.
pub const EMPTY_CONTENT_NOTICE: &str = "No content was extracted from this page.";

/// File name of the report published by run `run_id`.
pub fn report_file_name(run_id: Uuid) -> String {
    format!("report-{run_id}.pdf")
}

/// Build the section for one unit from its outcome.
pub fn build_section(unit: &AnalysisUnit, outcome: &AnalysisOutcome) -> ReportSection {
    let body = match &outcome.status {
        OutcomeStatus::Succeeded(_) if outcome.is_empty_success() => EMPTY_CONTENT_NOTICE.to_string(),
        OutcomeStatus::Succeeded(text) => prepare_body(text),
        OutcomeStatus::Failed(message) => prepare_body(&format!("Error: {message}")),
    };

    ReportSection {
        heading: format!("Section {}: Technical Data", unit.sequence_index + 1),
        caption: unit.source_label(),
        image_path: unit.source_locator.clone(),
        body,
    }
}

/// Pair every unit with its outcome, in ascending `sequence_index` order.
///
/// Fails if any unit lacks an outcome or an outcome names a unit that does
/// not exist.
pub fn order_sections(
    units: &[AnalysisUnit],
    outcomes: &[AnalysisOutcome],
) -> Result<Vec<ReportSection>, AssemblyError> {
    let n = units.len();
    let mut slots: Vec<Option<&AnalysisOutcome>> = vec![None; n];
    for outcome in outcomes {
        let slot = slots
            .get_mut(outcome.sequence_index)
            .ok_or(AssemblyError::OutcomeMismatch {
                index: outcome.sequence_index,
                units: n,
            })?;
        *slot = Some(outcome);
    }

    let mut ordered: Vec<&AnalysisUnit> = units.iter().collect();
    ordered.sort_by_key(|u| u.sequence_index);

    ordered
        .into_iter()
        .map(|unit| {
            let outcome = slots
                .get(unit.sequence_index)
                .copied()
                .flatten()
                .ok_or(AssemblyError::OutcomeMismatch {
                    index: unit.sequence_index,
                    units: n,
                })?;
            Ok(build_section(unit, outcome))
        })
        .collect()
}

/// Compile and publish the report for one run.
///
/// Returns the artifact name and its full path. Blocking: decodes images and
/// writes files; call from `spawn_blocking` in async contexts.
pub fn assemble_report(
    units: &[AnalysisUnit],
    outcomes: &[AnalysisOutcome],
    writer: &dyn ReportWriter,
    title: &str,
    output_root: &Path,
    run_id: Uuid,
) -> Result<(String, PathBuf), AssemblyError> {
    let sections = order_sections(units, outcomes)?;

    let name = report_file_name(run_id);
    let destination = output_root.join(&name);
    let publish_err = |source: std::io::Error| AssemblyError::Publish {
        path: destination.clone(),
        source,
    };

    std::fs::create_dir_all(output_root).map_err(publish_err)?;
    let staging = tempfile::Builder::new()
        .prefix(&format!(".report-{run_id}-"))
        .suffix(".part")
        .tempfile_in(output_root)
        .map_err(publish_err)?;

    let mut draft = writer.begin_report(title);
    for section in &sections {
        debug!("Adding '{}' ({})", section.heading, section.caption);
        draft.add_section(section)?;
    }
    {
        let mut out = BufWriter::new(staging.as_file());
        draft.finish(&mut out)?;
        out.flush().map_err(publish_err)?;
    }
    staging.as_file().sync_all().map_err(publish_err)?;

    // On failure the NamedTempFile is dropped and its file removed.
    staging
        .persist(&destination)
        .map_err(|e| publish_err(e.error))?;

    info!(
        "Report published: {} ({} section(s))",
        destination.display(),
        sections.len()
    );
    Ok((name, destination))
}
