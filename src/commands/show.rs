use anyhow::{Context, Result};
use tracing::info;

use crate::cli::ShowArgs;
use crate::commands::{emit_json, open_store};
use crate::model::ReportManifest;
use crate::results::AnalysisOutput;

pub fn run(args: ShowArgs) -> Result<()> {
    let store = open_store(&args.store)?;
    let report = store.report(&args.report_id)?;
    let results = store.analysis_results(&args.report_id)?;

    // A stored result that no longer decodes is reported rather than shown.
    for result in &results {
        AnalysisOutput::from_json(&result.result).with_context(|| {
            format!(
                "stored result {} of report {} is malformed",
                result.position, report.report_id
            )
        })?;
    }

    info!(
        report_id = %report.report_id,
        status = report.status.as_str(),
        results = results.len(),
        "loaded stored report"
    );
    emit_json(
        &ReportManifest {
            manifest_version: 1,
            report,
            results,
        },
        args.output.as_deref(),
    )
}
