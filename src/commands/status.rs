use anyhow::Result;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::commands::{emit_json, open_store};

pub fn run(args: StatusArgs) -> Result<()> {
    let db_path = args.store.db_path();
    info!(cache_root = %args.store.cache_root.display(), "status requested");

    if !db_path.exists() {
        warn!(path = %db_path.display(), "database file missing");
        return Ok(());
    }

    let store = open_store(&args.store)?;
    let counts = store.counts()?;
    info!(
        path = %db_path.display(),
        reports = counts.reports,
        analysis_results = counts.analysis_results,
        measure_values = counts.measure_values,
        "database status"
    );

    for report in store.reports()? {
        info!(
            report_id = %report.report_id,
            report = %report.report_type,
            task_id = %report.task_id,
            status = report.status.as_str(),
            failed_analysis = %report.failed_analysis.unwrap_or_default(),
            updated_at = %report.updated_at,
            "stored report"
        );
    }

    emit_json(&counts, None)
}
