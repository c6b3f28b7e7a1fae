use anyhow::{Context, Result};
use tracing::info;

use crate::cli::PurgeArgs;
use crate::commands::open_store;
use crate::model::run_cache_key;

pub fn run(args: PurgeArgs) -> Result<()> {
    let store = open_store(&args.store)?;

    if let Some(task_id) = &args.task_id {
        for run_id in &args.runs {
            let key = run_cache_key(task_id, run_id);
            let removed = store
                .purge_run_measures(&key)
                .with_context(|| format!("failed to purge cached measures of {key}"))?;
            info!(run = %key, removed, "run measure cache purged");
        }
    }

    if let Some(report_id) = &args.report_id {
        let removed = store
            .delete_report(report_id)
            .with_context(|| format!("failed to delete report {report_id}"))?;
        info!(report_id = %report_id, results = removed, "deleted report");
    }

    Ok(())
}
