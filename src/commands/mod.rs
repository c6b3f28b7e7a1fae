pub mod analyze;
pub mod list;
pub mod measure;
pub mod purge;
pub mod report;
pub mod schema;
pub mod show;
pub mod status;

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::cli::{StoreArgs, TaskArgs};
use crate::model::{RetrievalRun, RetrievalTask, load_task_manifest, select_runs};
use crate::store::SqliteStore;
use crate::util::{ensure_directory, write_json_pretty};

pub(crate) fn open_store(args: &StoreArgs) -> Result<SqliteStore> {
    let db_path = args.db_path();
    if let Some(parent) = db_path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        ensure_directory(parent)?;
    }
    SqliteStore::open(&db_path).with_context(|| format!("failed to open {}", db_path.display()))
}

pub(crate) fn load_task(args: &TaskArgs) -> Result<(RetrievalTask, Vec<RetrievalRun>)> {
    let (task, runs) = load_task_manifest(&args.manifest)?;
    let runs = select_runs(runs, &args.runs)?;
    info!(
        task_id = %task.id,
        runs = runs.len(),
        manifest = %args.manifest.display(),
        "loaded task manifest"
    );
    Ok((task, runs))
}

/// Writes `value` as pretty JSON to `output`, or to stdout when no path is given.
pub(crate) fn emit_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            write_json_pretty(path, value)?;
            info!(path = %path.display(), "wrote output");
        }
        None => {
            let rendered =
                serde_json::to_string_pretty(value).context("failed to serialize output")?;
            println!("{rendered}");
        }
    }
    Ok(())
}
