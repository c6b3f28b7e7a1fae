use anyhow::{Context, Result};
use serde_json::json;

use crate::analyses::AnalysisContext;
use crate::cli::AnalyzeArgs;
use crate::commands::{emit_json, load_task, open_store};
use crate::data::DataLoader;
use crate::measures::{InMemoryMeasureCache, MeasureCache, MeasureCalculator, TrecBackend};
use crate::orchestrator::{LogNotifier, Orchestrator, ResultSink};
use crate::registry::Registry;
use crate::store::SqliteStore;

pub fn run(args: AnalyzeArgs) -> Result<()> {
    let registry = Registry::builtin();
    let (task, runs) = load_task(&args.task)?;
    let submitted = args.parameters.load()?;

    // Nothing is written to the sink; it only satisfies the orchestrator.
    let store = if args.no_cache {
        SqliteStore::open_in_memory().context("failed to open in-memory store")?
    } else {
        open_store(&args.store)?
    };
    let memory = InMemoryMeasureCache::new();
    let cache: &dyn MeasureCache = if args.no_cache { &memory } else { &store };
    let sink: &dyn ResultSink = &store;

    let loader = DataLoader::new();
    let ctx = AnalysisContext::new(MeasureCalculator::new(&loader, &TrecBackend, cache));
    let orchestrator = Orchestrator::new(&registry, ctx, sink, &LogNotifier);
    let (parameters, output) = orchestrator
        .run_analysis(&args.analysis, &task, &runs, &submitted)
        .with_context(|| format!("analysis {} failed", args.analysis))?;

    emit_json(
        &json!({
            "analysis": args.analysis,
            "task_id": task.id,
            "run_ids": runs.iter().map(|run| run.id.as_str()).collect::<Vec<&str>>(),
            "parameters": parameters.to_json(),
            "result": output.to_json(),
        }),
        args.output.as_deref(),
    )
}
