use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde_json::json;

use crate::analyses::{Analysis, AnalysisContext, ParameterSchema};
use crate::cli::SchemaArgs;
use crate::commands::{emit_json, load_task};
use crate::data::DataLoader;
use crate::measures::{InMemoryMeasureCache, MeasureCalculator, TrecBackend};
use crate::registry::Registry;

pub fn run(args: SchemaArgs) -> Result<()> {
    let registry = Registry::builtin();
    let (task, runs) = load_task(&args.task)?;
    let loader = DataLoader::new();
    let cache = InMemoryMeasureCache::new();
    let ctx = AnalysisContext::new(MeasureCalculator::new(&loader, &TrecBackend, &cache));

    let analyses: Vec<&dyn Analysis> = match (&args.report, &args.analysis) {
        (Some(report), _) => registry.report_analyses(registry.report(report)?)?,
        (None, Some(analysis)) => vec![registry.analysis(analysis)?],
        (None, None) => Vec::new(),
    };

    let mut forms = IndexMap::<&str, serde_json::Value>::new();
    for analysis in analyses {
        let schema: ParameterSchema = analysis
            .schema(&ctx, &task, &runs)
            .with_context(|| format!("failed to build parameter form for {}", analysis.slug()))?;
        forms.insert(
            analysis.slug(),
            json!({ "name": analysis.name(), "fields": schema.fields }),
        );
    }

    emit_json(
        &json!({
            "task_id": task.id,
            "report": args.report,
            "analyses": forms,
        }),
        None,
    )
}
