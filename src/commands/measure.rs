use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde_json::{Value, json};
use tracing::info;

use crate::cli::MeasureArgs;
use crate::commands::{emit_json, load_task, open_store};
use crate::data::DataLoader;
use crate::measures::{MeasureCalculator, TrecBackend, parse_measure};
use crate::util::sort_query_ids;

pub fn run(args: MeasureArgs) -> Result<()> {
    let measure = parse_measure(&args.measure)
        .with_context(|| format!("invalid measure name {}", args.measure))?;
    let (task, runs) = load_task(&args.task)?;
    let store = open_store(&args.store)?;
    let loader = DataLoader::new();
    let calculator = MeasureCalculator::new(&loader, &TrecBackend, &store);

    let mut values = IndexMap::<String, Value>::new();
    for run in &runs {
        let value = if args.per_query {
            let per_query = calculator
                .per_query(&task, run, &measure)
                .with_context(|| format!("failed to evaluate run {}", run.id))?;
            let mut query_ids = per_query.keys().map(String::as_str).collect::<Vec<&str>>();
            sort_query_ids(&mut query_ids);
            let ordered = query_ids
                .into_iter()
                .map(|query_id| (query_id.to_string(), json!(per_query[query_id])))
                .collect::<serde_json::Map<String, Value>>();
            Value::Object(ordered)
        } else {
            let value = calculator
                .aggregate(&task, run, &measure)
                .with_context(|| format!("failed to evaluate run {}", run.id))?;
            info!(
                run_id = %run.id,
                measure = %measure,
                label = measure.display_name(),
                value,
                "measure computed"
            );
            json!(value)
        };
        values.insert(run.id.clone(), value);
    }

    emit_json(
        &json!({
            "task_id": task.id,
            "measure": measure.canonical_name(),
            "measure_label": measure.display_name(),
            "per_query": args.per_query,
            "values": values,
        }),
        None,
    )
}
