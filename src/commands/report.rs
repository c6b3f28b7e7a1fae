use anyhow::{Context, Result};
use chrono::Utc;
use tracing::info;

use crate::analyses::AnalysisContext;
use crate::cli::ReportArgs;
use crate::commands::{emit_json, load_task, open_store};
use crate::data::DataLoader;
use crate::measures::{MeasureCalculator, TrecBackend};
use crate::model::ReportManifest;
use crate::orchestrator::{LogNotifier, Orchestrator, ReportRequest};
use crate::registry::Registry;
use crate::util::utc_compact_string;

pub fn run(args: ReportArgs) -> Result<()> {
    let registry = Registry::builtin();
    let report = registry.report(&args.report)?;
    let (task, runs) = load_task(&args.task)?;
    let parameters = args.parameters.load()?;
    let store = open_store(&args.store)?;

    let report_id = args
        .report_id
        .clone()
        .unwrap_or_else(|| format!("report-{}", utc_compact_string(Utc::now())));
    let title = args
        .title
        .clone()
        .unwrap_or_else(|| format!("{} ({})", report.name, task.title));

    let loader = DataLoader::new();
    let ctx = AnalysisContext::new(MeasureCalculator::new(&loader, &TrecBackend, &store));
    let orchestrator = Orchestrator::new(&registry, ctx, &store, &LogNotifier);
    let outcome = orchestrator
        .run_report(
            report.slug,
            &ReportRequest {
                report_id: report_id.clone(),
                title,
                task: &task,
                runs: &runs,
                parameters: &parameters,
            },
        )
        .with_context(|| format!("report {report_id} ({}) did not complete", report.slug))?;

    info!(
        report_id = %outcome.record.report_id,
        status = outcome.record.status.as_str(),
        results = outcome.results.len(),
        "report stored"
    );

    let manifest = ReportManifest {
        manifest_version: 1,
        report: outcome.record,
        results: outcome.results,
    };
    emit_json(&manifest, args.output.as_deref())
}
