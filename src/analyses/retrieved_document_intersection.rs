use tracing::debug;

use super::common::{BASELINE_RUN, CUTOFF, baseline_run_field, cutoff, find_run, require_runs};
use super::{Analysis, AnalysisContext, FieldSpec, ParameterSchema, Parameters};
use crate::error::EvalError;
use crate::model::{RetrievalRun, RetrievalTask};
use crate::results::{AnalysisOutput, Scalar, Table};
use crate::util::round_to;

/// Overlap of each run's top documents with the baseline's top documents.
pub struct RetrievedDocumentIntersection;

impl Analysis for RetrievedDocumentIntersection {
    fn slug(&self) -> &'static str {
        "retrieved_document_intersection"
    }

    fn name(&self) -> &'static str {
        "Retrieved Document Intersection"
    }

    fn schema(
        &self,
        _ctx: &AnalysisContext<'_>,
        _task: &RetrievalTask,
        runs: &[RetrievalRun],
    ) -> Result<ParameterSchema, EvalError> {
        Ok(ParameterSchema::new()
            .field(baseline_run_field(runs))
            .field(FieldSpec::integer(CUTOFF, "Cutoff value", Some(1), Some(1000)).with_initial(10)))
    }

    fn execute(
        &self,
        ctx: &AnalysisContext<'_>,
        _task: &RetrievalTask,
        runs: &[RetrievalRun],
        parameters: &Parameters,
    ) -> Result<AnalysisOutput, EvalError> {
        require_runs(runs)?;
        let baseline = find_run(runs, parameters.text(BASELINE_RUN)?)?;
        let cutoff = cutoff(parameters.integer(CUTOFF)?)?;
        let baseline_table = ctx.loader.run(baseline)?;

        let mut table = Table::new(
            "Run",
            [
                "Intersected Documents",
                "Total Documents",
                "Intersection Percentage",
            ],
        );

        for run in runs.iter().filter(|run| run.id != baseline.id) {
            let run_table = ctx.loader.run(run)?;
            let mut intersected = 0_usize;
            let mut total = 0_usize;
            for query_id in run_table.query_ids() {
                let retrieved = run_table.top_documents(query_id, cutoff);
                let reference = baseline_table.top_documents(query_id, cutoff);
                intersected += retrieved.intersection(&reference).count();
                total += retrieved.len();
            }

            let percentage = if total == 0 {
                0.0
            } else {
                round_to(intersected as f64 / total as f64 * 100.0, 2)
            };
            debug!(
                run_id = %run.id,
                baseline = %baseline.id,
                intersected,
                total,
                "computed document intersection"
            );
            table.push_row(
                run.title.clone(),
                vec![
                    Scalar::from(intersected),
                    Scalar::from(total),
                    Scalar::Float(percentage),
                ],
            );
        }

        Ok(AnalysisOutput::Table(table))
    }
}
