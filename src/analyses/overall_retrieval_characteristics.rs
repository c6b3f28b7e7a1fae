use tracing::debug;

use super::common::{
    RELEVANCE_THRESHOLD, ThresholdDefault, judged_qrels, relevance_threshold_field, require_runs,
    threshold,
};
use super::{Analysis, AnalysisContext, ParameterSchema, Parameters};
use crate::error::EvalError;
use crate::measures::Measure;
use crate::model::{RetrievalRun, RetrievalTask};
use crate::results::{AnalysisOutput, Scalar, Table};

const CUTOFFS: [u32; 9] = [5, 10, 15, 20, 30, 100, 200, 500, 1000];

/// Counts plus precision and recall at standard cutoffs, one row per run.
pub struct OverallRetrievalCharacteristics;

impl Analysis for OverallRetrievalCharacteristics {
    fn slug(&self) -> &'static str {
        "overall_retrieval_characteristics"
    }

    fn name(&self) -> &'static str {
        "Overall Retrieval Characteristics"
    }

    fn schema(
        &self,
        ctx: &AnalysisContext<'_>,
        task: &RetrievalTask,
        _runs: &[RetrievalRun],
    ) -> Result<ParameterSchema, EvalError> {
        let qrels = ctx.loader.qrels(task)?;
        Ok(ParameterSchema::new().field(relevance_threshold_field(&qrels, ThresholdDefault::Lowest)))
    }

    fn execute(
        &self,
        ctx: &AnalysisContext<'_>,
        task: &RetrievalTask,
        runs: &[RetrievalRun],
        parameters: &Parameters,
    ) -> Result<AnalysisOutput, EvalError> {
        require_runs(runs)?;
        judged_qrels(ctx, task)?;
        let rel = threshold(parameters.integer(RELEVANCE_THRESHOLD)?)?;

        let counts = [
            ("NumQ", Measure::NumQ),
            ("NumRel", Measure::NumRel { rel }),
            ("NumRet", Measure::NumRet { rel: None }),
            ("NumRelRet", Measure::NumRet { rel: Some(rel) }),
        ];
        let precision = CUTOFFS
            .iter()
            .map(|cutoff| {
                (
                    format!("P@{cutoff}"),
                    Measure::Precision {
                        rel,
                        cutoff: *cutoff,
                        judged_only: false,
                    },
                )
            })
            .collect::<Vec<(String, Measure)>>();
        let recall = CUTOFFS
            .iter()
            .map(|cutoff| {
                (
                    format!("R@{cutoff}"),
                    Measure::Recall {
                        rel,
                        cutoff: *cutoff,
                        judged_only: false,
                    },
                )
            })
            .collect::<Vec<(String, Measure)>>();

        let mut general = Table::new("Run", counts.iter().map(|(label, _)| *label));
        for run in runs {
            let mut row = Vec::with_capacity(counts.len());
            for (_, measure) in &counts {
                let value = ctx.measures.aggregate(task, run, measure)?;
                row.push(Scalar::Int(value.round() as i64));
            }
            general.push_row(run.title.clone(), row);
        }

        let precision = measure_table(ctx, task, runs, &precision)?;
        let recall = measure_table(ctx, task, runs, &recall)?;
        debug!(runs = runs.len(), rel, "computed overall retrieval characteristics");

        Ok(AnalysisOutput::composite()
            .with("General", general)
            .with("Precision", precision)
            .with("Recall", recall)
            .into())
    }
}

fn measure_table(
    ctx: &AnalysisContext<'_>,
    task: &RetrievalTask,
    runs: &[RetrievalRun],
    measures: &[(String, Measure)],
) -> Result<Table, EvalError> {
    let mut table = Table::new("Run", measures.iter().map(|(label, _)| label.clone()));
    for run in runs {
        let row = measures
            .iter()
            .map(|(_, measure)| ctx.measures.aggregate(task, run, measure).map(Scalar::Float))
            .collect::<Result<Vec<Scalar>, EvalError>>()?;
        table.push_row(run.title.clone(), row);
    }
    Ok(table)
}
