use std::collections::BTreeMap;

use tracing::debug;

use super::common::{
    BASELINE_RUN, RELEVANCE_THRESHOLD, ThresholdDefault, baseline_run_field, find_run,
    judged_qrels, relevance_threshold_field, require_runs, threshold,
};
use super::{Analysis, AnalysisContext, Choice, FieldSpec, ParameterSchema, Parameters};
use crate::error::EvalError;
use crate::measures::{DcgGain, Measure};
use crate::model::{RetrievalRun, RetrievalTask};
use crate::results::{AnalysisOutput, Scalar, Table};
use crate::stats::{CorrectionMethod, adjust_p_values, mean, paired_t_test};

const CORRECTION_METHOD: &str = "correction_method";
const CORRECTION_VALUE: &str = "correction_value";

/// Per-run means of five standard measures and paired t-tests of every run
/// against a baseline, with multiple-comparison adjustment.
pub struct ExperimentalEvaluation;

impl ExperimentalEvaluation {
    fn measures(rel: i32) -> [Measure; 5] {
        [
            Measure::AveragePrecision {
                rel,
                cutoff: Some(100),
                judged_only: false,
            },
            Measure::Precision {
                rel,
                cutoff: 10,
                judged_only: false,
            },
            Measure::Ndcg {
                dcg: DcgGain::Log2,
                cutoff: Some(10),
                judged_only: true,
            },
            Measure::Recall {
                rel,
                cutoff: 50,
                judged_only: false,
            },
            Measure::ReciprocalRank {
                rel,
                cutoff: Some(100),
                judged_only: false,
            },
        ]
    }
}

impl Analysis for ExperimentalEvaluation {
    fn slug(&self) -> &'static str {
        "experimental_evaluation"
    }

    fn name(&self) -> &'static str {
        "Experimental Evaluation"
    }

    fn schema(
        &self,
        ctx: &AnalysisContext<'_>,
        task: &RetrievalTask,
        runs: &[RetrievalRun],
    ) -> Result<ParameterSchema, EvalError> {
        let qrels = ctx.loader.qrels(task)?;
        let methods = CorrectionMethod::ALL
            .iter()
            .map(|method| Choice {
                value: method.label().to_string(),
                label: method.label().to_string(),
            })
            .collect();

        Ok(ParameterSchema::new()
            .field(relevance_threshold_field(&qrels, ThresholdDefault::Lowest))
            .field(baseline_run_field(runs))
            .field(
                FieldSpec::choice(CORRECTION_METHOD, "Correction method", methods)
                    .with_initial(CorrectionMethod::Bonferroni.label()),
            )
            .field(
                FieldSpec::float(
                    CORRECTION_VALUE,
                    "Correction value (alpha)",
                    Some(0.01),
                    Some(0.05),
                )
                .with_initial(0.05),
            ))
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
        let baseline = find_run(runs, parameters.text(BASELINE_RUN)?)?;
        let method = CorrectionMethod::parse(parameters.text(CORRECTION_METHOD)?)
            .ok_or_else(|| EvalError::invalid(CORRECTION_METHOD, "unknown correction method"))?;
        let alpha = parameters.float(CORRECTION_VALUE)?;
        let measures = Self::measures(rel);

        // per_query[run position][measure position]
        let mut per_query = Vec::<Vec<BTreeMap<String, f64>>>::with_capacity(runs.len());
        for run in runs {
            let values = measures
                .iter()
                .map(|measure| ctx.measures.per_query(task, run, measure))
                .collect::<Result<Vec<_>, EvalError>>()?;
            per_query.push(values);
        }

        let mut values_table = Table::new("Measure", runs.iter().map(|run| run.title.clone()));
        for (measure_index, measure) in measures.iter().enumerate() {
            let row = per_query
                .iter()
                .map(|run_values| {
                    let values = run_values[measure_index].values().copied().collect::<Vec<f64>>();
                    Scalar::Float(mean(&values))
                })
                .collect();
            values_table.push_row(measure.canonical_name(), row);
        }

        let baseline_index = runs
            .iter()
            .position(|run| run.id == baseline.id)
            .unwrap_or_default();
        let compared = runs
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != baseline_index)
            .collect::<Vec<(usize, &RetrievalRun)>>();
        let compared_titles = compared.iter().map(|(_, run)| run.title.clone()).collect::<Vec<_>>();

        let mut p_table = Table::new("Measure", compared_titles.clone());
        let mut adjusted_table = Table::new("Measure", compared_titles.clone());
        let mut significance_table = Table::new("Measure", compared_titles);

        for (measure_index, measure) in measures.iter().enumerate() {
            let baseline_values = &per_query[baseline_index][measure_index];
            let p_values = compared
                .iter()
                .map(|(run_index, _)| {
                    paired_by_query(baseline_values, &per_query[*run_index][measure_index])
                })
                .collect::<Vec<Option<f64>>>();
            let adjusted = adjust_p_values(&p_values, method);
            let significant = adjusted
                .iter()
                .map(|p_value| match p_value {
                    Some(p_value) if *p_value <= alpha => Scalar::from("Yes"),
                    Some(_) => Scalar::from("No"),
                    None => Scalar::Null,
                })
                .collect();

            let label = measure.canonical_name();
            p_table.push_row(label.clone(), p_values.into_iter().map(Scalar::from).collect());
            adjusted_table.push_row(label.clone(), adjusted.into_iter().map(Scalar::from).collect());
            significance_table.push_row(label, significant);
        }

        debug!(
            baseline = %baseline.id,
            compared = compared.len(),
            method = method.slug(),
            alpha,
            "computed significance tests"
        );

        Ok(AnalysisOutput::composite()
            .with("Measure values", values_table)
            .with("P-values", p_table)
            .with("Adjusted p-values", adjusted_table)
            .with("Significant differences", significance_table)
            .into())
    }
}

/// Two-sided paired t-test over the queries both runs were evaluated on.
fn paired_by_query(
    baseline: &BTreeMap<String, f64>,
    other: &BTreeMap<String, f64>,
) -> Option<f64> {
    let (left, right): (Vec<f64>, Vec<f64>) = baseline
        .iter()
        .filter_map(|(query_id, value)| other.get(query_id).map(|other| (*value, *other)))
        .unzip();
    paired_t_test(&left, &right).map(|test| test.p_value)
}
