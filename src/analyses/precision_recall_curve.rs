use serde_json::json;

use super::common::{
    RELEVANCE_THRESHOLD, ThresholdDefault, judged_qrels, relevance_threshold_field, require_runs,
    threshold,
};
use super::{Analysis, AnalysisContext, ParameterSchema, Parameters};
use crate::error::EvalError;
use crate::measures::Measure;
use crate::model::{RetrievalRun, RetrievalTask};
use crate::results::{AnalysisOutput, Plot, line_trace};

/// Interpolated precision at the eleven standard recall points, one line per run.
pub struct PrecisionRecallCurve;

impl Analysis for PrecisionRecallCurve {
    fn slug(&self) -> &'static str {
        "precision_recall_curve"
    }

    fn name(&self) -> &'static str {
        "Precision/Recall Curve"
    }

    fn schema(
        &self,
        ctx: &AnalysisContext<'_>,
        task: &RetrievalTask,
        _runs: &[RetrievalRun],
    ) -> Result<ParameterSchema, EvalError> {
        let qrels = ctx.loader.qrels(task)?;
        Ok(ParameterSchema::new().field(relevance_threshold_field(&qrels, ThresholdDefault::Highest)))
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
        let recall_points = (0..=10)
            .map(|step| f64::from(step) / 10.0)
            .collect::<Vec<f64>>();

        let mut plot = Plot::new("Precision/Recall Curve", "Recall", "Precision");
        plot.set_layout("legend", json!({ "x": 1, "y": 1 }));
        plot.set_layout("hovermode", json!("x unified"));

        for run in runs {
            let precision = recall_points
                .iter()
                .map(|recall| {
                    let measure = Measure::InterpolatedPrecision {
                        rel,
                        recall: *recall,
                        judged_only: true,
                    };
                    ctx.measures.aggregate(task, run, &measure)
                })
                .collect::<Result<Vec<f64>, EvalError>>()?;
            plot.push_trace(line_trace(&run.title, &recall_points, &precision));
        }

        Ok(AnalysisOutput::Plot(plot))
    }
}
