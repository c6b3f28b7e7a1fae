use std::collections::BTreeMap;

use serde_json::{Value, json};

use super::common::{grade_label, judged_qrels, require_runs};
use super::{Analysis, AnalysisContext, ParameterSchema, Parameters};
use crate::data::{QrelsTable, RunTable};
use crate::error::EvalError;
use crate::model::{RetrievalRun, RetrievalTask};
use crate::results::{AnalysisOutput, Plot, bar_trace};

const UNJUDGED: &str = "Unjudged_Document";
const COLORS: [&str; 4] = ["skyblue", "lightgreen", "salmon", "gold"];

/// Inclusive rank ranges; the last bucket is open-ended.
const BUCKETS: [(&str, u32, u32); 13] = [
    ("1", 1, 1),
    ("2-10", 2, 10),
    ("11-20", 11, 20),
    ("21-30", 21, 30),
    ("31-40", 31, 40),
    ("41-50", 41, 50),
    ("51-60", 51, 60),
    ("61-70", 61, 70),
    ("71-80", 71, 80),
    ("81-90", 81, 90),
    ("91-100", 91, 100),
    ("101-200", 101, 200),
    ("200+", 201, u32::MAX),
];

/// Where, per query, the first document of each relevance grade (and the first
/// unjudged document) appears in the ranking.
pub struct PositionalDistribution;

impl Analysis for PositionalDistribution {
    fn slug(&self) -> &'static str {
        "positional_distribution"
    }

    fn name(&self) -> &'static str {
        "Positional Distribution of Relevant and Unjudged Retrieved Documents"
    }

    fn schema(
        &self,
        _ctx: &AnalysisContext<'_>,
        _task: &RetrievalTask,
        _runs: &[RetrievalRun],
    ) -> Result<ParameterSchema, EvalError> {
        Ok(ParameterSchema::new())
    }

    fn execute(
        &self,
        ctx: &AnalysisContext<'_>,
        task: &RetrievalTask,
        runs: &[RetrievalRun],
        _parameters: &Parameters,
    ) -> Result<AnalysisOutput, EvalError> {
        require_runs(runs)?;
        let qrels = judged_qrels(ctx, task)?;

        let mut output = AnalysisOutput::composite();
        for run in runs {
            let table = ctx.loader.run(run)?;
            let counts = bucket_first_positions(&qrels, &table);
            output = output.with(run.title.clone(), distribution_plot(&counts));
        }
        Ok(output.into())
    }
}

/// Series label → per-bucket query counts, series ordered by grade then unjudged.
pub(crate) fn bucket_first_positions(
    qrels: &QrelsTable,
    run: &RunTable,
) -> Vec<(String, [u64; 13])> {
    let grades = qrels.relevance_grades();
    let mut counts = grades
        .iter()
        .map(|grade| (Some(*grade), [0_u64; 13]))
        .chain(std::iter::once((None, [0_u64; 13])))
        .collect::<BTreeMap<Option<i32>, [u64; 13]>>();

    for query_id in run.query_ids() {
        let mut first = BTreeMap::<Option<i32>, u32>::new();
        for document in run.by_score(query_id) {
            let grade = qrels.relevance(query_id, &document.doc_id);
            first.entry(grade).or_insert(document.rank);
        }
        for (grade, rank) in first {
            if let (Some(series), Some(bucket)) = (counts.get_mut(&grade), bucket_of(rank)) {
                series[bucket] += 1;
            }
        }
    }

    // BTreeMap puts `None` first; unjudged is reported last.
    let mut ordered = counts
        .iter()
        .filter_map(|(grade, buckets)| grade.map(|grade| (grade_label(grade), *buckets)))
        .collect::<Vec<(String, [u64; 13])>>();
    if let Some(unjudged) = counts.get(&None) {
        ordered.push((UNJUDGED.to_string(), *unjudged));
    }
    ordered
}

fn bucket_of(rank: u32) -> Option<usize> {
    BUCKETS
        .iter()
        .position(|(_, start, end)| (*start..=*end).contains(&rank))
}

fn distribution_plot(series: &[(String, [u64; 13])]) -> Plot {
    let mut plot = Plot::new(
        "Distribution of Document Ranking Positions",
        "Position of the 1st Retrieved Document per Relevance Label",
        "Number of Queries",
    );
    plot.set_layout("barmode", json!("group"));
    plot.set_layout(
        "legend",
        json!({ "orientation": "h", "yanchor": "bottom", "y": 1.02, "xanchor": "right", "x": 1 }),
    );

    let labels = BUCKETS
        .iter()
        .map(|(label, _, _)| Value::from(*label))
        .collect::<Vec<Value>>();
    for (index, (name, counts)) in series.iter().enumerate() {
        let mut trace = bar_trace(
            name,
            labels.clone(),
            counts.iter().map(|count| Value::from(*count)).collect(),
        );
        trace["marker"] = json!({ "color": COLORS[index % COLORS.len()] });
        trace["hoverinfo"] = json!("y");
        plot.push_trace(trace);
    }
    plot
}
