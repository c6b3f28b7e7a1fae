use serde_json::{Value, json};

use super::common::{blend, grade_label, judged_qrels};
use super::{Analysis, AnalysisContext, ParameterSchema, Parameters};
use crate::data::QrelsTable;
use crate::error::EvalError;
use crate::model::{RetrievalRun, RetrievalTask};
use crate::results::{AnalysisOutput, Plot, Scalar, Table, bar_trace};
use crate::stats::summarize;
use crate::util::{round_to, sort_query_ids};

const IRRELEVANT: &str = "Irrelevant";
const COMBINED: &str = "Combined";
const LISTED_QUERIES: usize = 5;

/// Judgment counts per query, computed from the qrels alone.
struct QueryCounts {
    query_id: String,
    irrelevant: usize,
    /// Parallel to the relevant grades of the task.
    relevant: Vec<usize>,
}

impl QueryCounts {
    fn combined(&self) -> usize {
        self.relevant.iter().sum()
    }
}

/// Descriptive statistics over the qrels: how many documents of each grade
/// each query has, and which queries look easy or hard.
pub struct RelevanceJudgmentsPerQuery;

impl Analysis for RelevanceJudgmentsPerQuery {
    fn slug(&self) -> &'static str {
        "relevance_judgments_per_query"
    }

    fn name(&self) -> &'static str {
        "Relevance Judgments per Query"
    }

    fn uses_runs(&self) -> bool {
        false
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
        _runs: &[RetrievalRun],
        _parameters: &Parameters,
    ) -> Result<AnalysisOutput, EvalError> {
        let qrels = judged_qrels(ctx, task)?;
        let topics = ctx.loader.topics(task)?;

        let grades = qrels
            .relevance_grades()
            .into_iter()
            .filter(|grade| *grade > 0)
            .collect::<Vec<i32>>();
        let labels = grades.iter().map(|grade| grade_label(*grade)).collect::<Vec<String>>();
        let counts = count_judgments(&qrels, &grades);

        let mut per_query_columns = Vec::new();
        if !topics.is_empty() {
            per_query_columns.push("Query".to_string());
        }
        per_query_columns.push(IRRELEVANT.to_string());
        per_query_columns.extend(labels.iter().cloned());
        per_query_columns.push("Total".to_string());

        let mut per_query = Table::new("Query ID", per_query_columns);
        for query in &counts {
            let mut row = Vec::with_capacity(labels.len() + 3);
            if !topics.is_empty() {
                row.push(topics.text(&query.query_id).map_or(Scalar::Null, Scalar::from));
            }
            row.push(Scalar::from(query.irrelevant));
            row.extend(query.relevant.iter().map(|count| Scalar::from(*count)));
            row.push(Scalar::from(query.irrelevant + query.combined()));
            per_query.push_row(query.query_id.clone(), row);
        }

        Ok(AnalysisOutput::composite()
            .with("Query Relevance Judgments Plot", judgments_plot(&counts, &labels))
            .with("Easy and Hard Queries", difficulty_table(&counts, &labels))
            .with("Judgment statistics", statistics_table(&counts, &labels))
            .with("Judgments per query", per_query)
            .into())
    }
}

/// One entry per judged query in natural id order. Grades `<= 0` count as irrelevant.
fn count_judgments(qrels: &QrelsTable, grades: &[i32]) -> Vec<QueryCounts> {
    let mut query_ids = qrels.query_ids().collect::<Vec<&str>>();
    sort_query_ids(&mut query_ids);

    query_ids
        .into_iter()
        .map(|query_id| {
            let mut counts = QueryCounts {
                query_id: query_id.to_string(),
                irrelevant: 0,
                relevant: vec![0; grades.len()],
            };
            for grade in qrels.query_judgments(query_id).into_iter().flat_map(|docs| docs.values()) {
                match grades.iter().position(|candidate| candidate == grade) {
                    Some(index) => counts.relevant[index] += 1,
                    None => counts.irrelevant += 1,
                }
            }
            counts
        })
        .collect()
}

fn judgments_plot(counts: &[QueryCounts], labels: &[String]) -> Plot {
    let mut plot = Plot::new(
        "Query Relevance Judgements Analysis",
        "Query ID",
        "Number of Documents",
    );
    plot.set_layout("barmode", json!("stack"));
    plot.set_layout("height", json!(550));
    plot.set_layout("legend", json!({
        "title": { "text": "Relevance Labels" },
        "orientation": "h",
        "yanchor": "bottom",
        "y": 1.02,
        "xanchor": "right",
        "x": 1,
    }));
    plot.set_layout("xaxis", json!({
        "title": { "text": "Query ID" },
        "tickangle": 45,
        "type": "category",
    }));

    let x = counts
        .iter()
        .map(|query| Value::from(query.query_id.as_str()))
        .collect::<Vec<Value>>();

    let mut series = vec![(
        IRRELEVANT.to_string(),
        "red".to_string(),
        counts.iter().map(|query| query.irrelevant).collect::<Vec<usize>>(),
    )];
    for (index, label) in labels.iter().enumerate() {
        let color = if labels.len() == 1 {
            "blue".to_string()
        } else {
            let t = index as f64 / (labels.len() - 1) as f64;
            blend((173, 216, 230), (0, 0, 139), t)
        };
        series.push((
            label.clone(),
            color,
            counts.iter().map(|query| query.relevant[index]).collect(),
        ));
    }

    for (name, color, values) in series {
        let y = values.iter().map(|count| Value::from(*count)).collect::<Vec<Value>>();
        let mut trace = bar_trace(&name, x.clone(), y.clone());
        trace["text"] = Value::Array(y);
        trace["textposition"] = json!("auto");
        trace["marker"] = json!({ "color": color });
        trace["hovertemplate"] = json!(format!("Query: %{{x}}<br>{name}: %{{y}}<extra></extra>"));
        plot.push_trace(trace);
    }
    plot
}

fn difficulty_table(counts: &[QueryCounts], labels: &[String]) -> Table {
    let columns = labels
        .iter()
        .map(|label| label.replace('_', " "))
        .chain(std::iter::once(COMBINED.to_string()))
        .collect::<Vec<String>>();

    let per_column = (0..labels.len())
        .map(|index| {
            counts
                .iter()
                .map(|query| (query.query_id.as_str(), query.relevant[index], query.irrelevant))
                .collect::<Vec<(&str, usize, usize)>>()
        })
        .chain(std::iter::once(
            counts
                .iter()
                .map(|query| (query.query_id.as_str(), query.combined(), query.irrelevant))
                .collect(),
        ))
        .map(|column| classify(&column))
        .collect::<Vec<Difficulty>>();

    let mut table = Table::new("Category", columns);
    table.push_row(
        "Easy Queries (top 5)",
        per_column.iter().map(|column| Scalar::from(column.easy.join(", "))).collect(),
    );
    table.push_row(
        "Hard Queries (top 5)",
        per_column.iter().map(|column| Scalar::from(column.hard.join(", "))).collect(),
    );
    table.push_row(
        "Min Query",
        per_column
            .iter()
            .map(|column| column.min_query.clone().map_or(Scalar::Null, Scalar::from))
            .collect(),
    );
    table.push_row(
        "Max Query",
        per_column
            .iter()
            .map(|column| column.max_query.clone().map_or(Scalar::Null, Scalar::from))
            .collect(),
    );
    table
}

#[derive(Debug, Default)]
struct Difficulty {
    easy: Vec<String>,
    hard: Vec<String>,
    min_query: Option<String>,
    max_query: Option<String>,
}

/// Easy: at least as many relevant as irrelevant judgments. Hard: fewer
/// relevant judgments than half the irrelevant ones. Min and max keep the
/// first query reaching the extreme.
fn classify(column: &[(&str, usize, usize)]) -> Difficulty {
    let mut difficulty = Difficulty::default();
    let mut extremes: Option<(usize, usize)> = None;

    for (query_id, count, irrelevant) in column {
        if count >= irrelevant {
            if difficulty.easy.len() < LISTED_QUERIES {
                difficulty.easy.push((*query_id).to_string());
            }
        } else if (*count as f64) < *irrelevant as f64 / 2.0
            && difficulty.hard.len() < LISTED_QUERIES
        {
            difficulty.hard.push((*query_id).to_string());
        }

        match extremes {
            None => {
                extremes = Some((*count, *count));
                difficulty.min_query = Some((*query_id).to_string());
                difficulty.max_query = Some((*query_id).to_string());
            }
            Some((min, max)) => {
                if *count < min {
                    difficulty.min_query = Some((*query_id).to_string());
                }
                if *count > max {
                    difficulty.max_query = Some((*query_id).to_string());
                }
                extremes = Some((min.min(*count), max.max(*count)));
            }
        }
    }
    difficulty
}

fn statistics_table(counts: &[QueryCounts], labels: &[String]) -> Table {
    let mut series = vec![(
        IRRELEVANT.to_string(),
        counts.iter().map(|query| query.irrelevant as f64).collect::<Vec<f64>>(),
    )];
    for (index, label) in labels.iter().enumerate() {
        series.push((
            label.clone(),
            counts.iter().map(|query| query.relevant[index] as f64).collect(),
        ));
    }
    let grand_total = series
        .iter()
        .map(|(_, values)| values.iter().sum::<f64>())
        .sum::<f64>();

    let mut table = Table::new(
        "Label",
        ["Total", "Percentage", "Mean", "Median", "Std", "Min", "Max"],
    );
    for (label, values) in series {
        let row = match summarize(&values) {
            Some(summary) => {
                let percentage = if grand_total == 0.0 {
                    0.0
                } else {
                    round_to(summary.total / grand_total * 100.0, 2)
                };
                vec![
                    Scalar::Int(summary.total as i64),
                    Scalar::Float(percentage),
                    Scalar::Float(summary.mean),
                    Scalar::Float(summary.median),
                    Scalar::Float(summary.std),
                    Scalar::Int(summary.min as i64),
                    Scalar::Int(summary.max as i64),
                ]
            }
            None => Vec::new(),
        };
        table.push_row(label, row);
    }
    table
}
