use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Value, json};

use super::common::judged_qrels;
use super::{Analysis, AnalysisContext, FieldSpec, ParameterSchema, Parameters};
use crate::data::QrelsTable;
use crate::error::EvalError;
use crate::model::{RetrievalRun, RetrievalTask};
use crate::results::{AnalysisOutput, Plot, Scalar, Table, bar_trace};
use crate::util::compare_query_ids;

const DOCUMENTS_TO_DISPLAY: &str = "number_of_documents_to_display";
const PALETTE: [&str; 10] = [
    "#636efa", "#ef553b", "#00cc96", "#ab63fa", "#ffa15a", "#19d3f3", "#ff6692", "#b6e880",
    "#ff97ff", "#fecb52",
];

/// A document together with the grade it received for each query that judged it.
#[derive(Debug)]
pub(crate) struct SharedDocument<'q> {
    pub doc_id: &'q str,
    /// Query id → grade, in natural query order.
    pub grades: Vec<(&'q str, i32)>,
}

/// Documents judged for more than one query, most widely judged first.
pub struct RelevanceJudgmentsForMultipleQueries;

impl Analysis for RelevanceJudgmentsForMultipleQueries {
    fn slug(&self) -> &'static str {
        "relevance_judgments_for_multiple_queries"
    }

    fn name(&self) -> &'static str {
        "Relevance Judgments for Multiple Queries"
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
        Ok(ParameterSchema::new().field(
            FieldSpec::integer(
                DOCUMENTS_TO_DISPLAY,
                "Number of Documents to Display",
                Some(10),
                Some(200),
            )
            .with_initial(50),
        ))
    }

    fn execute(
        &self,
        ctx: &AnalysisContext<'_>,
        task: &RetrievalTask,
        _runs: &[RetrievalRun],
        parameters: &Parameters,
    ) -> Result<AnalysisOutput, EvalError> {
        let qrels = judged_qrels(ctx, task)?;
        let limit = usize::try_from(parameters.integer(DOCUMENTS_TO_DISPLAY)?)
            .map_err(|_| EvalError::invalid(DOCUMENTS_TO_DISPLAY, "value out of range"))?;

        let documents = shared_documents(&qrels, limit);

        let mut table = Table::new("Document ID", ["Number of Queries", "Relevance Judgments"]);
        for document in &documents {
            let judgments = document
                .grades
                .iter()
                .map(|(query_id, grade)| format!("{query_id}: {grade}"))
                .collect::<Vec<String>>()
                .join(", ");
            table.push_row(
                document.doc_id,
                vec![Scalar::from(document.grades.len()), Scalar::from(judgments)],
            );
        }

        Ok(AnalysisOutput::composite()
            .with("Relevance Judgments Plot", shared_documents_plot(&documents))
            .with("Documents judged for multiple queries", table)
            .into())
    }
}

/// Ties on the query count keep document ids in ascending order.
pub(crate) fn shared_documents(qrels: &QrelsTable, limit: usize) -> Vec<SharedDocument<'_>> {
    let mut by_document = BTreeMap::<&str, Vec<(&str, i32)>>::new();
    for judgment in qrels.judgments() {
        by_document
            .entry(judgment.doc_id.as_str())
            .or_default()
            .push((judgment.query_id.as_str(), judgment.relevance));
    }

    let mut documents = by_document
        .into_iter()
        .filter(|(_, grades)| grades.len() > 1)
        .map(|(doc_id, mut grades)| {
            grades.sort_by(|left, right| compare_query_ids(left.0, right.0));
            SharedDocument { doc_id, grades }
        })
        .collect::<Vec<SharedDocument<'_>>>();
    documents.sort_by(|left, right| right.grades.len().cmp(&left.grades.len()));
    documents.truncate(limit);
    documents
}

fn shared_documents_plot(documents: &[SharedDocument<'_>]) -> Plot {
    let mut plot = Plot::new(
        "Documents' Relevance Judged across Multiple Queries",
        "Document ID",
        "Number of Queries",
    );
    plot.set_layout("barmode", json!("stack"));
    plot.set_layout("height", json!(600));
    plot.set_layout("hoverlabel", json!({ "bgcolor": "white", "font": { "size": 12 } }));
    plot.set_layout(
        "legend",
        json!({
            "title": { "text": "Relevance Label" },
            "orientation": "h",
            "yanchor": "bottom",
            "y": 1.02,
            "xanchor": "right",
            "x": 1,
        }),
    );

    let grades = documents
        .iter()
        .flat_map(|document| document.grades.iter().map(|(_, grade)| *grade))
        .collect::<BTreeSet<i32>>();
    let x = documents
        .iter()
        .map(|document| Value::from(document.doc_id))
        .collect::<Vec<Value>>();

    for (index, grade) in grades.into_iter().enumerate() {
        let mut counts = Vec::with_capacity(documents.len());
        let mut hover = Vec::with_capacity(documents.len());
        for document in documents {
            let queries = document
                .grades
                .iter()
                .filter(|(_, candidate)| *candidate == grade)
                .map(|(query_id, _)| *query_id)
                .collect::<Vec<&str>>();
            counts.push(Value::from(queries.len()));
            hover.push(Value::from(format!("Queries: {}", queries.join(", "))));
        }

        let mut trace = bar_trace(&format!("Relevance {grade}"), x.clone(), counts);
        trace["marker"] = json!({ "color": PALETTE[index % PALETTE.len()] });
        trace["hovertext"] = Value::Array(hover);
        trace["hoverinfo"] = json!("text+y");
        plot.push_trace(trace);
    }
    plot
}
