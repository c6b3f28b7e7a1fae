use std::path::Path;

use serde_json::{Value, json};

use super::params::FieldKind;
use super::positional_distribution::bucket_first_positions;
use super::relevance_judgments_for_multiple_queries::shared_documents;
use super::*;
use crate::data::{QrelsTable, RunTable};
use crate::measures::{InMemoryMeasureCache, TrecBackend};
use crate::results::{Scalar, Table};

struct Fixture {
    loader: DataLoader,
    task: RetrievalTask,
    runs: Vec<RetrievalRun>,
}

impl Fixture {
    fn new(qrels: &str, runs: &[(&str, &str, &str)]) -> Self {
        let task = RetrievalTask {
            id: "t1".to_string(),
            title: "Task".to_string(),
            qrels_path: "qrels".into(),
            topics_path: None,
        };
        let loader = DataLoader::new();
        loader.insert_qrels(
            &task,
            QrelsTable::parse(qrels, Path::new("qrels")).expect("qrels fixture should parse"),
        );

        let runs = runs
            .iter()
            .map(|(id, title, text)| {
                let run = RetrievalRun {
                    id: (*id).to_string(),
                    title: (*title).to_string(),
                    task_id: task.id.clone(),
                    path: format!("{id}.tsv").into(),
                    sha256: format!("sha-{id}"),
                };
                let table =
                    RunTable::parse(text, Path::new("run")).expect("run fixture should parse");
                loader.insert_run(&run, table);
                run
            })
            .collect();

        Self {
            loader,
            task,
            runs,
        }
    }

    fn run(&self, analysis: &dyn Analysis, submitted: Value) -> Result<AnalysisOutput, EvalError> {
        self.run_with(analysis, &self.runs, submitted)
    }

    fn run_with(
        &self,
        analysis: &dyn Analysis,
        runs: &[RetrievalRun],
        submitted: Value,
    ) -> Result<AnalysisOutput, EvalError> {
        let cache = InMemoryMeasureCache::new();
        let ctx = AnalysisContext::new(MeasureCalculator::new(&self.loader, &TrecBackend, &cache));
        let parameters = analysis.validate(&ctx, &self.task, runs, &submitted)?;
        analysis.execute(&ctx, &self.task, runs, &parameters)
    }

    fn schema(&self, analysis: &dyn Analysis) -> ParameterSchema {
        let cache = InMemoryMeasureCache::new();
        let ctx = AnalysisContext::new(MeasureCalculator::new(&self.loader, &TrecBackend, &cache));
        analysis
            .schema(&ctx, &self.task, &self.runs)
            .expect("schema should build")
    }
}

fn table<'o>(output: &'o AnalysisOutput, label: &str) -> &'o Table {
    output
        .child(label)
        .and_then(AnalysisOutput::as_table)
        .unwrap_or_else(|| panic!("{label} should be a table"))
}

fn value<'o>(output: &'o AnalysisOutput, label: &str) -> &'o Scalar {
    match output.child(label) {
        Some(AnalysisOutput::Value(scalar)) => scalar,
        other => panic!("{label} should be a value, got {other:?}"),
    }
}

const SCENARIO_QRELS: &str = "q1 0 d1 1\nq1 0 d2 0\n";
const SCENARIO_RUN: &str = "q1\tQ0\td1\t1\t0.9\tr\nq1\tQ0\td2\t2\t0.5\tr\n";

#[test]
fn overall_characteristics_report_counts_per_run() {
    let fixture = Fixture::new(SCENARIO_QRELS, &[("a", "Run A", SCENARIO_RUN)]);
    let output = fixture
        .run(&OverallRetrievalCharacteristics, json!({}))
        .expect("analysis should succeed");

    let general = table(&output, "General");
    assert_eq!(general.get("Run A", "NumQ"), Some(&Scalar::Int(1)));
    assert_eq!(general.get("Run A", "NumRel"), Some(&Scalar::Int(1)));
    assert_eq!(general.get("Run A", "NumRet"), Some(&Scalar::Int(2)));
    assert_eq!(general.get("Run A", "NumRelRet"), Some(&Scalar::Int(1)));
    assert_eq!(
        table(&output, "Precision").get("Run A", "P@5"),
        Some(&Scalar::Float(0.2))
    );
    assert_eq!(
        table(&output, "Recall").get("Run A", "R@5"),
        Some(&Scalar::Float(1.0))
    );
}

#[test]
fn overall_characteristics_are_idempotent() {
    let fixture = Fixture::new(SCENARIO_QRELS, &[("a", "Run A", SCENARIO_RUN)]);
    let first = fixture
        .run(&OverallRetrievalCharacteristics, json!({}))
        .expect("first execution should succeed");
    let second = fixture
        .run(&OverallRetrievalCharacteristics, json!({}))
        .expect("second execution should succeed");
    assert_eq!(first, second);
    assert_eq!(first.to_json(), second.to_json());
}

#[test]
fn relevance_threshold_collapses_for_binary_qrels() {
    let fixture = Fixture::new("q1 0 d1 1\nq2 0 d2 1\n", &[("a", "Run A", SCENARIO_RUN)]);
    let schema = fixture.schema(&PrecisionRecallCurve);
    let field = schema
        .get("relevance_threshold")
        .expect("threshold field should exist");

    assert_eq!(
        field.kind,
        FieldKind::Integer {
            min: Some(1),
            max: Some(1)
        }
    );
    assert!(field.disabled);
    let parameters = schema
        .validate(&json!({ "relevance_threshold": 3 }))
        .expect("disabled field should take its initial value");
    assert_eq!(
        parameters
            .integer("relevance_threshold")
            .expect("threshold should be present"),
        1
    );
}

#[test]
fn relevance_threshold_spans_graded_qrels() {
    let fixture = Fixture::new("q1 0 d1 3\nq1 0 d2 0\n", &[("a", "Run A", SCENARIO_RUN)]);

    let lowest = fixture.schema(&OverallRetrievalCharacteristics);
    let field = lowest
        .get("relevance_threshold")
        .expect("threshold field should exist");
    assert_eq!(field.initial, Some(json!(1)));
    assert!(!field.disabled);

    let highest = fixture.schema(&PrecisionRecallCurve);
    let field = highest
        .get("relevance_threshold")
        .expect("threshold field should exist");
    assert_eq!(field.initial, Some(json!(3)));
}

#[test]
fn precision_recall_curve_has_eleven_points_per_run() {
    let fixture = Fixture::new(SCENARIO_QRELS, &[("a", "Run A", SCENARIO_RUN)]);
    let output = fixture
        .run(&PrecisionRecallCurve, json!({}))
        .expect("analysis should succeed");
    let AnalysisOutput::Plot(plot) = output else {
        panic!("precision/recall curve should be a plot");
    };

    assert_eq!(plot.data().len(), 1);
    assert_eq!(plot.data()[0]["name"], json!("Run A"));
    assert_eq!(
        plot.data()[0]["y"]
            .as_array()
            .expect("trace should carry y values")
            .len(),
        11
    );
    assert_eq!(plot.data()[0]["y"][0], json!(1.0));
}

#[test]
fn documents_retrieved_by_all_systems_finds_shared_documents() {
    let fixture = Fixture::new(
        SCENARIO_QRELS,
        &[
            ("a", "Run A", "q1\tQ0\td1\t1\t0.9\ta\nq1\tQ0\td2\t2\t0.5\ta\n"),
            ("b", "Run B", "q1\tQ0\td1\t1\t0.8\tb\nq1\tQ0\td3\t2\t0.4\tb\n"),
        ],
    );
    let output = fixture
        .run(&DocumentsRetrievedByAllSystems, json!({ "cutoff": 10 }))
        .expect("analysis should succeed");

    assert_eq!(value(&output, "Number of common queries"), &Scalar::Int(1));
    assert_eq!(
        value(&output, "Queries with documents retrieved by all systems"),
        &Scalar::from("q1")
    );
    assert_eq!(
        value(&output, "Sample of documents retrieved by all systems"),
        &Scalar::from("d1")
    );
}

#[test]
fn documents_retrieved_by_all_systems_orders_sample_by_frequency() {
    let run = "q1\tQ0\td1\t1\t0.9\tr\nq1\tQ0\td2\t2\t0.5\tr\n\
q2\tQ0\td2\t1\t0.9\tr\nq10\tQ0\td2\t1\t0.9\tr\n";
    let fixture = Fixture::new(
        SCENARIO_QRELS,
        &[("a", "Run A", run), ("b", "Run B", run)],
    );
    let output = fixture
        .run(
            &DocumentsRetrievedByAllSystems,
            json!({ "cutoff": 2, "sample_size": 2 }),
        )
        .expect("analysis should succeed");

    assert_eq!(value(&output, "Number of common queries"), &Scalar::Int(3));
    assert_eq!(
        value(&output, "Queries with documents retrieved by all systems"),
        &Scalar::from("q1, q2, q10")
    );
    assert_eq!(
        value(&output, "Sample of documents retrieved by all systems"),
        &Scalar::from("d2, d1")
    );
}

#[test]
fn experimental_evaluation_records_null_p_value_without_shared_queries() {
    let fixture = Fixture::new(
        "q1 0 d1 1\nq2 0 d2 1\n",
        &[
            ("a", "Run A", "q2\tQ0\td2\t1\t0.9\ta\n"),
            ("b", "Run B", "q1\tQ0\td1\t1\t0.9\tb\n"),
        ],
    );
    let output = fixture
        .run(&ExperimentalEvaluation, json!({ "baseline_run": "b" }))
        .expect("degenerate tests should not fail the analysis");

    let p_values = table(&output, "P-values");
    assert_eq!(p_values.columns(), ["Run A".to_string()]);
    assert_eq!(
        p_values.get("AP(rel=1,judged_only=False)@100", "Run A"),
        Some(&Scalar::Null)
    );
    assert_eq!(
        table(&output, "Significant differences").get("P(rel=1,judged_only=False)@10", "Run A"),
        Some(&Scalar::Null)
    );
    assert_eq!(
        table(&output, "Measure values").get("RR(rel=1,judged_only=False)@100", "Run B"),
        Some(&Scalar::Float(1.0))
    );
}

#[test]
fn experimental_evaluation_flags_significant_differences() {
    let qrels = "q1 0 d1 1\nq2 0 d2 1\nq3 0 d3 1\nq4 0 d4 1\n";
    let strong = "q1\tQ0\td1\t1\t0.9\ts\nq2\tQ0\td2\t1\t0.9\ts\n\
q3\tQ0\td3\t1\t0.9\ts\nq4\tQ0\td4\t1\t0.9\ts\n";
    let weak = "q1\tQ0\tx\t1\t0.9\tw\nq1\tQ0\td1\t2\t0.8\tw\n\
q2\tQ0\tx\t1\t0.9\tw\nq2\tQ0\ty\t2\t0.8\tw\nq2\tQ0\td2\t3\t0.7\tw\n\
q3\tQ0\tx\t1\t0.9\tw\nq3\tQ0\td3\t2\t0.8\tw\n\
q4\tQ0\tx\t1\t0.9\tw\nq4\tQ0\ty\t2\t0.8\tw\nq4\tQ0\td4\t3\t0.7\tw\n";
    let fixture = Fixture::new(qrels, &[("strong", "Strong", strong), ("weak", "Weak", weak)]);
    let output = fixture
        .run(
            &ExperimentalEvaluation,
            json!({ "baseline_run": "strong", "correction_method": "Holm" }),
        )
        .expect("analysis should succeed");

    let measure = "RR(rel=1,judged_only=False)@100";
    let p_value = table(&output, "P-values")
        .get(measure, "Weak")
        .and_then(Scalar::as_f64)
        .expect("p-value should be defined");
    assert!(p_value < 0.05, "p-value {p_value}");
    assert_eq!(
        table(&output, "Significant differences").get(measure, "Weak"),
        Some(&Scalar::from("Yes"))
    );
}

#[test]
fn experimental_evaluation_reports_every_invalid_field() {
    let fixture = Fixture::new(SCENARIO_QRELS, &[("a", "Run A", SCENARIO_RUN)]);
    let error = fixture
        .run(
            &ExperimentalEvaluation,
            json!({ "correction_value": 0.5, "correction_method": "Sidak", "bogus": 1 }),
        )
        .expect_err("invalid parameters should be rejected");

    let EvalError::Validation(fields) = error else {
        panic!("expected a validation error, got {error:?}");
    };
    assert_eq!(fields.get("baseline_run"), Some("this field is required"));
    assert_eq!(fields.get("correction_value"), Some("must be at most 0.05"));
    assert!(
        fields
            .get("correction_method")
            .is_some_and(|message| message.starts_with("select a valid choice"))
    );
    assert_eq!(fields.get("bogus"), Some("unknown field"));
}

#[test]
fn parameters_are_never_coerced() {
    let fixture = Fixture::new(SCENARIO_QRELS, &[("a", "Run A", SCENARIO_RUN)]);
    let error = fixture
        .run(&RetrievedDocumentIntersection, json!({ "baseline_run": "a", "cutoff": "5" }))
        .expect_err("string cutoff should be rejected");
    let EvalError::Validation(fields) = error else {
        panic!("expected a validation error, got {error:?}");
    };
    assert_eq!(fields.get("cutoff"), Some("enter a whole number"));
}

#[test]
fn retrieved_document_intersection_reports_zero_overlap() {
    let fixture = Fixture::new(
        SCENARIO_QRELS,
        &[
            ("a", "Run A", "q1\tQ0\td2\t1\t0.9\ta\nq1\tQ0\td1\t2\t0.5\ta\n"),
            ("b", "Run B", SCENARIO_RUN),
        ],
    );
    let output = fixture
        .run(
            &RetrievedDocumentIntersection,
            json!({ "baseline_run": "b", "cutoff": 1 }),
        )
        .expect("analysis should succeed");
    let AnalysisOutput::Table(table) = output else {
        panic!("intersection should be a table");
    };

    assert_eq!(table.index(), ["Run A".to_string()]);
    assert_eq!(
        table.get("Run A", "Intersected Documents"),
        Some(&Scalar::Int(0))
    );
    assert_eq!(table.get("Run A", "Total Documents"), Some(&Scalar::Int(1)));
    assert_eq!(
        table.get("Run A", "Intersection Percentage"),
        Some(&Scalar::Float(0.0))
    );
}

#[test]
fn retrieved_document_intersection_rounds_percentages() {
    let fixture = Fixture::new(
        SCENARIO_QRELS,
        &[
            (
                "a",
                "Run A",
                "q1\tQ0\td1\t1\t0.9\ta\nq1\tQ0\td5\t2\t0.5\ta\nq1\tQ0\td6\t3\t0.4\ta\n",
            ),
            ("b", "Run B", SCENARIO_RUN),
        ],
    );
    let output = fixture
        .run(
            &RetrievedDocumentIntersection,
            json!({ "baseline_run": "b", "cutoff": 3 }),
        )
        .expect("analysis should succeed");
    let AnalysisOutput::Table(table) = output else {
        panic!("intersection should be a table");
    };
    assert_eq!(
        table.get("Run A", "Intersection Percentage"),
        Some(&Scalar::Float(33.33))
    );
}

#[test]
fn analyses_require_runs_and_judgments() {
    let fixture = Fixture::new(SCENARIO_QRELS, &[]);
    let error = fixture
        .run_with(&OverallRetrievalCharacteristics, &[], json!({}))
        .expect_err("an empty run selection should be rejected");
    assert!(matches!(error, EvalError::InsufficientData(_)), "{error:?}");

    let unjudged = Fixture::new("", &[("a", "Run A", SCENARIO_RUN)]);
    let error = unjudged
        .run(&PositionalDistribution, json!({}))
        .expect_err("empty qrels should be rejected");
    assert!(matches!(error, EvalError::InsufficientData(_)), "{error:?}");
}

#[test]
fn first_positions_are_bucketed_per_grade() {
    let qrels = QrelsTable::parse("q1 0 d1 1\nq1 0 d2 0\n", Path::new("qrels"))
        .expect("qrels should parse");
    let run_text = "q1\tQ0\td2\t1\t0.99\tr\nq1\tQ0\td1\t2\t0.98\tr\nq1\tQ0\tu1\t15\t0.5\tr\n\
q1\tQ0\tu2\t16\t0.4\tr\n";
    let run = RunTable::parse(run_text, Path::new("run")).expect("run should parse");

    let series = bucket_first_positions(&qrels, &run);
    let names = series
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<&str>>();
    assert_eq!(
        names,
        ["Irrelevant_Document", "Relevance_Label_1", "Unjudged_Document"]
    );
    assert_eq!(series[0].1[0], 1);
    assert_eq!(series[1].1[1], 1);
    assert_eq!(series[2].1[2], 1);
    assert_eq!(series.iter().map(|(_, counts)| counts.iter().sum::<u64>()).sum::<u64>(), 3);
}

#[test]
fn positional_distribution_emits_one_plot_per_run() {
    let fixture = Fixture::new(
        SCENARIO_QRELS,
        &[("a", "Run A", SCENARIO_RUN), ("b", "Run B", SCENARIO_RUN)],
    );
    let output = fixture
        .run(&PositionalDistribution, json!({}))
        .expect("analysis should succeed");
    let plot = output
        .child("Run B")
        .and_then(AnalysisOutput::as_plot)
        .expect("each run should get a plot");
    assert_eq!(plot.layout()["barmode"], json!("group"));
    assert_eq!(plot.data().len(), 3);
    assert_eq!(plot.data()[0]["x"][12], json!("200+"));
}

#[test]
fn ranking_heatmap_marks_unjudged_and_missing_cells() {
    let fixture = Fixture::new(
        SCENARIO_QRELS,
        &[(
            "a",
            "Run A",
            "q1\tQ0\td1\t1\t0.9\ta\nq1\tQ0\td9\t2\t0.5\ta\n",
        )],
    );
    let output = fixture
        .run(&RelevanceRankingPositions, json!({ "ranking_depth": 3 }))
        .expect("analysis should succeed");
    let AnalysisOutput::Plot(plot) = output else {
        panic!("ranking positions should be a plot");
    };

    let heatmap = &plot.data()[0];
    assert_eq!(heatmap["type"], json!("heatmap"));
    assert_eq!(heatmap["x"], json!(["q1"]));
    assert_eq!(heatmap["z"], json!([[1], [-100], [null]]));
    assert_eq!(plot.layout()["height"], json!(700));
}

const GRADED_QRELS: &str = "q1 0 d1 1\nq1 0 d2 0\nq1 0 d3 0\nq2 0 d1 2\nq2 0 d4 1\nq10 0 d5 0\n";

#[test]
fn judgments_per_query_classifies_easy_and_hard_queries() {
    let fixture = Fixture::new(GRADED_QRELS, &[]);
    let output = fixture
        .run_with(&RelevanceJudgmentsPerQuery, &[], json!({}))
        .expect("analysis should succeed without runs");

    let difficulty = table(&output, "Easy and Hard Queries");
    assert_eq!(
        difficulty.columns(),
        [
            "Relevance Label 1".to_string(),
            "Relevance Label 2".to_string(),
            "Combined".to_string()
        ]
    );
    assert_eq!(
        difficulty.get("Easy Queries (top 5)", "Combined"),
        Some(&Scalar::from("q2"))
    );
    assert_eq!(
        difficulty.get("Hard Queries (top 5)", "Combined"),
        Some(&Scalar::from("q10"))
    );
    assert_eq!(
        difficulty.get("Min Query", "Combined"),
        Some(&Scalar::from("q10"))
    );
    assert_eq!(
        difficulty.get("Max Query", "Combined"),
        Some(&Scalar::from("q2"))
    );

    let per_query = table(&output, "Judgments per query");
    assert_eq!(
        per_query.index(),
        ["q1".to_string(), "q2".to_string(), "q10".to_string()]
    );
    assert_eq!(per_query.get("q1", "Irrelevant"), Some(&Scalar::Int(2)));
    assert_eq!(per_query.get("q2", "Total"), Some(&Scalar::Int(2)));

    let statistics = table(&output, "Judgment statistics");
    assert_eq!(statistics.get("Irrelevant", "Total"), Some(&Scalar::Int(3)));
    assert_eq!(
        statistics.get("Irrelevant", "Percentage"),
        Some(&Scalar::Float(50.0))
    );

    let plot = output
        .child("Query Relevance Judgments Plot")
        .and_then(AnalysisOutput::as_plot)
        .expect("plot should be present");
    assert_eq!(plot.data()[0]["marker"]["color"], json!("red"));
    assert_eq!(plot.layout()["barmode"], json!("stack"));
}

#[test]
fn shared_documents_are_listed_with_their_grades() {
    let qrels = QrelsTable::parse(GRADED_QRELS, Path::new("qrels")).expect("qrels should parse");
    let documents = shared_documents(&qrels, 10);
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].doc_id, "d1");
    assert_eq!(documents[0].grades, vec![("q1", 1), ("q2", 2)]);

    let fixture = Fixture::new(GRADED_QRELS, &[]);
    let output = fixture
        .run_with(&RelevanceJudgmentsForMultipleQueries, &[], json!({}))
        .expect("analysis should succeed");
    let listing = table(&output, "Documents judged for multiple queries");
    assert_eq!(listing.get("d1", "Number of Queries"), Some(&Scalar::Int(2)));
    assert_eq!(
        listing.get("d1", "Relevance Judgments"),
        Some(&Scalar::from("q1: 1, q2: 2"))
    );

    let error = fixture
        .run_with(
            &RelevanceJudgmentsForMultipleQueries,
            &[],
            json!({ "number_of_documents_to_display": 5 }),
        )
        .expect_err("values below the minimum should be rejected");
    assert!(matches!(error, EvalError::Validation(_)));
}
