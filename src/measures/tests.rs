use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::*;
use crate::data::{DataLoader, QrelsTable, RunTable};
use crate::error::EvalError;
use crate::model::{RetrievalRun, RetrievalTask};

const QRELS: &str = "q1 0 d1 1\nq1 0 d2 0\nq1 0 d3 2\nq2 0 d4 1\n";
const RUN: &str = "q1\tQ0\td1\t1\t0.9\tt\n\
q1\tQ0\td2\t2\t0.8\tt\n\
q1\tQ0\td3\t3\t0.7\tt\n\
q1\tQ0\td9\t4\t0.6\tt\n\
q2\tQ0\td5\t1\t0.5\tt\n\
q2\tQ0\td4\t2\t0.4\tt\n\
q3\tQ0\td1\t1\t1.0\tt\n";

fn tables() -> (QrelsTable, RunTable) {
    let qrels = QrelsTable::parse(QRELS, Path::new("qrels")).expect("qrels fixture should parse");
    let run = RunTable::parse(RUN, Path::new("run")).expect("run fixture should parse");
    (qrels, run)
}

fn aggregate(name: &str) -> f64 {
    let (qrels, run) = tables();
    let measure = parse_measure(name).expect("measure name should parse");
    TrecBackend
        .aggregate(&measure, &qrels, &run)
        .expect("measure should evaluate")
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn canonical_names_encode_every_parameter() {
    let ap = Measure::AveragePrecision {
        rel: 1,
        cutoff: Some(100),
        judged_only: false,
    };
    assert_eq!(ap.canonical_name(), "AP(rel=1,judged_only=False)@100");
    assert_eq!(ap.canonical_name(), ap.clone().canonical_name());
    assert_eq!(ap.to_string(), ap.canonical_name());

    let iprec = Measure::InterpolatedPrecision {
        rel: 2,
        recall: 1.0,
        judged_only: true,
    };
    assert_eq!(iprec.canonical_name(), "IPrec(rel=2,judged_only=True)@1.0");

    let ndcg = Measure::Ndcg {
        dcg: DcgGain::Log2,
        cutoff: Some(10),
        judged_only: true,
    };
    assert_eq!(ndcg.canonical_name(), "nDCG(dcg=log2,judged_only=True)@10");
    assert_eq!(Measure::NumRet { rel: None }.canonical_name(), "NumRet");
    assert_eq!(
        Measure::BejeweledPlayerModel {
            t: 1.0,
            min_rel: 0,
            max_rel: 2,
            cutoff: 20,
        }
        .canonical_name(),
        "BPM(T=1.0,min_rel=0,max_rel=2)@20"
    );
}

#[test]
fn parse_measure_inverts_canonical_names() {
    let measures = vec![
        Measure::AveragePrecision {
            rel: 2,
            cutoff: None,
            judged_only: true,
        },
        Measure::Precision {
            rel: 1,
            cutoff: 10,
            judged_only: false,
        },
        Measure::Recall {
            rel: 1,
            cutoff: 50,
            judged_only: false,
        },
        Measure::ReciprocalRank {
            rel: 1,
            cutoff: Some(100),
            judged_only: false,
        },
        Measure::RPrecision {
            rel: 1,
            judged_only: false,
        },
        Measure::Ndcg {
            dcg: DcgGain::ExpLog2,
            cutoff: None,
            judged_only: false,
        },
        Measure::InterpolatedPrecision {
            rel: 1,
            recall: 0.1,
            judged_only: true,
        },
        Measure::BinaryPreference { rel: 1 },
        Measure::Judged { cutoff: 10 },
        Measure::NumQ,
        Measure::NumRel { rel: 1 },
        Measure::NumRet { rel: Some(1) },
        Measure::Accuracy { rel: 1, cutoff: 5 },
        Measure::AlphaNdcg {
            alpha: 0.5,
            rel: 1,
            cutoff: 20,
            judged_only: false,
        },
        Measure::IntentAwareAveragePrecision {
            rel: 1,
            judged_only: false,
        },
    ];

    for measure in measures {
        let name = measure.canonical_name();
        let parsed = parse_measure(&name).expect("canonical name should parse");
        assert_eq!(parsed, measure, "{name}");
    }
}

#[test]
fn parse_measure_applies_defaults() {
    assert_eq!(
        parse_measure("P@10").expect("short name should parse"),
        Measure::Precision {
            rel: 1,
            cutoff: 10,
            judged_only: false,
        }
    );
    assert_eq!(
        parse_measure("nDCG@10")
            .expect("short name should parse")
            .canonical_name(),
        "nDCG(dcg=log2,judged_only=False)@10"
    );
}

#[test]
fn parse_measure_rejects_unknown_and_malformed_names() {
    for name in ["MAP@10", "P(rel=1)", "AP(foo=1)@10", "P(rel=x)@10", "NumQ@5", ""] {
        let error = parse_measure(name).expect_err("name should be rejected");
        assert!(
            matches!(error, EvalError::UnsupportedMeasure(_)),
            "{name}: {error:?}"
        );
    }
}

#[test]
fn parse_measure_reports_out_of_range_parameters_per_field() {
    let error = parse_measure("P(rel=0,judged_only=False)@0").expect_err("range should fail");
    match error {
        EvalError::Validation(fields) => {
            assert!(fields.get("rel").is_some());
            assert!(fields.get("cutoff").is_some());
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn backend_computes_trec_style_aggregates() {
    assert_close(aggregate("AP(rel=1,judged_only=False)"), (5.0 / 6.0 + 0.5) / 2.0);
    assert_close(aggregate("P(rel=1,judged_only=False)@2"), 0.5);
    assert_close(aggregate("P(rel=2,judged_only=False)@3"), 1.0 / 6.0);
    assert_close(aggregate("RR(rel=1,judged_only=False)"), 0.75);
    assert_close(aggregate("RR(rel=1,judged_only=True)"), 1.0);
    assert_close(aggregate("R(rel=1,judged_only=False)@1"), 0.25);
}

#[test]
fn backend_sums_count_measures_over_evaluated_queries() {
    assert_close(aggregate("NumQ"), 2.0);
    assert_close(aggregate("NumRel(rel=1)"), 3.0);
    assert_close(aggregate("NumRet"), 6.0);
    assert_close(aggregate("NumRet(rel=1)"), 3.0);
}

#[test]
fn backend_computes_graded_ndcg() {
    let ideal = 2.0 + 1.0 / 3_f64.log2();
    let q1 = 2.0 / ideal;
    let q2 = (1.0 / 3_f64.log2()) / 1.0;
    assert_close(aggregate("nDCG(dcg=log2,judged_only=False)@3"), (q1 + q2) / 2.0);
    assert_close(aggregate("nDCG(dcg=log2,judged_only=True)@3"), (q1 + 1.0) / 2.0);
}

#[test]
fn backend_interpolated_precision_is_monotone_in_recall() {
    let low = aggregate("IPrec(rel=1,judged_only=False)@0.0");
    let high = aggregate("IPrec(rel=1,judged_only=False)@1.0");
    assert!(low >= high, "{low} < {high}");
    assert_close(low, (1.0 + 0.5) / 2.0);
}

#[test]
fn backend_returns_zero_without_relevant_documents() {
    let qrels = QrelsTable::parse("q1 0 d1 0\n", Path::new("qrels")).expect("qrels should parse");
    let run = RunTable::parse("q1\tQ0\td1\t1\t1.0\tt\n", Path::new("run")).expect("run should parse");
    let measure = parse_measure("AP(rel=1,judged_only=False)").expect("measure should parse");

    let value = TrecBackend
        .aggregate(&measure, &qrels, &run)
        .expect("measure should evaluate");
    assert_eq!(value, 0.0);
}

#[test]
fn backend_rejects_measures_it_cannot_evaluate() {
    let (qrels, run) = tables();
    let measure = parse_measure("Accuracy(rel=1)@5").expect("measure should parse");
    let error = TrecBackend
        .per_query(&measure, &qrels, &run)
        .expect_err("accuracy is not supported");
    assert!(matches!(error, EvalError::UnsupportedMeasure(_)), "{error:?}");
}

#[derive(Default)]
struct CountingBackend {
    calls: AtomicUsize,
}

impl EvaluationBackend for CountingBackend {
    fn per_query(
        &self,
        measure: &Measure,
        qrels: &QrelsTable,
        run: &RunTable,
    ) -> Result<BTreeMap<String, f64>, EvalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        TrecBackend.per_query(measure, qrels, run)
    }
}

fn fixture() -> (DataLoader, RetrievalTask, RetrievalRun) {
    let task = RetrievalTask {
        id: "t1".to_string(),
        title: "Task".to_string(),
        qrels_path: "qrels".into(),
        topics_path: None,
    };
    let run = RetrievalRun {
        id: "r1".to_string(),
        title: "Run".to_string(),
        task_id: "t1".to_string(),
        path: "run".into(),
        sha256: "aaaa".to_string(),
    };
    let (qrels, table) = tables();
    let loader = DataLoader::new();
    loader.insert_qrels(&task, qrels);
    loader.insert_run(&run, table);
    (loader, task, run)
}

#[test]
fn aggregate_computes_each_measure_once() {
    let (loader, task, run) = fixture();
    let backend = CountingBackend::default();
    let cache = InMemoryMeasureCache::new();
    let calculator = MeasureCalculator::new(&loader, &backend, &cache);
    let measure = parse_measure("P@2").expect("measure should parse");

    let first = calculator
        .aggregate(&task, &run, &measure)
        .expect("first aggregate should succeed");
    let second = calculator
        .aggregate(&task, &run, &measure)
        .expect("second aggregate should succeed");

    assert_eq!(first, second);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.len(), 1);
}

#[test]
fn aggregate_recomputes_when_run_fingerprint_changes() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let run_path = dir.path().join("run.tsv");
    std::fs::write(&run_path, RUN).expect("run should be written");

    let (loader, task, mut run) = fixture();
    run.path = run_path;
    let backend = CountingBackend::default();
    let cache = InMemoryMeasureCache::new();
    let measure = parse_measure("P@2").expect("measure should parse");
    cache
        .put_cached_measure(&run.cache_key(), &measure.canonical_name(), "stale", 0.99)
        .expect("seeding cache should succeed");

    let calculator = MeasureCalculator::new(&loader, &backend, &cache);
    let value = calculator
        .aggregate(&task, &run, &measure)
        .expect("aggregate should recompute");

    assert_close(value, 0.5);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    let cached = cache
        .get_cached_measure(&run.cache_key(), &measure.canonical_name())
        .expect("cache read should succeed")
        .expect("value should be cached");
    assert_eq!(cached.run_sha256, "aaaa");
}

#[test]
fn per_query_is_never_cached() {
    let (loader, task, run) = fixture();
    let backend = CountingBackend::default();
    let cache = InMemoryMeasureCache::new();
    let calculator = MeasureCalculator::new(&loader, &backend, &cache);
    let measure = parse_measure("RR(rel=1,judged_only=False)").expect("measure should parse");

    let values = calculator
        .per_query(&task, &run, &measure)
        .expect("per-query should succeed");
    calculator
        .per_query(&task, &run, &measure)
        .expect("per-query should succeed again");

    assert_eq!(values.keys().collect::<Vec<_>>(), vec!["q1", "q2"]);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    assert!(cache.is_empty());
}

#[test]
fn display_names_follow_the_measure_kind() {
    let precision = parse_measure("P(rel=1,judged_only=False)@10").expect("measure should parse");
    assert_eq!(precision.display_name(), "Precision");
    assert_eq!(Measure::NumQ.display_name(), "Number of Queries");
}
