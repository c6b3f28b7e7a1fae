use std::collections::{BTreeMap, HashMap};

use super::{Aggregation, DcgGain, Measure};
use crate::data::{QrelsTable, RankedDocument, RunTable};
use crate::error::EvalError;

/// Computes measure values from parsed tables.
pub trait EvaluationBackend: Send + Sync {
    /// One value per query present in both the run and the qrels.
    fn per_query(
        &self,
        measure: &Measure,
        qrels: &QrelsTable,
        run: &RunTable,
    ) -> Result<BTreeMap<String, f64>, EvalError>;

    fn aggregate(
        &self,
        measure: &Measure,
        qrels: &QrelsTable,
        run: &RunTable,
    ) -> Result<f64, EvalError> {
        let values = self.per_query(measure, qrels, run)?;
        let total = values.values().sum::<f64>();
        Ok(match measure.aggregation() {
            Aggregation::Sum => total,
            Aggregation::Mean if values.is_empty() => 0.0,
            Aggregation::Mean => total / values.len() as f64,
        })
    }
}

/// Built-in backend following trec_eval conventions.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrecBackend;

impl EvaluationBackend for TrecBackend {
    fn per_query(
        &self,
        measure: &Measure,
        qrels: &QrelsTable,
        run: &RunTable,
    ) -> Result<BTreeMap<String, f64>, EvalError> {
        measure.validate()?;
        if !is_supported(measure) {
            return Err(EvalError::UnsupportedMeasure(measure.canonical_name()));
        }

        let mut values = BTreeMap::new();
        for query_id in run.query_ids() {
            let Some(judgments) = qrels.query_judgments(query_id) else {
                continue;
            };
            let ranking = run.by_score(query_id);
            values.insert(
                query_id.to_string(),
                evaluate_query(measure, judgments, &ranking),
            );
        }
        Ok(values)
    }
}

fn is_supported(measure: &Measure) -> bool {
    !matches!(
        measure,
        Measure::Accuracy { .. }
            | Measure::AlphaDcg { .. }
            | Measure::AlphaNdcg { .. }
            | Measure::IntentAwareAveragePrecision { .. }
            | Measure::BejeweledPlayerModel { .. }
    )
}

struct Query<'a> {
    judgments: &'a HashMap<String, i32>,
    ranking: Vec<&'a RankedDocument>,
}

impl<'a> Query<'a> {
    fn new(
        judgments: &'a HashMap<String, i32>,
        ranking: &[&'a RankedDocument],
        judged_only: bool,
    ) -> Self {
        let ranking = ranking
            .iter()
            .copied()
            .filter(|document| !judged_only || judgments.contains_key(&document.doc_id))
            .collect();
        Self { judgments, ranking }
    }

    fn grade(&self, document: &RankedDocument) -> Option<i32> {
        self.judgments.get(&document.doc_id).copied()
    }

    fn is_relevant(&self, document: &RankedDocument, rel: i32) -> bool {
        self.grade(document).is_some_and(|grade| grade >= rel)
    }

    fn num_rel(&self, rel: i32) -> usize {
        self.judgments.values().filter(|grade| **grade >= rel).count()
    }

    fn top(&self, cutoff: Option<u32>) -> &[&'a RankedDocument] {
        match cutoff {
            Some(cutoff) => &self.ranking[..self.ranking.len().min(cutoff as usize)],
            None => &self.ranking,
        }
    }

    fn relevant_in(&self, documents: &[&RankedDocument], rel: i32) -> usize {
        documents
            .iter()
            .filter(|document| self.is_relevant(document, rel))
            .count()
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

fn evaluate_query(
    measure: &Measure,
    judgments: &HashMap<String, i32>,
    ranking: &[&RankedDocument],
) -> f64 {
    match *measure {
        Measure::AveragePrecision {
            rel,
            cutoff,
            judged_only,
        } => {
            let query = Query::new(judgments, ranking, judged_only);
            let mut found = 0_usize;
            let mut precision_sum = 0.0;
            for (index, document) in query.top(cutoff).iter().enumerate() {
                if query.is_relevant(document, rel) {
                    found += 1;
                    precision_sum += found as f64 / (index + 1) as f64;
                }
            }
            ratio(precision_sum, query.num_rel(rel) as f64)
        }
        Measure::Precision {
            rel,
            cutoff,
            judged_only,
        } => {
            let query = Query::new(judgments, ranking, judged_only);
            let found = query.relevant_in(query.top(Some(cutoff)), rel);
            ratio(found as f64, f64::from(cutoff))
        }
        Measure::Recall {
            rel,
            cutoff,
            judged_only,
        } => {
            let query = Query::new(judgments, ranking, judged_only);
            let found = query.relevant_in(query.top(Some(cutoff)), rel);
            ratio(found as f64, query.num_rel(rel) as f64)
        }
        Measure::ReciprocalRank {
            rel,
            cutoff,
            judged_only,
        } => {
            let query = Query::new(judgments, ranking, judged_only);
            query
                .top(cutoff)
                .iter()
                .position(|document| query.is_relevant(document, rel))
                .map(|index| 1.0 / (index + 1) as f64)
                .unwrap_or(0.0)
        }
        Measure::RPrecision { rel, judged_only } => {
            let query = Query::new(judgments, ranking, judged_only);
            let num_rel = query.num_rel(rel);
            let found = query.relevant_in(query.top(Some(num_rel as u32)), rel);
            ratio(found as f64, num_rel as f64)
        }
        Measure::Ndcg {
            dcg,
            cutoff,
            judged_only,
        } => {
            let query = Query::new(judgments, ranking, judged_only);
            let actual = query
                .top(cutoff)
                .iter()
                .enumerate()
                .map(|(index, document)| {
                    discounted(gain(dcg, query.grade(document).unwrap_or(0)), index)
                })
                .sum::<f64>();

            let mut ideal_grades = judgments.values().copied().collect::<Vec<i32>>();
            ideal_grades.sort_unstable_by(|left, right| right.cmp(left));
            let depth = cutoff.map_or(ideal_grades.len(), |cutoff| {
                ideal_grades.len().min(cutoff as usize)
            });
            let ideal = ideal_grades[..depth]
                .iter()
                .enumerate()
                .map(|(index, grade)| discounted(gain(dcg, *grade), index))
                .sum::<f64>();

            ratio(actual, ideal)
        }
        Measure::InterpolatedPrecision {
            rel,
            recall,
            judged_only,
        } => {
            let query = Query::new(judgments, ranking, judged_only);
            let num_rel = query.num_rel(rel);
            if num_rel == 0 {
                return 0.0;
            }

            let mut found = 0_usize;
            let mut best = 0.0_f64;
            for (index, document) in query.ranking.iter().enumerate() {
                if query.is_relevant(document, rel) {
                    found += 1;
                }
                let precision = found as f64 / (index + 1) as f64;
                let reached = found as f64 / num_rel as f64;
                if reached >= recall {
                    best = best.max(precision);
                }
            }
            best
        }
        Measure::BinaryPreference { rel } => {
            let query = Query::new(judgments, ranking, true);
            let num_rel = query.num_rel(rel);
            let num_nonrel = judgments.len() - num_rel;
            if num_rel == 0 {
                return 0.0;
            }

            let mut nonrel_so_far = 0_usize;
            let mut score = 0.0;
            for document in &query.ranking {
                if query.is_relevant(document, rel) {
                    score += if num_nonrel == 0 {
                        1.0
                    } else {
                        1.0 - nonrel_so_far.min(num_rel) as f64
                            / num_rel.min(num_nonrel) as f64
                    };
                } else {
                    nonrel_so_far += 1;
                }
            }
            score / num_rel as f64
        }
        Measure::Judged { cutoff } => {
            let query = Query::new(judgments, ranking, false);
            let top = query.top(Some(cutoff));
            let judged = top
                .iter()
                .filter(|document| query.grade(document).is_some())
                .count();
            ratio(judged as f64, top.len() as f64)
        }
        Measure::NumQ => 1.0,
        Measure::NumRel { rel } => Query::new(judgments, ranking, false).num_rel(rel) as f64,
        Measure::NumRet { rel } => {
            let query = Query::new(judgments, ranking, false);
            match rel {
                None => query.ranking.len() as f64,
                Some(rel) => query.relevant_in(&query.ranking, rel) as f64,
            }
        }
        Measure::Accuracy { .. }
        | Measure::AlphaDcg { .. }
        | Measure::AlphaNdcg { .. }
        | Measure::IntentAwareAveragePrecision { .. }
        | Measure::BejeweledPlayerModel { .. } => 0.0,
    }
}

fn gain(dcg: DcgGain, grade: i32) -> f64 {
    if grade <= 0 {
        return 0.0;
    }
    match dcg {
        DcgGain::Log2 => f64::from(grade),
        DcgGain::ExpLog2 => 2_f64.powi(grade) - 1.0,
    }
}

fn discounted(gain: f64, index: usize) -> f64 {
    gain / ((index + 2) as f64).log2()
}
