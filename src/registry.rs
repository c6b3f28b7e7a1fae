use indexmap::IndexMap;

use crate::analyses::{
    Analysis, DocumentsRetrievedByAllSystems, ExperimentalEvaluation,
    OverallRetrievalCharacteristics, PositionalDistribution, PrecisionRecallCurve,
    RelevanceJudgmentsForMultipleQueries, RelevanceJudgmentsPerQuery, RelevanceRankingPositions,
    RetrievedDocumentIntersection,
};
use crate::error::EvalError;
use crate::reports::{BUILTIN_REPORTS, Report};

/// Resolves stable identifiers to analyses and reports. Built once at startup
/// and read-only afterwards.
pub struct Registry {
    analyses: IndexMap<&'static str, Box<dyn Analysis>>,
    reports: IndexMap<&'static str, Report>,
}

impl Registry {
    pub fn builtin() -> Self {
        let analyses: Vec<Box<dyn Analysis>> = vec![
            Box::new(OverallRetrievalCharacteristics),
            Box::new(ExperimentalEvaluation),
            Box::new(PositionalDistribution),
            Box::new(PrecisionRecallCurve),
            Box::new(RetrievedDocumentIntersection),
            Box::new(DocumentsRetrievedByAllSystems),
            Box::new(RelevanceJudgmentsPerQuery),
            Box::new(RelevanceJudgmentsForMultipleQueries),
            Box::new(RelevanceRankingPositions),
        ];

        Self {
            analyses: analyses
                .into_iter()
                .map(|analysis| (analysis.slug(), analysis))
                .collect(),
            reports: BUILTIN_REPORTS
                .iter()
                .map(|report| (report.slug, *report))
                .collect(),
        }
    }

    pub fn analysis(&self, slug: &str) -> Result<&dyn Analysis, EvalError> {
        self.analyses
            .get(slug)
            .map(|analysis| &**analysis)
            .ok_or_else(|| EvalError::not_found("analysis", slug))
    }

    pub fn report(&self, slug: &str) -> Result<&Report, EvalError> {
        self.reports
            .get(slug)
            .ok_or_else(|| EvalError::not_found("report", slug))
    }

    /// The report's analyses in declared order.
    pub fn report_analyses(&self, report: &Report) -> Result<Vec<&dyn Analysis>, EvalError> {
        report
            .analyses
            .iter()
            .map(|slug| self.analysis(slug))
            .collect()
    }

    pub fn analyses(&self) -> impl Iterator<Item = &dyn Analysis> {
        self.analyses.values().map(|analysis| &**analysis)
    }

    pub fn reports(&self) -> impl Iterator<Item = &Report> {
        self.reports.values()
    }
}
