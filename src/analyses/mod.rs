use serde_json::Value;

use crate::data::DataLoader;
use crate::error::EvalError;
use crate::measures::MeasureCalculator;
use crate::model::{RetrievalRun, RetrievalTask};
use crate::results::AnalysisOutput;

mod common;
mod documents_retrieved_by_all_systems;
mod experimental_evaluation;
mod overall_retrieval_characteristics;
mod params;
mod positional_distribution;
mod precision_recall_curve;
mod relevance_judgments_for_multiple_queries;
mod relevance_judgments_per_query;
mod relevance_ranking_positions;
mod retrieved_document_intersection;
#[cfg(test)]
mod tests;

pub use documents_retrieved_by_all_systems::DocumentsRetrievedByAllSystems;
pub use experimental_evaluation::ExperimentalEvaluation;
pub use overall_retrieval_characteristics::OverallRetrievalCharacteristics;
pub use params::{Choice, FieldSpec, ParameterSchema, Parameters};
pub use positional_distribution::PositionalDistribution;
pub use precision_recall_curve::PrecisionRecallCurve;
pub use relevance_judgments_for_multiple_queries::RelevanceJudgmentsForMultipleQueries;
pub use relevance_judgments_per_query::RelevanceJudgmentsPerQuery;
pub use relevance_ranking_positions::RelevanceRankingPositions;
pub use retrieved_document_intersection::RetrievedDocumentIntersection;

/// Shared collaborators handed to every analysis.
#[derive(Clone, Copy)]
pub struct AnalysisContext<'a> {
    pub loader: &'a DataLoader,
    pub measures: MeasureCalculator<'a>,
}

impl<'a> AnalysisContext<'a> {
    pub fn new(measures: MeasureCalculator<'a>) -> Self {
        Self {
            loader: measures.loader(),
            measures,
        }
    }
}

/// A self-contained computation over one task and a selection of its runs.
///
/// Implementations hold no state; identical inputs and parameters produce
/// identical outputs.
pub trait Analysis: Send + Sync {
    /// Stable identifier used by the registry and as the parameter prefix.
    fn slug(&self) -> &'static str;

    fn name(&self) -> &'static str;

    /// Parameter form for `task`; bounds and choices may depend on its data.
    fn schema(
        &self,
        ctx: &AnalysisContext<'_>,
        task: &RetrievalTask,
        runs: &[RetrievalRun],
    ) -> Result<ParameterSchema, EvalError>;

    fn execute(
        &self,
        ctx: &AnalysisContext<'_>,
        task: &RetrievalTask,
        runs: &[RetrievalRun],
        parameters: &Parameters,
    ) -> Result<AnalysisOutput, EvalError>;

    /// Whether the analysis reads run files. Judgment-only analyses return false.
    fn uses_runs(&self) -> bool {
        true
    }

    /// Rejects an empty run selection before the form is built.
    fn validate(
        &self,
        ctx: &AnalysisContext<'_>,
        task: &RetrievalTask,
        runs: &[RetrievalRun],
        submitted: &Value,
    ) -> Result<Parameters, EvalError> {
        if self.uses_runs() {
            common::require_runs(runs)?;
        }
        self.schema(ctx, task, runs)?
            .validate(submitted)
            .map_err(EvalError::Validation)
    }
}
