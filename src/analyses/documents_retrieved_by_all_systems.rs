use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use super::common::{CUTOFF, cutoff, require_runs};
use super::{Analysis, AnalysisContext, FieldSpec, ParameterSchema, Parameters};
use crate::data::RunTable;
use crate::error::EvalError;
use crate::model::{RetrievalRun, RetrievalTask};
use crate::results::{AnalysisOutput, Scalar};
use crate::util::sort_query_ids;

const SAMPLE_SIZE: &str = "sample_size";

/// Documents that every selected run places within the cutoff for the same query.
pub struct DocumentsRetrievedByAllSystems;

impl Analysis for DocumentsRetrievedByAllSystems {
    fn slug(&self) -> &'static str {
        "documents_retrieved_by_all_systems"
    }

    fn name(&self) -> &'static str {
        "Documents Retrieved By All Systems"
    }

    fn schema(
        &self,
        _ctx: &AnalysisContext<'_>,
        _task: &RetrievalTask,
        _runs: &[RetrievalRun],
    ) -> Result<ParameterSchema, EvalError> {
        Ok(ParameterSchema::new()
            .field(FieldSpec::integer(CUTOFF, "Cutoff value", Some(1), Some(1000)).with_initial(1))
            .field(
                FieldSpec::integer(
                    SAMPLE_SIZE,
                    "Size of the retrieved documents sample",
                    Some(1),
                    Some(10),
                )
                .with_initial(10),
            ))
    }

    fn execute(
        &self,
        ctx: &AnalysisContext<'_>,
        _task: &RetrievalTask,
        runs: &[RetrievalRun],
        parameters: &Parameters,
    ) -> Result<AnalysisOutput, EvalError> {
        require_runs(runs)?;
        let cutoff = cutoff(parameters.integer(CUTOFF)?)?;
        let sample_size = usize::try_from(parameters.integer(SAMPLE_SIZE)?)
            .map_err(|_| EvalError::invalid(SAMPLE_SIZE, "value out of range"))?;

        let tables = runs
            .iter()
            .map(|run| ctx.loader.run(run))
            .collect::<Result<Vec<Arc<RunTable>>, EvalError>>()?;
        let all_queries = tables
            .iter()
            .flat_map(|table| table.query_ids())
            .collect::<BTreeSet<&str>>();

        let mut common_queries = Vec::new();
        let mut frequency = HashMap::<&str, usize>::new();
        for query_id in all_queries {
            let Some(common) = common_documents(&tables, query_id, cutoff) else {
                continue;
            };
            common_queries.push(query_id);
            for doc_id in common {
                *frequency.entry(doc_id).or_default() += 1;
            }
        }
        sort_query_ids(&mut common_queries);

        let mut sample = frequency.into_iter().collect::<Vec<(&str, usize)>>();
        sample.sort_by(|left, right| right.1.cmp(&left.1).then_with(|| left.0.cmp(right.0)));
        sample.truncate(sample_size);

        Ok(AnalysisOutput::composite()
            .with("Number of common queries", Scalar::from(common_queries.len()))
            .with(
                "Queries with documents retrieved by all systems",
                Scalar::from(common_queries.join(", ")),
            )
            .with(
                "Sample of documents retrieved by all systems",
                Scalar::from(
                    sample
                        .iter()
                        .map(|(doc_id, _)| *doc_id)
                        .collect::<Vec<&str>>()
                        .join(", "),
                ),
            )
            .into())
    }
}

/// `None` when no document is shared by every run's top `cutoff` for the query.
fn common_documents<'t>(
    tables: &'t [Arc<RunTable>],
    query_id: &str,
    cutoff: u32,
) -> Option<HashSet<&'t str>> {
    let (first, rest) = tables.split_first()?;
    let mut common = first.top_documents(query_id, cutoff);
    for table in rest {
        let retrieved = table.top_documents(query_id, cutoff);
        common.retain(|doc_id| retrieved.contains(doc_id));
    }
    (!common.is_empty()).then_some(common)
}
