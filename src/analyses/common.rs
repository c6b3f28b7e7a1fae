use std::sync::Arc;

use super::{AnalysisContext, Choice, FieldSpec};
use crate::data::QrelsTable;
use crate::error::EvalError;
use crate::model::{RetrievalRun, RetrievalTask};

pub const RELEVANCE_THRESHOLD: &str = "relevance_threshold";
pub const BASELINE_RUN: &str = "baseline_run";
pub const CUTOFF: &str = "cutoff";

#[derive(Debug, Clone, Copy)]
pub enum ThresholdDefault {
    Lowest,
    Highest,
}

/// `1..=max grade`; collapsed and disabled when the task has a single
/// relevant grade.
pub fn relevance_threshold_field(qrels: &QrelsTable, default: ThresholdDefault) -> FieldSpec {
    let max = i64::from(qrels.max_relevance().unwrap_or(1).max(1));
    let initial = match default {
        ThresholdDefault::Lowest => 1,
        ThresholdDefault::Highest => max,
    };
    FieldSpec::integer(RELEVANCE_THRESHOLD, "Relevance threshold", Some(1), Some(max))
        .with_initial(initial)
        .disabled(max == 1)
}

pub fn baseline_run_field(runs: &[RetrievalRun]) -> FieldSpec {
    FieldSpec::choice(
        BASELINE_RUN,
        "Baseline run",
        runs.iter()
            .map(|run| Choice {
                value: run.id.clone(),
                label: run.title.clone(),
            })
            .collect(),
    )
}

pub fn require_runs(runs: &[RetrievalRun]) -> Result<(), EvalError> {
    if runs.is_empty() {
        return Err(EvalError::InsufficientData(
            "at least one retrieval run is required".to_string(),
        ));
    }
    Ok(())
}

/// Loads the task's qrels and rejects an empty judgment set.
pub fn judged_qrels(
    ctx: &AnalysisContext<'_>,
    task: &RetrievalTask,
) -> Result<Arc<QrelsTable>, EvalError> {
    let qrels = ctx.loader.qrels(task)?;
    if qrels.is_empty() {
        return Err(EvalError::InsufficientData(format!(
            "task {} has no relevance judgments",
            task.id
        )));
    }
    Ok(qrels)
}

pub fn find_run<'r>(runs: &'r [RetrievalRun], id: &str) -> Result<&'r RetrievalRun, EvalError> {
    runs.iter()
        .find(|run| run.id == id)
        .ok_or_else(|| EvalError::invalid(BASELINE_RUN, format!("{id} is not a selected run")))
}

pub fn threshold(value: i64) -> Result<i32, EvalError> {
    i32::try_from(value)
        .map_err(|_| EvalError::invalid(RELEVANCE_THRESHOLD, "value out of range"))
}

pub fn cutoff(value: i64) -> Result<u32, EvalError> {
    u32::try_from(value).map_err(|_| EvalError::invalid(CUTOFF, "value out of range"))
}

pub fn grade_label(grade: i32) -> String {
    if grade == 0 {
        "Irrelevant_Document".to_string()
    } else {
        format!("Relevance_Label_{grade}")
    }
}

/// Linear blend between two RGB colors, `t` in `[0, 1]`.
pub fn blend(from: (u8, u8, u8), to: (u8, u8, u8), t: f64) -> String {
    let mix = |a: u8, b: u8| {
        let value = f64::from(a) + (f64::from(b) - f64::from(a)) * t.clamp(0.0, 1.0);
        value.round() as u8
    };
    format!(
        "#{:02x}{:02x}{:02x}",
        mix(from.0, to.0),
        mix(from.1, to.1),
        mix(from.2, to.2)
    )
}
