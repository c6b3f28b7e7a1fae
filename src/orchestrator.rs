use std::time::Instant;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{error, info, warn};

use crate::analyses::{Analysis, AnalysisContext, Parameters};
use crate::error::{EvalError, FieldErrors};
use crate::model::{AnalysisRecord, ReportRecord, ReportStatus, RetrievalRun, RetrievalTask};
use crate::registry::Registry;
use crate::reports::Report;
use crate::results::AnalysisOutput;

/// Persists report records and analysis results as they are produced.
pub trait ResultSink: Send + Sync {
    fn create_report(&self, record: &ReportRecord) -> Result<(), EvalError>;

    fn save_analysis_result(&self, record: &AnalysisRecord) -> Result<(), EvalError>;

    fn set_report_status(
        &self,
        report_id: &str,
        status: ReportStatus,
        failed_analysis: Option<&str>,
        failure_reason: Option<&str>,
    ) -> Result<(), EvalError>;
}

/// Receives progress events for one report, strictly in report order.
pub trait ProgressNotifier: Send + Sync {
    fn notify(&self, report_id: &str, completed: usize, total: usize);

    fn notify_complete(&self, report_id: &str, total: usize);

    fn notify_error(&self, report_id: &str, analysis: &str, error: &EvalError);
}

/// Emits progress as structured log events.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl ProgressNotifier for LogNotifier {
    fn notify(&self, report_id: &str, completed: usize, total: usize) {
        info!(report_id, completed, total, "report progress");
    }

    fn notify_complete(&self, report_id: &str, total: usize) {
        info!(report_id, total, "report completed");
    }

    fn notify_error(&self, report_id: &str, analysis: &str, error: &EvalError) {
        error!(report_id, analysis, kind = error.kind(), error = %error, "report failed");
    }
}

pub struct ReportRequest<'r> {
    pub report_id: String,
    pub title: String,
    pub task: &'r RetrievalTask,
    pub runs: &'r [RetrievalRun],
    /// `{ "<analysis slug>": { "<field>": value } }`; missing entries use defaults.
    pub parameters: &'r Value,
}

#[derive(Debug)]
pub struct ReportOutcome {
    pub record: ReportRecord,
    pub results: Vec<AnalysisRecord>,
}

/// Runs reports: validates every analysis up front, then executes them in
/// declared order, persisting each result and reporting progress.
pub struct Orchestrator<'a> {
    registry: &'a Registry,
    ctx: AnalysisContext<'a>,
    sink: &'a dyn ResultSink,
    notifier: &'a dyn ProgressNotifier,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        registry: &'a Registry,
        ctx: AnalysisContext<'a>,
        sink: &'a dyn ResultSink,
        notifier: &'a dyn ProgressNotifier,
    ) -> Self {
        Self {
            registry,
            ctx,
            sink,
            notifier,
        }
    }

    /// Validates the parameters of every analysis of `report`. Field errors
    /// are collected across analyses and named `<analysis slug>.<field>`.
    pub fn validate_report(
        &self,
        report: &Report,
        task: &RetrievalTask,
        runs: &[RetrievalRun],
        submitted: &Value,
    ) -> Result<Vec<(&'a dyn Analysis, Parameters)>, EvalError> {
        let empty = Map::new();
        let by_analysis = match submitted {
            Value::Null => &empty,
            Value::Object(object) => object,
            _ => return Err(EvalError::invalid("parameters", "must be a JSON object")),
        };

        let mut errors = FieldErrors::new();
        for key in by_analysis.keys() {
            if !report.analyses.iter().any(|slug| *slug == key.as_str()) {
                errors.add(key.clone(), "not an analysis of this report");
            }
        }

        let mut validated = Vec::with_capacity(report.analyses.len());
        for analysis in self.registry.report_analyses(report)? {
            let submitted = by_analysis.get(analysis.slug()).unwrap_or(&Value::Null);
            match analysis.validate(&self.ctx, task, runs, submitted) {
                Ok(parameters) => validated.push((analysis, parameters)),
                Err(EvalError::Validation(fields)) => {
                    errors.extend_prefixed(analysis.slug(), fields);
                }
                Err(other) => return Err(other),
            }
        }

        errors.into_result()?;
        Ok(validated)
    }

    pub fn run_report(
        &self,
        report_slug: &str,
        request: &ReportRequest<'_>,
    ) -> Result<ReportOutcome, EvalError> {
        let report = self.registry.report(report_slug)?;
        let validated = self.validate_report(report, request.task, request.runs, request.parameters)?;
        let total = validated.len();

        let now = Utc::now();
        let mut record = ReportRecord {
            report_id: request.report_id.clone(),
            report_type: report.slug.to_string(),
            title: request.title.clone(),
            task_id: request.task.id.clone(),
            run_ids: request.runs.iter().map(|run| run.id.clone()).collect(),
            status: ReportStatus::Running,
            failed_analysis: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        };
        if let Err(err) = self.sink.create_report(&record) {
            self.notifier
                .notify_error(&record.report_id, report.slug, &err);
            return Err(err);
        }
        info!(
            report_id = %record.report_id,
            report = report.slug,
            task_id = %record.task_id,
            runs = record.run_ids.len(),
            analyses = total,
            "report started"
        );

        let mut results = Vec::with_capacity(total);
        for (position, (analysis, parameters)) in validated.into_iter().enumerate() {
            let started = Instant::now();
            info!(report_id = %record.report_id, analysis = analysis.slug(), position, "analysis started");

            let stored = analysis
                .execute(&self.ctx, request.task, request.runs, &parameters)
                .and_then(|output| {
                    let result = AnalysisRecord {
                        report_id: record.report_id.clone(),
                        position,
                        analysis_type: analysis.slug().to_string(),
                        parameters: parameters.to_json(),
                        result: output.to_json(),
                        created_at: Utc::now(),
                    };
                    self.sink.save_analysis_result(&result)?;
                    Ok(result)
                });
            match stored {
                Ok(result) => results.push(result),
                Err(err) => return Err(self.fail(&record.report_id, analysis.slug(), err)),
            }

            info!(
                report_id = %record.report_id,
                analysis = analysis.slug(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "analysis completed"
            );
            self.notifier.notify(&record.report_id, position + 1, total);
        }

        if let Err(err) =
            self.sink
                .set_report_status(&record.report_id, ReportStatus::Completed, None, None)
        {
            return Err(self.fail(&record.report_id, report.slug, err));
        }
        self.notifier.notify_complete(&record.report_id, total);
        record.status = ReportStatus::Completed;
        record.updated_at = Utc::now();

        Ok(ReportOutcome { record, results })
    }

    /// Emits `err` on the error channel and marks the report failed at `step`.
    /// The status update is best effort; the original error is returned.
    fn fail(&self, report_id: &str, step: &str, err: EvalError) -> EvalError {
        self.notifier.notify_error(report_id, step, &err);
        if let Err(status_err) = self.sink.set_report_status(
            report_id,
            ReportStatus::Failed,
            Some(step),
            Some(&err.to_string()),
        ) {
            warn!(report_id, step, error = %status_err, "could not mark report as failed");
        }
        EvalError::AnalysisFailed {
            analysis: step.to_string(),
            source: Box::new(err),
        }
    }

    /// Validates and executes a single analysis without persisting anything.
    pub fn run_analysis(
        &self,
        slug: &str,
        task: &RetrievalTask,
        runs: &[RetrievalRun],
        submitted: &Value,
    ) -> Result<(Parameters, AnalysisOutput), EvalError> {
        let analysis = self.registry.analysis(slug)?;
        let parameters = analysis.validate(&self.ctx, task, runs, submitted)?;
        let started = Instant::now();
        let output = analysis.execute(&self.ctx, task, runs, &parameters)?;
        info!(
            analysis = slug,
            task_id = %task.id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "analysis completed"
        );
        Ok((parameters, output))
    }
}
