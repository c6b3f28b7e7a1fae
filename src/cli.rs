use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgGroup, Args, Parser, Subcommand};
use serde_json::Value;

#[derive(Parser, Debug)]
#[command(
    name = "ir-report",
    version,
    about = "Evaluate retrieval runs against relevance judgments and build analysis reports"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a report and persist its results.
    Report(ReportArgs),
    /// Execute a single analysis without persisting it.
    Analyze(AnalyzeArgs),
    /// Compute one measure for the selected runs.
    Measure(MeasureArgs),
    /// Print the parameter form of a report or an analysis.
    Schema(SchemaArgs),
    /// List registered reports and analyses.
    List,
    /// Print the stored results of a report.
    Show(ShowArgs),
    Status(StatusArgs),
    /// Drop cached measure values and/or a stored report.
    Purge(PurgeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    #[arg(long, default_value = ".cache/ir-report")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,
}

impl StoreArgs {
    pub fn db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.cache_root.join("ir_report.sqlite"))
    }
}

#[derive(Args, Debug, Clone)]
pub struct TaskArgs {
    /// Task manifest describing the qrels, topics and runs.
    #[arg(long)]
    pub manifest: PathBuf,

    /// Restrict to these run ids (repeatable); all runs when omitted.
    #[arg(long = "run")]
    pub runs: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ParameterArgs {
    #[arg(long, conflicts_with = "parameters_json")]
    pub parameters: Option<PathBuf>,

    #[arg(long)]
    pub parameters_json: Option<String>,
}

impl ParameterArgs {
    /// Submitted parameters; `null` when none were given.
    pub fn load(&self) -> Result<Value> {
        if let Some(path) = &self.parameters {
            let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
            return serde_json::from_slice(&raw)
                .with_context(|| format!("failed to parse {}", path.display()));
        }
        if let Some(inline) = &self.parameters_json {
            return serde_json::from_str(inline).context("failed to parse --parameters-json");
        }
        Ok(Value::Null)
    }
}

#[derive(Args, Debug, Clone)]
pub struct ReportArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub task: TaskArgs,

    #[command(flatten)]
    pub parameters: ParameterArgs,

    /// Report slug, e.g. `retrieval_performance`.
    #[arg(long)]
    pub report: String,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub report_id: Option<String>,

    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub task: TaskArgs,

    #[command(flatten)]
    pub parameters: ParameterArgs,

    #[arg(long)]
    pub analysis: String,

    /// Keep measure values in memory instead of the persistent cache.
    #[arg(long, default_value_t = false)]
    pub no_cache: bool,

    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct MeasureArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub task: TaskArgs,

    /// Canonical measure name, e.g. `P(rel=1,judged_only=False)@10`.
    #[arg(long)]
    pub measure: String,

    #[arg(long, default_value_t = false)]
    pub per_query: bool,
}

#[derive(Args, Debug, Clone)]
#[command(group(ArgGroup::new("target").required(true).args(["report", "analysis"])))]
pub struct SchemaArgs {
    #[command(flatten)]
    pub task: TaskArgs,

    #[arg(long)]
    pub report: Option<String>,

    #[arg(long)]
    pub analysis: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ShowArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long)]
    pub report_id: String,

    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Args, Debug, Clone)]
#[command(group(ArgGroup::new("target").required(true).multiple(true).args(["runs", "report_id"])))]
pub struct PurgeArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Task the purged runs belong to.
    #[arg(long, requires = "runs")]
    pub task_id: Option<String>,

    #[arg(long = "run", requires = "task_id")]
    pub runs: Vec<String>,

    #[arg(long)]
    pub report_id: Option<String>,
}
