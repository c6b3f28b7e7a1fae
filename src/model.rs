use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::util::sha256_file;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetrievalTask {
    pub id: String,
    pub title: String,
    pub qrels_path: PathBuf,
    pub topics_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetrievalRun {
    pub id: String,
    pub title: String,
    pub task_id: String,
    pub path: PathBuf,
    pub sha256: String,
}

impl RetrievalRun {
    /// Key used for the measure cache; run ids are only unique within a task.
    pub fn cache_key(&self) -> String {
        run_cache_key(&self.task_id, &self.id)
    }
}

pub fn run_cache_key(task_id: &str, run_id: &str) -> String {
    format!("{task_id}/{run_id}")
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskManifest {
    pub manifest_version: u32,
    pub task: TaskManifestEntry,
    pub runs: Vec<RunManifestEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskManifestEntry {
    pub id: String,
    pub title: String,
    pub qrels: PathBuf,
    pub topics: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunManifestEntry {
    pub id: String,
    pub title: String,
    pub path: PathBuf,
}

/// One persisted analysis execution inside a report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisRecord {
    pub report_id: String,
    pub position: usize,
    pub analysis_type: String,
    pub parameters: serde_json::Value,
    pub result: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Running,
    Completed,
    Failed,
}

impl ReportStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRecord {
    pub report_id: String,
    pub report_type: String,
    pub title: String,
    pub task_id: String,
    pub run_ids: Vec<String>,
    pub status: ReportStatus,
    pub failed_analysis: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportManifest {
    pub manifest_version: u32,
    pub report: ReportRecord,
    pub results: Vec<AnalysisRecord>,
}

pub fn load_task_manifest(path: &Path) -> Result<(RetrievalTask, Vec<RetrievalRun>)> {
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let manifest: TaskManifest = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    if manifest.manifest_version != 1 {
        bail!(
            "unsupported task manifest version {} in {}",
            manifest.manifest_version,
            path.display()
        );
    }

    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let task = RetrievalTask {
        id: manifest.task.id.trim().to_string(),
        title: manifest.task.title,
        qrels_path: base_dir.join(&manifest.task.qrels),
        topics_path: manifest.task.topics.map(|topics| base_dir.join(topics)),
    };
    if task.id.is_empty() {
        bail!("task id must not be empty in {}", path.display());
    }

    let mut seen_ids = HashSet::<String>::new();
    let mut seen_titles = HashSet::<String>::new();
    let mut runs = Vec::with_capacity(manifest.runs.len());
    for entry in manifest.runs {
        let id = entry.id.trim().to_string();
        if id.is_empty() {
            bail!("run id must not be empty in {}", path.display());
        }
        if !seen_ids.insert(id.clone()) {
            bail!("duplicate run id {id} in {}", path.display());
        }
        if !seen_titles.insert(entry.title.clone()) {
            bail!("duplicate run title {} in {}", entry.title, path.display());
        }

        let run_path = base_dir.join(&entry.path);
        let sha256 = sha256_file(&run_path)?;
        runs.push(RetrievalRun {
            id,
            title: entry.title,
            task_id: task.id.clone(),
            path: run_path,
            sha256,
        });
    }

    Ok((task, runs))
}

/// Restricts `runs` to the requested ids, preserving manifest order.
pub fn select_runs(runs: Vec<RetrievalRun>, requested: &[String]) -> Result<Vec<RetrievalRun>> {
    if requested.is_empty() {
        return Ok(runs);
    }

    for id in requested {
        if !runs.iter().any(|run| &run.id == id) {
            bail!("retrieval run not found: {id}");
        }
    }

    Ok(runs
        .into_iter()
        .filter(|run| requested.contains(&run.id))
        .collect())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{ReportStatus, load_task_manifest, select_runs};

    #[test]
    fn task_manifest_resolves_paths_relative_to_manifest() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        fs::write(dir.path().join("qrels.txt"), "q1 0 d1 1\n").expect("qrels should be written");
        fs::write(dir.path().join("bm25.tsv"), "q1\tQ0\td1\t1\t1.5\tbm25\n")
            .expect("run should be written");
        fs::write(
            dir.path().join("task.json"),
            r#"{
              "manifest_version": 1,
              "task": {"id": "t1", "title": "Task", "qrels": "qrels.txt"},
              "runs": [{"id": "bm25", "title": "BM25", "path": "bm25.tsv"}]
            }"#,
        )
        .expect("manifest should be written");

        let (task, runs) =
            load_task_manifest(&dir.path().join("task.json")).expect("manifest should load");
        assert_eq!(task.qrels_path, dir.path().join("qrels.txt"));
        assert!(task.topics_path.is_none());
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].task_id, "t1");
        assert_eq!(runs[0].cache_key(), "t1/bm25");
        assert_eq!(runs[0].sha256.len(), 64);
    }

    #[test]
    fn task_manifest_rejects_duplicate_run_ids() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        fs::write(dir.path().join("run.tsv"), "").expect("run should be written");
        fs::write(
            dir.path().join("task.json"),
            r#"{
              "manifest_version": 1,
              "task": {"id": "t1", "title": "Task", "qrels": "qrels.txt"},
              "runs": [
                {"id": "a", "title": "A", "path": "run.tsv"},
                {"id": "a", "title": "B", "path": "run.tsv"}
              ]
            }"#,
        )
        .expect("manifest should be written");

        let error = load_task_manifest(&dir.path().join("task.json"))
            .expect_err("duplicate ids should be rejected");
        assert!(error.to_string().contains("duplicate run id"), "{error}");
    }

    #[test]
    fn select_runs_rejects_unknown_ids() {
        let error = select_runs(Vec::new(), &["missing".to_string()])
            .expect_err("unknown run should be rejected");
        assert!(error.to_string().contains("missing"));
    }

    #[test]
    fn report_status_round_trips_through_strings() {
        for status in [
            ReportStatus::Running,
            ReportStatus::Completed,
            ReportStatus::Failed,
        ] {
            assert_eq!(ReportStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ReportStatus::parse("unknown"), None);
    }
}
