use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, warn};

use crate::error::EvalError;
use crate::model::{RetrievalRun, RetrievalTask};

mod qrels;
mod run;
mod topics;

pub use qrels::QrelsTable;
pub use run::{RankedDocument, RunTable};
pub use topics::TopicsTable;

pub fn load_qrels(task: &RetrievalTask) -> Result<QrelsTable, EvalError> {
    let text = read_text(&task.qrels_path)?;
    let table = QrelsTable::parse(&text, &task.qrels_path)?;
    info!(
        task_id = %task.id,
        path = %task.qrels_path.display(),
        judgments = table.len(),
        queries = table.query_count(),
        "loaded qrels"
    );
    Ok(table)
}

/// Tasks without a topics file yield an empty table.
pub fn load_topics(task: &RetrievalTask) -> Result<TopicsTable, EvalError> {
    let Some(path) = task.topics_path.as_deref() else {
        return Ok(TopicsTable::default());
    };

    let text = read_text(path)?;
    let table = TopicsTable::parse(&text, path)?;
    info!(task_id = %task.id, path = %path.display(), topics = table.len(), "loaded topics");
    Ok(table)
}

pub fn load_run(run: &RetrievalRun) -> Result<RunTable, EvalError> {
    let text = read_text(&run.path)?;
    let table = RunTable::parse(&text, &run.path)?;
    info!(
        run_id = %run.id,
        path = %run.path.display(),
        rows = table.len(),
        "loaded run"
    );
    if table.is_empty() {
        warn!(run_id = %run.id, path = %run.path.display(), "run file has no rankings");
    }
    Ok(table)
}

fn read_text(path: &Path) -> Result<String, EvalError> {
    fs::read_to_string(path).map_err(|source| EvalError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Memoizes parsed tables per entity id. Entries live until explicitly invalidated.
#[derive(Debug, Default)]
pub struct DataLoader {
    qrels: Mutex<HashMap<String, Arc<QrelsTable>>>,
    topics: Mutex<HashMap<String, Arc<TopicsTable>>>,
    runs: Mutex<HashMap<String, Arc<RunTable>>>,
}

impl DataLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn qrels(&self, task: &RetrievalTask) -> Result<Arc<QrelsTable>, EvalError> {
        cached(&self.qrels, &task.id, || load_qrels(task))
    }

    pub fn topics(&self, task: &RetrievalTask) -> Result<Arc<TopicsTable>, EvalError> {
        cached(&self.topics, &task.id, || load_topics(task))
    }

    pub fn run(&self, run: &RetrievalRun) -> Result<Arc<RunTable>, EvalError> {
        cached(&self.runs, &run.cache_key(), || load_run(run))
    }

    pub fn invalidate_run(&self, run: &RetrievalRun) {
        lock(&self.runs).remove(&run.cache_key());
    }

    #[cfg(test)]
    pub fn insert_qrels(&self, task: &RetrievalTask, table: QrelsTable) {
        lock(&self.qrels).insert(task.id.clone(), Arc::new(table));
    }

    #[cfg(test)]
    pub fn insert_topics(&self, task: &RetrievalTask, table: TopicsTable) {
        lock(&self.topics).insert(task.id.clone(), Arc::new(table));
    }

    #[cfg(test)]
    pub fn insert_run(&self, run: &RetrievalRun, table: RunTable) {
        lock(&self.runs).insert(run.cache_key(), Arc::new(table));
    }
}

fn cached<T>(
    slot: &Mutex<HashMap<String, Arc<T>>>,
    key: &str,
    load: impl FnOnce() -> Result<T, EvalError>,
) -> Result<Arc<T>, EvalError> {
    if let Some(table) = lock(slot).get(key) {
        debug!(key, "table cache hit");
        return Ok(Arc::clone(table));
    }

    let table = Arc::new(load()?);
    lock(slot).insert(key.to_string(), Arc::clone(&table));
    Ok(table)
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
