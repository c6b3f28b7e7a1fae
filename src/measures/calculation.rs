use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};

use super::{EvaluationBackend, Measure};
use crate::data::DataLoader;
use crate::error::EvalError;
use crate::model::{RetrievalRun, RetrievalTask};

#[derive(Debug, Clone, PartialEq)]
pub struct CachedMeasure {
    pub value: f64,
    /// Fingerprint of the run file the value was computed from.
    pub run_sha256: String,
}

/// Keyed storage for aggregate measure values. Writes are upserts.
pub trait MeasureCache: Send + Sync {
    fn get_cached_measure(
        &self,
        run_key: &str,
        measure_name: &str,
    ) -> Result<Option<CachedMeasure>, EvalError>;

    fn put_cached_measure(
        &self,
        run_key: &str,
        measure_name: &str,
        run_sha256: &str,
        value: f64,
    ) -> Result<(), EvalError>;
}

#[derive(Debug, Default)]
pub struct InMemoryMeasureCache {
    values: Mutex<HashMap<(String, String), CachedMeasure>>,
}

impl InMemoryMeasureCache {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MeasureCache for InMemoryMeasureCache {
    fn get_cached_measure(
        &self,
        run_key: &str,
        measure_name: &str,
    ) -> Result<Option<CachedMeasure>, EvalError> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values
            .get(&(run_key.to_string(), measure_name.to_string()))
            .cloned())
    }

    fn put_cached_measure(
        &self,
        run_key: &str,
        measure_name: &str,
        run_sha256: &str,
        value: f64,
    ) -> Result<(), EvalError> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                (run_key.to_string(), measure_name.to_string()),
                CachedMeasure {
                    value,
                    run_sha256: run_sha256.to_string(),
                },
            );
        Ok(())
    }
}

/// Computes measure values for runs, memoizing aggregates in a [`MeasureCache`].
#[derive(Clone, Copy)]
pub struct MeasureCalculator<'a> {
    loader: &'a DataLoader,
    backend: &'a dyn EvaluationBackend,
    cache: &'a dyn MeasureCache,
}

impl<'a> MeasureCalculator<'a> {
    pub fn new(
        loader: &'a DataLoader,
        backend: &'a dyn EvaluationBackend,
        cache: &'a dyn MeasureCache,
    ) -> Self {
        Self {
            loader,
            backend,
            cache,
        }
    }

    pub fn loader(&self) -> &'a DataLoader {
        self.loader
    }

    /// Aggregate value over all evaluated queries, computed at most once per
    /// run content and measure.
    pub fn aggregate(
        &self,
        task: &RetrievalTask,
        run: &RetrievalRun,
        measure: &Measure,
    ) -> Result<f64, EvalError> {
        let measure_name = measure.canonical_name();
        let run_key = run.cache_key();

        if let Some(cached) = self.cache.get_cached_measure(&run_key, &measure_name)? {
            if cached.run_sha256 == run.sha256 {
                debug!(run = %run_key, measure = %measure_name, "measure cache hit");
                return Ok(cached.value);
            }
            warn!(
                run = %run_key,
                measure = %measure_name,
                cached_sha256 = %cached.run_sha256,
                current_sha256 = %run.sha256,
                "run content changed since measure was cached; recomputing"
            );
            self.loader.invalidate_run(run);
        } else {
            debug!(run = %run_key, measure = %measure_name, "measure cache miss");
        }

        let qrels = self.loader.qrels(task)?;
        let table = self.loader.run(run)?;
        let value = self.backend.aggregate(measure, &qrels, &table)?;
        self.cache
            .put_cached_measure(&run_key, &measure_name, &run.sha256, value)?;
        Ok(value)
    }

    /// Per-query values. Never cached.
    pub fn per_query(
        &self,
        task: &RetrievalTask,
        run: &RetrievalRun,
        measure: &Measure,
    ) -> Result<BTreeMap<String, f64>, EvalError> {
        let qrels = self.loader.qrels(task)?;
        let table = self.loader.run(run)?;
        self.backend.per_query(measure, &qrels, &table)
    }
}
