use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use tracing::debug;

use crate::error::EvalError;
use crate::measures::{CachedMeasure, MeasureCache};
use crate::model::{AnalysisRecord, ReportRecord, ReportStatus};
use crate::orchestrator::ResultSink;
use crate::util::now_utc_string;

const DB_SCHEMA_VERSION: &str = "1";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub reports: i64,
    pub analysis_results: i64,
    pub measure_values: i64,
}

/// SQLite persistence for reports, analysis results and cached measure values.
pub struct SqliteStore {
    connection: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, EvalError> {
        let connection = Connection::open(path)?;
        connection.pragma_update(None, "journal_mode", "WAL")?;
        connection.pragma_update(None, "synchronous", "NORMAL")?;
        Self::with_connection(connection)
    }

    pub fn open_in_memory() -> Result<Self, EvalError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(connection: Connection) -> Result<Self, EvalError> {
        ensure_schema(&connection)?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn report(&self, report_id: &str) -> Result<ReportRecord, EvalError> {
        let connection = self.lock();
        let record = connection
            .query_row(
                "
                SELECT report_id, report_type, title, task_id, run_ids, status,
                       failed_analysis, failure_reason, created_at, updated_at
                FROM reports
                WHERE report_id = ?1
                ",
                [report_id],
                read_report_row,
            )
            .optional()?;
        record
            .ok_or_else(|| EvalError::not_found("report", report_id))?
    }

    /// Most recent first.
    pub fn reports(&self) -> Result<Vec<ReportRecord>, EvalError> {
        let connection = self.lock();
        let mut statement = connection.prepare(
            "
            SELECT report_id, report_type, title, task_id, run_ids, status,
                   failed_analysis, failure_reason, created_at, updated_at
            FROM reports
            ORDER BY created_at DESC, report_id ASC
            ",
        )?;
        let rows = statement.query_map([], read_report_row)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row??);
        }
        Ok(out)
    }

    /// Results of one report in execution order.
    pub fn analysis_results(&self, report_id: &str) -> Result<Vec<AnalysisRecord>, EvalError> {
        let connection = self.lock();
        let mut statement = connection.prepare(
            "
            SELECT report_id, position, analysis_type, parameters, result, created_at
            FROM analysis_results
            WHERE report_id = ?1
            ORDER BY position ASC
            ",
        )?;
        let mut rows = statement.query([report_id])?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let position: i64 = row.get(1)?;
            let parameters: String = row.get(3)?;
            let result: String = row.get(4)?;
            let created_at: DateTime<Utc> = row.get(5)?;
            out.push(AnalysisRecord {
                report_id: row.get(0)?,
                position: usize::try_from(position).unwrap_or_default(),
                analysis_type: row.get(2)?,
                parameters: serde_json::from_str(&parameters)?,
                result: serde_json::from_str(&result)?,
                created_at,
            });
        }
        Ok(out)
    }

    pub fn counts(&self) -> Result<StoreCounts, EvalError> {
        let connection = self.lock();
        let count = |sql: &str| connection.query_row(sql, [], |row| row.get::<_, i64>(0));
        Ok(StoreCounts {
            reports: count("SELECT COUNT(*) FROM reports")?,
            analysis_results: count("SELECT COUNT(*) FROM analysis_results")?,
            measure_values: count("SELECT COUNT(*) FROM measure_values")?,
        })
    }

    /// Drops every cached measure of a run. Returns the number of values removed.
    pub fn purge_run_measures(&self, run_key: &str) -> Result<usize, EvalError> {
        let removed = self
            .lock()
            .execute("DELETE FROM measure_values WHERE run_id = ?1", [run_key])?;
        debug!(run = run_key, removed, "purged cached measures");
        Ok(removed)
    }

    /// Deletes a report and its analysis results. Returns the number of results removed.
    pub fn delete_report(&self, report_id: &str) -> Result<usize, EvalError> {
        let mut connection = self.lock();
        let tx = connection.transaction()?;
        let results = tx.execute(
            "DELETE FROM analysis_results WHERE report_id = ?1",
            [report_id],
        )?;
        let reports = tx.execute("DELETE FROM reports WHERE report_id = ?1", [report_id])?;
        if reports == 0 {
            return Err(EvalError::not_found("report", report_id));
        }
        tx.commit()?;
        Ok(results)
    }
}

fn ensure_schema(connection: &Connection) -> Result<(), EvalError> {
    connection.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS reports (
          report_id TEXT PRIMARY KEY,
          report_type TEXT NOT NULL,
          title TEXT NOT NULL,
          task_id TEXT NOT NULL,
          run_ids TEXT NOT NULL,
          status TEXT NOT NULL,
          failed_analysis TEXT,
          failure_reason TEXT,
          created_at TEXT NOT NULL,
          updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS analysis_results (
          report_id TEXT NOT NULL,
          position INTEGER NOT NULL,
          analysis_type TEXT NOT NULL,
          parameters TEXT NOT NULL,
          result TEXT NOT NULL,
          created_at TEXT NOT NULL,
          PRIMARY KEY (report_id, position),
          FOREIGN KEY (report_id) REFERENCES reports(report_id)
        );

        CREATE TABLE IF NOT EXISTS measure_values (
          run_id TEXT NOT NULL,
          measure_name TEXT NOT NULL,
          run_sha256 TEXT NOT NULL,
          value REAL NOT NULL,
          computed_at TEXT NOT NULL,
          PRIMARY KEY (run_id, measure_name)
        );

        CREATE INDEX IF NOT EXISTS idx_reports_task ON reports(task_id);
        CREATE INDEX IF NOT EXISTS idx_measure_values_run ON measure_values(run_id);
        ",
    )?;

    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [DB_SCHEMA_VERSION],
    )?;
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_updated_at', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [now_utc_string()],
    )?;
    Ok(())
}

/// Decoding failures of the JSON and status columns surface as the inner error.
fn read_report_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<ReportRecord, EvalError>> {
    let run_ids: String = row.get(4)?;
    let status: String = row.get(5)?;
    let run_ids = match serde_json::from_str::<Vec<String>>(&run_ids) {
        Ok(run_ids) => run_ids,
        Err(error) => return Ok(Err(EvalError::Serialization(error))),
    };
    let Some(status) = ReportStatus::parse(&status) else {
        return Ok(Err(EvalError::MalformedResult(format!(
            "unknown report status {status}"
        ))));
    };

    Ok(Ok(ReportRecord {
        report_id: row.get(0)?,
        report_type: row.get(1)?,
        title: row.get(2)?,
        task_id: row.get(3)?,
        run_ids,
        status,
        failed_analysis: row.get(6)?,
        failure_reason: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    }))
}

impl MeasureCache for SqliteStore {
    fn get_cached_measure(
        &self,
        run_key: &str,
        measure_name: &str,
    ) -> Result<Option<CachedMeasure>, EvalError> {
        let cached = self
            .lock()
            .query_row(
                "SELECT value, run_sha256 FROM measure_values WHERE run_id = ?1 AND measure_name = ?2",
                [run_key, measure_name],
                |row| {
                    Ok(CachedMeasure {
                        value: row.get(0)?,
                        run_sha256: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(cached)
    }

    fn put_cached_measure(
        &self,
        run_key: &str,
        measure_name: &str,
        run_sha256: &str,
        value: f64,
    ) -> Result<(), EvalError> {
        self.lock().execute(
            "
            INSERT INTO measure_values(run_id, measure_name, run_sha256, value, computed_at)
            VALUES(?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(run_id, measure_name) DO UPDATE SET
              run_sha256=excluded.run_sha256,
              value=excluded.value,
              computed_at=excluded.computed_at
            ",
            params![run_key, measure_name, run_sha256, value, Utc::now()],
        )?;
        Ok(())
    }
}

impl ResultSink for SqliteStore {
    fn create_report(&self, record: &ReportRecord) -> Result<(), EvalError> {
        let run_ids = serde_json::to_string(&record.run_ids)?;
        self.lock().execute(
            "
            INSERT INTO reports(report_id, report_type, title, task_id, run_ids, status,
                                failed_analysis, failure_reason, created_at, updated_at)
            VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ",
            params![
                record.report_id,
                record.report_type,
                record.title,
                record.task_id,
                run_ids,
                record.status.as_str(),
                record.failed_analysis,
                record.failure_reason,
                record.created_at,
                record.updated_at,
            ],
        )?;
        Ok(())
    }

    fn save_analysis_result(&self, record: &AnalysisRecord) -> Result<(), EvalError> {
        let parameters = serde_json::to_string(&record.parameters)?;
        let result = serde_json::to_string(&record.result)?;
        self.lock().execute(
            "
            INSERT INTO analysis_results(report_id, position, analysis_type, parameters, result, created_at)
            VALUES(?1, ?2, ?3, ?4, ?5, ?6)
            ",
            params![
                record.report_id,
                record.position as i64,
                record.analysis_type,
                parameters,
                result,
                record.created_at,
            ],
        )?;
        Ok(())
    }

    fn set_report_status(
        &self,
        report_id: &str,
        status: ReportStatus,
        failed_analysis: Option<&str>,
        failure_reason: Option<&str>,
    ) -> Result<(), EvalError> {
        let updated = self.lock().execute(
            "
            UPDATE reports
            SET status = ?2, failed_analysis = ?3, failure_reason = ?4, updated_at = ?5
            WHERE report_id = ?1
            ",
            params![
                report_id,
                status.as_str(),
                failed_analysis,
                failure_reason,
                Utc::now()
            ],
        )?;
        if updated == 0 {
            return Err(EvalError::not_found("report", report_id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::json;

    use super::SqliteStore;
    use crate::error::EvalError;
    use crate::measures::MeasureCache;
    use crate::model::{AnalysisRecord, ReportRecord, ReportStatus};
    use crate::orchestrator::ResultSink;

    fn created() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
            .single()
            .expect("timestamp should be valid")
    }

    fn report(report_id: &str) -> ReportRecord {
        ReportRecord {
            report_id: report_id.to_string(),
            report_type: "query_based_analysis".to_string(),
            title: "Report".to_string(),
            task_id: "t1".to_string(),
            run_ids: vec!["a".to_string(), "b".to_string()],
            status: ReportStatus::Running,
            failed_analysis: None,
            failure_reason: None,
            created_at: created(),
            updated_at: created(),
        }
    }

    #[test]
    fn measure_values_are_upserted() {
        let store = SqliteStore::open_in_memory().expect("store should open");
        assert!(
            store
                .get_cached_measure("t1/a", "P@10")
                .expect("lookup should succeed")
                .is_none()
        );

        store
            .put_cached_measure("t1/a", "P@10", "sha-1", 0.25)
            .expect("first write should succeed");
        store
            .put_cached_measure("t1/a", "P@10", "sha-2", 0.5)
            .expect("second write should succeed");

        let cached = store
            .get_cached_measure("t1/a", "P@10")
            .expect("lookup should succeed")
            .expect("value should be cached");
        assert_eq!(cached.value, 0.5);
        assert_eq!(cached.run_sha256, "sha-2");
        assert_eq!(store.counts().expect("counts should load").measure_values, 1);
    }

    #[test]
    fn purging_a_run_removes_only_its_measures() {
        let store = SqliteStore::open_in_memory().expect("store should open");
        for (run, measure) in [("t1/a", "P@10"), ("t1/a", "NumQ"), ("t1/b", "P@10")] {
            store
                .put_cached_measure(run, measure, "sha", 1.0)
                .expect("write should succeed");
        }

        assert_eq!(store.purge_run_measures("t1/a").expect("purge should succeed"), 2);
        assert!(
            store
                .get_cached_measure("t1/b", "P@10")
                .expect("lookup should succeed")
                .is_some()
        );
    }

    #[test]
    fn reports_and_results_round_trip() {
        let store = SqliteStore::open_in_memory().expect("store should open");
        store.create_report(&report("r1")).expect("report should be created");
        let created_at = Utc::now();
        for position in 0..2 {
            store
                .save_analysis_result(&AnalysisRecord {
                    report_id: "r1".to_string(),
                    position,
                    analysis_type: format!("analysis_{position}"),
                    parameters: json!({ "cutoff": 10 }),
                    result: json!({ "type": "value", "value": position }),
                    created_at,
                })
                .expect("result should be saved");
        }
        store
            .set_report_status("r1", ReportStatus::Failed, Some("analysis_1"), Some("boom"))
            .expect("status should update");

        let stored = store.report("r1").expect("report should load");
        assert_eq!(stored.status, ReportStatus::Failed);
        assert_eq!(stored.run_ids, vec!["a", "b"]);
        assert_eq!(stored.failed_analysis.as_deref(), Some("analysis_1"));
        assert_eq!(stored.failure_reason.as_deref(), Some("boom"));
        assert_eq!(stored.created_at, created());
        assert!(stored.updated_at > stored.created_at);

        let results = store.analysis_results("r1").expect("results should load");
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].analysis_type, "analysis_1");
        assert_eq!(results[1].result, json!({ "type": "value", "value": 1 }));
        assert_eq!(results[0].created_at.timestamp(), created_at.timestamp());
        assert_eq!(store.reports().expect("reports should list").len(), 1);
    }

    #[test]
    fn deleting_a_report_removes_its_results() {
        let store = SqliteStore::open_in_memory().expect("store should open");
        store.create_report(&report("r1")).expect("report should be created");
        store
            .save_analysis_result(&AnalysisRecord {
                report_id: "r1".to_string(),
                position: 0,
                analysis_type: "overall_retrieval_characteristics".to_string(),
                parameters: json!({}),
                result: json!({ "type": "value", "value": null }),
                created_at: Utc::now(),
            })
            .expect("result should be saved");

        assert_eq!(store.delete_report("r1").expect("delete should succeed"), 1);
        let counts = store.counts().expect("counts should load");
        assert_eq!(counts.reports, 0);
        assert_eq!(counts.analysis_results, 0);

        let error = store.report("r1").expect_err("deleted report should be gone");
        assert!(matches!(error, EvalError::NotFound { .. }), "{error:?}");
        let error = store
            .delete_report("r1")
            .expect_err("deleting twice should fail");
        assert_eq!(error.kind(), "not_found");
    }

    #[test]
    fn status_updates_require_an_existing_report() {
        let store = SqliteStore::open_in_memory().expect("store should open");
        let error = store
            .set_report_status("missing", ReportStatus::Completed, None, None)
            .expect_err("unknown report should be rejected");
        assert_eq!(error.kind(), "not_found");
    }
}
