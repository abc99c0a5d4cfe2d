use crate::errors::{AppError, AppResult};
use crate::formatter::format_number;
use crate::models::{
    DateWindow, GroupBy, JobAggregate, JobCount, MetricRecord, NewMetricRecord, QueueAggregate, SortBy, TrendEntry,
};
use crate::tracker::MetricSink;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const SCHEMA_SQL: &str = include_str!("schema.sql");
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const RECORD_COLUMNS: &str = "id, job, queue, duration_ms, memory_mb, created_at, updated_at";

#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl Database {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
            }
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;

        Ok(Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))
    }

    pub fn insert_metric(&self, record: &NewMetricRecord) -> AppResult<MetricRecord> {
        self.insert_metric_at(record, Utc::now())
    }

    pub fn insert_metric_at(&self, record: &NewMetricRecord, created_at: DateTime<Utc>) -> AppResult<MetricRecord> {
        let duration_ms = format_number(record.duration_ms.max(0.0));
        let memory_mb = format_number(record.memory_mb.max(0.0));
        let stamp = format_time(created_at);

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO jobs_metrics (job, queue, duration_ms, memory_mb, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![record.job, record.queue, duration_ms, memory_mb, stamp, stamp],
        )?;

        Ok(MetricRecord {
            id: conn.last_insert_rowid(),
            job: record.job.clone(),
            queue: record.queue.clone(),
            duration_ms: Some(duration_ms),
            memory_mb: Some(memory_mb),
            created_at: parse_time(&stamp).map_err(AppError::from)?,
            updated_at: parse_time(&stamp).map_err(AppError::from)?,
        })
    }

    pub fn get_metric(&self, id: i64) -> AppResult<Option<MetricRecord>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {RECORD_COLUMNS} FROM jobs_metrics WHERE id = ?1"),
            [id],
            parse_record_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn count_metrics(&self) -> AppResult<i64> {
        let conn = self.lock()?;
        conn.query_row("SELECT COUNT(1) FROM jobs_metrics", [], |row| row.get(0))
            .map_err(AppError::from)
    }

    /// Individual executions, heaviest first.
    pub fn list_metrics(&self, window: &DateWindow, sort_by: SortBy, limit: usize) -> AppResult<Vec<MetricRecord>> {
        let mut query = format!("SELECT {RECORD_COLUMNS} FROM jobs_metrics WHERE 1 = 1");
        let params_vec = push_window(&mut query, window);
        query.push_str(&format!(" ORDER BY {} DESC, id ASC LIMIT ?", sort_by.record_column()));

        let conn = self.lock()?;
        let mut statement = conn.prepare(&query)?;
        let rows = statement.query_map(bind_params(&params_vec, Some(limit)), parse_record_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// `limit = None` returns every job.
    pub fn aggregate_by_job(
        &self,
        window: &DateWindow,
        sort_by: SortBy,
        limit: Option<usize>,
    ) -> AppResult<Vec<JobAggregate>> {
        let mut query = String::from(
            "SELECT job,
                    COUNT(*) AS executions,
                    COALESCE(AVG(memory_mb), 0) AS avg_memory,
                    COALESCE(MAX(memory_mb), 0) AS max_memory,
                    COALESCE(MIN(memory_mb), 0) AS min_memory,
                    COALESCE(AVG(duration_ms), 0) AS avg_duration,
                    COALESCE(MAX(duration_ms), 0) AS max_duration,
                    COALESCE(MIN(duration_ms), 0) AS min_duration,
                    MIN(created_at) AS first_executed,
                    MAX(created_at) AS last_executed
             FROM jobs_metrics WHERE 1 = 1",
        );
        let params_vec = push_window(&mut query, window);
        query.push_str(&format!(" GROUP BY job ORDER BY {} DESC, job ASC", sort_by.aggregate_column()));
        if limit.is_some() {
            query.push_str(" LIMIT ?");
        }

        let conn = self.lock()?;
        let mut statement = conn.prepare(&query)?;
        let rows = statement.query_map(bind_params(&params_vec, limit), |row| {
            Ok(JobAggregate {
                job: row.get(0)?,
                executions: row.get(1)?,
                avg_memory: row.get(2)?,
                max_memory: row.get(3)?,
                min_memory: row.get(4)?,
                avg_duration: row.get(5)?,
                max_duration: row.get(6)?,
                min_duration: row.get(7)?,
                first_executed: parse_time(&row.get::<_, String>(8)?)?,
                last_executed: parse_time(&row.get::<_, String>(9)?)?,
                memory_trend: None,
                duration_trend: None,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
    }

    /// Null queues are left out; `limit = None` returns every queue.
    pub fn aggregate_by_queue(
        &self,
        window: &DateWindow,
        sort_by: SortBy,
        limit: Option<usize>,
    ) -> AppResult<Vec<QueueAggregate>> {
        let mut query = String::from(
            "SELECT queue,
                    COUNT(*) AS executions,
                    COUNT(DISTINCT job) AS distinct_jobs,
                    COALESCE(AVG(memory_mb), 0) AS avg_memory,
                    COALESCE(MAX(memory_mb), 0) AS max_memory,
                    COALESCE(AVG(duration_ms), 0) AS avg_duration,
                    COALESCE(MAX(duration_ms), 0) AS max_duration,
                    MIN(created_at) AS first_executed,
                    MAX(created_at) AS last_executed
             FROM jobs_metrics WHERE queue IS NOT NULL",
        );
        let params_vec = push_window(&mut query, window);
        query.push_str(&format!(" GROUP BY queue ORDER BY {} DESC, queue ASC", sort_by.aggregate_column()));
        if limit.is_some() {
            query.push_str(" LIMIT ?");
        }

        let conn = self.lock()?;
        let mut statement = conn.prepare(&query)?;
        let rows = statement.query_map(bind_params(&params_vec, limit), |row| {
            Ok(QueueAggregate {
                queue: row.get(0)?,
                executions: row.get(1)?,
                distinct_jobs: row.get(2)?,
                avg_memory: row.get(3)?,
                max_memory: row.get(4)?,
                avg_duration: row.get(5)?,
                max_duration: row.get(6)?,
                first_executed: parse_time(&row.get::<_, String>(7)?)?,
                last_executed: parse_time(&row.get::<_, String>(8)?)?,
                memory_trend: None,
                duration_trend: None,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
    }

    pub fn job_counts(&self, window: &DateWindow) -> AppResult<Vec<JobCount>> {
        let mut query = String::from(
            "SELECT job, COUNT(*) AS executions, MIN(created_at), MAX(created_at)
             FROM jobs_metrics WHERE 1 = 1",
        );
        let params_vec = push_window(&mut query, window);
        query.push_str(" GROUP BY job ORDER BY executions DESC, job ASC");

        let conn = self.lock()?;
        let mut statement = conn.prepare(&query)?;
        let rows = statement.query_map(bind_params(&params_vec, None), |row| {
            Ok(JobCount {
                job: row.get(0)?,
                executions: row.get(1)?,
                first_executed: parse_time(&row.get::<_, String>(2)?)?,
                last_executed: parse_time(&row.get::<_, String>(3)?)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
    }

    /// Average memory and duration per job or queue over `[start, end]`.
    pub fn previous_period_averages(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        group_by: GroupBy,
    ) -> AppResult<Vec<(String, TrendEntry)>> {
        let column = group_by.column();
        let null_filter = match group_by {
            GroupBy::Queue => " AND queue IS NOT NULL",
            GroupBy::Job => "",
        };
        let query = format!(
            "SELECT {column}, COALESCE(AVG(memory_mb), 0), COALESCE(AVG(duration_ms), 0)
             FROM jobs_metrics
             WHERE created_at BETWEEN ?1 AND ?2{null_filter}
             GROUP BY {column}"
        );

        let conn = self.lock()?;
        let mut statement = conn.prepare(&query)?;
        let rows = statement.query_map(params![format_time(start), format_time(end)], |row| {
            Ok((
                row.get::<_, String>(0)?,
                TrendEntry {
                    avg_memory: row.get(1)?,
                    avg_duration: row.get(2)?,
                },
            ))
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
    }

    pub fn delete_older_than(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM jobs_metrics WHERE created_at < ?1",
            [format_time(cutoff)],
        )?;
        Ok(deleted as u64)
    }

    pub fn purge_all(&self) -> AppResult<u64> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM jobs_metrics", [])?;
        Ok(deleted as u64)
    }
}

impl MetricSink for Database {
    fn record(&self, record: &NewMetricRecord) -> AppResult<()> {
        self.insert_metric(record).map(|_| ())
    }
}

fn push_window(query: &mut String, window: &DateWindow) -> Vec<String> {
    match window {
        DateWindow::Between { start, end } => {
            query.push_str(" AND created_at BETWEEN ? AND ?");
            vec![format_time(*start), format_time(*end)]
        }
        DateWindow::Since(start) => {
            query.push_str(" AND created_at >= ?");
            vec![format_time(*start)]
        }
        DateWindow::All => Vec::new(),
    }
}

fn bind_params(params_vec: &[String], limit: Option<usize>) -> rusqlite::ParamsFromIter<Vec<rusqlite::types::Value>> {
    let mut values: Vec<rusqlite::types::Value> = params_vec
        .iter()
        .map(|param| rusqlite::types::Value::Text(param.clone()))
        .collect();
    if let Some(limit) = limit {
        values.push(rusqlite::types::Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
    }
    rusqlite::params_from_iter(values)
}

fn parse_record_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MetricRecord> {
    Ok(MetricRecord {
        id: row.get(0)?,
        job: row.get(1)?,
        queue: row.get(2)?,
        duration_ms: row.get(3)?,
        memory_mb: row.get(4)?,
        created_at: parse_time(&row.get::<_, String>(5)?)?,
        updated_at: parse_time(&row.get::<_, String>(6)?)?,
    })
}

/// Fixed-width UTC text so lexical order matches chronological order.
pub(crate) fn format_time(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, error.to_string())),
            )
        })
}
