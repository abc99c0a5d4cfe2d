use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Display name for records that were written without a queue.
pub const DEFAULT_QUEUE_LABEL: &str = "default";

/// Missing and empty queue names both display as [`DEFAULT_QUEUE_LABEL`].
pub fn queue_label(queue: Option<&str>) -> &str {
    match queue {
        Some(name) if !name.is_empty() => name,
        _ => DEFAULT_QUEUE_LABEL,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SortBy {
    #[default]
    Memory,
    Duration,
}

impl SortBy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Duration => "time",
        }
    }

    pub(crate) fn record_column(self) -> &'static str {
        match self {
            Self::Memory => "memory_mb",
            Self::Duration => "duration_ms",
        }
    }

    pub(crate) fn aggregate_column(self) -> &'static str {
        match self {
            Self::Memory => "max_memory",
            Self::Duration => "max_duration",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroupBy {
    Job,
    Queue,
}

impl GroupBy {
    pub(crate) fn column(self) -> &'static str {
        match self {
            Self::Job => "job",
            Self::Queue => "queue",
        }
    }
}

/// One persisted job execution sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub id: i64,
    pub job: String,
    pub queue: Option<String>,
    pub duration_ms: Option<f64>,
    pub memory_mb: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MetricRecord {
    pub fn queue_label(&self) -> &str {
        queue_label(self.queue.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMetricRecord {
    pub job: String,
    pub queue: Option<String>,
    pub duration_ms: f64,
    pub memory_mb: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobAggregate {
    pub job: String,
    pub executions: i64,
    pub avg_memory: f64,
    pub max_memory: f64,
    pub min_memory: f64,
    pub avg_duration: f64,
    pub max_duration: f64,
    pub min_duration: f64,
    pub first_executed: DateTime<Utc>,
    pub last_executed: DateTime<Utc>,
    pub memory_trend: Option<Trend>,
    pub duration_trend: Option<Trend>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueAggregate {
    pub queue: String,
    pub distinct_jobs: i64,
    pub executions: i64,
    pub avg_memory: f64,
    pub max_memory: f64,
    pub avg_duration: f64,
    pub max_duration: f64,
    pub first_executed: DateTime<Utc>,
    pub last_executed: DateTime<Utc>,
    pub memory_trend: Option<Trend>,
    pub duration_trend: Option<Trend>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobCount {
    pub job: String,
    pub executions: i64,
    pub first_executed: DateTime<Utc>,
    pub last_executed: DateTime<Utc>,
}

/// Prior-period averages for one job or queue.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendEntry {
    pub avg_memory: f64,
    pub avg_duration: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "direction", content = "percent")]
pub enum Trend {
    Up(i64),
    Down(i64),
    Stable,
    NotAvailable,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up(percent) => write!(f, "↑ (+{percent}%)"),
            Self::Down(percent) => write!(f, "↓ ({percent}%)"),
            Self::Stable => write!(f, "→ (0%)"),
            Self::NotAvailable => write!(f, "N/A"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportOptions {
    pub limit: usize,
    pub sort_by: SortBy,
    pub days: u32,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub show_trends: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            sort_by: SortBy::Memory,
            days: 7,
            start_date: None,
            end_date: None,
            show_trends: false,
        }
    }
}

/// Resolved `created_at` filter for a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateWindow {
    Between {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    Since(DateTime<Utc>),
    All,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatSummary {
    pub avg: f64,
    pub max: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMetricsExport {
    pub job: String,
    pub executions: i64,
    pub avg_per_day: f64,
    pub memory: StatSummary,
    pub duration: StatSummary,
    pub first_executed: DateTime<Utc>,
    pub last_executed: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMetricsExport {
    pub queue: String,
    pub distinct_jobs: i64,
    pub executions: i64,
    pub memory: StatSummary,
    pub duration: StatSummary,
    pub first_executed: DateTime<Utc>,
    pub last_executed: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsExport {
    pub job_metrics: Vec<JobMetricsExport>,
    pub queue_metrics: Vec<QueueMetricsExport>,
    pub export_time: String,
    pub period: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub cutoff: DateTime<Utc>,
    pub initial_count: i64,
    pub deleted: u64,
    pub remaining: i64,
}
