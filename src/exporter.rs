use crate::errors::{AppError, AppResult};
use crate::formatter::{avg_per_day, format_number};
use crate::models::{queue_label, JobMetricsExport, MetricsExport, QueueMetricsExport, StatSummary};
use crate::query::MetricsQuery;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::path::PathBuf;

pub const EXPORT_BASENAME: &str = "metrics_export";

pub struct Exporter {
    export_dir: PathBuf,
}

impl Exporter {
    pub fn new(export_dir: impl Into<PathBuf>) -> Self {
        Self {
            export_dir: export_dir.into(),
        }
    }

    /// Writes `{base}_{timestamp}.json`, adding a counter if that name is taken.
    pub fn export_json<T: Serialize>(&self, base: &str, data: &T, now: DateTime<Utc>) -> AppResult<PathBuf> {
        std::fs::create_dir_all(&self.export_dir).map_err(|error| AppError::Io(error.to_string()))?;

        let safe_base = sanitize_filename_component(base);
        let stamp = now.format("%Y-%m-%d_%H-%M-%S");
        let mut output_path = self.export_dir.join(format!("{safe_base}_{stamp}.json"));
        let mut attempt = 1;
        while output_path.exists() {
            output_path = self.export_dir.join(format!("{safe_base}_{stamp}_{attempt}.json"));
            attempt += 1;
        }

        let contents = serde_json::to_string_pretty(data)?;
        std::fs::write(&output_path, contents).map_err(|error| AppError::Io(error.to_string()))?;
        tracing::info!(path = %output_path.display(), "exported job metrics");
        Ok(output_path)
    }
}

/// Composes every job and queue aggregate in the window for the JSON export.
pub fn build_export(query: &MetricsQuery<'_>, period: String) -> AppResult<MetricsExport> {
    let job_metrics = query
        .all_job_metrics()?
        .into_iter()
        .map(|item| JobMetricsExport {
            avg_per_day: avg_per_day(item.executions, item.first_executed, item.last_executed),
            memory: StatSummary {
                avg: format_number(item.avg_memory),
                max: format_number(item.max_memory),
                min: Some(format_number(item.min_memory)),
            },
            duration: StatSummary {
                avg: format_number(item.avg_duration),
                max: format_number(item.max_duration),
                min: Some(format_number(item.min_duration)),
            },
            job: item.job,
            executions: item.executions,
            first_executed: item.first_executed,
            last_executed: item.last_executed,
        })
        .collect();

    let queue_metrics = query
        .queue_metrics()?
        .into_iter()
        .map(|item| QueueMetricsExport {
            queue: queue_label(Some(item.queue.as_str())).to_string(),
            distinct_jobs: item.distinct_jobs,
            executions: item.executions,
            memory: StatSummary {
                avg: format_number(item.avg_memory),
                max: format_number(item.max_memory),
                min: None,
            },
            duration: StatSummary {
                avg: format_number(item.avg_duration),
                max: format_number(item.max_duration),
                min: None,
            },
            first_executed: item.first_executed,
            last_executed: item.last_executed,
        })
        .collect();

    Ok(MetricsExport {
        job_metrics,
        queue_metrics,
        export_time: query.now().to_rfc3339_opts(SecondsFormat::Secs, true),
        period,
    })
}

fn sanitize_filename_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        EXPORT_BASENAME.to_string()
    } else {
        cleaned
    }
}
