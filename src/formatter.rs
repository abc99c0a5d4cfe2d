//! Display rows, headers and terminal tables for the metrics reports.

use crate::models::{queue_label, JobAggregate, JobCount, MetricRecord, QueueAggregate, Trend};
use chrono::{DateTime, Utc};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Rounds to two decimal places.
pub fn format_number(value: f64) -> f64 {
    if !value.is_finite() {
        return value;
    }
    (value * 100.0).round() / 100.0
}

pub fn format_time(value: DateTime<Utc>) -> String {
    value.format(TIME_FORMAT).to_string()
}

/// Executions divided by the inclusive number of calendar days spanned.
pub fn avg_per_day(executions: i64, first: DateTime<Utc>, last: DateTime<Utc>) -> f64 {
    let days = (last - first).num_days().max(0) + 1;
    format_number(executions as f64 / days as f64)
}

fn number_cell(value: f64) -> String {
    format_number(value).to_string()
}

fn trend_cell(trend: Option<Trend>) -> String {
    trend.unwrap_or(Trend::NotAvailable).to_string()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsFormatter {
    show_trends: bool,
}

impl MetricsFormatter {
    pub fn new(show_trends: bool) -> Self {
        Self { show_trends }
    }

    fn with_trend_headers(&self, mut headers: Vec<String>) -> Vec<String> {
        if self.show_trends {
            headers.push("Memory Trend".to_string());
            headers.push("Duration Trend".to_string());
        }
        headers
    }

    pub fn detailed_headers(&self) -> Vec<String> {
        ["Job", "Memory (MB)", "Duration (ms)", "Queue", "Executed At"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    pub fn detailed_rows(&self, records: &[MetricRecord]) -> Vec<Vec<String>> {
        records
            .iter()
            .map(|record| {
                vec![
                    record.job.clone(),
                    record.memory_mb.map(number_cell).unwrap_or_default(),
                    record.duration_ms.map(number_cell).unwrap_or_default(),
                    record.queue_label().to_string(),
                    format_time(record.created_at),
                ]
            })
            .collect()
    }

    pub fn job_headers(&self) -> Vec<String> {
        self.with_trend_headers(
            [
                "Job",
                "Executions",
                "Avg/Day",
                "Avg Memory (MB)",
                "Max Memory (MB)",
                "Avg Duration (ms)",
                "Max Duration (ms)",
                "Last Executed",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        )
    }

    pub fn job_rows(&self, rows: &[JobAggregate]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|item| {
                let mut row = vec![
                    item.job.clone(),
                    item.executions.to_string(),
                    avg_per_day(item.executions, item.first_executed, item.last_executed).to_string(),
                    number_cell(item.avg_memory),
                    number_cell(item.max_memory),
                    number_cell(item.avg_duration),
                    number_cell(item.max_duration),
                    format_time(item.last_executed),
                ];
                if self.show_trends {
                    row.push(trend_cell(item.memory_trend));
                    row.push(trend_cell(item.duration_trend));
                }
                row
            })
            .collect()
    }

    pub fn job_count_headers(&self) -> Vec<String> {
        ["Job", "Executions", "First Executed", "Last Executed", "Avg Per Day"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    pub fn job_count_rows(&self, rows: &[JobCount]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|item| {
                vec![
                    item.job.clone(),
                    item.executions.to_string(),
                    format_time(item.first_executed),
                    format_time(item.last_executed),
                    avg_per_day(item.executions, item.first_executed, item.last_executed).to_string(),
                ]
            })
            .collect()
    }

    pub fn queue_headers(&self) -> Vec<String> {
        self.with_trend_headers(
            [
                "Queue",
                "Unique Jobs",
                "Executions",
                "Avg Memory (MB)",
                "Max Memory (MB)",
                "Avg Duration (ms)",
                "Max Duration (ms)",
                "Last Executed",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        )
    }

    pub fn queue_rows(&self, rows: &[QueueAggregate]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|item| {
                let mut row = vec![
                    queue_label(Some(item.queue.as_str())).to_string(),
                    item.distinct_jobs.to_string(),
                    item.executions.to_string(),
                    number_cell(item.avg_memory),
                    number_cell(item.max_memory),
                    number_cell(item.avg_duration),
                    number_cell(item.max_duration),
                    format_time(item.last_executed),
                ];
                if self.show_trends {
                    row.push(trend_cell(item.memory_trend));
                    row.push(trend_cell(item.duration_trend));
                }
                row
            })
            .collect()
    }
}

/// Boxed ASCII table. Rows shorter than the header are padded with blanks.
pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|header| header.chars().count()).collect();
    for row in rows {
        for (index, cell) in row.iter().enumerate() {
            let len = cell.chars().count();
            match widths.get_mut(index) {
                Some(width) => *width = (*width).max(len),
                None => widths.push(len),
            }
        }
    }

    let separator = {
        let mut line = String::from("+");
        for width in &widths {
            line.push_str(&"-".repeat(width + 2));
            line.push('+');
        }
        line
    };

    let render_row = |cells: &[String]| {
        let mut line = String::from("|");
        for (index, width) in widths.iter().enumerate() {
            let cell = cells.get(index).map(String::as_str).unwrap_or("");
            let pad = width - cell.chars().count();
            line.push(' ');
            line.push_str(cell);
            line.push_str(&" ".repeat(pad + 1));
            line.push('|');
        }
        line
    };

    let mut out = Vec::with_capacity(rows.len() + 4);
    out.push(separator.clone());
    out.push(render_row(headers));
    out.push(separator.clone());
    for row in rows {
        out.push(render_row(row.as_slice()));
    }
    out.push(separator);
    out.join("\n")
}
