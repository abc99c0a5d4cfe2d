//! Period-over-period comparison of average memory and duration.

use crate::db::Database;
use crate::errors::AppResult;
use crate::models::{GroupBy, JobAggregate, QueueAggregate, ReportOptions, Trend, TrendEntry};
use crate::query::{end_of_day, start_of_day};
use chrono::{DateTime, Days, Utc};
use std::collections::HashMap;

/// Changes smaller than this many percent count as stable.
const STABLE_THRESHOLD_PERCENT: f64 = 5.0;

/// The window of equal length immediately before the current one, or `None`
/// when the report covers the whole history.
pub fn previous_window(options: &ReportOptions, now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    match (options.start_date, options.end_date) {
        (Some(start), Some(end)) => {
            let span = (end - start).num_days().max(0) as u64 + 1;
            let previous_end = start.checked_sub_days(Days::new(1))?;
            let previous_start = previous_end.checked_sub_days(Days::new(span - 1))?;
            Some((start_of_day(previous_start), end_of_day(previous_end)))
        }
        _ if options.days > 0 => {
            let days = Days::new(u64::from(options.days));
            let previous_end = now.checked_sub_days(days)?;
            let previous_start = previous_end.checked_sub_days(days)?;
            Some((previous_start, previous_end))
        }
        _ => None,
    }
}

pub fn classify(current: f64, previous: Option<f64>) -> Trend {
    let Some(previous) = previous else {
        return Trend::NotAvailable;
    };
    if previous == 0.0 || current == 0.0 {
        return Trend::NotAvailable;
    }

    let percent = (current - previous) / previous * 100.0;
    if percent.abs() < STABLE_THRESHOLD_PERCENT {
        Trend::Stable
    } else if percent > 0.0 {
        Trend::Up(percent.round() as i64)
    } else {
        Trend::Down(percent.round() as i64)
    }
}

/// Prior-period averages indexed by job or queue name.
#[derive(Debug, Clone, Default)]
pub struct TrendAnalyzer {
    previous: HashMap<String, TrendEntry>,
    previous_period: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl TrendAnalyzer {
    pub fn load(db: &Database, options: &ReportOptions, now: DateTime<Utc>, group_by: GroupBy) -> AppResult<Self> {
        let Some((start, end)) = previous_window(options, now) else {
            return Ok(Self::default());
        };

        let previous = db
            .previous_period_averages(start, end, group_by)?
            .into_iter()
            .collect::<HashMap<_, _>>();
        tracing::debug!(
            entries = previous.len(),
            start = %start,
            end = %end,
            "loaded previous period averages"
        );

        Ok(Self {
            previous,
            previous_period: Some((start, end)),
        })
    }

    #[cfg(test)]
    pub(crate) fn from_entries(entries: impl IntoIterator<Item = (String, TrendEntry)>) -> Self {
        Self {
            previous: entries.into_iter().collect(),
            previous_period: None,
        }
    }

    pub fn previous_period_description(&self) -> Option<String> {
        self.previous_period
            .map(|(start, end)| format!("{} to {}", start.format("%Y-%m-%d"), end.format("%Y-%m-%d")))
    }

    pub fn memory_trend(&self, key: &str, current: f64) -> Trend {
        classify(current, self.previous.get(key).map(|entry| entry.avg_memory))
    }

    pub fn duration_trend(&self, key: &str, current: f64) -> Trend {
        classify(current, self.previous.get(key).map(|entry| entry.avg_duration))
    }

    pub fn annotate_jobs(&self, rows: &mut [JobAggregate]) {
        for row in rows {
            row.memory_trend = Some(self.memory_trend(&row.job, row.avg_memory));
            row.duration_trend = Some(self.duration_trend(&row.job, row.avg_duration));
        }
    }

    pub fn annotate_queues(&self, rows: &mut [QueueAggregate]) {
        for row in rows {
            row.memory_trend = Some(self.memory_trend(&row.queue, row.avg_memory));
            row.duration_trend = Some(self.duration_trend(&row.queue, row.avg_duration));
        }
    }
}
