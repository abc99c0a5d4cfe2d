use crate::config::{MetricsConfig, DEFAULT_DAYS_TO_KEEP};
use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::models::CleanupReport;
use chrono::{DateTime, Days, Utc};

pub struct RetentionCleaner<'a> {
    db: &'a Database,
    days_to_keep: u32,
}

impl<'a> RetentionCleaner<'a> {
    pub fn new(db: &'a Database, config: &MetricsConfig) -> Self {
        let days_to_keep = if config.days_to_keep > 0 {
            config.days_to_keep
        } else {
            DEFAULT_DAYS_TO_KEEP
        };
        Self { db, days_to_keep }
    }

    /// Deletes records created before `now - days`. `days` falls back to the configured retention.
    pub fn clean(&self, days: Option<u32>, now: DateTime<Utc>) -> AppResult<CleanupReport> {
        let days = days.unwrap_or(self.days_to_keep);
        if days == 0 {
            return Err(AppError::Cli("--days must be at least 1".to_string()));
        }
        let cutoff = now
            .checked_sub_days(Days::new(u64::from(days)))
            .ok_or_else(|| AppError::Cli(format!("--days={days} reaches before the supported date range")))?;

        let initial_count = self.db.count_metrics()?;
        let deleted = self.db.delete_older_than(cutoff)?;
        let remaining = self.db.count_metrics()?;
        tracing::info!(
            cutoff = %cutoff,
            initial = initial_count,
            deleted,
            remaining,
            "cleaned up job metrics"
        );

        Ok(CleanupReport {
            cutoff,
            initial_count,
            deleted,
            remaining,
        })
    }
}
