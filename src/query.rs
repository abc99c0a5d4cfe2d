use crate::db::Database;
use crate::errors::AppResult;
use crate::models::{DateWindow, JobAggregate, JobCount, MetricRecord, QueueAggregate, ReportOptions};
use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeZone, Utc};

/// Midnight at the start of `date`, UTC.
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

/// Last representable microsecond of `date`, UTC.
pub fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    let last = NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999).unwrap_or(NaiveTime::MIN);
    Utc.from_utc_datetime(&date.and_time(last))
}

impl DateWindow {
    /// An explicit range wins over `days`; `days = 0` means the whole history.
    pub fn resolve(options: &ReportOptions, now: DateTime<Utc>) -> Self {
        match (options.start_date, options.end_date) {
            (Some(start), Some(end)) => Self::Between {
                start: start_of_day(start),
                end: end_of_day(end),
            },
            _ if options.days > 0 => Self::Since(
                now.checked_sub_days(Days::new(u64::from(options.days)))
                    .unwrap_or(DateTime::<Utc>::MIN_UTC),
            ),
            _ => Self::All,
        }
    }
}

pub fn describe_window(options: &ReportOptions) -> String {
    match (options.start_date, options.end_date) {
        (Some(start), Some(end)) => format!("between {start} and {end}"),
        _ if options.days > 0 => format!("from the last {} days", options.days),
        _ => "from the entire history".to_string(),
    }
}

/// Report queries bound to one set of options and a fixed clock reading.
pub struct MetricsQuery<'a> {
    db: &'a Database,
    options: ReportOptions,
    now: DateTime<Utc>,
    window: DateWindow,
}

impl<'a> MetricsQuery<'a> {
    pub fn new(db: &'a Database, options: ReportOptions, now: DateTime<Utc>) -> Self {
        let window = DateWindow::resolve(&options, now);
        Self {
            db,
            options,
            now,
            window,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn description(&self) -> String {
        describe_window(&self.options)
    }

    pub fn job_metrics(&self) -> AppResult<Vec<JobAggregate>> {
        self.db
            .aggregate_by_job(&self.window, self.options.sort_by, Some(self.options.limit))
    }

    /// Every job in the window, ignoring `limit`.
    pub fn all_job_metrics(&self) -> AppResult<Vec<JobAggregate>> {
        self.db.aggregate_by_job(&self.window, self.options.sort_by, None)
    }

    /// Every queue in the window; the dashboard does not truncate this view.
    pub fn queue_metrics(&self) -> AppResult<Vec<QueueAggregate>> {
        self.db.aggregate_by_queue(&self.window, self.options.sort_by, None)
    }

    pub fn queue_metrics_limited(&self) -> AppResult<Vec<QueueAggregate>> {
        self.db
            .aggregate_by_queue(&self.window, self.options.sort_by, Some(self.options.limit))
    }

    pub fn detailed_metrics(&self) -> AppResult<Vec<MetricRecord>> {
        self.db
            .list_metrics(&self.window, self.options.sort_by, self.options.limit)
    }

    pub fn job_counts(&self) -> AppResult<Vec<JobCount>> {
        self.db.job_counts(&self.window)
    }
}
