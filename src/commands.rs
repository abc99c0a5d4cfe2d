use crate::cleaner::RetentionCleaner;
use crate::cli::{CleanupArgs, ExportArgs, TopArgs};
use crate::config::MetricsConfig;
use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::exporter::{build_export, Exporter, EXPORT_BASENAME};
use crate::formatter::{format_time, render_table, MetricsFormatter};
use crate::models::{GroupBy, ReportOptions, SortBy};
use crate::query::MetricsQuery;
use crate::trend::TrendAnalyzer;
use chrono::{DateTime, Utc};
use std::io::Write;
use std::path::PathBuf;

/// Shared state for one CLI invocation.
pub struct CommandContext {
    pub config: MetricsConfig,
    pub db: Database,
}

impl CommandContext {
    pub fn open(config: MetricsConfig) -> AppResult<Self> {
        let db = Database::new(&config.database_path)?;
        tracing::debug!(path = %db.path().display(), "opened metrics database");
        Ok(Self { config, db })
    }
}

pub fn run_cleanup(ctx: &CommandContext, args: &CleanupArgs, now: DateTime<Utc>, out: &mut dyn Write) -> AppResult<u64> {
    let cleaner = RetentionCleaner::new(&ctx.db, &ctx.config);
    let report = cleaner.clean(args.days, now)?;

    writeln!(out, "Cleaning up records older than {}", format_time(report.cutoff))?;
    writeln!(out, "Initial records count: {}", report.initial_count)?;
    writeln!(out, "Deleted {} old jobs metrics records", report.deleted)?;
    writeln!(out, "Remaining records count: {}", report.remaining)?;
    Ok(report.deleted)
}

pub fn top_options(args: &TopArgs) -> AppResult<ReportOptions> {
    if let (Some(from), Some(to)) = (args.from, args.to) {
        if from > to {
            return Err(AppError::Cli(format!("--from {from} is after --to {to}")));
        }
    }
    Ok(ReportOptions {
        limit: args.limit as usize,
        sort_by: args.sort.into(),
        days: args.days,
        start_date: args.from,
        end_date: args.to,
        show_trends: args.trends,
    })
}

pub fn run_top(ctx: &CommandContext, args: &TopArgs, now: DateTime<Utc>, out: &mut dyn Write) -> AppResult<()> {
    let options = top_options(args)?;
    let query = MetricsQuery::new(&ctx.db, options.clone(), now);
    let formatter = MetricsFormatter::new(options.show_trends);

    writeln!(out, "Showing job metrics {}", query.description())?;
    writeln!(
        out,
        "Sorted by {}, limited to {} results",
        options.sort_by.as_str(),
        options.limit
    )?;

    let mut jobs = query.job_metrics()?;
    let mut queues = if args.limit_queues {
        query.queue_metrics_limited()?
    } else {
        query.queue_metrics()?
    };
    if options.show_trends {
        let job_trends = TrendAnalyzer::load(&ctx.db, &options, now, GroupBy::Job)?;
        job_trends.annotate_jobs(&mut jobs);
        let queue_trends = TrendAnalyzer::load(&ctx.db, &options, now, GroupBy::Queue)?;
        queue_trends.annotate_queues(&mut queues);
        match job_trends.previous_period_description() {
            Some(period) => writeln!(out, "Trends compared with {period}")?,
            None => writeln!(out, "Trends are not available for the entire history")?,
        }
    }

    writeln!(out, "\nJOB METRICS:")?;
    writeln!(out, "{}", render_table(&formatter.job_headers(), &formatter.job_rows(&jobs)))?;

    writeln!(out, "\nQUEUE SUMMARY:")?;
    writeln!(out, "{}", render_table(&formatter.queue_headers(), &formatter.queue_rows(&queues)))?;

    if args.counts {
        writeln!(out, "\nEXECUTION COUNTS:")?;
        let counts = query.job_counts()?;
        writeln!(
            out,
            "{}",
            render_table(&formatter.job_count_headers(), &formatter.job_count_rows(&counts))
        )?;
    }

    if args.detailed {
        writeln!(out, "\nHEAVIEST EXECUTIONS:")?;
        let records = query.detailed_metrics()?;
        writeln!(
            out,
            "{}",
            render_table(&formatter.detailed_headers(), &formatter.detailed_rows(&records))
        )?;
    }

    Ok(())
}

pub fn run_export(ctx: &CommandContext, args: &ExportArgs, now: DateTime<Utc>, out: &mut dyn Write) -> AppResult<PathBuf> {
    let options = ReportOptions {
        sort_by: SortBy::Memory,
        days: args.days,
        ..ReportOptions::default()
    };
    let query = MetricsQuery::new(&ctx.db, options, now);

    writeln!(out, "Exporting comprehensive job metrics data to JSON...")?;
    let period = match args.days {
        0 => "Entire history".to_string(),
        days => format!("Last {days} days"),
    };
    let export = build_export(&query, period)?;
    let path = Exporter::new(&ctx.config.export_dir).export_json(EXPORT_BASENAME, &export, now)?;
    writeln!(out, "Metrics data exported to: {}", path.display())?;
    Ok(path)
}
