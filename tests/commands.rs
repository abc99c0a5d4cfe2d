use chrono::{Duration, Utc};
use jobs_metrics::cli::{CleanupArgs, ExportArgs, SortArg, TopArgs};
use jobs_metrics::commands::{run_cleanup, run_export, run_top, CommandContext};
use jobs_metrics::models::{MetricsExport, NewMetricRecord};
use jobs_metrics::tracker::{JobResult, MemoryProbe};
use jobs_metrics::{Database, Job, JobHarness, MetricTracker, MetricsConfig};
use std::sync::Arc;

fn context(dir: &tempfile::TempDir) -> CommandContext {
    let config = MetricsConfig {
        database_path: dir.path().join("metrics.sqlite"),
        export_dir: dir.path().join("jobs-metrics-export"),
        ..MetricsConfig::default()
    };
    CommandContext::open(config).expect("open context")
}

fn record(job: &str, queue: Option<&str>, duration_ms: f64, memory_mb: f64) -> NewMetricRecord {
    NewMetricRecord {
        job: job.to_string(),
        queue: queue.map(ToString::to_string),
        duration_ms,
        memory_mb,
    }
}

fn top_args() -> TopArgs {
    TopArgs {
        limit: 10,
        sort: SortArg::Memory,
        days: 7,
        from: None,
        to: None,
        trends: false,
        detailed: false,
        counts: false,
        limit_queues: false,
    }
}

#[test]
fn top_prints_job_and_queue_tables() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ctx = context(&dir);
    let now = Utc::now();
    ctx.db
        .insert_metric_at(&record("HighMemoryJob", Some("default"), 100.0, 50.5), now - Duration::hours(1))
        .expect("insert");
    ctx.db
        .insert_metric_at(&record("HighMemoryJob", Some("default"), 150.0, 40.2), now - Duration::hours(2))
        .expect("insert");
    ctx.db
        .insert_metric_at(&record("LowMemoryJob", Some("default"), 50.0, 10.2), now - Duration::hours(3))
        .expect("insert");

    let mut out = Vec::new();
    run_top(&ctx, &top_args(), now, &mut out).expect("top");
    let output = String::from_utf8(out).expect("utf8");

    assert!(output.contains("Showing job metrics from the last 7 days"));
    assert!(output.contains("JOB METRICS:"));
    assert!(output.contains("QUEUE SUMMARY:"));
    assert!(output.contains("HighMemoryJob"));
    assert!(output.contains("Executions"));
    let high = output.find("HighMemoryJob").expect("high");
    let low = output.find("LowMemoryJob").expect("low");
    assert!(high < low);
}

#[test]
fn top_sorted_by_time_with_trends_and_extras() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ctx = context(&dir);
    let now = Utc::now();
    ctx.db
        .insert_metric_at(&record("SlowJob", Some("reports"), 900.0, 5.0), now - Duration::days(1))
        .expect("insert");
    ctx.db
        .insert_metric_at(&record("FastJob", Some("reports"), 10.0, 80.0), now - Duration::days(1))
        .expect("insert");
    ctx.db
        .insert_metric_at(&record("SlowJob", Some("reports"), 450.0, 5.0), now - Duration::days(9))
        .expect("insert");

    let args = TopArgs {
        sort: SortArg::Time,
        trends: true,
        detailed: true,
        counts: true,
        ..top_args()
    };
    let mut out = Vec::new();
    run_top(&ctx, &args, now, &mut out).expect("top");
    let output = String::from_utf8(out).expect("utf8");

    assert!(output.contains("Sorted by time"));
    assert!(output.contains("Trends compared with"));
    assert!(output.contains("Memory Trend"));
    assert!(output.contains("↑ (+100%)"));
    assert!(output.contains("EXECUTION COUNTS:"));
    assert!(output.contains("HEAVIEST EXECUTIONS:"));
    assert!(output.find("SlowJob").expect("slow") < output.find("FastJob").expect("fast"));
}

#[test]
fn top_can_truncate_queue_summary() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ctx = context(&dir);
    let now = Utc::now();
    for (queue, memory) in [("emails", 30.0), ("reports", 20.0), ("billing", 10.0)] {
        ctx.db
            .insert_metric_at(&record("SyncJob", Some(queue), 5.0, memory), now - Duration::hours(1))
            .expect("insert");
    }

    let mut full = Vec::new();
    run_top(&ctx, &top_args(), now, &mut full).expect("top");
    assert!(String::from_utf8(full).expect("utf8").contains("billing"));

    let args = TopArgs {
        limit: 2,
        limit_queues: true,
        ..top_args()
    };
    let mut limited = Vec::new();
    run_top(&ctx, &args, now, &mut limited).expect("top");
    let output = String::from_utf8(limited).expect("utf8");
    assert!(output.contains("emails"));
    assert!(output.contains("reports"));
    assert!(!output.contains("billing"));
}

#[test]
fn top_rejects_reversed_range() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ctx = context(&dir);
    let args = TopArgs {
        from: chrono::NaiveDate::from_ymd_opt(2024, 6, 10),
        to: chrono::NaiveDate::from_ymd_opt(2024, 6, 1),
        ..top_args()
    };
    let err = run_top(&ctx, &args, Utc::now(), &mut Vec::new()).expect_err("reversed range");
    assert!(err.to_string().starts_with("CLI_INVALID"));
}

#[test]
fn cleanup_keeps_only_recent_records() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ctx = context(&dir);
    let now = Utc::now();
    ctx.db
        .insert_metric_at(&record("OldJob", None, 1.0, 1.0), now - Duration::days(60))
        .expect("insert");
    let recent = ctx
        .db
        .insert_metric_at(&record("RecentJob", None, 1.0, 1.0), now - Duration::days(10))
        .expect("insert");

    let mut out = Vec::new();
    let deleted = run_cleanup(&ctx, &CleanupArgs { days: Some(30) }, now, &mut out).expect("cleanup");
    assert_eq!(deleted, 1);
    assert!(String::from_utf8(out).expect("utf8").contains("Deleted 1 old jobs metrics records"));
    assert_eq!(ctx.db.count_metrics().expect("count"), 1);
    assert!(ctx.db.get_metric(recent.id).expect("get").is_some());

    let deleted_again = run_cleanup(&ctx, &CleanupArgs { days: Some(30) }, now, &mut Vec::new()).expect("cleanup");
    assert_eq!(deleted_again, 0);
}

#[test]
fn export_writes_job_and_queue_metrics() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ctx = context(&dir);
    let now = Utc::now();
    ctx.db
        .insert_metric_at(&record("ImportJob", Some("imports"), 100.0, 20.0), now - Duration::days(1))
        .expect("insert");
    ctx.db
        .insert_metric_at(&record("ImportJob", Some("imports"), 300.0, 40.0), now - Duration::days(3))
        .expect("insert");
    ctx.db
        .insert_metric_at(&record("MailJob", None, 50.0, 10.0), now - Duration::days(2))
        .expect("insert");
    ctx.db
        .insert_metric_at(&record("AncientJob", Some("imports"), 50.0, 10.0), now - Duration::days(45))
        .expect("insert");

    let mut out = Vec::new();
    let path = run_export(&ctx, &ExportArgs { days: 30 }, now, &mut out).expect("export");
    assert!(path.starts_with(dir.path().join("jobs-metrics-export")));
    assert!(String::from_utf8(out).expect("utf8").contains("Metrics data exported to:"));

    let raw = std::fs::read_to_string(&path).expect("read export");
    let export: MetricsExport = serde_json::from_str(&raw).expect("decode export");
    assert_eq!(export.period, "Last 30 days");
    assert_eq!(export.job_metrics.len(), 2);
    assert!(export.job_metrics.iter().all(|row| row.job != "AncientJob"));

    let import = export
        .job_metrics
        .iter()
        .find(|row| row.job == "ImportJob")
        .expect("import job");
    assert_eq!(import.executions, 2);
    assert_eq!(import.memory.max, 40.0);
    assert_eq!(import.memory.min, Some(20.0));
    assert_eq!(import.duration.avg, 200.0);

    assert_eq!(export.queue_metrics.len(), 1);
    assert_eq!(export.queue_metrics[0].queue, "imports");
    assert_eq!(export.queue_metrics[0].distinct_jobs, 1);
    assert!(export.queue_metrics[0].memory.min.is_none());

    let value: serde_json::Value = serde_json::from_str(&raw).expect("json value");
    assert!(value["export_time"].as_str().is_some());
    assert!(value["queue_metrics"][0]["memory"].get("min").is_none());
}

struct ResizeImages;

impl Job for ResizeImages {
    fn queue(&self) -> Option<&str> {
        Some("media")
    }

    fn run(&mut self) -> JobResult {
        Ok(())
    }
}

struct HalfGigabyte;

impl MemoryProbe for HalfGigabyte {
    fn peak_bytes(&self) -> u64 {
        512 * 1024 * 1024
    }
}

fn harness(db: Arc<Database>, config: MetricsConfig) -> JobHarness {
    let tracker = MetricTracker::new(config, db, Arc::new(HalfGigabyte));
    JobHarness::new(vec![Arc::new(tracker)])
}

#[test]
fn tracked_jobs_land_in_the_store() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = Arc::new(Database::new(&dir.path().join("metrics.sqlite")).expect("db"));
    let harness = harness(db.clone(), MetricsConfig::default());

    for _ in 0..3 {
        harness.execute(&mut ResizeImages).expect("run");
    }

    assert_eq!(db.count_metrics().expect("count"), 3);
    let rows = db
        .aggregate_by_queue(&jobs_metrics::models::DateWindow::All, jobs_metrics::models::SortBy::Memory, None)
        .expect("queues");
    assert_eq!(rows[0].queue, "media");
    assert_eq!(rows[0].max_memory, 512.0);
}

#[test]
fn disabled_tracking_leaves_store_empty() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = Arc::new(Database::new(&dir.path().join("metrics.sqlite")).expect("db"));
    let config = MetricsConfig {
        track_jobs_metrics: false,
        ..MetricsConfig::default()
    };
    let harness = harness(db.clone(), config);

    for _ in 0..10 {
        harness.execute(&mut ResizeImages).expect("run");
    }
    assert_eq!(db.count_metrics().expect("count"), 0);
}

#[test]
fn concurrent_jobs_do_not_lose_samples() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = Arc::new(Database::new(&dir.path().join("metrics.sqlite")).expect("db"));
    let harness = harness(db.clone(), MetricsConfig::default());

    std::thread::scope(|scope| {
        for _ in 0..4 {
            let harness = harness.clone();
            scope.spawn(move || {
                for _ in 0..25 {
                    harness.execute(&mut ResizeImages).expect("run");
                }
            });
        }
    });

    assert_eq!(db.count_metrics().expect("count"), 100);
}
