use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use jobs_metrics::cli::{Cli, Commands};
use jobs_metrics::commands::{run_cleanup, run_export, run_top, CommandContext};
use jobs_metrics::{init_tracing, MetricsConfig};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = MetricsConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(database) = cli.database {
        config.database_path = database;
    }

    if let Err(error) = init_tracing(config.log_dir.as_deref()) {
        eprintln!("failed to initialise logging: {error}");
    }

    let ctx = CommandContext::open(config).context("failed to open metrics database")?;
    let now = Utc::now();
    let mut stdout = std::io::stdout().lock();

    match &cli.command {
        Commands::Cleanup(args) => {
            run_cleanup(&ctx, args, now, &mut stdout).context("cleanup failed")?;
        }
        Commands::Top(args) => {
            run_top(&ctx, args, now, &mut stdout).context("top failed")?;
        }
        Commands::Export(args) => {
            run_export(&ctx, args, now, &mut stdout).context("export failed")?;
        }
    }

    Ok(())
}
