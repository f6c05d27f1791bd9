//! layerpack - Main entry point
//!
//! Builds `layers/api_prisma_layer.zip` from the current project directory.

use anyhow::Context;
use std::process::ExitCode;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use layerpack::cli::Cli;
use layerpack::{process_guard, BuildPlan, BuildReport, LayerBuilder, LayerLayout, LayerPaths, ProcessRunner};

/// Initialize logging; RUST_LOG overrides the verbosity flags
fn init_logger(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .init();
}

fn main() -> ExitCode {
    // Usage errors exit with clap's status 2 before anything is logged
    let cli = Cli::parse_args();
    init_logger(cli.log_level());
    info!("layerpack {} starting up", env!("CARGO_PKG_VERSION"));

    if let Err(e) = process_guard::init_signal_handlers() {
        warn!("Failed to initialize signal handlers: {}", e);
    }
    debug!("Signal handlers initialized");

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            for cause in e.chain().skip(1) {
                debug!("caused by: {}", cause);
            }
            eprintln!("✗ {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let layout = LayerLayout::default();
    let paths = LayerPaths::resolve(&cli.env_file, &layout)?;
    let runner = ProcessRunner::new(cli.tool_timeout());
    match runner.timeout() {
        Some(limit) => debug!("Tool timeout: {}s", limit.as_secs()),
        None => debug!("Tool timeout disabled"),
    }

    let builder = LayerBuilder::new(paths, layout.clone(), &runner);

    if cli.dry_run {
        info!("Dry run: no files will be changed");
        let plan = builder.plan()?;
        if cli.json {
            let json = serde_json::to_string_pretty(&plan).context("Failed to serialize build plan")?;
            println!("{}", json);
        } else {
            print_plan(&plan);
        }
        return Ok(());
    }

    let report = builder.run()?;
    if cli.json {
        let json =
            serde_json::to_string_pretty(&report).context("Failed to serialize build report")?;
        println!("{}", json);
    } else {
        print_summary(&report, &layout);
    }
    Ok(())
}

fn print_plan(plan: &BuildPlan) {
    println!("Dry run for {}", plan.paths.env_file.display());
    for step in &plan.steps {
        println!("  [{}] {}", step.stage, step.action);
    }
}

fn print_summary(report: &BuildReport, layout: &LayerLayout) {
    if report.patch.replaced == 0 {
        println!("! No {} line found in the staged schema", layout.marker);
    }
    println!(
        "✓ Layer archive created: {} ({} entries, {} bytes)",
        report.archive.path.display(),
        report.archive.entries,
        report.archive.bytes
    );
}
