mod logging;

use std::fs;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use gpuinfo::config::Cli;
use gpuinfo::config::Commands;
use gpuinfo::config::ReportArgs;
use gpuinfo::config::ShowArgs;
use gpuinfo::provider::NvmlProvider;
use gpuinfo::provider::TimeoutProvider;
use gpuinfo::GpuSnapshot;
use gpuinfo::ReportError;
use gpuinfo::Reporter;
use gpuinfo::TelemetryProvider;
use utils::version;

/// Sets up global panic hooks.
fn setup_global_hooks() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        tracing::error!("Thread panicked: {}", panic_info);
    }));
}

fn main() -> Result<()> {
    setup_global_hooks();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Show(show_args)) => run_show(show_args),
        None => run_report(cli.report),
    }
}

fn run_report(args: ReportArgs) -> Result<()> {
    let _guard = logging::init(args.metrics_file.as_deref())?;

    tracing::info!("Starting gpuinfo {}", &**version::VERSION);

    let provider = open_provider(args.timeout())?;
    let reporter = Reporter::new(provider, &args.output);

    match args.interval() {
        Some(interval) => watch(&reporter, interval),
        None => reporter.run().with_context(|| {
            format!("failed to report GPU telemetry to {}", args.output.display())
        }),
    }
}

fn open_provider(timeout: Option<Duration>) -> Result<Box<dyn TelemetryProvider>, ReportError> {
    let nvml = NvmlProvider::open()?;

    Ok(match timeout {
        Some(timeout) => Box::new(TimeoutProvider::new(nvml, timeout)),
        None => Box::new(nvml),
    })
}

/// Refresh the report forever; failed runs are logged and retried next tick.
fn watch<P: TelemetryProvider>(reporter: &Reporter<P>, interval: Duration) -> Result<()> {
    tracing::info!("Refreshing {:?} every {:?}", reporter.output(), interval);

    loop {
        reporter.refresh();
        thread::sleep(interval);
    }
}

fn run_show(args: ShowArgs) -> Result<()> {
    utils::logging::init();

    let contents = fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read report {}", args.input.display()))?;
    let snapshot: GpuSnapshot = contents
        .parse()
        .with_context(|| format!("malformed report {}", args.input.display()))?;

    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
