use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use utils::version;

use crate::report::DEFAULT_OUTPUT;

/// Write the first GPU's telemetry to a six-line report
#[derive(Parser, Debug)]
#[command(about, long_about, version = &**version::VERSION)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub report: ReportArgs,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print an existing report as JSON
    Show(ShowArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ReportArgs {
    #[arg(
        long,
        env = "GPUINFO_OUTPUT",
        value_hint = clap::ValueHint::FilePath,
        default_value = DEFAULT_OUTPUT,
        help = "Report file, replaced on every run"
    )]
    pub output: PathBuf,

    #[arg(
        long,
        env = "GPUINFO_TIMEOUT_SECS",
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Give up on the GPU telemetry query after this many seconds"
    )]
    pub timeout_secs: Option<u64>,

    #[arg(
        long,
        env = "GPUINFO_INTERVAL_SECS",
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Keep running and refresh the report every N seconds"
    )]
    pub interval_secs: Option<u64>,

    #[arg(
        long,
        env = "GPUINFO_METRICS_FILE",
        value_hint = clap::ValueHint::FilePath,
        help = "Also record each snapshot as InfluxDB line protocol, e.g. logs/gpu.metrics"
    )]
    pub metrics_file: Option<PathBuf>,
}

impl ReportArgs {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval_secs.map(Duration::from_secs)
    }
}

#[derive(Args, Debug, Clone)]
pub struct ShowArgs {
    #[arg(
        long,
        env = "GPUINFO_OUTPUT",
        value_hint = clap::ValueHint::FilePath,
        default_value = DEFAULT_OUTPUT,
        help = "Report file to read"
    )]
    pub input: PathBuf,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn report_is_the_default_command() {
        let cli = Cli::try_parse_from(["gpuinfo"]).expect("should parse");

        assert!(cli.command.is_none());
        assert_eq!(cli.report.output, PathBuf::from("gpuinfo.txt"));
        assert_eq!(cli.report.timeout(), None);
        assert_eq!(cli.report.interval(), None);
        assert!(cli.report.metrics_file.is_none());
    }

    #[test]
    fn report_flags() {
        let cli = Cli::try_parse_from([
            "gpuinfo",
            "--output",
            "/tmp/gpu.txt",
            "--timeout-secs",
            "3",
            "--interval-secs",
            "5",
        ])
        .expect("should parse");

        assert_eq!(cli.report.output, PathBuf::from("/tmp/gpu.txt"));
        assert_eq!(cli.report.timeout(), Some(Duration::from_secs(3)));
        assert_eq!(cli.report.interval(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn zero_interval_is_rejected() {
        assert!(Cli::try_parse_from(["gpuinfo", "--interval-secs", "0"]).is_err());
    }

    #[test]
    fn show_subcommand() {
        let cli = Cli::try_parse_from(["gpuinfo", "show", "--input", "other.txt"])
            .expect("should parse");

        match cli.command {
            Some(Commands::Show(args)) => assert_eq!(args.input, PathBuf::from("other.txt")),
            None => panic!("expected show subcommand"),
        }
    }
}
