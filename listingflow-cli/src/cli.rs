//! Command-line arguments.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use listingflow::pipeline::{RestartPoint, RunRequest};

/// Listing-enrichment pipeline runner.
#[derive(Parser, Debug)]
#[command(name = "listingflow", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a single registered step
    Step {
        /// Step identifier (e.g. `country_filter`)
        step_id: String,
        #[command(flatten)]
        args: RunArgs,
    },
    /// Run the extraction steps only
    Extract(RunArgs),
    /// Run the whole pipeline
    Full(RunArgs),
}

impl Command {
    /// Splits the command into the run request and its shared arguments.
    pub fn into_request(self) -> (RunRequest, RunArgs) {
        let (request, args) = match self {
            Self::Step { step_id, args } => (RunRequest::single(step_id), args),
            Self::Extract(args) => (RunRequest::extraction(), args),
            Self::Full(args) => (RunRequest::full(), args),
        };
        let request = match args.restart_point() {
            Some(point) => request.with_restart(point),
            None => request,
        };
        (request, args)
    }
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Search term, listing URL, or image reference with --image
    pub search: String,

    /// Treat SEARCH as an image reference
    #[arg(long)]
    pub image: bool,

    /// Result cap per discovery source [default: 50]
    #[arg(short = 'n', long)]
    pub number_of_results: Option<usize>,

    /// Country scope (ISO code, e.g. CH)
    #[arg(long)]
    pub country: Option<String>,

    /// Organization profile (implies its country)
    #[arg(long)]
    pub org: Option<String>,

    /// Operator name recorded in the run id
    #[arg(long, env = "USER", default_value = "anonymous")]
    pub user: String,

    /// Query related keywords during enrichment
    #[arg(long)]
    pub enrich: bool,

    /// Settings file merged over the built-in defaults
    #[arg(long, env = "LISTINGFLOW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Artifact directory (overrides the settings file)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Run whose artifact seeds this run
    #[arg(long, requires = "from_step")]
    pub from_run: Option<String>,

    /// Step whose artifact seeds this run
    #[arg(long, requires = "from_run")]
    pub from_step: Option<String>,

    /// Write into --from-run instead of starting a new run
    #[arg(long, requires = "from_run")]
    pub in_place: bool,

    /// Cancel the run after this many seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Log filter (e.g. `debug`, `listingflow=trace`)
    #[arg(long, env = "LISTINGFLOW_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Also write logs to this file
    #[arg(long, env = "LISTINGFLOW_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,
}

impl RunArgs {
    fn restart_point(&self) -> Option<RestartPoint> {
        self.from_run
            .as_ref()
            .zip(self.from_step.as_ref())
            .map(|(run, step)| RestartPoint::new(run.clone(), step.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use listingflow::pipeline::RunMode;

    #[test]
    fn test_step_command_with_restart() {
        let cli = Cli::try_parse_from([
            "listingflow",
            "step",
            "ranker",
            "aspirin",
            "--country",
            "CH",
            "--from-run",
            "r1",
            "--from-step",
            "suspicion",
            "--user",
            "tester",
        ])
        .unwrap();
        let (request, args) = cli.command.into_request();
        assert_eq!(request.mode, RunMode::single("ranker"));
        assert_eq!(request.restart, Some(RestartPoint::new("r1", "suspicion")));
        assert_eq!(args.country.as_deref(), Some("CH"));
        assert_eq!(args.user, "tester");
    }

    #[test]
    fn test_restart_needs_both_halves() {
        assert!(Cli::try_parse_from(["listingflow", "full", "aspirin", "--from-run", "r1"]).is_err());
    }

    #[test]
    fn test_full_defaults() {
        let cli = Cli::try_parse_from(["listingflow", "full", "aspirin", "-n", "3"]).unwrap();
        let (request, args) = cli.command.into_request();
        assert_eq!(request.mode, RunMode::Full);
        assert_eq!(args.number_of_results, Some(3));
        assert!(!args.image && !args.enrich && !args.in_place);
    }
}
