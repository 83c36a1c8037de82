mod config;
mod data;
mod detect;
mod error;
mod report;
mod state;
mod validate;

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use config::{AnalysisOptions, Config, ServiceOptions};
use report::llm::{read_api_key, ChatClient};
use state::Analysis;

#[derive(Parser)]
#[command(name = "vd-audit")]
#[command(version, about = "Check a vehicle-detector table for misplaced, duplicate and missing devices", long_about = None)]
struct Cli {
    /// JSON config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(flatten)]
    analysis: AnalysisOptions,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate the table and list devices at anomalous positions
    Detect,

    /// Everything `detect` does, plus a written report from a language model
    Report {
        #[command(flatten)]
        service: ServiceOptions,

        /// Print the prompt instead of calling the service
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let result = run(cli, &mut io::stdout().lock());
    ExitCode::from(exit_status(result, &mut io::stderr().lock()))
}

/// Print a failed run's error chain to `err` and map the outcome to the
/// process status: 0 on success, 1 on any fatal error.
fn exit_status(result: anyhow::Result<()>, err: &mut dyn Write) -> u8 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            let _ = writeln!(err, "error: {e:#}");
            1
        }
    }
}

fn run(cli: Cli, out: &mut dyn Write) -> anyhow::Result<()> {
    let (service, report_mode) = match cli.command {
        Command::Detect => (ServiceOptions::default(), None),
        Command::Report { service, dry_run } => (service, Some(dry_run)),
    };
    let config = Config::resolve(cli.analysis, service, cli.config.as_deref())?;

    // Fail on a missing key before doing any work.
    let api_key = match report_mode {
        Some(false) => Some(read_api_key(&config.credentials)?),
        _ => None,
    };

    let analysis = Analysis::run(&config)?;

    let generated = match (report_mode, api_key) {
        (Some(true), _) => {
            let prompt = report::prompt::build_prompt(&analysis, config.max_listed);
            if cli.json {
                writeln!(out, "{}", report::render_json(&analysis, Some(&prompt), None)?)?;
            } else {
                writeln!(out, "{prompt}")?;
            }
            return Ok(());
        }
        (Some(false), Some(key)) => {
            let client = ChatClient::new(&config.endpoint, &config.model, key, config.timeout);
            Some(report::generate_report(&analysis, &client, config.max_listed)?)
        }
        _ => None,
    };

    if cli.json {
        writeln!(out, "{}", report::render_json(&analysis, None, generated.as_deref())?)?;
    } else {
        write!(out, "{}", report::render_console(&analysis, config.max_listed))?;
        if let Some(text) = generated {
            writeln!(out, "\n=== Generated report ===\n")?;
            writeln!(out, "{text}")?;
        }
    }
    Ok(())
}
