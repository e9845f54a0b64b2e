pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgGroup, Parser, Subcommand};

use crate::commands::matcher::MatchInput;

#[derive(Debug, Parser)]
#[command(
    name = "covermatch",
    about = "Covermatch operator CLI",
    long_about = "Run the coverage matcher, inspect configuration, and check service readiness.",
    after_help = "Examples:\n  covermatch match --sample\n  covermatch match --source agent1 --input-file profile.txt\n  covermatch doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Run the Plan/Do/Check/Act coverage matcher and print the JSON result",
        group(ArgGroup::new("match_input").required(true).args(["input", "input_file", "sample"]))
    )]
    Match {
        #[arg(long, default_value = "user", help = "Origin of the input: user or agent1")]
        source: String,
        #[arg(long, help = "Requirements or risk profile text")]
        input: Option<String>,
        #[arg(long, help = "Read the input text from a file")]
        input_file: Option<PathBuf>,
        #[arg(long, help = "Use the built-in example input for the chosen source")]
        sample: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, API credentials, and search-service settings")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Match { source, input, input_file, sample } => {
            let input = match (input, input_file) {
                (Some(text), _) => MatchInput::Text(text),
                (None, Some(path)) => MatchInput::File(path),
                (None, None) if sample => MatchInput::Sample,
                (None, None) => MatchInput::Text(String::new()),
            };
            commands::matcher::run(&source, input)
        }
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
