pub mod bootstrap;
pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "knowbot",
    about = "Knowbot operator CLI",
    long_about = "Ask questions against a deployment bundle, chat interactively, evaluate labelled cases, and inspect readiness and configuration.",
    after_help = "Examples:\n  knowbot ask \"How do I reset my password?\" --trace\n  knowbot chat\n  knowbot eval --cases test_cases.json --output evaluation_results.json\n  knowbot doctor --json\n  knowbot config"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Answer a single question in a fresh session and print the outcome as JSON")]
    Ask {
        #[arg(help = "The question to ask")]
        query: String,
        #[arg(long, help = "Include stage timings and decision flags")]
        trace: bool,
    },
    #[command(about = "Start an interactive session on stdin/stdout")]
    Chat {
        #[arg(long, help = "Print the trace record after every turn")]
        trace: bool,
    },
    #[command(about = "Evaluate intent, knowledge and action policy against labelled cases")]
    Eval {
        #[arg(long, help = "JSON array of labelled cases")]
        cases: PathBuf,
        #[arg(long, help = "Write per-case results as JSON to this file")]
        output: Option<PathBuf>,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, the deployment bundle and generation readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Ask { query, trace } => commands::ask::run(&query, trace),
        Command::Chat { trace } => commands::chat::run(trace),
        Command::Eval { cases, output } => commands::eval::run(&cases, output.as_deref()),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            let (passed, output) = commands::doctor::run(json);
            commands::CommandResult { exit_code: if passed { 0 } else { 1 }, output }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
