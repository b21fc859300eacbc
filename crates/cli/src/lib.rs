pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "demande",
    about = "Demande operator CLI",
    long_about = "Operate the enrollment service: migrations, catalog seeding, config inspection, readiness checks, and the pending review queue.",
    after_help = "Examples:\n  demande doctor --json\n  demande config\n  demande pending --limit 20"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic grade catalog and student roster")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, notification delivery settings, and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "List pending enrollment requests, oldest first")]
    Pending {
        #[arg(long, help = "Maximum number of requests to list")]
        limit: Option<u32>,
        #[arg(long, default_value = "cli-operator", help = "Administrator id recorded in logs")]
        actor: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Pending { limit, actor } => commands::pending::run(limit, &actor),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
