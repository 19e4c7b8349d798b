pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "querent",
    about = "Querent operator CLI",
    long_about = "Apply migrations, inspect configuration, and load or inspect tenant schemas.",
    after_help = "Examples:\n  querent migrate\n  querent config\n  querent import --tenant 683c317abb9177f8bc5896fe --file schema.json\n  querent schema --tenant 683c317abb9177f8bc5896fe"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Print the flattened field vocabulary of one tenant")]
    Schema {
        #[arg(long, help = "Tenant (company) id")]
        tenant: String,
    },
    #[command(about = "Load entity and template documents for one tenant from a JSON file")]
    Import {
        #[arg(long, help = "Tenant (company) id")]
        tenant: String,
        #[arg(long, help = "JSON file with `entities` and `templates` arrays")]
        file: PathBuf,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Schema { tenant } => commands::schema::run(&tenant),
        Command::Import { tenant, file } => commands::import::run(&tenant, &file),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
