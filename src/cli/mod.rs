pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "arbor")]
#[command(about = "Arbor CLI - compile, inspect and serve endpoint models")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Merge and compile model files, then print a summary")]
    Compile(commands::compile::CompileArgs),

    #[command(about = "List HTTP routes and the real-time routing table")]
    Routes(commands::routes::RoutesArgs),

    #[command(about = "Issue a signed token with the configured secret")]
    Token(commands::token::TokenArgs),

    #[command(about = "Run the API server")]
    Serve(commands::serve::ServeArgs),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command {
        Commands::Compile(args) => commands::compile::handle(args, output_format),
        Commands::Routes(args) => commands::routes::handle(args, output_format),
        Commands::Token(args) => commands::token::handle(args, output_format),
        Commands::Serve(args) => commands::serve::handle(args).await,
    }
}
