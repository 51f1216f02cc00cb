//! llmcraft CLI: the main entry point.
//!
//! Commands:
//! - `serve`  : Start the HTTP/SSE server
//! - `chat`   : Interactive or single-message chat
//! - `report` : Generate a structured technical report
//! - `review` : Structured review of a source file
//! - `check`  : Run the input guardrail on some text
//! - `config` : Print a starter configuration file

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "llmcraft",
    about = "llmcraft: grounded, guarded, tool-using chat over any OpenAI-compatible model",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: ~/.llmcraft/config.toml)
    #[arg(short, long, global = true, env = "LLMCRAFT_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Chat with the assistant
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Session id; a fresh one is generated when omitted
        #[arg(short, long)]
        session: Option<String>,

        /// Print the reply as it is generated
        #[arg(long)]
        stream: bool,
    },

    /// Generate a structured technical report
    Report {
        /// What the report is about
        topic: String,
    },

    /// Review a source file
    Review {
        /// File to review
        file: PathBuf,

        /// Language of the code (default: python)
        #[arg(short, long)]
        language: Option<String>,
    },

    /// Run the input guardrail on some text
    Check {
        /// Text to screen
        text: String,
    },

    /// Print a starter config file to stdout
    Config,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Serve { port } => commands::serve::run(config_path, port).await?,
        Commands::Chat {
            message,
            session,
            stream,
        } => commands::chat::run(config_path, message, session, stream).await?,
        Commands::Report { topic } => commands::structured::report(config_path, &topic).await?,
        Commands::Review { file, language } => {
            commands::structured::review(config_path, &file, language.as_deref()).await?
        }
        Commands::Check { text } => commands::check::run(config_path, &text)?,
        Commands::Config => commands::config_cmd::print_default(),
    }

    Ok(())
}
