mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "gembridge")]
#[command(about = "OpenAI-compatible chat API served through the Google AI Studio web app", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize gembridge configuration and directories
    Onboard {
        /// Force overwrite existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Open a visible browser on the persisted profile to sign in
    Login,

    /// Start the OpenAI-compatible gateway (long-running)
    Gateway {
        /// Port to listen on (overrides config gateway.port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (overrides config gateway.host)
        #[arg(long)]
        host: Option<String>,
    },

    /// Send one message through the web app and print the answer
    Chat {
        /// Message to send
        #[arg(short, long)]
        message: String,

        /// Model identifier, e.g. gemini-2.0-flash (keeps the current selection if omitted)
        #[arg(long)]
        model: Option<String>,
    },

    /// Show how a model identifier maps onto the model picker
    Resolve {
        /// Model identifier, e.g. gemini-2.5-pro-preview
        model: String,
    },

    /// Run environment diagnostics
    Doctor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup tracing
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Onboard { force } => {
            commands::onboard::run(force).await?;
        }
        Commands::Login => {
            commands::login::run().await?;
        }
        Commands::Gateway { port, host } => {
            commands::gateway::run(host, port).await?;
        }
        Commands::Chat { message, model } => {
            commands::chat_cmd::run(message, model).await?;
        }
        Commands::Resolve { model } => {
            commands::resolve_cmd::run(&model)?;
        }
        Commands::Doctor => {
            commands::doctor::run().await?;
        }
    }

    Ok(())
}
