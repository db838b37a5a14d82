mod daemon;
mod interactive;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};

use daybook_config::{AppConfig, DEFAULT_CONFIG_PATH};
use daybook_runtime::{DaemonClient, Request, describe_client_error};

#[derive(Debug, Parser)]
#[command(name = "daybook", version, about = "Local journaling daemon")]
struct Cli {
    /// Configuration file (TOML).
    #[arg(long, global = true, value_name = "PATH", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Journal repository root.
    #[arg(long, global = true, value_name = "DIR")]
    repo: Option<String>,
    /// Unix socket path.
    #[arg(long, global = true, value_name = "PATH")]
    socket: Option<String>,
    /// Add a weather line to each new day's header.
    #[arg(long, global = true)]
    with_weather: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the journaling service until SIGINT/SIGTERM.
    Serve,
    /// Type notes directly into the journal, no socket involved.
    Interactive,
    /// Send one note to the running service.
    Add {
        #[arg(required = true, trailing_var_arg = true)]
        message: Vec<String>,
    },
    /// Check that the service is reachable.
    Ping,
}

impl Cli {
    fn load_config(&self) -> Result<AppConfig> {
        let mut config = AppConfig::load_from(&self.config)?;
        if let Some(repo) = &self.repo {
            config.journal.repo = repo.clone();
        }
        if let Some(socket) = &self.socket {
            config.daemon.socket_path = socket.clone();
        }
        if self.with_weather {
            config.journal.with_weather = true;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let Some(command) = &cli.command else {
        Cli::command().print_help()?;
        return Ok(ExitCode::FAILURE);
    };

    let config = cli.load_config()?;
    match command {
        Commands::Serve => {
            daemon::run_service(config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Interactive => {
            interactive::run_interactive(config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Add { message } => {
            logging::init_client_logging(&config.telemetry.log_level);
            Ok(exchange(&config, &Request::add(message.join(" "))).await)
        }
        Commands::Ping => {
            logging::init_client_logging(&config.telemetry.log_level);
            Ok(exchange(&config, &Request::ping()).await)
        }
    }
}

/// One connection, one reply.  Prints the raw reply or a diagnostic.
async fn exchange(config: &AppConfig, request: &Request) -> ExitCode {
    let client = DaemonClient::new(&config.daemon.socket_path);
    match client.send(request).await {
        Ok(response) => {
            println!("{response}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            println!("{}", describe_client_error(&err));
            ExitCode::FAILURE
        }
    }
}
