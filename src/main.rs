use clap::Parser;
use minechat::cli::{App, Cli, Commands, Config};
use minechat::ChatError;
use std::process::ExitCode;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::resolve(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    init_tracing(config.debug);
    let app = App::new(config);

    match cli.command {
        Commands::Listen(_) => match app.listen().await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("Listener stopped: {:#}", e);
                ExitCode::FAILURE
            }
        },
        Commands::Send(args) => match app.send(&args.message, args.nickname.as_deref()).await {
            Ok(report) => {
                if let Some(credentials) = &report.registered {
                    println!("Save your token: {}", credentials.account_hash);
                }
                println!("Message has been sent successfully");
                ExitCode::SUCCESS
            }
            Err(ChatError::ProtocolRejection(reason)) => {
                warn!("Server rejected the request");
                eprintln!("{}", reason);
                ExitCode::FAILURE
            }
            Err(ChatError::Configuration { setting, issue }) => {
                eprintln!("Invalid {}: {}", setting, issue);
                ExitCode::FAILURE
            }
            Err(e) => {
                error!(error = %e, "Send failed");
                eprintln!("Failed to send message: {}", e);
                ExitCode::FAILURE
            }
        },
    }
}
