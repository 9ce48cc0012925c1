use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "minechat")]
#[command(about = "Listen to and post into a minechat server")]
pub struct Cli {
    /// Path to a TOML config file (defaults to the platform config directory)
    #[arg(short, long, global = true, env = "MINECHAT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Switch on debug output
    #[arg(short, long, global = true, env = "DVMN_DEBUG")]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Relay chat lines into the history file until interrupted
    ///
    /// Example: minechat listen --host minechat.dvmn.org --port 5000
    Listen(ListenArgs),

    /// Register or authorise, then post one message
    ///
    /// Examples:
    ///   minechat send --nickname bob --message "hello"
    ///   minechat send --token 1a2b3c --message "hello"
    Send(SendArgs),
}

#[derive(Args, Debug, Default)]
pub struct ListenArgs {
    /// Host of the chat server
    #[arg(short = 'u', long, env = "DVMN_HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "DVMN_PORT")]
    pub port: Option<u16>,

    /// File where chat history is appended; `-` writes to stdout
    #[arg(short = 'f', long = "filepath", env = "DVMN_CHAT_PATH")]
    pub history: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
pub struct SendArgs {
    /// Host of the chat server
    #[arg(short = 'u', long, env = "DVMN_HOST")]
    pub host: Option<String>,

    /// Port to post messages to
    #[arg(short, long, env = "DVMN_SEND_PORT")]
    pub port: Option<u16>,

    /// Text of the message to send
    #[arg(short, long)]
    pub message: String,

    /// Authorization token
    #[arg(short, long, env = "DVMN_AUTH_TOKEN")]
    pub token: Option<String>,

    /// Register a new user under this name instead of using a token
    #[arg(short, long, conflicts_with = "token")]
    pub nickname: Option<String>,
}
