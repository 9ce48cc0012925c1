use crate::cli::commands::{Cli, Commands, ListenArgs, SendArgs};
use crate::error::ChatError;
use crate::events::{EventSink, HistorySink, StdoutSink, TracingSink};
use crate::flows::{ListenFlow, SendFlow, SendReport, SendRequest};
use crate::messages::wire::{LineCodec, WireConfig, DEFAULT_MAX_LINE_LENGTH};
use crate::network::{ResilientSession, RetryPolicy, ATTEMPTS_BEFORE_DELAY, ATTEMPT_DELAY_SECS};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub const DEFAULT_SERVER_HOST: &str = "minechat.dvmn.org";
pub const DEFAULT_LISTEN_SERVER_PORT: u16 = 5000;
pub const DEFAULT_SEND_SERVER_PORT: u16 = 5050;
pub const DEFAULT_HISTORY_FILE: &str = "minechat.history";
/// History path that selects stdout instead of a file
pub const STDOUT_HISTORY: &str = "-";

/// Connect retry settings as they appear in the config file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub attempts_before_delay: u32,
    pub attempt_delay_secs: u64,
    pub connect_timeout_secs: u64,
    pub max_attempts: Option<u32>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts_before_delay: ATTEMPTS_BEFORE_DELAY,
            attempt_delay_secs: ATTEMPT_DELAY_SECS,
            connect_timeout_secs: 10,
            max_attempts: None,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts_before_delay: self.attempts_before_delay,
            attempt_delay: Duration::from_secs(self.attempt_delay_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs.max(1)),
            max_attempts: self.max_attempts.filter(|max| *max > 0),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Chat server host
    pub host: String,
    /// Port the listener reads chat history from
    pub listen_port: u16,
    /// Port messages are posted to
    pub send_port: u16,
    /// Where the listener appends history
    pub history_file: PathBuf,
    pub debug: bool,
    /// Saved auth token used when none is given on the command line
    pub token: Option<String>,
    pub max_line_length: usize,
    pub retry: RetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_SERVER_HOST.to_string(),
            listen_port: DEFAULT_LISTEN_SERVER_PORT,
            send_port: DEFAULT_SEND_SERVER_PORT,
            history_file: PathBuf::from(DEFAULT_HISTORY_FILE),
            debug: false,
            token: None,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            retry: RetryConfig::default(),
        }
    }
}

impl Config {
    /// Get the default config directory
    pub fn default_config_dir() -> Result<PathBuf> {
        ProjectDirs::from("org", "dvmn", "minechat")
            .map(|proj_dirs| proj_dirs.config_dir().to_path_buf())
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))
    }

    /// Get the default config file path
    pub fn default_config_file() -> Result<PathBuf> {
        Ok(Self::default_config_dir()?.join("config.toml"))
    }

    /// Parse a config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse configuration file {}", path.display()))
    }

    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, the default file is used if present,
    /// otherwise built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        match Self::default_config_file() {
            Ok(default_file) if default_file.exists() => Self::from_file(&default_file),
            _ => Ok(Self::default()),
        }
    }

    /// Config file, then env/CLI values for the chosen subcommand
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let mut config = Self::load(cli.config.as_deref())?;
        if cli.debug {
            config.debug = true;
        }
        match &cli.command {
            Commands::Listen(args) => config.apply_listen_args(args),
            Commands::Send(args) => config.apply_send_args(args),
        }
        Ok(config)
    }

    pub fn apply_listen_args(&mut self, args: &ListenArgs) {
        if let Some(host) = &args.host {
            self.host = host.clone();
        }
        if let Some(port) = args.port {
            self.listen_port = port;
        }
        if let Some(history) = &args.history {
            self.history_file = history.clone();
        }
    }

    pub fn apply_send_args(&mut self, args: &SendArgs) {
        if let Some(host) = &args.host {
            self.host = host.clone();
        }
        if let Some(port) = args.port {
            self.send_port = port;
        }
        if let Some(token) = &args.token {
            self.token = Some(token.clone());
        }
    }

    pub fn codec(&self) -> LineCodec {
        LineCodec::new(WireConfig::with_max_line_length(self.max_line_length))
    }
}

/// Main application state
pub struct App {
    pub config: Config,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    fn history_sink(&self) -> Result<Arc<dyn EventSink>> {
        let path = &self.config.history_file;
        if path.as_os_str() == STDOUT_HISTORY {
            return Ok(Arc::new(StdoutSink::stdout()));
        }
        let history = HistorySink::open_history(path)
            .with_context(|| format!("Failed to open history file {}", path.display()))?;
        Ok(Arc::new(history))
    }

    /// Relay chat into the history file (or stdout for `-`) until ctrl-c
    pub async fn listen(&self) -> Result<()> {
        let sink = self.history_sink()?;

        let session = ResilientSession::new(self.config.host.clone(), self.config.listen_port, sink)
            .with_policy(self.config.retry.policy())
            .with_codec(self.config.codec());
        let mut flow = ListenFlow::new(session);

        info!(
            host = %self.config.host,
            port = self.config.listen_port,
            history = %self.config.history_file.display(),
            "Listening to chat"
        );

        tokio::select! {
            _ = flow.run() => {}
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to wait for ctrl-c")?;
                info!("Shutting down listener");
            }
        }
        Ok(())
    }

    /// Register (if `nickname` is set) or use the configured token, then post `message`
    pub async fn send(
        &self,
        message: &str,
        nickname: Option<&str>,
    ) -> std::result::Result<SendReport, ChatError> {
        let request = SendRequest {
            nickname: nickname.map(str::to_string),
            token: self.config.token.clone(),
            message: message.to_string(),
        };

        SendFlow::new(
            self.config.host.clone(),
            self.config.send_port,
            Arc::new(TracingSink),
        )
        .with_policy(self.config.retry.policy())
        .with_codec(self.config.codec())
        .run(request)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.host, "minechat.dvmn.org");
        assert_eq!(config.listen_port, 5000);
        assert_eq!(config.send_port, 5050);
        assert_eq!(config.history_file, PathBuf::from("minechat.history"));
        assert_eq!(config.retry.policy(), RetryPolicy::default());
    }

    #[test]
    fn test_partial_config_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "host = \"localhost\"\n\n[retry]\nmax_attempts = 5\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.listen_port, DEFAULT_LISTEN_SERVER_PORT);
        assert_eq!(config.retry.max_attempts, Some(5));
        assert_eq!(config.retry.attempts_before_delay, ATTEMPTS_BEFORE_DELAY);
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "listen_port = \"not a port\"").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_cli_overrides_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "host = \"from-file\"\nsend_port = 6000\ntoken = \"file-token\"\n")
            .unwrap();

        let cli = Cli::try_parse_from([
            "minechat",
            "--config",
            path.to_str().unwrap(),
            "send",
            "--host",
            "from-cli",
            "--token",
            "cli-token",
            "--message",
            "hi",
        ])
        .unwrap();
        let config = Config::resolve(&cli).unwrap();

        assert_eq!(config.host, "from-cli");
        assert_eq!(config.send_port, 6000);
        assert_eq!(config.token.as_deref(), Some("cli-token"));
    }

    #[test]
    fn test_listen_overrides() {
        let mut config = Config::default();
        config.apply_listen_args(&ListenArgs {
            host: None,
            port: Some(5001),
            history: Some(PathBuf::from("chat.log")),
        });
        assert_eq!(config.host, DEFAULT_SERVER_HOST);
        assert_eq!(config.listen_port, 5001);
        assert_eq!(config.history_file, PathBuf::from("chat.log"));
    }

    #[test]
    fn test_history_sink_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("chat.log");
        let app = App::new(Config {
            history_file: path.clone(),
            ..Config::default()
        });

        app.history_sink().unwrap().record("hello");

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.ends_with("] hello\n"));
    }

    #[test]
    fn test_dash_history_selects_stdout() {
        let app = App::new(Config {
            history_file: PathBuf::from(STDOUT_HISTORY),
            ..Config::default()
        });
        assert!(app.history_sink().is_ok());
        assert!(!Path::new(STDOUT_HISTORY).exists());
    }

    #[test]
    fn test_zero_max_attempts_means_unbounded() {
        let retry = RetryConfig {
            max_attempts: Some(0),
            ..RetryConfig::default()
        };
        assert_eq!(retry.policy().max_attempts, None);
    }

    #[tokio::test]
    async fn test_send_without_token_fails_before_connecting() {
        let app = App::new(Config {
            host: "127.0.0.1".to_string(),
            send_port: 1,
            ..Config::default()
        });
        let err = app.send("hello", None).await.unwrap_err();
        assert!(matches!(err, ChatError::Configuration { .. }));
    }
}
