pub mod app;
pub mod commands;
pub mod validation;

pub use app::{App, Config, RetryConfig};
pub use commands::{Cli, Commands, ListenArgs, SendArgs};
