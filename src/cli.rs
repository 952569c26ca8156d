// ABOUTME: Command-line interface for the relay binary
// ABOUTME: `run` (default) starts the relay, `check-config` validates and prints the config

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "chatrelay")]
#[command(about = "Relay chat between a Steam group chat, an IRC channel and a Slack channel")]
#[command(version)]
pub struct Cli {
    /// Config file (overrides CHATRELAY_CONFIG_PATH and the default locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Commands {
    /// Start the relay
    Run,
    /// Load and validate the configuration, then print it with secrets redacted
    CheckConfig,
}

impl Cli {
    pub fn selected(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_is_default() {
        let cli = Cli::parse_from(["chatrelay"]);
        assert_eq!(cli.selected(), Commands::Run);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_check_config_with_path() {
        let cli = Cli::parse_from(["chatrelay", "check-config", "--config", "/etc/relay.toml"]);
        assert_eq!(cli.selected(), Commands::CheckConfig);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/relay.toml")));
    }

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        <Cli as CommandFactory>::command().debug_assert();
    }
}
