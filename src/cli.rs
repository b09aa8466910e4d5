use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "fevm-block-producer",
    version,
    about = "Polls a Filecoin EVM node and produces hydrated blocks in order"
)]
pub struct Cli {
    /// Specify the config file path (default: ./config.yaml)
    #[arg(long, default_value = "config.yaml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start producing blocks (default)
    Run,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_default_config_path() {
        let cli = Cli::parse_from(["fevm-block-producer"]);
        assert_eq!(cli.config, PathBuf::from("config.yaml"));
        assert!(cli.command.is_none());
    }

    #[test]
    fn parses_run_with_custom_config() {
        let cli = Cli::parse_from(["fevm-block-producer", "--config", "/etc/producer.yaml", "run"]);
        assert_eq!(cli.config, PathBuf::from("/etc/producer.yaml"));
        assert!(matches!(cli.command, Some(Commands::Run)));
    }
}
