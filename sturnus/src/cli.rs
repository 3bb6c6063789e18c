//! CLI argument definitions using clap.

use clap::{Parser, Subcommand};
use eyre::Result;

#[derive(Debug, Parser)]
#[command(name = "stur")]
#[command(about = "CTC acoustic model training and evaluation")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Train an acoustic model over a labeled corpus
    Train(crate::train::Args),

    /// Evaluate an existing checkpoint and report WER/LER
    Eval(crate::eval::Args),
}

/// Execute CLI command - separated for testing.
pub fn run(cli: Cli) -> Result<()> {
    tracing::debug!(?cli, "parsed arguments");

    match cli.command {
        Commands::Train(args) => crate::train::execute(args.try_into()?),
        Commands::Eval(args) => crate::eval::execute(args.try_into()?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::train::Config;

    #[test]
    fn parses_train_defaults() {
        let cli = Cli::parse_from(["stur", "train"]);

        match &cli.command {
            Commands::Train(args) => {
                assert_eq!(args.arch, 0);
                assert_eq!(args.batch_size, 2);
                assert_eq!(args.epochs, 40);
                assert_eq!(args.train_steps, 0);
                assert_eq!(args.opt, "sgd");
                assert!((args.learning_rate - 0.01).abs() < 1e-9);
            }
            _ => panic!("unexpected command: {:?}", cli.command),
        }
    }

    #[test]
    fn parses_train_with_overrides() {
        let cli = Cli::parse_from([
            "stur",
            "train",
            "--train-files",
            "a.csv,b.csv",
            "--arch",
            "2",
            "--opt",
            "nadam",
            "--epochs",
            "3",
            "--name",
            "run1",
        ]);

        match &cli.command {
            Commands::Train(args) => {
                assert_eq!(args.train_files, "a.csv,b.csv");
                assert_eq!(args.arch, 2);
                assert_eq!(args.opt, "nadam");
                assert_eq!(args.epochs, 3);
                assert_eq!(args.name.as_deref(), Some("run1"));
            }
            _ => panic!("unexpected command: {:?}", cli.command),
        }
    }

    #[test]
    fn parses_eval_command() {
        let cli = Cli::parse_from([
            "stur",
            "eval",
            "--test-files",
            "test.csv",
            "--load-checkpoint",
            "checkpoints/run1",
        ]);

        match &cli.command {
            Commands::Eval(args) => {
                assert_eq!(args.test_files, "test.csv");
                assert_eq!(args.load_checkpoint.to_str(), Some("checkpoints/run1"));
            }
            _ => panic!("unexpected command: {:?}", cli.command),
        }
    }

    #[test]
    fn eval_requires_a_checkpoint_path() {
        assert!(Cli::try_parse_from(["stur", "eval", "--test-files", "t.csv"]).is_err());
    }

    #[test]
    fn unknown_optimizer_fails_config_resolution() {
        let cli = Cli::parse_from(["stur", "train", "--opt", "rmsprop"]);

        let Commands::Train(args) = cli.command else {
            panic!("expected train command");
        };

        let resolved: Result<Config, _> = args.try_into();
        let message = format!("{}", resolved.unwrap_err());
        assert!(message.contains("rmsprop"), "message: {message}");
    }

    #[test]
    fn unknown_architecture_fails_config_resolution() {
        let cli = Cli::parse_from(["stur", "train", "--arch", "9"]);

        let Commands::Train(args) = cli.command else {
            panic!("expected train command");
        };

        let resolved: Result<Config, _> = args.try_into();
        let message = format!("{}", resolved.unwrap_err());
        assert!(message.contains('9'), "message: {message}");
    }

    #[test]
    fn default_run_name_carries_the_arch() {
        let cli = Cli::parse_from(["stur", "train", "--arch", "5"]);

        let Commands::Train(args) = cli.command else {
            panic!("expected train command");
        };

        let config: Config = args.try_into().unwrap();
        assert!(config.run.name.starts_with("DS5_"), "name: {}", config.run.name);
    }
}
