//! Parses command-line arguments for the dispute agent.

use std::{fmt::Display, path::PathBuf};

use clap::{crate_version, Parser, ValueEnum};
use dispute_primitives::types::Role;

#[derive(Debug, Parser)]
#[clap(
    name = "dispute-agent",
    about = "Takes part in bisection disputes as the prover or the verifier",
    version = crate_version!()
)]
pub(crate) struct Cli {
    #[arg(
        value_enum,
        help = "Which side of the dispute to take: `prover` (alias: p) or `verifier` (alias: v)"
    )]
    pub mode: OperationMode,

    #[clap(
        long,
        short = 'p',
        help = "The file containing the consensus parameters of the dispute",
        default_value = "params.toml"
    )]
    pub params: PathBuf,

    #[clap(
        long,
        short = 'c',
        help = "The file containing the configuration for the agent",
        default_value = "config.toml"
    )]
    pub config: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OperationMode {
    /// Publish the proof and defend it.
    #[clap(alias = "p")]
    Prover,

    /// Check the proof and challenge it if it does not verify.
    #[clap(alias = "v")]
    Verifier,
}

impl From<OperationMode> for Role {
    fn from(mode: OperationMode) -> Self {
        match mode {
            OperationMode::Prover => Role::Prover,
            OperationMode::Verifier => Role::Verifier,
        }
    }
}

impl Display for OperationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationMode::Prover => write!(f, "prover"),
            OperationMode::Verifier => write!(f, "verifier"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cli() {
        let cli = Cli::parse_from(["dispute-agent", "v", "--config", "agent.toml"]);
        assert_eq!(cli.mode, OperationMode::Verifier);
        assert_eq!(cli.params, PathBuf::from("params.toml"));
        assert_eq!(cli.config, PathBuf::from("agent.toml"));
        assert_eq!(Role::from(cli.mode), Role::Verifier);

        assert!(Cli::try_parse_from(["dispute-agent", "judge"]).is_err());
    }
}
