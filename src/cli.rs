use clap::error::ErrorKind;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Build, run and health-check the local MCP server fleet through docker compose.
#[derive(Debug, Parser)]
#[command(
    name = "mcp-stack",
    version,
    disable_help_subcommand = true,
    allow_external_subcommands = true
)]
pub struct Cli {
    /// Directory to start the compose-file search from (defaults to the current directory)
    #[arg(long, global = true, value_name = "DIR")]
    pub project_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<StackCommand>,
}

/// Positional words after the command. The first argument alone selects the behaviour,
/// so anything after it is accepted and ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Args)]
pub struct Extra {
    #[arg(hide = true)]
    pub rest: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum StackCommand {
    /// Build the container images
    Build(Extra),
    /// Start the services unless they are already up and healthy
    Run(Extra),
    /// Stop all services
    Stop(Extra),
    /// Restart all services
    Restart(Extra),
    /// Follow logs, optionally for one service
    Logs {
        service: Option<String>,
        #[arg(hide = true)]
        rest: Vec<String>,
    },
    /// Show service states
    Status(Extra),
    /// Tear down the stack and prune unused docker resources
    Clean(Extra),
    /// Probe every service's health endpoint, then show status
    Test(Extra),
    /// Print usage
    Help(Extra),
    #[command(external_subcommand)]
    Unknown(Vec<String>),
}

/// Exit code for an argument error: help and version output succeed, anything else is
/// reported like an unknown command.
pub fn error_exit_code(err: &clap::Error) -> i32 {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => 1,
    }
}

pub fn usage() -> String {
    format!(
        "MCP server stack manager

Usage: mcp-stack [--project-dir DIR] [-v] <command> [service]

Commands:
  build           Build the container images
  run             Start the services (skipped when already running and healthy)
  stop            Stop all services
  restart         Restart all services
  logs [service]  Follow logs (all services, or one, e.g. `logs tavily`)
  status          Show service states
  clean           Remove stopped containers and unused images
  test            Run the health check against every service
  help            Show this help

Environment:
  DOCKER_BIN, COMPOSE_FILE_NAME, ENV_FILE, COMPOSE_PROFILE,
  MCP_SERVICES, MCP_SCAN_PORTS, HEALTH_TIMEOUT_MS, RUST_LOG

Version: {}",
        env!("CARGO_PKG_VERSION")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("mcp-stack").chain(args.iter().copied())).unwrap()
    }

    fn unit(cmd: fn(Extra) -> StackCommand) -> Option<StackCommand> {
        Some(cmd(Extra::default()))
    }

    #[test]
    fn parses_known_commands() {
        assert_eq!(parse(&["build"]).command, unit(StackCommand::Build));
        assert_eq!(parse(&["run"]).command, unit(StackCommand::Run));
        assert_eq!(parse(&["help"]).command, unit(StackCommand::Help));
        assert_eq!(parse(&[]).command, None);
    }

    #[test]
    fn logs_takes_optional_service() {
        assert_eq!(
            parse(&["logs"]).command,
            Some(StackCommand::Logs {
                service: None,
                rest: vec![]
            })
        );
        assert_eq!(
            parse(&["logs", "tavily"]).command,
            Some(StackCommand::Logs {
                service: Some("tavily".to_string()),
                rest: vec![]
            })
        );
    }

    #[test]
    fn words_after_the_command_are_ignored() {
        assert!(matches!(parse(&["build", "extra"]).command, Some(StackCommand::Build(_))));
        assert!(matches!(
            parse(&["logs", "tavily", "extra"]).command,
            Some(StackCommand::Logs { service: Some(ref s), .. }) if s == "tavily"
        ));
    }

    #[test]
    fn bad_flags_exit_with_one_and_help_with_zero() {
        let bad = Cli::try_parse_from(["mcp-stack", "-x"]).unwrap_err();
        assert_eq!(error_exit_code(&bad), 1);
        let help = Cli::try_parse_from(["mcp-stack", "--help"]).unwrap_err();
        assert_eq!(error_exit_code(&help), 0);
        let version = Cli::try_parse_from(["mcp-stack", "--version"]).unwrap_err();
        assert_eq!(error_exit_code(&version), 0);
    }

    #[test]
    fn unknown_commands_are_captured() {
        assert_eq!(
            parse(&["deploy", "now"]).command,
            Some(StackCommand::Unknown(vec!["deploy".to_string(), "now".to_string()]))
        );
    }

    #[test]
    fn global_flags_after_command() {
        let cli = parse(&["status", "-v", "--project-dir", "/tmp/stack"]);
        assert!(cli.verbose);
        assert_eq!(cli.project_dir, Some(PathBuf::from("/tmp/stack")));
    }

    #[test]
    fn clap_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
