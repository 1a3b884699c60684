mod cli;
mod commands;
mod config;
mod docker;
mod env;
mod error;
mod health;
mod logger;
mod output;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let args = match cli::Cli::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let code = cli::error_exit_code(&e);
            e.print()?;
            if code != 0 {
                output::Printer::default().plain(&cli::usage());
            }
            std::process::exit(code);
        }
    };
    logger::init_cli_logger(args.verbose);

    let start_dir = match args.project_dir {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let root = config::find_project_root(&start_dir, &config::compose_file_name());
    let cfg = config::get_config(&root);
    tracing::debug!(root = %root.display(), services = cfg.services.len(), "resolved project");

    let runtime = docker::DockerCli::new(&cfg.docker_bin, &cfg.cwd, &cfg.compose_file);
    let probe = health::HttpProbe::new(cfg.health_timeout)?;
    let stack = commands::Stack::new(cfg, runtime, probe);

    let code = match stack.dispatch(args.command).await {
        Ok(outcome) => {
            match &outcome {
                commands::Outcome::PortConflict(port) => {
                    tracing::warn!(port, "start aborted, port held by another process")
                }
                commands::Outcome::UnknownCommand(name) => {
                    tracing::warn!(command = %name, "unknown command")
                }
                _ => {}
            }
            outcome.exit_code()
        }
        Err(e) => {
            tracing::error!(error = %e, "command aborted");
            output::Printer::default().error(&e.to_string());
            e.exit_code()
        }
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
