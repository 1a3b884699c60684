use crate::cli::{self, StackCommand};
use crate::config::{Config, ServiceSpec};
use crate::docker::{self, Runtime};
use crate::env::{self, EnvMap};
use crate::error::Result;
use crate::health::HealthProbe;
use crate::output::Printer;
use chrono::Local;

/// How a command finished when no external action failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Done,
    /// Every service was already up and healthy; nothing was started.
    AlreadyRunning,
    /// A scanned port is held by something that does not answer the health check.
    PortConflict(u16),
    /// The compose file is missing, or `logs` named an unknown service.
    Skipped,
    UnknownCommand(String),
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::PortConflict(_) | Outcome::UnknownCommand(_) => 1,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Files {
    env: bool,
    compose: bool,
}

pub struct Stack<R, H> {
    cfg: Config,
    runtime: R,
    probe: H,
    out: Printer,
}

impl<R: Runtime, H: HealthProbe> Stack<R, H> {
    pub fn new(cfg: Config, runtime: R, probe: H) -> Self {
        Self {
            cfg,
            runtime,
            probe,
            out: Printer::default(),
        }
    }

    pub async fn dispatch(&self, command: Option<StackCommand>) -> Result<Outcome> {
        match command {
            Some(StackCommand::Build(_)) => self.build().await,
            Some(StackCommand::Run(_)) => self.run().await,
            Some(StackCommand::Stop(_)) => self.stop().await,
            Some(StackCommand::Restart(_)) => self.restart().await,
            Some(StackCommand::Logs { service, .. }) => self.logs(service.as_deref()).await,
            Some(StackCommand::Status(_)) => self.status().await,
            Some(StackCommand::Clean(_)) => self.clean().await,
            Some(StackCommand::Test(_)) => self.test().await,
            Some(StackCommand::Help(_)) | None => {
                self.out.plain(&cli::usage());
                Ok(Outcome::Done)
            }
            Some(StackCommand::Unknown(args)) => {
                let name = args.first().cloned().unwrap_or_default();
                self.out.error(&format!("Unknown command: {name}"));
                self.out.plain(&cli::usage());
                Ok(Outcome::UnknownCommand(name))
            }
        }
    }

    fn check_files(&self) -> Files {
        let files = Files {
            env: self.cfg.env_file_exists(),
            compose: self.cfg.compose_file_exists(),
        };
        if !files.env {
            self.out.warn(&format!(
                "{} not found; services may be missing API keys",
                self.cfg.env_file.display()
            ));
        }
        if !files.compose {
            self.out
                .warn(&format!("{} not found", self.cfg.compose_file.display()));
        }
        files
    }

    fn load_env(&self, files: Files) -> Result<EnvMap> {
        let vars = if files.env {
            env::load_env_file(&self.cfg.env_file)?
        } else {
            EnvMap::new()
        };

        for (service, key) in self.missing_required(&vars) {
            self.out
                .warn(&format!("{key} is not set; {service} will not work"));
        }
        Ok(vars)
    }

    /// (service, key) pairs whose required key is neither in `vars` nor in the process env.
    fn missing_required<'a>(&'a self, vars: &EnvMap) -> Vec<(&'a str, &'a str)> {
        self.cfg
            .services
            .iter()
            .flat_map(|svc| {
                svc.required_env
                    .iter()
                    .filter(|key| env::get_value(vars, key).is_none())
                    .map(move |key| (svc.name.as_str(), key.as_str()))
            })
            .collect()
    }

    async fn compose(&self, args: &[&str], env: &EnvMap) -> Result<()> {
        docker::compose_checked(&self.runtime, args, env).await
    }

    pub async fn build(&self) -> Result<Outcome> {
        let files = self.check_files();
        let env = self.load_env(files)?;
        if !files.compose {
            tracing::debug!("no compose file, skipping build");
            return Ok(Outcome::Skipped);
        }

        self.out.info("Building images...");
        self.compose(&["build"], &env).await?;
        self.out.success("Build complete");
        Ok(Outcome::Done)
    }

    pub async fn run(&self) -> Result<Outcome> {
        let files = self.check_files();
        let env = self.load_env(files)?;

        if self.all_services_healthy().await {
            self.out.success("MCP servers are already running and healthy");
            self.connection_info();
            return Ok(Outcome::AlreadyRunning);
        }

        for &port in &self.cfg.scan_ports {
            if !docker::is_port_in_use(&self.runtime, port).await {
                continue;
            }
            let path = self.health_path_for(port);
            if self.probe.is_healthy(port, path).await {
                self.out
                    .info(&format!("Port {port} is served by a healthy MCP server"));
            } else {
                self.out.warn(&format!(
                    "Port {port} is already in use by another process; stop it or change the port mapping"
                ));
                return Ok(Outcome::PortConflict(port));
            }
        }

        if !files.compose {
            tracing::debug!("no compose file, skipping up");
            return Ok(Outcome::Skipped);
        }

        self.out.info(&format!(
            "Starting services (profile: {})...",
            self.cfg.compose_profile
        ));
        self.compose(
            &["--profile", self.cfg.compose_profile.as_str(), "up", "-d"],
            &env,
        )
        .await?;
        self.out.success("Services started");
        self.connection_info();
        Ok(Outcome::Done)
    }

    pub async fn stop(&self) -> Result<Outcome> {
        self.out.info("Stopping services...");
        self.compose(&["stop"], &EnvMap::new()).await?;
        self.out.success("Services stopped");
        Ok(Outcome::Done)
    }

    pub async fn restart(&self) -> Result<Outcome> {
        let files = self.check_files();
        let env = self.load_env(files)?;
        if !files.compose {
            tracing::debug!("no compose file, skipping restart");
            return Ok(Outcome::Skipped);
        }

        self.out.info("Restarting services...");
        self.compose(&["restart"], &env).await?;
        self.out.success("Services restarted");
        Ok(Outcome::Done)
    }

    pub async fn logs(&self, service: Option<&str>) -> Result<Outcome> {
        match service {
            None => {
                self.compose(&["logs", "-f"], &EnvMap::new()).await?;
                Ok(Outcome::Done)
            }
            Some(name) if self.cfg.service(name).is_some() => {
                self.compose(&["logs", "-f", name], &EnvMap::new()).await?;
                Ok(Outcome::Done)
            }
            Some(name) => {
                tracing::debug!(name, "logs requested for unknown service");
                Ok(Outcome::Skipped)
            }
        }
    }

    pub async fn status(&self) -> Result<Outcome> {
        self.out.header("Service status");
        self.compose(&["ps"], &EnvMap::new()).await?;
        Ok(Outcome::Done)
    }

    pub async fn clean(&self) -> Result<Outcome> {
        self.out.info("Removing containers and orphans...");
        self.compose(&["down", "--remove-orphans"], &EnvMap::new())
            .await?;
        self.out.info("Pruning unused docker resources...");
        docker::docker_checked(&self.runtime, &["system", "prune", "-f"]).await?;
        self.out.success("Cleanup complete");
        Ok(Outcome::Done)
    }

    pub async fn test(&self) -> Result<Outcome> {
        self.out.header("Health check");
        for svc in &self.cfg.services {
            let stamp = Local::now().format("%H:%M:%S");
            if self.probe.is_healthy(svc.port, &svc.health_path).await {
                self.out
                    .success(&format!("[{stamp}] {} passed ({})", svc.name, svc.health_url()));
            } else {
                self.out
                    .error(&format!("[{stamp}] {} failed ({})", svc.name, svc.health_url()));
            }
        }
        self.status().await
    }

    async fn service_healthy(&self, svc: &ServiceSpec) -> bool {
        docker::is_container_running(&self.runtime, &svc.container).await
            && self.probe.is_healthy(svc.port, &svc.health_path).await
    }

    async fn all_services_healthy(&self) -> bool {
        if self.cfg.services.is_empty() {
            return false;
        }
        for svc in &self.cfg.services {
            if !self.service_healthy(svc).await {
                return false;
            }
        }
        true
    }

    fn health_path_for(&self, port: u16) -> &str {
        self.cfg
            .services
            .iter()
            .find(|s| s.port == port)
            .map(|s| s.health_path.as_str())
            .unwrap_or("/health")
    }

    fn connection_info(&self) {
        self.out.header("Connection info");
        for svc in &self.cfg.services {
            self.out.detail("service", &svc.name);
            self.out.detail("mcp", &svc.mcp_url());
            self.out.detail("health", &svc.health_url());
        }
    }
}
