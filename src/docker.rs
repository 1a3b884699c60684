use crate::env::EnvMap;
use crate::error::{Result, StackError};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Narrow seam over the external tools. Production goes through [`DockerCli`];
/// tests substitute a recording fake.
#[async_trait]
pub trait Runtime: Send + Sync {
    /// Run `<docker> compose -f <file> <args..>` with inherited stdio and return its exit code.
    async fn compose(&self, args: &[&str], env: &EnvMap) -> Result<i32>;

    /// Run `<docker> <args..>` with inherited stdio and return its exit code.
    async fn docker(&self, args: &[&str]) -> Result<i32>;

    /// Capture stdout of an arbitrary tool. `None` when the tool is missing or exits non-zero.
    async fn capture(&self, program: &str, args: &[&str]) -> Option<String>;

    /// The container CLI binary, used for captured queries.
    fn docker_bin(&self) -> &str;
}

#[derive(Debug, Clone)]
pub struct DockerCli {
    pub docker_bin: String,
    pub cwd: PathBuf,
    pub compose_file: PathBuf,
}

impl DockerCli {
    pub fn new(docker_bin: &str, cwd: &Path, compose_file: &Path) -> Self {
        Self {
            docker_bin: docker_bin.to_string(),
            cwd: cwd.to_path_buf(),
            compose_file: compose_file.to_path_buf(),
        }
    }

    async fn status(&self, args: Vec<String>, env: &EnvMap) -> Result<i32> {
        tracing::debug!(bin = %self.docker_bin, ?args, "invoking");
        let status = Command::new(&self.docker_bin)
            .current_dir(&self.cwd)
            .args(&args)
            .envs(env)
            .status()
            .await
            .map_err(|source| StackError::Spawn {
                program: self.docker_bin.clone(),
                source,
            })?;
        Ok(status.code().unwrap_or(if status.success() { 0 } else { 1 }))
    }
}

#[async_trait]
impl Runtime for DockerCli {
    async fn compose(&self, args: &[&str], env: &EnvMap) -> Result<i32> {
        let mut full = vec![
            "compose".to_string(),
            "-f".to_string(),
            self.compose_file.display().to_string(),
        ];
        full.extend(args.iter().map(|a| a.to_string()));
        self.status(full, env).await
    }

    async fn docker(&self, args: &[&str]) -> Result<i32> {
        let full = args.iter().map(|a| a.to_string()).collect();
        self.status(full, &EnvMap::new()).await
    }

    async fn capture(&self, program: &str, args: &[&str]) -> Option<String> {
        let out = Command::new(program)
            .current_dir(&self.cwd)
            .args(args)
            .output()
            .await;
        match out {
            Ok(o) if o.status.success() => {
                Some(String::from_utf8_lossy(&o.stdout).trim_end().to_string())
            }
            Ok(o) => {
                tracing::debug!(program, ?args, code = ?o.status.code(), "command failed");
                None
            }
            Err(e) => {
                tracing::debug!(program, error = %e, "command unavailable");
                None
            }
        }
    }

    fn docker_bin(&self) -> &str {
        &self.docker_bin
    }
}

/// Run a compose action and turn a non-zero exit into an error, aborting the command.
pub async fn compose_checked<R: Runtime + ?Sized>(rt: &R, args: &[&str], env: &EnvMap) -> Result<()> {
    let code = rt.compose(args, env).await?;
    if code == 0 {
        Ok(())
    } else {
        Err(StackError::ActionFailed {
            command: format!("{} compose {}", rt.docker_bin(), args.join(" ")),
            code,
        })
    }
}

pub async fn docker_checked<R: Runtime + ?Sized>(rt: &R, args: &[&str]) -> Result<()> {
    let code = rt.docker(args).await?;
    if code == 0 {
        Ok(())
    } else {
        Err(StackError::ActionFailed {
            command: format!("{} {}", rt.docker_bin(), args.join(" ")),
            code,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContainerSummary {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(rename = "Names")]
    pub names: String,
    #[serde(rename = "State", default)]
    pub state: String,
    #[serde(rename = "Status", default)]
    pub status: String,
}

pub fn container_name(raw_names: &str) -> String {
    // docker ps .Names is a single string (may include comma-separated)
    raw_names
        .split(',')
        .next()
        .unwrap_or("")
        .trim()
        .trim_start_matches('/')
        .to_string()
}

/// Containers currently running, one JSON object per line from `docker ps`.
pub async fn list_running<R: Runtime + ?Sized>(rt: &R) -> Vec<ContainerSummary> {
    let bin = rt.docker_bin().to_string();
    let out = rt
        .capture(&bin, &["ps", "--no-trunc", "--format", "{{json .}}"])
        .await
        .unwrap_or_default();

    out.lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .filter_map(|l| serde_json::from_str::<ContainerSummary>(l).ok())
        .collect()
}

/// Exact name match against the running set. A missing docker CLI counts as not running.
pub async fn is_container_running<R: Runtime + ?Sized>(rt: &R, name: &str) -> bool {
    let hit = list_running(rt)
        .await
        .into_iter()
        .find(|c| container_name(&c.names) == name && (c.state.is_empty() || c.state == "running"));
    if let Some(c) = &hit {
        tracing::debug!(id = %c.id, status = %c.status, name, "container is running");
    }
    hit.is_some()
}

/// Some process holds a listening TCP socket on `port`. Without lsof this reports false.
pub async fn is_port_in_use<R: Runtime + ?Sized>(rt: &R, port: u16) -> bool {
    let target = format!("-iTCP:{port}");
    rt.capture("lsof", &["-nP", target.as_str(), "-sTCP:LISTEN", "-t"])
        .await
        .map(|pids| pids.lines().any(|l| !l.trim().is_empty()))
        .unwrap_or(false)
}


#[cfg(test)]
mod tests {
    use super::fake::FakeRuntime;
    use super::*;

    #[test]
    fn container_name_takes_first_alias() {
        assert_eq!(container_name("/tavily,alias"), "tavily");
        assert_eq!(container_name(" tavily "), "tavily");
    }

    #[tokio::test]
    async fn running_check_requires_exact_name() {
        let rt = FakeRuntime::default().with_running(&["tavily-old", "redis"]);
        assert!(!is_container_running(&rt, "tavily").await);
        assert!(is_container_running(&rt, "redis").await);
    }

    #[tokio::test]
    async fn missing_docker_means_not_running() {
        let rt = FakeRuntime::default();
        assert!(!is_container_running(&rt, "tavily").await);
    }

    #[tokio::test]
    async fn port_check_reads_lsof_pids() {
        let rt = FakeRuntime::default().with_listening(3001);
        assert!(is_port_in_use(&rt, 3001).await);
        assert!(!is_port_in_use(&rt, 3000).await);
    }

    #[tokio::test]
    async fn non_zero_compose_exit_is_an_error() {
        let rt = FakeRuntime::default().failing("compose build", 3);
        let err = compose_checked(&rt, &["build"], &EnvMap::new()).await.unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert_eq!(rt.calls(), vec!["compose build"]);
    }

    #[tokio::test]
    async fn unavailable_tool_captures_nothing() {
        let rt = DockerCli::new("mcp-stack-no-such-binary", Path::new("."), Path::new("x.yml"));
        assert_eq!(rt.capture("mcp-stack-no-such-binary", &["ps"]).await, None);
        assert!(!is_container_running(&rt, "tavily").await);
    }

    #[tokio::test]
    async fn spawn_failure_is_reported() {
        let rt = DockerCli::new("mcp-stack-no-such-binary", Path::new("."), Path::new("x.yml"));
        let err = rt.compose(&["ps"], &EnvMap::new()).await.unwrap_err();
        assert!(matches!(err, StackError::Spawn { .. }));
    }
}
