use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_COMPOSE_FILE: &str = "docker-compose.yml";
pub const DEFAULT_ENV_FILE: &str = ".env";
pub const DEFAULT_PROFILE: &str = "mcp";
pub const DEFAULT_SCAN_PORTS: [u16; 3] = [3000, 3001, 3002];
pub const DEFAULT_HEALTH_TIMEOUT_MS: u64 = 3000;

/// One MCP server in the compose fleet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    pub name: String,
    pub container: String,
    pub port: u16,
    pub health_path: String,
    pub mcp_path: String,
    pub required_env: Vec<String>,
}

impl ServiceSpec {
    pub fn new(name: &str, port: u16, health_path: &str) -> Self {
        Self {
            name: name.to_string(),
            container: name.to_string(),
            port,
            health_path: normalize_path(health_path),
            mcp_path: "/mcp/".to_string(),
            required_env: vec![],
        }
    }

    pub fn tavily() -> Self {
        let mut s = Self::new("tavily", 3000, "/health");
        s.required_env = vec!["TAVILY_API_KEY".to_string()];
        s
    }

    pub fn health_url(&self) -> String {
        format!("http://localhost:{}{}", self.port, self.health_path)
    }

    pub fn mcp_url(&self) -> String {
        format!("http://localhost:{}{}", self.port, self.mcp_path)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub cwd: PathBuf,
    pub docker_bin: String,
    pub compose_file: PathBuf,
    pub env_file: PathBuf,
    pub compose_profile: String,
    pub services: Vec<ServiceSpec>,
    pub scan_ports: Vec<u16>,
    pub health_timeout: Duration,
}

impl Config {
    pub fn compose_file_exists(&self) -> bool {
        self.compose_file.exists()
    }

    pub fn env_file_exists(&self) -> bool {
        self.env_file.exists()
    }

    pub fn service(&self, name: &str) -> Option<&ServiceSpec> {
        self.services.iter().find(|s| s.name == name)
    }
}

pub fn resolve_docker_binary() -> String {
    std::env::var("DOCKER_BIN").unwrap_or_else(|_| "docker".to_string())
}

pub fn compose_file_name() -> String {
    non_empty_var("COMPOSE_FILE_NAME").unwrap_or_else(|| DEFAULT_COMPOSE_FILE.to_string())
}

/// Walk up until a directory holding the compose file is found; otherwise stay in `start_dir`.
pub fn find_project_root(start_dir: &Path, compose_name: &str) -> PathBuf {
    let mut dir = start_dir.to_path_buf();

    for _ in 0..12 {
        if dir.join(compose_name).exists() {
            return dir;
        }
        match dir.parent() {
            Some(parent) if parent != dir => dir = parent.to_path_buf(),
            _ => break,
        }
    }

    start_dir.to_path_buf()
}

/// Build the runtime settings from the process environment.
pub fn get_config(root: &Path) -> Config {
    let compose_name = compose_file_name();
    let env_name = non_empty_var("ENV_FILE").unwrap_or_else(|| DEFAULT_ENV_FILE.to_string());

    let services = non_empty_var("MCP_SERVICES")
        .map(|raw| parse_services(&raw))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| vec![ServiceSpec::tavily()]);

    let scan_ports = non_empty_var("MCP_SCAN_PORTS")
        .map(|raw| parse_ports(&raw))
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| DEFAULT_SCAN_PORTS.to_vec());

    let health_timeout_ms = std::env::var("HEALTH_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(DEFAULT_HEALTH_TIMEOUT_MS);

    Config {
        cwd: root.to_path_buf(),
        docker_bin: resolve_docker_binary(),
        compose_file: root.join(compose_name),
        env_file: root.join(env_name),
        compose_profile: non_empty_var("COMPOSE_PROFILE")
            .unwrap_or_else(|| DEFAULT_PROFILE.to_string()),
        services,
        scan_ports,
        health_timeout: Duration::from_millis(health_timeout_ms),
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn normalize_path(p: &str) -> String {
    let p = p.trim();
    if p.starts_with('/') {
        p.to_string()
    } else {
        format!("/{p}")
    }
}

/// Parse MCP_SERVICES.
/// Format (one per line, or `;`-separated):
///   name:port[:health_path]
/// Ignores empty entries and comments (#). The well-known `tavily` entry keeps its
/// required API key.
pub fn parse_services(raw: &str) -> Vec<ServiceSpec> {
    let mut services: Vec<ServiceSpec> = Vec::new();

    for entry in raw
        .split(['\n', ';'])
        .map(|l| l.trim())
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
    {
        let mut parts = entry.splitn(3, ':').map(str::trim);
        let name = parts.next().unwrap_or_default();
        let port = parts.next().and_then(|p| p.parse::<u16>().ok()).filter(|p| *p > 0);
        let health = parts.next().filter(|h| !h.is_empty()).unwrap_or("/health");

        let Some(port) = port.filter(|_| !name.is_empty()) else {
            tracing::warn!(entry, "skipping malformed service entry");
            continue;
        };
        if services.iter().any(|s| s.name == name) {
            tracing::warn!(name, "duplicate service entry ignored");
            continue;
        }

        let mut spec = ServiceSpec::new(name, port, health);
        if name == "tavily" {
            spec.required_env = ServiceSpec::tavily().required_env;
        }
        services.push(spec);
    }
    services
}

/// Comma or whitespace separated TCP ports; invalid tokens are dropped.
pub fn parse_ports(raw: &str) -> Vec<u16> {
    let mut ports = Vec::new();
    for tok in raw.split([',', ' ']).map(str::trim).filter(|t| !t.is_empty()) {
        match tok.parse::<u16>() {
            Ok(p) if p > 0 && !ports.contains(&p) => ports.push(p),
            Ok(_) => {}
            Err(_) => tracing::warn!(token = tok, "ignoring invalid port"),
        }
    }
    ports
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_service_is_tavily() {
        let s = ServiceSpec::tavily();
        assert_eq!(s.port, 3000);
        assert_eq!(s.container, "tavily");
        assert_eq!(s.health_url(), "http://localhost:3000/health");
        assert_eq!(s.mcp_url(), "http://localhost:3000/mcp/");
        assert_eq!(s.required_env, vec!["TAVILY_API_KEY".to_string()]);
    }

    #[test]
    fn parses_service_lines() {
        let raw = "
            # fleet
            tavily:3000
            search:3001:healthz
        ";
        let services = parse_services(raw);
        assert_eq!(services.len(), 2);
        assert_eq!(services[0].name, "tavily");
        assert_eq!(services[0].health_path, "/health");
        assert_eq!(services[0].required_env, vec!["TAVILY_API_KEY".to_string()]);
        assert_eq!(services[1].port, 3001);
        assert_eq!(services[1].health_path, "/healthz");
        assert!(services[1].required_env.is_empty());
    }

    #[test]
    fn skips_malformed_and_duplicate_services() {
        let services = parse_services("a:0;b:notaport;:3000;c:3002;c:3003");
        assert_eq!(services, vec![ServiceSpec::new("c", 3002, "/health")]);
    }

    #[test]
    fn parses_port_lists() {
        assert_eq!(parse_ports("3000, 3001,3002"), vec![3000, 3001, 3002]);
        assert_eq!(parse_ports("0,x,3000,3000"), vec![3000]);
    }

    #[test]
    fn project_root_walks_up_to_compose_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("docker-compose.yml"), "services: {}\n").unwrap();
        let nested = dir.path().join("src").join("mcp_servers");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_project_root(&nested, "docker-compose.yml"), dir.path());
    }

    #[test]
    fn project_root_falls_back_to_start_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nowhere");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_project_root(&nested, "no-such-compose.yml"), nested);
    }
}
