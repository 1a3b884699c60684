use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// True iff GET <host>:<port><path> answers 2xx within the timeout.
    async fn is_healthy(&self, port: u16, path: &str) -> bool;
}

#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    host: String,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_host("localhost", timeout)
    }

    pub fn with_host(host: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .no_proxy()
            .build()?;
        Ok(Self {
            client,
            host: host.to_string(),
        })
    }

    pub fn url(&self, port: u16, path: &str) -> String {
        format!("http://{}:{port}{path}", self.host)
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn is_healthy(&self, port: u16, path: &str) -> bool {
        let url = self.url(port, path);
        match self.client.get(&url).send().await {
            Ok(resp) => {
                let ok = resp.status().is_success();
                tracing::debug!(%url, status = resp.status().as_u16(), ok, "health probe");
                ok
            }
            Err(e) => {
                tracing::debug!(%url, error = %e, "health probe failed");
                false
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Reports healthy for a fixed set of ports and records every probe.
    #[derive(Default)]
    pub struct FakeProbe {
        pub healthy_ports: HashSet<u16>,
        pub probes: Mutex<Vec<String>>,
    }

    impl FakeProbe {
        pub fn healthy(ports: &[u16]) -> Self {
            Self {
                healthy_ports: ports.iter().copied().collect(),
                probes: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl HealthProbe for FakeProbe {
        async fn is_healthy(&self, port: u16, path: &str) -> bool {
            self.probes.lock().unwrap().push(format!("{port}{path}"));
            self.healthy_ports.contains(&port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn client_for(server: &MockServer, timeout_ms: u64) -> HttpProbe {
        HttpProbe::with_host(&server.host(), Duration::from_millis(timeout_ms)).unwrap()
    }

    #[tokio::test]
    async fn healthy_on_2xx() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/health");
                then.status(200)
                    .header("Content-Type", "application/json")
                    .json_body(serde_json::json!({"success": true, "data": "OK"}));
            })
            .await;

        let probe = client_for(&server, 2000);
        assert!(probe.is_healthy(server.port(), "/health").await);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn no_content_still_counts_as_success() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/healthz");
                then.status(204);
            })
            .await;

        let probe = client_for(&server, 2000);
        assert!(probe.is_healthy(server.port(), "/healthz").await);
    }

    #[tokio::test]
    async fn server_error_is_unhealthy() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/health");
                then.status(503);
            })
            .await;

        let probe = client_for(&server, 2000);
        assert!(!probe.is_healthy(server.port(), "/health").await);
    }

    #[tokio::test]
    async fn unknown_path_is_unhealthy() {
        let server = MockServer::start_async().await;
        let probe = client_for(&server, 2000);
        assert!(!probe.is_healthy(server.port(), "/health").await);
    }

    #[tokio::test]
    async fn slow_response_times_out() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/health");
                then.status(200).delay(Duration::from_millis(1500));
            })
            .await;

        let probe = client_for(&server, 200);
        assert!(!probe.is_healthy(server.port(), "/health").await);
    }

    #[tokio::test]
    async fn refused_connection_is_unhealthy() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let probe = HttpProbe::with_host("127.0.0.1", Duration::from_millis(500)).unwrap();
        assert!(!probe.is_healthy(port, "/health").await);
    }

    #[test]
    fn builds_localhost_urls() {
        let probe = HttpProbe::new(Duration::from_secs(1)).unwrap();
        assert_eq!(probe.url(3000, "/health"), "http://localhost:3000/health");
    }
}
