// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::domain::runtime::HealthProbe;

/// Probes `GET {endpoint}/health`; any 2xx within the timeout is healthy
#[derive(Clone, Default)]
pub struct HttpHealthProbe {
    client: Client,
}

impl HttpHealthProbe {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self, endpoint: &str, timeout: Duration) -> bool {
        let url = format!("{}/health", endpoint.trim_end_matches('/'));
        match self.client.get(&url).timeout(timeout).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                debug!(url = %url, status = %response.status(), "Health probe failed");
                false
            }
            Err(e) => {
                debug!(url = %url, error = %e, "Health probe failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_probe_success_and_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/health")
            .with_status(200)
            .with_body(r#"{"status":"ok"}"#)
            .create_async()
            .await;

        let probe = HttpHealthProbe::new();
        assert!(probe.probe(&server.url(), Duration::from_secs(1)).await);

        let mut failing = mockito::Server::new_async().await;
        failing
            .mock("GET", "/health")
            .with_status(503)
            .create_async()
            .await;
        assert!(!probe.probe(&failing.url(), Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_unhealthy() {
        let probe = HttpHealthProbe::new();
        assert!(!probe.probe("http://127.0.0.1:1", Duration::from_millis(200)).await);
    }
}
