//! Port reachability probes used by health checks
//!
//! Probes are best effort: any error, refusal or timeout reads as unreachable.

use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use userbox_config::ReachabilityConfig;

#[async_trait]
pub trait ReachabilityCheck: Send + Sync {
    /// Does anything answer HTTP on this port?
    async fn check_web(&self, port: u16) -> bool;

    /// Does anything accept TCP connections on this port?
    async fn check_secondary(&self, port: u16) -> bool;
}

/// Probes ports on a fixed host over the network
pub struct NetworkProbe {
    host: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl NetworkProbe {
    pub fn new(host: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            host: host.into(),
            timeout,
            client,
        })
    }

    pub fn from_config(config: &ReachabilityConfig) -> Result<Self, reqwest::Error> {
        Self::new(config.host.clone(), config.timeout())
    }

    fn url(&self, port: u16) -> String {
        if self.host.contains(':') {
            format!("http://[{}]:{}/", self.host, port)
        } else {
            format!("http://{}:{}/", self.host, port)
        }
    }
}

#[async_trait]
impl ReachabilityCheck for NetworkProbe {
    async fn check_web(&self, port: u16) -> bool {
        // Any HTTP response counts, including error statuses
        match self.client.get(self.url(port)).send().await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("Web probe on port {} failed: {}", port, e);
                false
            }
        }
    }

    async fn check_secondary(&self, port: u16) -> bool {
        let connect = TcpStream::connect((self.host.as_str(), port));
        match tokio::time::timeout(self.timeout, connect).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                tracing::debug!("TCP probe on port {} failed: {}", port, e);
                false
            }
            Err(_) => {
                tracing::debug!("TCP probe on port {} timed out", port);
                false
            }
        }
    }
}
