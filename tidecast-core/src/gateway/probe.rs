//! Gateway existence probes.

use async_trait::async_trait;

use super::GatewayError;
use crate::config::GatewayConfig;

/// Bounded existence check against one gateway-hosted resource.
///
/// The resolver treats gateways as opaque HTTP locators; the probe is the
/// only place that actually touches the network, which keeps the failover
/// logic testable against scripted outcomes.
#[async_trait]
pub trait GatewayProbe: Send + Sync {
    /// Checks whether `url` is servable by its gateway.
    ///
    /// # Errors
    ///
    /// - `GatewayError::ProbeFailed` - Request failed or returned a
    ///   non-success status
    async fn probe(&self, url: &str) -> Result<(), GatewayError>;
}

/// HTTP HEAD probe used in production.
pub struct HttpGatewayProbe {
    client: reqwest::Client,
}

impl HttpGatewayProbe {
    /// Creates an HTTP probe with the configured timeout and user agent.
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(config.probe_timeout)
                .user_agent(config.user_agent)
                .redirect(reqwest::redirect::Policy::limited(3))
                .build()
                .expect("HTTP client creation should not fail"),
        }
    }
}

#[async_trait]
impl GatewayProbe for HttpGatewayProbe {
    async fn probe(&self, url: &str) -> Result<(), GatewayError> {
        let response =
            self.client
                .head(url)
                .send()
                .await
                .map_err(|e| GatewayError::ProbeFailed {
                    gateway: url.to_string(),
                    reason: e.to_string(),
                })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(GatewayError::ProbeFailed {
                gateway: url.to_string(),
                reason: format!("status {}", response.status()),
            })
        }
    }
}
