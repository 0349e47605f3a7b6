//! Gateway failover resolution for content-addressed storage.
//!
//! A [`GatewayResolver`] holds an ordered list of gateway base locators and,
//! per resolution attempt, probes each candidate once in configured order
//! starting from a rotation pointer. The pointer advances on every call so
//! unrelated lookups spread load across gateways over time.

pub mod probe;
pub mod simulation;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tracing::{debug, info};

pub use probe::{GatewayProbe, HttpGatewayProbe};
pub use simulation::SimulatedGatewayProbe;

use crate::config::GatewayConfig;

/// Errors that can occur during gateway resolution.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// One gateway probe failed. Recovered locally by advancing to the next
    /// candidate; never surfaced to resolver callers.
    #[error("Gateway probe failed for {gateway}: {reason}")]
    ProbeFailed { gateway: String, reason: String },

    /// Every configured gateway failed one probe each. Callers apply a local
    /// fallback policy instead of treating this as fatal.
    #[error("All {attempted} configured gateways failed")]
    AllGatewaysExhausted { attempted: usize },
}

/// A playable source resolved through one gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    /// Base locator of the gateway that answered the probe
    pub gateway: String,
    /// Full locator of the playable resource on that gateway
    pub url: String,
}

/// Resolves content locators against an ordered list of redundant gateways.
///
/// One resolver instance may be shared by many sessions; the rotation
/// pointer is the only shared mutable state and is atomic.
pub struct GatewayResolver {
    gateways: Vec<String>,
    rotation: AtomicUsize,
    probe_timeout: Duration,
    probe: Arc<dyn GatewayProbe>,
}

impl GatewayResolver {
    /// Creates a resolver over the configured gateway list.
    pub fn new(config: &GatewayConfig, probe: Arc<dyn GatewayProbe>) -> Self {
        Self {
            gateways: config.gateways.clone(),
            rotation: AtomicUsize::new(0),
            probe_timeout: config.probe_timeout,
            probe,
        }
    }

    /// Resolves a content locator to a playable source.
    ///
    /// Probes each configured gateway at most once, in list order starting
    /// from the rotation pointer and wrapping once. The first gateway whose
    /// existence probe succeeds within the configured timeout is selected.
    /// The rotation pointer advances exactly once per call, success or not.
    ///
    /// # Errors
    ///
    /// - `GatewayError::AllGatewaysExhausted` - Every gateway failed its
    ///   probe; the caller should fall back to a local default source
    pub async fn resolve(
        &self,
        content_locator: &str,
        quality: &str,
    ) -> Result<ResolvedSource, GatewayError> {
        let total = self.gateways.len();
        let start = self.rotation.fetch_add(1, Ordering::Relaxed);
        if total == 0 {
            return Err(GatewayError::AllGatewaysExhausted { attempted: 0 });
        }
        let start = start % total;

        for offset in 0..total {
            let gateway = &self.gateways[(start + offset) % total];
            let url = source_url(gateway, content_locator, quality);

            match self.probe_with_timeout(gateway, &url).await {
                Ok(()) => {
                    info!(%gateway, content_locator, quality, "gateway selected");
                    return Ok(ResolvedSource {
                        gateway: gateway.clone(),
                        url,
                    });
                }
                Err(GatewayError::ProbeFailed { gateway, reason }) => {
                    debug!(%gateway, %reason, "gateway probe failed, trying next");
                }
                Err(other) => return Err(other),
            }
        }

        debug!(attempted = total, content_locator, "gateway list exhausted");
        Err(GatewayError::AllGatewaysExhausted { attempted: total })
    }

    /// Current rotation pointer, exposed for load-distribution diagnostics.
    pub fn rotation_pointer(&self) -> usize {
        self.rotation.load(Ordering::Relaxed)
    }

    async fn probe_with_timeout(&self, gateway: &str, url: &str) -> Result<(), GatewayError> {
        match tokio::time::timeout(self.probe_timeout, self.probe.probe(url)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::ProbeFailed {
                gateway: gateway.to_string(),
                reason: format!("probe timed out after {:?}", self.probe_timeout),
            }),
        }
    }
}

/// Joins a gateway base locator with the content locator and quality label.
fn source_url(gateway: &str, content_locator: &str, quality: &str) -> String {
    format!(
        "{}/{}/{}",
        gateway.trim_end_matches('/'),
        content_locator,
        quality
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;

    fn config_with(gateways: &[&str]) -> GatewayConfig {
        GatewayConfig {
            gateways: gateways.iter().map(|g| g.to_string()).collect(),
            probe_timeout: Duration::from_millis(100),
            ..GatewayConfig::default()
        }
    }

    #[tokio::test]
    async fn test_first_healthy_gateway_selected_in_order() {
        let probe = Arc::new(SimulatedGatewayProbe::with_outcomes(&[
            ("https://g1", false),
            ("https://g2", true),
            ("https://g3", true),
        ]));
        let resolver = GatewayResolver::new(
            &config_with(&["https://g1", "https://g2", "https://g3"]),
            probe.clone(),
        );

        let source = resolver.resolve("content_001", "medium").await.unwrap();

        assert_eq!(source.gateway, "https://g2");
        assert_eq!(source.url, "https://g2/content_001/medium");
        // g1 failed, g2 succeeded, g3 never probed
        assert_eq!(probe.probe_count(), 2);
    }

    #[tokio::test]
    async fn test_each_gateway_probed_at_most_once_before_exhaustion() {
        let probe = Arc::new(SimulatedGatewayProbe::failing());
        let resolver = GatewayResolver::new(
            &config_with(&["https://g1", "https://g2", "https://g3", "https://g4"]),
            probe.clone(),
        );

        let result = resolver.resolve("content_001", "medium").await;

        assert!(matches!(
            result,
            Err(GatewayError::AllGatewaysExhausted { attempted: 4 })
        ));
        assert_eq!(probe.probe_count(), 4);
    }

    #[tokio::test]
    async fn test_rotation_pointer_advances_on_every_call() {
        let probe = Arc::new(SimulatedGatewayProbe::healthy());
        let resolver =
            GatewayResolver::new(&config_with(&["https://g1", "https://g2"]), probe.clone());

        let first = resolver.resolve("content_001", "low").await.unwrap();
        let second = resolver.resolve("content_002", "low").await.unwrap();

        assert_eq!(first.gateway, "https://g1");
        assert_eq!(second.gateway, "https://g2");
        assert_eq!(resolver.rotation_pointer(), 2);

        // Pointer advances even when every probe fails
        probe.fail_all();
        let _ = resolver.resolve("content_003", "low").await;
        assert_eq!(resolver.rotation_pointer(), 3);
    }

    #[tokio::test]
    async fn test_attempt_wraps_once_from_rotation_pointer() {
        let probe = Arc::new(SimulatedGatewayProbe::with_outcomes(&[
            ("https://g1", true),
            ("https://g2", false),
            ("https://g3", false),
        ]));
        let resolver = GatewayResolver::new(
            &config_with(&["https://g1", "https://g2", "https://g3"]),
            probe.clone(),
        );

        // Move the pointer past g1 so the attempt starts at g2 and wraps
        let _ = resolver.resolve("warmup", "low").await;
        probe.reset_probe_count();

        let source = resolver.resolve("content_001", "low").await.unwrap();

        assert_eq!(source.gateway, "https://g1");
        assert_eq!(probe.probed_urls(), vec![
            "https://g2/content_001/low".to_string(),
            "https://g3/content_001/low".to_string(),
            "https://g1/content_001/low".to_string(),
        ]);
    }

    #[tokio::test]
    async fn test_slow_probe_counts_as_failure() {
        let probe = Arc::new(SimulatedGatewayProbe::with_delay(Duration::from_secs(10)));
        let resolver = GatewayResolver::new(&config_with(&["https://g1"]), probe);

        tokio::time::pause();
        let result = resolver.resolve("content_001", "medium").await;

        assert!(matches!(
            result,
            Err(GatewayError::AllGatewaysExhausted { attempted: 1 })
        ));
    }

    #[test]
    fn test_source_url_joins_without_duplicate_slashes() {
        assert_eq!(
            source_url("https://g1/ipfs/", "content_001", "high"),
            "https://g1/ipfs/content_001/high"
        );
    }
}
