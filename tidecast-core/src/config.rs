//! Centralized configuration for Tidecast.
//!
//! All tunable parameters and settings are defined here to avoid
//! hard-coded values scattered throughout the codebase.

use std::time::Duration;

/// Central configuration for all Tidecast components.
///
/// Groups related configuration settings into logical sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct TidecastConfig {
    pub gateway: GatewayConfig,
    pub payment: PaymentConfig,
    pub session: SessionConfig,
}

/// Content-addressed storage gateway configuration.
///
/// Controls the ordered gateway list, probe timeouts, and the local
/// fallback source used when every gateway is unreachable.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Ordered gateway base locators, probed in list order
    pub gateways: Vec<String>,
    /// Per-gateway existence probe timeout
    pub probe_timeout: Duration,
    /// User agent for HTTP probes
    pub user_agent: &'static str,
    /// Local default source used after every gateway has failed
    pub local_fallback: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            gateways: vec![
                "https://ipfs.io/ipfs".to_string(),
                "https://cloudflare-ipfs.com/ipfs".to_string(),
                "https://dweb.link/ipfs".to_string(),
                "https://gateway.pinata.cloud/ipfs".to_string(),
            ],
            probe_timeout: Duration::from_secs(3),
            user_agent: "tidecast/0.1.0",
            local_fallback: "local://cache".to_string(),
        }
    }
}

/// Metered payment channel configuration.
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    /// Interval between settlement ticks while a channel is open
    pub settlement_interval: Duration,
    /// Token price of one stream entitlement
    pub purchase_price: u64,
    /// Amount requested from the wallet collaborator when balance is short
    pub default_top_up: u64,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            settlement_interval: Duration::from_secs(30),
            purchase_price: 10,
            default_top_up: 100,
        }
    }
}

/// Stream session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Interval between viewing-time ticks while playing
    pub tick_interval: Duration,
    /// Quality label used when no explicit quality is requested
    pub default_quality: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            default_quality: "medium".to_string(),
        }
    }
}

impl TidecastConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via environment variables while
    /// maintaining sensible defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(gateways) = std::env::var("TIDECAST_GATEWAYS") {
            let parsed: Vec<String> = gateways
                .split(',')
                .map(|g| g.trim().to_string())
                .filter(|g| !g.is_empty())
                .collect();
            if !parsed.is_empty() {
                config.gateway.gateways = parsed;
            }
        }

        if let Ok(timeout) = std::env::var("TIDECAST_PROBE_TIMEOUT") {
            if let Ok(seconds) = timeout.parse::<u64>() {
                config.gateway.probe_timeout = Duration::from_secs(seconds);
            }
        }

        if let Ok(interval) = std::env::var("TIDECAST_SETTLEMENT_INTERVAL") {
            if let Ok(seconds) = interval.parse::<u64>() {
                config.payment.settlement_interval = Duration::from_secs(seconds);
            }
        }

        if let Ok(interval) = std::env::var("TIDECAST_TICK_INTERVAL") {
            if let Ok(seconds) = interval.parse::<u64>() {
                config.session.tick_interval = Duration::from_secs(seconds);
            }
        }

        if let Ok(quality) = std::env::var("TIDECAST_DEFAULT_QUALITY") {
            config.session.default_quality = quality;
        }

        config
    }

    /// Creates a configuration optimized for testing.
    ///
    /// Short intervals so timer-driven tests complete quickly under
    /// paused tokio time.
    pub fn for_testing() -> Self {
        let mut config = Self::default();
        config.gateway.probe_timeout = Duration::from_millis(100);
        config.payment.settlement_interval = Duration::from_millis(100);
        config.session.tick_interval = Duration::from_millis(100);
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = TidecastConfig::default();

        assert_eq!(config.gateway.gateways.len(), 4);
        assert_eq!(config.gateway.probe_timeout, Duration::from_secs(3));
        assert_eq!(config.gateway.local_fallback, "local://cache");
        assert_eq!(config.payment.settlement_interval, Duration::from_secs(30));
        assert_eq!(config.payment.purchase_price, 10);
        assert_eq!(config.payment.default_top_up, 100);
        assert_eq!(config.session.tick_interval, Duration::from_secs(1));
        assert_eq!(config.session.default_quality, "medium");
    }

    #[test]
    fn test_testing_preset_shortens_intervals() {
        let config = TidecastConfig::for_testing();

        assert!(config.gateway.probe_timeout < Duration::from_secs(1));
        assert!(config.payment.settlement_interval < Duration::from_secs(1));
        assert!(config.session.tick_interval < Duration::from_secs(1));
    }

    #[test]
    fn test_env_override() {
        unsafe {
            std::env::set_var("TIDECAST_GATEWAYS", "https://a/ipfs, https://b/ipfs");
            std::env::set_var("TIDECAST_PROBE_TIMEOUT", "7");
            std::env::set_var("TIDECAST_SETTLEMENT_INTERVAL", "60");
            std::env::set_var("TIDECAST_TICK_INTERVAL", "2");
            std::env::set_var("TIDECAST_DEFAULT_QUALITY", "high");
        }

        let config = TidecastConfig::from_env();

        assert_eq!(
            config.gateway.gateways,
            vec!["https://a/ipfs".to_string(), "https://b/ipfs".to_string()]
        );
        assert_eq!(config.gateway.probe_timeout, Duration::from_secs(7));
        assert_eq!(config.payment.settlement_interval, Duration::from_secs(60));
        assert_eq!(config.session.tick_interval, Duration::from_secs(2));
        assert_eq!(config.session.default_quality, "high");

        // Cleanup
        unsafe {
            std::env::remove_var("TIDECAST_GATEWAYS");
            std::env::remove_var("TIDECAST_PROBE_TIMEOUT");
            std::env::remove_var("TIDECAST_SETTLEMENT_INTERVAL");
            std::env::remove_var("TIDECAST_TICK_INTERVAL");
            std::env::remove_var("TIDECAST_DEFAULT_QUALITY");
        }
    }
}
