//! Scripted gateway probe for tests and the demo CLI.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::GatewayError;
use super::probe::GatewayProbe;

/// Probe with scripted per-gateway outcomes and a call counter.
///
/// Outcomes are matched by locator prefix, so rules can be written against
/// gateway base locators while probes arrive with full resource URLs.
pub struct SimulatedGatewayProbe {
    outcomes: Mutex<Vec<(String, bool)>>,
    default_success: AtomicBool,
    delay: Option<Duration>,
    probed: Mutex<Vec<String>>,
}

impl SimulatedGatewayProbe {
    /// Every probe succeeds.
    pub fn healthy() -> Self {
        Self {
            outcomes: Mutex::new(Vec::new()),
            default_success: AtomicBool::new(true),
            delay: None,
            probed: Mutex::new(Vec::new()),
        }
    }

    /// Every probe fails.
    pub fn failing() -> Self {
        let probe = Self::healthy();
        probe.default_success.store(false, Ordering::Relaxed);
        probe
    }

    /// Probes succeed or fail according to gateway-prefix rules; gateways
    /// without a rule succeed.
    pub fn with_outcomes(outcomes: &[(&str, bool)]) -> Self {
        let probe = Self::healthy();
        *probe.outcomes.lock() = outcomes
            .iter()
            .map(|(gateway, up)| (gateway.to_string(), *up))
            .collect();
        probe
    }

    /// Every probe succeeds, but only after `delay` has elapsed. Used to
    /// exercise the resolver's per-gateway timeout.
    pub fn with_delay(delay: Duration) -> Self {
        let mut probe = Self::healthy();
        probe.delay = Some(delay);
        probe
    }

    /// Switches every subsequent probe to failure.
    pub fn fail_all(&self) {
        self.outcomes.lock().clear();
        self.default_success.store(false, Ordering::Relaxed);
    }

    /// Number of probes issued so far.
    pub fn probe_count(&self) -> usize {
        self.probed.lock().len()
    }

    /// Full URLs probed so far, in order.
    pub fn probed_urls(&self) -> Vec<String> {
        self.probed.lock().clone()
    }

    /// Clears the probe log.
    pub fn reset_probe_count(&self) {
        self.probed.lock().clear();
    }

    fn outcome_for(&self, url: &str) -> bool {
        let outcomes = self.outcomes.lock();
        for (gateway, up) in outcomes.iter() {
            if url.starts_with(gateway.as_str()) {
                return *up;
            }
        }
        self.default_success.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl GatewayProbe for SimulatedGatewayProbe {
    async fn probe(&self, url: &str) -> Result<(), GatewayError> {
        self.probed.lock().push(url.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.outcome_for(url) {
            Ok(())
        } else {
            Err(GatewayError::ProbeFailed {
                gateway: url.to_string(),
                reason: "simulated gateway failure".to_string(),
            })
        }
    }
}
