//! Entitlement checks and the purchase flow gating playback.
//!
//! [`AccessController::ensure_access`] must run to completion before any
//! gateway probing happens; the session treats that ordering as a hard
//! precondition.

pub mod simulation;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

pub use simulation::SimulatedPaymentContract;

use crate::config::PaymentConfig;
use crate::events::{EventBus, StreamEvent};

/// A failed call into the external wallet/contract collaborator.
#[derive(Debug, thiserror::Error)]
#[error("contract call failed: {reason}")]
pub struct ContractError {
    pub reason: String,
}

impl ContractError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// External access-control and wallet collaborator.
///
/// All operations are fallible and possibly slow; this subsystem imposes no
/// timeout of its own on them.
#[async_trait]
pub trait PaymentContract: Send + Sync {
    /// Whether `subject` already holds an entitlement for `content_id`.
    async fn check_access(&self, content_id: &str, subject: &str) -> Result<bool, ContractError>;

    /// Purchases a stream entitlement. Returns whether the purchase was
    /// accepted.
    async fn purchase_access(&self, content_id: &str, subject: &str)
    -> Result<bool, ContractError>;

    /// Spendable token balance of `subject`.
    async fn get_balance(&self, subject: &str) -> Result<u64, ContractError>;

    /// Tops up the subject's balance. Returns whether the top-up was
    /// accepted.
    async fn top_up(&self, subject: &str, amount: u64) -> Result<bool, ContractError>;
}

/// Step of the purchase flow a collaborator error occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseStep {
    EntitlementCheck,
    BalanceCheck,
    TopUp,
    Purchase,
}

impl fmt::Display for PurchaseStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PurchaseStep::EntitlementCheck => write!(f, "entitlement check"),
            PurchaseStep::BalanceCheck => write!(f, "balance check"),
            PurchaseStep::TopUp => write!(f, "top-up"),
            PurchaseStep::Purchase => write!(f, "purchase"),
        }
    }
}

/// Errors that can occur while establishing access to a content id.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    /// Entitlement missing and the purchase flow did not grant one:
    /// insufficient balance after the top-up attempt, or purchase rejected.
    #[error("Access denied for {content_id}")]
    AccessDenied { content_id: String },

    /// A collaborator call itself failed, identified by the failing step.
    #[error("Purchase flow failed during {step}: {reason}")]
    PurchaseFailed { step: PurchaseStep, reason: String },
}

/// Gates playback behind an entitlement, driving the purchase flow when the
/// subject holds none.
pub struct AccessController {
    contract: Arc<dyn PaymentContract>,
    events: Arc<EventBus>,
    config: PaymentConfig,
}

impl AccessController {
    pub fn new(
        contract: Arc<dyn PaymentContract>,
        events: Arc<EventBus>,
        config: PaymentConfig,
    ) -> Self {
        Self {
            contract,
            events,
            config,
        }
    }

    /// Ensures `subject` may stream `content_id`, purchasing an entitlement
    /// if necessary.
    ///
    /// An existing entitlement returns immediately with no side effects.
    /// Otherwise: balance check, top-up when short, then purchase. Failures
    /// short-circuit the chain; a failed top-up prevents the purchase
    /// attempt. A successful top-up publishes [`StreamEvent::TokensPurchased`].
    ///
    /// # Errors
    ///
    /// - `AccessError::AccessDenied` - Top-up or purchase was rejected
    /// - `AccessError::PurchaseFailed` - A collaborator call failed
    pub async fn ensure_access(&self, content_id: &str, subject: &str) -> Result<(), AccessError> {
        let entitled = self
            .contract
            .check_access(content_id, subject)
            .await
            .map_err(|e| purchase_failed(PurchaseStep::EntitlementCheck, e))?;

        if entitled {
            debug!(content_id, subject, "existing entitlement found");
            return Ok(());
        }

        let balance = self
            .contract
            .get_balance(subject)
            .await
            .map_err(|e| purchase_failed(PurchaseStep::BalanceCheck, e))?;

        if balance < self.config.purchase_price {
            let amount = self.config.default_top_up;
            debug!(subject, balance, amount, "balance short, attempting top-up");

            let accepted = self
                .contract
                .top_up(subject, amount)
                .await
                .map_err(|e| purchase_failed(PurchaseStep::TopUp, e))?;

            if !accepted {
                return Err(AccessError::AccessDenied {
                    content_id: content_id.to_string(),
                });
            }

            self.events.publish(StreamEvent::TokensPurchased { amount });
        }

        let granted = self
            .contract
            .purchase_access(content_id, subject)
            .await
            .map_err(|e| purchase_failed(PurchaseStep::Purchase, e))?;

        if granted {
            info!(content_id, subject, "stream entitlement purchased");
            Ok(())
        } else {
            Err(AccessError::AccessDenied {
                content_id: content_id.to_string(),
            })
        }
    }
}

fn purchase_failed(step: PurchaseStep, error: ContractError) -> AccessError {
    AccessError::PurchaseFailed {
        step,
        reason: error.reason,
    }
}
