//! Scripted wallet/contract collaborator for tests and the demo CLI.

use std::collections::HashSet;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{ContractError, PaymentContract};

#[derive(Default)]
struct ContractState {
    balance: u64,
    entitlements: HashSet<(String, String)>,
    reject_top_ups: bool,
    fail_top_ups: Option<String>,
    reject_purchases: bool,
    fail_purchases: Option<String>,
    top_up_calls: usize,
    purchase_calls: usize,
}

/// In-memory contract with scripted balances, entitlements, and failure
/// switches.
pub struct SimulatedPaymentContract {
    state: Mutex<ContractState>,
}

impl SimulatedPaymentContract {
    /// Creates a contract where the subject starts with `balance` tokens and
    /// no entitlements.
    pub fn new(balance: u64) -> Self {
        Self {
            state: Mutex::new(ContractState {
                balance,
                ..ContractState::default()
            }),
        }
    }

    /// Pre-grants an entitlement, as if purchased in an earlier session.
    pub fn grant_entitlement(&self, content_id: &str, subject: &str) {
        self.state
            .lock()
            .entitlements
            .insert((content_id.to_string(), subject.to_string()));
    }

    /// Subsequent top-ups are rejected (returned as not accepted).
    pub fn reject_top_ups(&self) {
        self.state.lock().reject_top_ups = true;
    }

    /// Subsequent top-up calls fail outright with `reason`.
    pub fn fail_top_ups(&self, reason: &str) {
        self.state.lock().fail_top_ups = Some(reason.to_string());
    }

    /// Subsequent purchases are rejected (returned as not accepted).
    pub fn reject_purchases(&self) {
        self.state.lock().reject_purchases = true;
    }

    /// Subsequent purchase calls fail outright with `reason`.
    pub fn fail_purchases(&self, reason: &str) {
        self.state.lock().fail_purchases = Some(reason.to_string());
    }

    pub fn top_up_calls(&self) -> usize {
        self.state.lock().top_up_calls
    }

    pub fn purchase_calls(&self) -> usize {
        self.state.lock().purchase_calls
    }

    pub fn balance(&self) -> u64 {
        self.state.lock().balance
    }
}

#[async_trait]
impl PaymentContract for SimulatedPaymentContract {
    async fn check_access(&self, content_id: &str, subject: &str) -> Result<bool, ContractError> {
        let state = self.state.lock();
        Ok(state
            .entitlements
            .contains(&(content_id.to_string(), subject.to_string())))
    }

    async fn purchase_access(
        &self,
        content_id: &str,
        subject: &str,
    ) -> Result<bool, ContractError> {
        let mut state = self.state.lock();
        state.purchase_calls += 1;

        if let Some(reason) = &state.fail_purchases {
            return Err(ContractError::new(reason.clone()));
        }
        if state.reject_purchases {
            return Ok(false);
        }

        state
            .entitlements
            .insert((content_id.to_string(), subject.to_string()));
        Ok(true)
    }

    async fn get_balance(&self, _subject: &str) -> Result<u64, ContractError> {
        Ok(self.state.lock().balance)
    }

    async fn top_up(&self, _subject: &str, amount: u64) -> Result<bool, ContractError> {
        let mut state = self.state.lock();
        state.top_up_calls += 1;

        if let Some(reason) = &state.fail_top_ups {
            return Err(ContractError::new(reason.clone()));
        }
        if state.reject_top_ups {
            return Ok(false);
        }

        state.balance += amount;
        Ok(true)
    }
}
