//! Outbound transfer interface
//!
//! The engine never moves funds itself; a withdrawal hands the amount to a
//! [`Payout`] after the credit is already zeroed.

use serde::Serialize;
use std::sync::{Arc, Mutex};
use surety_core::{Address, Amount, Error, Result};

/// Outbound transfer of withdrawn credit
pub trait Payout: Send + Sync {
    /// Transfer `amount` to `to`
    fn transfer(&self, to: &Address, amount: Amount) -> Result<()>;

    /// Get payout name
    fn name(&self) -> &str;
}

/// Completed transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transfer {
    /// Recipient
    pub to: Address,
    /// Amount sent
    pub amount: Amount,
}

#[derive(Debug, Default)]
struct PayoutState {
    transfers: Vec<Transfer>,
    fail_next: usize,
}

/// In-process payout that records transfers
///
/// Clones share the same log, so a caller can keep one to inspect what the
/// engine paid.
#[derive(Debug, Clone, Default)]
pub struct RecordingPayout {
    state: Arc<Mutex<PayoutState>>,
}

impl RecordingPayout {
    /// Create new payout
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `count` transfers
    pub fn fail_next(&self, count: usize) -> Result<()> {
        self.lock()?.fail_next = count;
        Ok(())
    }

    /// Transfers made so far
    pub fn transfers(&self) -> Result<Vec<Transfer>> {
        Ok(self.lock()?.transfers.clone())
    }

    /// Total sent to `to`
    pub fn total_to(&self, to: &Address) -> Result<Amount> {
        self.lock()?
            .transfers
            .iter()
            .filter(|t| t.to == *to)
            .try_fold(Amount::ZERO, |sum, t| sum.checked_add(t.amount))
            .ok_or_else(|| Error::Overflow(format!("transfers to {}", to)))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, PayoutState>> {
        self.state
            .lock()
            .map_err(|_| Error::Concurrency("Payout log poisoned".to_string()))
    }
}

impl Payout for RecordingPayout {
    fn transfer(&self, to: &Address, amount: Amount) -> Result<()> {
        let mut state = self.lock()?;
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(Error::TransferFailed(format!(
                "transfer of {} to {} rejected",
                amount, to
            )));
        }

        state.transfers.push(Transfer { to: *to, amount });
        tracing::debug!(to = %to, amount = %amount, "Transfer recorded");
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}
