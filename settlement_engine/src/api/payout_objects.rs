use std::time::Duration as StdDuration;

use chrono::Duration;
use mkt_common::{Cents, Currency, Money};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::{Payout, PayoutMethod, PayoutStatus};

pub const DEFAULT_MINIMUM_PAYOUT: Cents = Cents::new(2_000);
pub const DEFAULT_HOLD_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayoutConfig {
    /// Requests below this amount are rejected, and scheduled payouts wait until the balance reaches it.
    pub minimum_payout: Cents,
    /// How long delivered earnings are held before they become withdrawable.
    pub hold_period: Duration,
    pub currency: Currency,
    pub storage_timeout: StdDuration,
}

impl Default for PayoutConfig {
    fn default() -> Self {
        Self {
            minimum_payout: DEFAULT_MINIMUM_PAYOUT,
            hold_period: Duration::days(DEFAULT_HOLD_DAYS),
            currency: Currency::default(),
            storage_timeout: StdDuration::from_secs(5),
        }
    }
}

/// A seller's withdrawal request, as submitted over the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutRequest {
    pub amount: Money,
    pub method: PayoutMethod,
    #[serde(default)]
    pub notes: Option<String>,
}

/// An administrator's instruction to move a payout along.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvancePayoutRequest {
    pub status: PayoutStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayoutGatewayError {
    /// The gateway could not be reached. The payout is tried again on the next run.
    #[error("Payout gateway unavailable: {0}")]
    Unavailable(String),
    /// The gateway refused the payout, e.g. because the account details are wrong.
    #[error("Payout rejected: {0}")]
    Rejected(String),
}

/// The external service that moves money to sellers.
#[allow(async_fn_in_trait)]
pub trait PayoutGateway {
    /// Sends the payout and returns the gateway's reference for it. Implementations must treat `payout.id` as an
    /// idempotency key, since a payout left in `processing` is submitted again on the next run.
    async fn submit_payout(&self, payout: &Payout) -> Result<String, PayoutGatewayError>;
}

/// What happened to the payouts picked up by a processing run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutRunSummary {
    pub completed: Vec<Payout>,
    pub failed: Vec<Payout>,
    /// Left in `processing` because the gateway was unavailable.
    pub deferred: Vec<Payout>,
}

impl PayoutRunSummary {
    pub fn is_empty(&self) -> bool {
        self.completed.is_empty() && self.failed.is_empty() && self.deferred.is_empty()
    }
}
