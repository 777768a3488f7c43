use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use mkt_common::Money;

use crate::{
    db_types::{NewPayout, Payout, PayoutMethod, PayoutStatus, PayoutUpdate, SellerPayoutMethod, Transaction, UserId},
    helpers::{validate_payout_method, with_timeout},
    order_objects::Actor,
    payout_objects::{PayoutConfig, PayoutGateway, PayoutGatewayError, PayoutRunSummary},
    traits::{CommissionReport, EarningsSummary, PayoutManagement, TransactionManagement},
    SettlementError,
    TransactionLedger,
};

/// `PayoutProcessor` handles seller withdrawals: requests, administrator approval, scheduled batches and submission to
/// an external [`PayoutGateway`]. It also runs the job that releases earnings once their hold period is over.
///
/// A seller's balance is never stored. Every check runs against the transaction and payout logs, and the check that
/// guards a new payout is part of the statement that inserts it.
pub struct PayoutProcessor<B> {
    ledger: TransactionLedger<B>,
    config: PayoutConfig,
}

impl<B> Debug for PayoutProcessor<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PayoutProcessor")
    }
}

impl<B> PayoutProcessor<B> {
    pub fn new(db: B, config: PayoutConfig) -> Self {
        Self { ledger: TransactionLedger::new(db), config }
    }

    pub fn config(&self) -> &PayoutConfig {
        &self.config
    }
}

impl<B> PayoutProcessor<B>
where B: TransactionManagement + PayoutManagement
{
    /// Requests a withdrawal of `amount` to `method`.
    ///
    /// Fails with `ValidationError` if the method details are malformed, `BelowMinimum` if the amount is below the
    /// configured minimum and `InsufficientBalance` if the seller's withdrawable balance does not cover it.
    pub async fn request_payout(
        &self,
        seller_id: &UserId,
        amount: Money,
        method: PayoutMethod,
        notes: Option<String>,
    ) -> Result<Payout, SettlementError> {
        validate_payout_method(&method).map_err(SettlementError::ValidationError)?;
        if amount.currency != self.config.currency {
            return Err(SettlementError::ValidationError(format!(
                "Payouts are made in {}, not {}",
                self.config.currency, amount.currency
            )));
        }
        if amount.amount < self.config.minimum_payout {
            return Err(SettlementError::BelowMinimum {
                requested: amount.to_string(),
                minimum: Money::new(self.config.minimum_payout, self.config.currency.clone()).to_string(),
            });
        }
        let payout = NewPayout { seller_id: seller_id.clone(), amount: amount.clone(), method, notes, requested_at: Utc::now() };
        match self.timed(self.ledger.insert_payout_if_funded(payout)).await? {
            Some(p) => {
                info!("💸️ Payout #{} of {amount} requested by seller {seller_id}", p.id);
                Ok(p)
            },
            None => {
                let available = self.timed(self.ledger.withdrawable_balance(seller_id, &amount.currency)).await?;
                debug!("💸️ Seller {seller_id} asked for {amount}, but only {available} is withdrawable");
                Err(SettlementError::InsufficientBalance {
                    requested: amount.to_string(),
                    available: amount.with_amount(available).to_string(),
                })
            },
        }
    }

    /// An administrator moves a payout to `new_status`. Allowed moves are `pending → processing → completed`, and
    /// `pending` or `processing` to `failed`. A failed payout no longer counts against the seller's balance.
    pub async fn advance_payout(
        &self,
        payout_id: i64,
        new_status: PayoutStatus,
        admin: &Actor,
        notes: Option<String>,
    ) -> Result<Payout, SettlementError> {
        if !admin.is_admin() {
            return Err(SettlementError::PermissionDenied("Only administrators can process payouts".into()));
        }
        let update = PayoutUpdate::new(new_status).with_processed_by(admin.id.clone()).with_notes(notes);
        let payout = self.apply_update(payout_id, update).await?;
        info!("💸️ Payout #{payout_id} is now {new_status} (by {admin})");
        Ok(payout)
    }

    async fn apply_update(&self, payout_id: i64, update: PayoutUpdate) -> Result<Payout, SettlementError> {
        let payout = self
            .timed(self.ledger.fetch_payout(payout_id))
            .await?
            .ok_or_else(|| SettlementError::NotFound(format!("Payout {payout_id}")))?;
        if !payout.status.can_transition_to(update.status) {
            return Err(SettlementError::InvalidTransition {
                from: payout.status.to_string(),
                to: update.status.to_string(),
            });
        }
        self.timed(self.ledger.update_payout_status(payout_id, payout.status, update)).await?.ok_or_else(|| {
            SettlementError::StorageConflict(format!("Payout {payout_id} was modified while it was being updated"))
        })
    }

    pub async fn set_payout_method(
        &self,
        seller_id: &UserId,
        method: PayoutMethod,
    ) -> Result<SellerPayoutMethod, SettlementError> {
        validate_payout_method(&method).map_err(SettlementError::ValidationError)?;
        let stored = self.timed(self.ledger.upsert_payout_method(seller_id, &method)).await?;
        info!("💸️ Seller {seller_id} will be paid by {method}");
        Ok(stored)
    }

    pub async fn payout_method(&self, seller_id: &UserId) -> Result<Option<SellerPayoutMethod>, SettlementError> {
        self.timed(self.ledger.fetch_payout_method(seller_id)).await
    }

    pub async fn payouts_for_seller(&self, seller_id: &UserId) -> Result<Vec<Payout>, SettlementError> {
        self.timed(self.ledger.fetch_payouts_for_seller(seller_id)).await
    }

    /// Payouts waiting for an administrator or the gateway: `pending` first, then `processing`.
    pub async fn open_payouts(&self) -> Result<Vec<Payout>, SettlementError> {
        let mut payouts = self.timed(self.ledger.fetch_payouts_with_status(PayoutStatus::Pending)).await?;
        payouts.extend(self.timed(self.ledger.fetch_payouts_with_status(PayoutStatus::Processing)).await?);
        Ok(payouts)
    }

    /// Requests a payout of the full withdrawable balance for every seller who has chosen a payout method and whose
    /// balance has reached the minimum.
    pub async fn run_scheduled_payouts(&self) -> Result<Vec<Payout>, SettlementError> {
        let methods = self.timed(self.ledger.fetch_payout_methods()).await?;
        let currency = &self.config.currency;
        let mut created = Vec::new();
        for SellerPayoutMethod { seller_id, method, .. } in methods {
            let balance = match self.timed(self.ledger.withdrawable_balance(&seller_id, currency)).await {
                Ok(b) => b,
                Err(e) => {
                    warn!("💸️ Could not read the balance of seller {seller_id}. Skipping them this run. {e}");
                    continue;
                },
            };
            if balance < self.config.minimum_payout {
                trace!("💸️ Seller {seller_id} has {balance} withdrawable. Below the minimum");
                continue;
            }
            let payout = NewPayout {
                seller_id: seller_id.clone(),
                amount: Money::new(balance, currency.clone()),
                method,
                notes: Some("Scheduled payout".into()),
                requested_at: Utc::now(),
            };
            match self.timed(self.ledger.insert_payout_if_funded(payout)).await {
                Ok(Some(p)) => {
                    info!("💸️ Scheduled payout #{} of {balance} {currency} created for seller {seller_id}", p.id);
                    created.push(p);
                },
                Ok(None) => debug!("💸️ The balance of seller {seller_id} changed during the run. Skipping them"),
                Err(e) => warn!("💸️ Could not create a scheduled payout for seller {seller_id}. {e}"),
            }
        }
        Ok(created)
    }

    /// Sends open payouts to the gateway.
    ///
    /// Each `pending` payout is moved to `processing` before it is submitted. A payout the gateway accepts is
    /// completed; one it rejects is failed. If the gateway is unavailable, the payout stays in `processing` and is
    /// submitted again on the next run.
    pub async fn process_pending_payouts<G: PayoutGateway>(&self, gateway: &G) -> Result<PayoutRunSummary, SettlementError> {
        let mut summary = PayoutRunSummary::default();
        let pending = self.timed(self.ledger.fetch_payouts_with_status(PayoutStatus::Pending)).await?;
        let stuck = self.timed(self.ledger.fetch_payouts_with_status(PayoutStatus::Processing)).await?;
        let mut batch = Vec::with_capacity(pending.len() + stuck.len());
        for payout in pending {
            let update = PayoutUpdate::new(PayoutStatus::Processing);
            match self.timed(self.ledger.update_payout_status(payout.id, PayoutStatus::Pending, update)).await? {
                Some(p) => batch.push(p),
                None => debug!("💸️ Payout #{} was picked up elsewhere", payout.id),
            }
        }
        batch.extend(stuck.into_iter().filter(|p| p.gateway_reference.is_none()));
        for payout in batch {
            match gateway.submit_payout(&payout).await {
                Ok(reference) => {
                    let update = PayoutUpdate::new(PayoutStatus::Completed).with_gateway_reference(reference);
                    if let Some(p) = self.finish(payout.id, update).await? {
                        info!("💸️ Payout #{} of {} {} completed", p.id, p.amount, p.currency);
                        summary.completed.push(p);
                    }
                },
                Err(PayoutGatewayError::Rejected(reason)) => {
                    let update = PayoutUpdate::new(PayoutStatus::Failed).with_notes(Some(reason.clone()));
                    if let Some(p) = self.finish(payout.id, update).await? {
                        warn!("💸️ Payout #{} was rejected by the gateway: {reason}", p.id);
                        summary.failed.push(p);
                    }
                },
                Err(e @ PayoutGatewayError::Unavailable(_)) => {
                    warn!("💸️ Payout #{} will be retried on the next run. {e}", payout.id);
                    summary.deferred.push(payout);
                },
            }
        }
        Ok(summary)
    }

    async fn finish(&self, payout_id: i64, update: PayoutUpdate) -> Result<Option<Payout>, SettlementError> {
        let payout = self.timed(self.ledger.update_payout_status(payout_id, PayoutStatus::Processing, update)).await?;
        if payout.is_none() {
            warn!("💸️ Payout #{payout_id} left the processing state while it was with the gateway");
        }
        Ok(payout)
    }

    /// Makes the earnings of orders delivered at least one hold period before `now` withdrawable.
    pub async fn release_matured_earnings(&self, now: DateTime<Utc>) -> Result<Vec<Transaction>, SettlementError> {
        let cutoff = now - self.config.hold_period;
        let released = self.timed(self.ledger.release_matured(cutoff, now)).await?;
        if !released.is_empty() {
            info!("💸️ Released the earnings of {} delivered orders", released.len());
        }
        Ok(released)
    }

    pub async fn seller_earnings_summary(&self, seller_id: &UserId) -> Result<EarningsSummary, SettlementError> {
        self.timed(self.ledger.earnings_summary(seller_id, &self.config.currency)).await
    }

    pub async fn platform_commission(
        &self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<CommissionReport, SettlementError> {
        self.timed(self.ledger.commission_report(since, until, &self.config.currency)).await
    }

    async fn timed<T, F>(&self, operation: F) -> Result<T, SettlementError>
    where F: std::future::Future<Output = Result<T, SettlementError>> {
        with_timeout(self.config.storage_timeout, operation).await
    }
}
