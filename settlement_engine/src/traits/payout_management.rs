use mkt_common::{Cents, Currency};

use crate::{
    db_types::{NewPayout, Payout, PayoutMethod, PayoutStatus, PayoutUpdate, SellerPayoutMethod, UserId},
    traits::{EarningsSummary, StorageError},
};

/// Persistence for seller payouts.
///
/// Balances are never stored. The withdrawable balance is the sum of the seller's `ready`, `processing` and
/// `completed` earnings less the sum of their non-failed payouts.
#[allow(async_fn_in_trait)]
pub trait PayoutManagement {
    async fn withdrawable_balance(&self, seller_id: &UserId, currency: &Currency) -> Result<Cents, StorageError>;

    /// Inserts a `pending` payout if, and only if, the seller's withdrawable balance covers it. The balance check
    /// and the insert are a single statement, so concurrent requests cannot overdraw the balance.
    ///
    /// Returns `None` if the balance was insufficient.
    async fn insert_payout_if_funded(&self, payout: NewPayout) -> Result<Option<Payout>, StorageError>;

    /// Compare-and-swap status update. When the new status is `completed`, the payout is also allocated against the
    /// seller's oldest `ready` earnings in the same database transaction.
    ///
    /// Returns `None` if the payout is missing or no longer has the `expected` status.
    async fn update_payout_status(
        &self,
        id: i64,
        expected: PayoutStatus,
        update: PayoutUpdate,
    ) -> Result<Option<Payout>, StorageError>;

    async fn fetch_payout(&self, id: i64) -> Result<Option<Payout>, StorageError>;

    async fn fetch_payouts_for_seller(&self, seller_id: &UserId) -> Result<Vec<Payout>, StorageError>;

    async fn fetch_payouts_with_status(&self, status: PayoutStatus) -> Result<Vec<Payout>, StorageError>;

    async fn upsert_payout_method(
        &self,
        seller_id: &UserId,
        method: &PayoutMethod,
    ) -> Result<SellerPayoutMethod, StorageError>;

    async fn fetch_payout_method(&self, seller_id: &UserId) -> Result<Option<SellerPayoutMethod>, StorageError>;

    async fn fetch_payout_methods(&self) -> Result<Vec<SellerPayoutMethod>, StorageError>;

    async fn earnings_summary(&self, seller_id: &UserId, currency: &Currency) -> Result<EarningsSummary, StorageError>;
}
