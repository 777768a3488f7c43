use crate::{
    db_types::{NewReconciliationEntry, ReconciliationEntry},
    traits::StorageError,
};

/// The dead-letter store for settlement events that could not be applied.
#[allow(async_fn_in_trait)]
pub trait ReconciliationManagement {
    /// Records the event. If an unresolved entry for the same gateway reference and event kind exists, its attempt
    /// count is incremented and its reason replaced instead.
    async fn dead_letter(&self, entry: NewReconciliationEntry) -> Result<ReconciliationEntry, StorageError>;

    async fn fetch_reconciliation_entries(
        &self,
        include_resolved: bool,
    ) -> Result<Vec<ReconciliationEntry>, StorageError>;

    /// Marks the entry resolved. Returns `None` if it does not exist or was already resolved.
    async fn resolve_reconciliation_entry(
        &self,
        id: i64,
        resolution: &str,
    ) -> Result<Option<ReconciliationEntry>, StorageError>;
}
