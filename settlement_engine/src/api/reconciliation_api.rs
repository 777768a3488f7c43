use std::fmt::Debug;

use log::*;

use crate::{db_types::ReconciliationEntry, order_objects::Actor, traits::ReconciliationManagement, SettlementError};

/// Operator access to the settlement events that could not be applied.
pub struct ReconciliationApi<B> {
    db: B,
}

impl<B> Debug for ReconciliationApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReconciliationApi")
    }
}

impl<B> ReconciliationApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> ReconciliationApi<B>
where B: ReconciliationManagement
{
    pub async fn entries(&self, include_resolved: bool) -> Result<Vec<ReconciliationEntry>, SettlementError> {
        let entries = self.db.fetch_reconciliation_entries(include_resolved).await?;
        Ok(entries)
    }

    /// Closes an entry. Resolving is bookkeeping only: whatever the operator did to fix the underlying problem
    /// (refunding the buyer, settling by hand) happens outside the engine.
    pub async fn resolve(&self, id: i64, admin: &Actor, resolution: &str) -> Result<ReconciliationEntry, SettlementError> {
        if !admin.is_admin() {
            return Err(SettlementError::PermissionDenied("Only administrators can resolve reconciliation entries".into()));
        }
        if resolution.trim().is_empty() {
            return Err(SettlementError::ValidationError("Please describe how the entry was resolved".into()));
        }
        let resolution = format!("{resolution} (by {})", admin.id);
        let entry = self
            .db
            .resolve_reconciliation_entry(id, &resolution)
            .await?
            .ok_or_else(|| SettlementError::NotFound(format!("Open reconciliation entry {id}")))?;
        info!("🗃️ Reconciliation entry #{id} for payment {} resolved: {resolution}", entry.gateway_reference);
        Ok(entry)
    }
}
