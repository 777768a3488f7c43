use std::{future::Future, time::Duration};

use log::*;

use crate::SettlementError;

/// Runs a storage call, giving up after `limit`. A timed-out call has an unknown outcome, so callers must only use this
/// for operations that are safe to repeat.
pub async fn with_timeout<T, E, F>(limit: Duration, operation: F) -> Result<T, SettlementError>
where
    F: Future<Output = Result<T, E>>,
    SettlementError: From<E>,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result.map_err(SettlementError::from),
        Err(_) => {
            warn!("🗃️ A storage call did not complete within {}ms", limit.as_millis());
            Err(SettlementError::Timeout(limit))
        },
    }
}
