use std::time::Duration;

use chrono::Utc;
use log::*;
use settlement_engine::{db_types::Transaction, PayoutProcessor, SqliteDatabase};
use tokio::task::JoinHandle;

/// Starts the payout worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// On every tick the worker makes delivered earnings whose hold period has passed withdrawable. If `auto_payouts` is
/// set, it then requests a payout of the full balance for every seller who has set a payout method.
pub fn start_payout_worker(
    api: PayoutProcessor<SqliteDatabase>,
    interval: Duration,
    auto_payouts: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        info!("🕰️ Payout worker started. Running every {}s", interval.as_secs());
        loop {
            timer.tick().await;
            run_payout_jobs(&api, auto_payouts).await;
        }
    })
}

async fn run_payout_jobs(api: &PayoutProcessor<SqliteDatabase>, auto_payouts: bool) {
    trace!("🕰️ Running earnings release job");
    match api.release_matured_earnings(Utc::now()).await {
        Ok(released) if released.is_empty() => trace!("🕰️ No earnings matured"),
        Ok(released) => {
            info!("🕰️ {} orders' earnings are now withdrawable", released.len());
            debug!("🕰️ Released earnings: {}", transaction_list(&released));
        },
        Err(e) => error!("🕰️ Error running the earnings release job: {e}"),
    }
    if !auto_payouts {
        return;
    }
    match api.run_scheduled_payouts().await {
        Ok(payouts) if payouts.is_empty() => trace!("🕰️ No scheduled payouts were due"),
        Ok(payouts) => info!("🕰️ {} scheduled payouts requested", payouts.len()),
        Err(e) => error!("🕰️ Error running the scheduled payout job: {e}"),
    }
}

fn transaction_list(transactions: &[Transaction]) -> String {
    transactions
        .iter()
        .map(|t| format!("[{}] order_id: {} seller: {} earnings: {}", t.id, t.order_id, t.seller_id, t.seller_earnings))
        .collect::<Vec<String>>()
        .join(", ")
}
