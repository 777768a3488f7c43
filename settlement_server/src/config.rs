use std::{env, fmt::Display, str::FromStr, time::Duration};

use log::*;
use mkt_common::{
    helpers::{parse_boolean_flag, parse_or_default},
    Currency,
    Secret,
};
use settlement_engine::{
    commission::{
        CommissionConfig,
        DEFAULT_FIXED_FEE,
        DEFAULT_MAX_PRICE,
        DEFAULT_SERVICE_FEE_BPS,
        DEFAULT_SHIPPING_COST,
        DEFAULT_TAX_BPS,
    },
    helpers::RetryConfig,
    payout_objects::{PayoutConfig, DEFAULT_HOLD_DAYS, DEFAULT_MINIMUM_PAYOUT},
    SettlementConfig,
    DEFAULT_AMOUNT_TOLERANCE,
    DEFAULT_STORAGE_TIMEOUT,
};

const DEFAULT_MKT_HOST: &str = "127.0.0.1";
const DEFAULT_MKT_PORT: u16 = 8370;
const DEFAULT_SETTLE_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_WORKER_INTERVAL: Duration = Duration::from_secs(600);
const DEFAULT_MAX_CONNECTIONS: u32 = 25;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: Secret<String>,
    pub max_connections: u32,
    pub settlement: SettlementConfig,
    pub payouts: PayoutConfig,
    /// Retry policy for gateway confirmations that fail transiently before the server answers the gateway.
    pub settle_retry: RetryConfig,
    /// How often the background worker releases matured earnings.
    pub worker_interval: Duration,
    /// If true, the worker also requests a payout of the full balance for every seller with a payout method.
    pub auto_payouts: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_MKT_HOST.to_string(),
            port: DEFAULT_MKT_PORT,
            database_url: Secret::default(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            settlement: SettlementConfig::default(),
            payouts: PayoutConfig::default(),
            settle_retry: RetryConfig::default().with_max_attempts(DEFAULT_SETTLE_MAX_ATTEMPTS),
            worker_interval: DEFAULT_WORKER_INTERVAL,
            auto_payouts: false,
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("MKT_HOST").ok().unwrap_or_else(|| DEFAULT_MKT_HOST.into());
        let port = env_or_default("MKT_PORT", DEFAULT_MKT_PORT);
        let database_url = env::var("MKT_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ MKT_DATABASE_URL is not set. Please set it to the URL for the settlement database.");
            String::default()
        });
        let currency = env_or_default("MKT_CURRENCY", Currency::default());
        let storage_timeout =
            Duration::from_millis(env_or_default("MKT_STORAGE_TIMEOUT_MS", millis(DEFAULT_STORAGE_TIMEOUT)));
        let commission = CommissionConfig {
            service_fee_bps: env_or_default("MKT_SERVICE_FEE_BPS", DEFAULT_SERVICE_FEE_BPS),
            fixed_fee: env_or_default("MKT_FIXED_FEE", DEFAULT_FIXED_FEE),
            shipping_cost: env_or_default("MKT_SHIPPING_COST", DEFAULT_SHIPPING_COST),
            tax_bps: env_or_default("MKT_TAX_BPS", DEFAULT_TAX_BPS),
            max_price: env_or_default("MKT_MAX_PRICE", DEFAULT_MAX_PRICE),
            currency: currency.clone(),
        };
        let settlement = SettlementConfig {
            commission,
            amount_tolerance: env_or_default("MKT_AMOUNT_TOLERANCE", DEFAULT_AMOUNT_TOLERANCE),
            storage_timeout,
            ..Default::default()
        };
        let hold_days = env_or_default("MKT_PAYOUT_HOLD_DAYS", DEFAULT_HOLD_DAYS);
        let payouts = PayoutConfig {
            minimum_payout: env_or_default("MKT_MINIMUM_PAYOUT", DEFAULT_MINIMUM_PAYOUT),
            hold_period: chrono::Duration::days(hold_days.max(0)),
            currency,
            storage_timeout,
        };
        let settle_retry = RetryConfig::default()
            .with_max_attempts(env_or_default("MKT_SETTLE_MAX_ATTEMPTS", DEFAULT_SETTLE_MAX_ATTEMPTS));
        let worker_interval =
            Duration::from_secs(env_or_default("MKT_WORKER_INTERVAL_SECS", DEFAULT_WORKER_INTERVAL.as_secs()).max(1));
        let auto_payouts = parse_boolean_flag(env::var("MKT_AUTO_PAYOUTS").ok(), false);
        if auto_payouts {
            info!("🪛️ Scheduled payouts are enabled. Sellers with a payout method will be paid their full balance.");
        }
        Self {
            host,
            port,
            database_url: Secret::new(database_url),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            settlement,
            payouts,
            settle_retry,
            worker_interval,
            auto_payouts,
        }
    }
}

/// The per-request settings that handlers need, shared as app data.
#[derive(Clone, Debug)]
pub struct ServerOptions {
    /// Assumed for request amounts that don't name a currency.
    pub currency: Currency,
    pub settle_retry: RetryConfig,
}

impl ServerOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self { currency: config.payouts.currency.clone(), settle_retry: config.settle_retry.clone() }
    }
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default())
    }
}

/// Reads `name` from the environment. Values that don't parse are logged and replaced by `default`.
fn env_or_default<T>(name: &str, default: T) -> T
where
    T: FromStr + Display + Clone,
    T::Err: Display,
{
    parse_or_default(env::var(name).ok(), default.clone()).unwrap_or_else(|e| {
        warn!("🪛️ Invalid configuration value for {name}. {e} Using the default, {default}, instead.");
        default
    })
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod test {
    use mkt_common::Cents;

    use super::*;

    #[test]
    fn env_values_fall_back_to_defaults() {
        env::set_var("MKT_TEST_FEE", "2.50");
        env::set_var("MKT_TEST_PORT", "http");
        assert_eq!(env_or_default("MKT_TEST_FEE", Cents::from(70)), Cents::from(250));
        assert_eq!(env_or_default("MKT_TEST_PORT", 8370u16), 8370);
        assert_eq!(env_or_default("MKT_TEST_UNSET", 42i64), 42);
    }

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, DEFAULT_MKT_PORT);
        assert_eq!(config.settle_retry.max_attempts, DEFAULT_SETTLE_MAX_ATTEMPTS);
        assert_eq!(config.payouts.minimum_payout, Cents::from(2_000));
        assert_eq!(config.settlement.commission.max_price, Cents::from(100_000_000));
        assert!(!config.auto_payouts);
        assert!(config.database_url.is_unset());
    }
}
