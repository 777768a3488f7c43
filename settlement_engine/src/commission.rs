//! The platform's fee schedule.
//!
//! The calculator is a pure function of the product price and the [`CommissionConfig`]. It is evaluated exactly once,
//! when the order is created, and the result is frozen onto the order. Settlement recomputes the breakdown from the
//! stored price only to check that the gateway charged the expected amount.
use mkt_common::{Cents, Currency, Money, MoneyError};
use serde::{Deserialize, Serialize};

use crate::db_types::Order;

pub const DEFAULT_SERVICE_FEE_BPS: i64 = 500;
pub const DEFAULT_FIXED_FEE: Cents = Cents::new(70);
pub const DEFAULT_SHIPPING_COST: Cents = Cents::new(500);
pub const DEFAULT_TAX_BPS: i64 = 0;
pub const DEFAULT_MAX_PRICE: Cents = Cents::new(100_000_000);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionConfig {
    /// Percentage fee, in basis points, charged on the product price.
    pub service_fee_bps: i64,
    /// Flat fee added to every order.
    pub fixed_fee: Cents,
    pub shipping_cost: Cents,
    /// Tax rate, in basis points, charged on the product price.
    pub tax_bps: i64,
    /// The most a single product may be listed for. Checkouts above this are refused.
    pub max_price: Cents,
    pub currency: Currency,
}

impl Default for CommissionConfig {
    fn default() -> Self {
        Self {
            service_fee_bps: DEFAULT_SERVICE_FEE_BPS,
            fixed_fee: DEFAULT_FIXED_FEE,
            shipping_cost: DEFAULT_SHIPPING_COST,
            tax_bps: DEFAULT_TAX_BPS,
            max_price: DEFAULT_MAX_PRICE,
            currency: Currency::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionBreakdown {
    pub product_price: Cents,
    pub service_fee: Cents,
    pub shipping_cost: Cents,
    pub tax_amount: Cents,
    pub total_amount: Cents,
    pub seller_earnings: Cents,
    pub service_fee_rate_bps: i64,
    pub currency: Currency,
}

impl CommissionBreakdown {
    /// The portion of the total the platform keeps.
    pub fn commission_amount(&self) -> Cents {
        self.service_fee + self.tax_amount
    }

    pub fn total(&self) -> Money {
        Money::new(self.total_amount, self.currency.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommissionCalculator {
    config: CommissionConfig,
}

impl CommissionCalculator {
    pub fn new(config: CommissionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CommissionConfig {
        &self.config
    }

    pub fn currency(&self) -> &Currency {
        &self.config.currency
    }

    pub fn max_price(&self) -> Cents {
        self.config.max_price
    }

    /// Fails with [`MoneyError::Overflow`] if any part of the breakdown does not fit in an `i64` of cents.
    pub fn calculate(&self, product_price: &Money) -> Result<CommissionBreakdown, MoneyError> {
        let price = product_price.amount;
        let service_fee = price.apply_rate_bps(self.config.service_fee_bps).checked_add(self.config.fixed_fee)?;
        let shipping_cost = self.config.shipping_cost;
        let tax_amount = price.apply_rate_bps(self.config.tax_bps);
        let total_amount = price.checked_add(service_fee)?.checked_add(shipping_cost)?.checked_add(tax_amount)?;
        Ok(CommissionBreakdown {
            product_price: price,
            service_fee,
            shipping_cost,
            tax_amount,
            total_amount,
            seller_earnings: price,
            service_fee_rate_bps: self.config.service_fee_bps,
            currency: product_price.currency.clone(),
        })
    }

    /// Recomputes the breakdown from the order's stored price and compares it with the amounts frozen on the order.
    pub fn verify(&self, order: &Order) -> bool {
        let Ok(expected) = self.calculate(&order.price()) else {
            return false;
        };
        expected.total_amount == order.total_amount &&
            expected.service_fee == order.service_fee &&
            expected.shipping_cost == order.shipping_cost &&
            expected.tax_amount == order.tax_amount
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn eur(cents: i64) -> Money {
        Money::new(cents, Currency::default())
    }

    #[test]
    fn default_fee_schedule() {
        let calc = CommissionCalculator::default();
        let b = calc.calculate(&eur(10_000)).unwrap();
        assert_eq!(b.service_fee, Cents::from(570));
        assert_eq!(b.shipping_cost, Cents::from(500));
        assert_eq!(b.tax_amount, Cents::from(0));
        assert_eq!(b.total_amount, Cents::from(11_070));
        assert_eq!(b.seller_earnings, Cents::from(10_000));
        assert_eq!(b.commission_amount(), Cents::from(570));
        assert_eq!(b.service_fee_rate_bps, 500);
    }

    #[test]
    fn fee_rounding() {
        let calc = CommissionCalculator::default();
        // 5% of 12.34 is 0.617
        let b = calc.calculate(&eur(1234)).unwrap();
        assert_eq!(b.service_fee, Cents::from(62 + 70));
        // 5% of 0.10 is exactly half a cent
        let b = calc.calculate(&eur(10)).unwrap();
        assert_eq!(b.service_fee, Cents::from(71));
    }

    #[test]
    fn tax_is_part_of_commission() {
        let config = CommissionConfig { tax_bps: 2_000, ..Default::default() };
        let calc = CommissionCalculator::new(config);
        let b = calc.calculate(&eur(10_000)).unwrap();
        assert_eq!(b.tax_amount, Cents::from(2_000));
        assert_eq!(b.total_amount, Cents::from(13_070));
        assert_eq!(b.commission_amount() + b.seller_earnings + b.shipping_cost, b.total_amount);
    }

    #[test]
    fn totals_always_balance() {
        let calc = CommissionCalculator::new(CommissionConfig { tax_bps: 1_900, ..Default::default() });
        for cents in [1, 99, 100, 1_999, 12_345, 99_999, 1_000_000] {
            let b = calc.calculate(&eur(cents)).unwrap();
            assert_eq!(b.commission_amount() + b.seller_earnings + b.shipping_cost, b.total_amount, "price {cents}");
        }
    }

    #[test]
    fn overflowing_prices_are_an_error() {
        let calc = CommissionCalculator::default();
        let result = calc.calculate(&eur(i64::MAX - 100));
        assert!(matches!(result, Err(MoneyError::Overflow(_))));
    }
}
