//! Primitives shared by the settlement engine and the settlement server.
//!
//! * [`Cents`] is the fixed-point amount type. All monetary arithmetic is done in integer cents.
//! * [`Money`] tags an amount with its [`Currency`]. Operations across currencies fail rather than silently mixing.
//! * [`Secret`] hides sensitive configuration values from logs.
mod money;

pub mod helpers;
pub mod op;
mod secret;

pub use money::{Cents, Currency, Money, MoneyError, DEFAULT_CURRENCY_CODE};
pub use secret::Secret;
