mod payout_method;
mod retry;
mod timeout;

pub use payout_method::validate_payout_method;
pub use retry::{retry_with_backoff, RetryConfig};
pub use timeout::with_timeout;
