use regex::Regex;

use crate::db_types::PayoutMethod;

const MIN_CARD_REFERENCE_LENGTH: usize = 10;

/// Checks that the payout method payload is well-formed for its kind.
///
/// * Wallet handles are either `@`-tags (an `@` followed by at least two of `A-Z a-z 0-9 _ . -`) or email addresses.
/// * Bank transfers need an IBAN-shaped account number: two letters, two check digits and 11 to 30 alphanumerics.
///   Spaces are ignored.
/// * Card references must be at least 10 characters long.
pub fn validate_payout_method(method: &PayoutMethod) -> Result<(), String> {
    match method {
        PayoutMethod::Wallet { handle } => {
            let handle = handle.trim();
            let pattern = if handle.starts_with('@') { r"^@[A-Za-z0-9_.\-]{2,}$" } else { r"^[^\s@]+@[^\s@]+\.[^\s@]+$" };
            let re = Regex::new(pattern).map_err(|e| e.to_string())?;
            if re.is_match(handle) {
                Ok(())
            } else if handle.starts_with('@') {
                Err(format!("'{handle}' is not a valid wallet tag. Tags start with @ and are at least 3 characters."))
            } else {
                Err(format!("'{handle}' is not a valid wallet tag or email address."))
            }
        },
        PayoutMethod::BankTransfer { iban } => {
            let compact = iban.chars().filter(|c| !c.is_whitespace()).collect::<String>().to_ascii_uppercase();
            let re = Regex::new(r"^[A-Z]{2}[0-9]{2}[A-Z0-9]{11,30}$").map_err(|e| e.to_string())?;
            if re.is_match(&compact) {
                Ok(())
            } else {
                Err("The bank account number is not a valid IBAN.".to_string())
            }
        },
        PayoutMethod::Card { reference } => {
            if reference.trim().chars().count() >= MIN_CARD_REFERENCE_LENGTH {
                Ok(())
            } else {
                Err(format!("Card details must be at least {MIN_CARD_REFERENCE_LENGTH} characters."))
            }
        },
    }
}
