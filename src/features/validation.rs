use super::money;
use rust_decimal::prelude::*;
use thiserror::Error;

pub const MIN_SECRET_LEN: usize = 6;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please enter a valid amount (e.g., 50 or 50.00), got `{0}`")]
    NotANumber(String),

    #[error("Amount must be greater than zero, got {0}")]
    NonPositive(Decimal),

    #[error("Amount {0} is over the {} limit", money::format(money::MAX_AMOUNT))]
    TooLarge(Decimal),

    #[error("Password must be at least 6 characters long and include both letters and numbers")]
    WeakSecret,

    #[error("Name cannot be empty")]
    EmptyName,
}

type ValidationResult<T> = Result<T, ValidationError>;

/// Parse a user-typed amount into a positive value with exactly two decimals.
pub fn parse_amount(raw: &str) -> ValidationResult<Decimal> {
    let trimmed = raw.trim();
    let amount =
        Decimal::from_str(trimmed).map_err(|_| ValidationError::NotANumber(trimmed.to_owned()))?;

    if amount > money::MAX_AMOUNT {
        return Err(ValidationError::TooLarge(amount));
    }

    let amount = money::normalize(amount);
    if amount <= Decimal::ZERO {
        return Err(ValidationError::NonPositive(amount));
    }
    Ok(amount)
}

pub fn validate_secret(raw: &str) -> ValidationResult<&str> {
    let long_enough = raw.chars().count() >= MIN_SECRET_LEN;
    let has_letter = raw.chars().any(|c| c.is_ascii_alphabetic());
    let has_digit = raw.chars().any(|c| c.is_ascii_digit());

    if long_enough && has_letter && has_digit {
        Ok(raw)
    } else {
        Err(ValidationError::WeakSecret)
    }
}

pub fn validate_name(raw: &str) -> ValidationResult<&str> {
    match raw.trim() {
        "" => Err(ValidationError::EmptyName),
        name => Ok(name),
    }
}
