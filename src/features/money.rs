use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::{Deserialize, Deserializer, Serializer};

/// Number of fractional digits every stored amount carries.
pub const CENTS_DP: u32 = 2;

/// Largest amount a single operation accepts.
pub const MAX_AMOUNT: Decimal = dec!(1000000000);

/// Round to cents, midpoint away from zero, and pin the scale so that
/// `100` is held as `100.00`.
pub fn normalize(amount: Decimal) -> Decimal {
    let mut rounded =
        amount.round_dp_with_strategy(CENTS_DP, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(CENTS_DP);
    rounded
}

/// True when the amount carries no precision below a cent.
pub fn is_whole_cents(amount: Decimal) -> bool {
    amount.round_dp(CENTS_DP) == amount
}

pub fn format(amount: Decimal) -> String {
    format!("${}", normalize(amount))
}

/// Serde adapter: amounts are written as 2-decimal strings and read back from
/// either strings or JSON numbers.
pub mod two_places {
    use super::*;

    pub fn serialize<S>(amount: &Decimal, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let rounded_amount = normalize(*amount).to_string();
        s.serialize_str(rounded_amount.as_str())
    }

    pub fn deserialize<'de, D>(d: D) -> Result<Decimal, D::Error>
    where
        D: Deserializer<'de>,
    {
        <Decimal as Deserialize>::deserialize(d)
    }
}
