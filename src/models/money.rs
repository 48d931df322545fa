//! Money amounts: rounded to cents and serialized as strings with two
//! decimals, so `0` reads `"0.00"` like any other amount.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serializer};

const CENTS: u32 = 2;

/// Round to cents and pin the scale
pub fn normalize(value: Decimal) -> Decimal {
    let mut cents = value.round_dp(CENTS);
    cents.rescale(CENTS);
    cents
}

pub fn serialize<S: Serializer>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&normalize(*value))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Decimal, D::Error> {
    <Decimal as Deserialize>::deserialize(deserializer).map(normalize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize, Deserialize)]
    struct Amount(#[serde(with = "super")] Decimal);

    #[test]
    fn zero_keeps_two_decimals() {
        assert_eq!(serde_json::to_string(&Amount(Decimal::ZERO)).unwrap(), r#""0.00""#);
    }

    #[test]
    fn amounts_are_rounded_to_cents() {
        assert_eq!(normalize(Decimal::new(15, 1)).to_string(), "1.50");
        assert_eq!(normalize(Decimal::new(12345, 3)).to_string(), "12.34");
        assert_eq!(normalize(Decimal::from(7)).to_string(), "7.00");
    }

    #[test]
    fn parses_strings_and_numbers() {
        let Amount(from_str) = serde_json::from_str(r#""2.5""#).unwrap();
        let Amount(from_number) = serde_json::from_str("2.5").unwrap();
        assert_eq!(from_str.to_string(), "2.50");
        assert_eq!(from_number, from_str);
    }
}
