//! Non-negative fixed-point ingredient quantity.
//!
//! Quantities are stored as integer milli-units (three fractional digits), so
//! consuming and later restoring the same amount always lands on the exact
//! starting value.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

const SCALE: u64 = 1_000;
const FRACTION_DIGITS: usize = 3;

/// An ingredient quantity in the ingredient's own unit (ml, g, shots, ...).
///
/// Serialized as decimal text (`"200"`, `"12.5"`).
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Quantity(u64);

impl Quantity {
    pub const ZERO: Quantity = Quantity(0);

    pub const fn from_milli(milli: u64) -> Self {
        Self(milli)
    }

    /// Whole units, e.g. `Quantity::from_units(200)` for 200 ml.
    pub const fn from_units(units: u32) -> Self {
        Self(units as u64 * SCALE)
    }

    pub const fn milli(self) -> u64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Quantity) -> Option<Quantity> {
        self.0.checked_add(other.0).map(Quantity)
    }

    pub fn checked_sub(self, other: Quantity) -> Option<Quantity> {
        self.0.checked_sub(other.0).map(Quantity)
    }

    /// Scale a per-unit requirement by the number of units ordered.
    pub fn checked_mul(self, count: u32) -> Option<Quantity> {
        self.0.checked_mul(u64::from(count)).map(Quantity)
    }

    pub fn saturating_sub(self, other: Quantity) -> Quantity {
        Quantity(self.0.saturating_sub(other.0))
    }
}

impl core::fmt::Display for Quantity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let whole = self.0 / SCALE;
        let frac = self.0 % SCALE;
        if frac == 0 {
            return write!(f, "{whole}");
        }
        let digits = format!("{frac:0width$}", width = FRACTION_DIGITS);
        write!(f, "{whole}.{}", digits.trim_end_matches('0'))
    }
}

impl FromStr for Quantity {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || DomainError::validation(format!("invalid quantity '{s}'"));

        let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if frac.len() > FRACTION_DIGITS {
            return Err(DomainError::validation(format!(
                "quantity '{s}' has more than {FRACTION_DIGITS} fractional digits"
            )));
        }

        let whole: u64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let frac: u64 = if frac.is_empty() {
            0
        } else {
            format!("{frac:0<width$}", width = FRACTION_DIGITS)
                .parse()
                .map_err(|_| invalid())?
        };

        whole
            .checked_mul(SCALE)
            .and_then(|m| m.checked_add(frac))
            .map(Quantity)
            .ok_or_else(|| DomainError::validation(format!("quantity '{s}' is out of range")))
    }
}

impl TryFrom<String> for Quantity {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Quantity> for String {
    fn from(value: Quantity) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_whole_and_fractional_values() {
        assert_eq!("200".parse::<Quantity>().unwrap(), Quantity::from_units(200));
        assert_eq!("12.5".parse::<Quantity>().unwrap(), Quantity::from_milli(12_500));
        assert_eq!(".125".parse::<Quantity>().unwrap(), Quantity::from_milli(125));
        assert_eq!("7.".parse::<Quantity>().unwrap(), Quantity::from_units(7));
    }

    #[test]
    fn rejects_negative_and_malformed_values() {
        for bad in ["", ".", "-1", "1.2345", "abc", "1e3", "1.2.3"] {
            assert!(bad.parse::<Quantity>().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn display_trims_trailing_zeros() {
        assert_eq!(Quantity::from_units(500).to_string(), "500");
        assert_eq!(Quantity::from_milli(12_500).to_string(), "12.5");
        assert_eq!(Quantity::from_milli(1_050).to_string(), "1.05");
        assert_eq!(Quantity::from_milli(7).to_string(), "0.007");
    }

    #[test]
    fn serializes_as_decimal_text() {
        let json = serde_json::to_string(&Quantity::from_milli(2_250)).unwrap();
        assert_eq!(json, "\"2.25\"");
        let back: Quantity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Quantity::from_milli(2_250));
    }

    #[test]
    fn subtraction_below_zero_is_detected() {
        let have = Quantity::from_units(100);
        let need = Quantity::from_units(200);
        assert_eq!(have.checked_sub(need), None);
        assert_eq!(have.saturating_sub(need), Quantity::ZERO);
    }

    proptest! {
        /// Property: display/parse preserves every representable milli value.
        #[test]
        fn text_form_is_lossless(milli in 0u64..1_000_000_000_000u64) {
            let q = Quantity::from_milli(milli);
            let parsed: Quantity = q.to_string().parse().unwrap();
            prop_assert_eq!(parsed, q);
        }

        /// Property: adding then subtracting the same amount is exact.
        #[test]
        fn add_then_sub_is_identity(a in 0u64..u64::MAX / 2, b in 0u64..u64::MAX / 2) {
            let qa = Quantity::from_milli(a);
            let qb = Quantity::from_milli(b);
            let sum = qa.checked_add(qb).unwrap();
            prop_assert_eq!(sum.checked_sub(qb), Some(qa));
        }
    }
}
