//! Indian price notation: rupee amounts <-> short forms like `₹75 L`, `₹1.5 Cr`, `₹10K`.
//!
//! Short forms are a display convenience. Formatting keeps at most one decimal
//! for lakh/crore and none for thousands, so `parse(format(v)) == v` only holds
//! when `v` is a whole multiple of the unit at that precision.

use num_format::{Locale, ToFormattedString};
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use ts_rs::TS;

pub const THOUSAND: u64 = 1_000;
pub const LAKH: u64 = 1_00_000;
pub const CRORE: u64 = 1_00_00_000;

static NOTATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+\.?\d*)(CR|L|K)$").expect("valid price notation regex"));
static DIGITS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+$").expect("valid digits regex"));

/// Result of reading user-entered price text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceInput {
    /// Nothing entered (or only symbols/whitespace).
    Empty,
    /// Something entered that is not a price.
    Invalid,
    /// A rupee amount.
    Amount(u64),
}

impl PriceInput {
    pub fn amount(self) -> Option<u64> {
        match self {
            PriceInput::Amount(value) => Some(value),
            PriceInput::Empty | PriceInput::Invalid => None,
        }
    }

    /// Decimal rupee string for the amount. `Empty` and `Invalid` both
    /// collapse to `""`. See [`raw_price_notation`] for the form-field string.
    pub fn to_raw(self) -> String {
        self.amount().map(|v| v.to_string()).unwrap_or_default()
    }
}

enum Notation {
    Scaled(u64),
    Digits,
    Unrecognized,
}

fn clean(input: &str) -> String {
    input
        .chars()
        .filter(|c| *c != '₹' && *c != ',' && !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}

fn classify(cleaned: &str) -> Notation {
    if let Some(caps) = NOTATION_RE.captures(cleaned) {
        let unit = match &caps[2] {
            "CR" => CRORE,
            "L" => LAKH,
            _ => THOUSAND,
        };
        let Ok(number) = caps[1].parse::<f64>() else {
            return Notation::Unrecognized;
        };
        let scaled = (number * unit as f64).round();
        if !scaled.is_finite() || scaled > u64::MAX as f64 {
            return Notation::Unrecognized;
        }
        return Notation::Scaled(scaled as u64);
    }

    if DIGITS_RE.is_match(cleaned) {
        Notation::Digits
    } else {
        Notation::Unrecognized
    }
}

/// Read user-entered price text: `75L`, `₹1.5 Cr`, `10k`, `1,50,000`.
///
/// Pure digits are taken as rupees. Digit strings too large for `u64` are
/// `Invalid`.
pub fn parse_price_notation(input: &str) -> PriceInput {
    let cleaned = clean(input);
    if cleaned.is_empty() {
        return PriceInput::Empty;
    }
    match classify(&cleaned) {
        Notation::Scaled(value) => PriceInput::Amount(value),
        Notation::Digits => cleaned
            .parse::<u64>()
            .map_or(PriceInput::Invalid, PriceInput::Amount),
        Notation::Unrecognized => PriceInput::Invalid,
    }
}

/// Raw string stored in forms and query strings for user-entered price text.
///
/// Digit-only input is echoed as cleaned (leading zeros and all), unit forms
/// become their rupee amount, and anything else is `""`.
pub fn raw_price_notation(input: &str) -> String {
    let cleaned = clean(input);
    match classify(&cleaned) {
        Notation::Digits => cleaned,
        Notation::Scaled(value) => value.to_string(),
        Notation::Unrecognized => String::new(),
    }
}

/// Format a raw rupee string in short notation. Unparseable input yields `""`.
pub fn format_price_notation(raw: &str) -> String {
    raw.trim()
        .parse::<u64>()
        .map(format_amount_notation)
        .unwrap_or_default()
}

/// Short notation for an amount already held as a number.
pub fn format_amount_notation(amount: u64) -> String {
    if amount >= CRORE {
        format!("₹{} Cr", scaled_one_decimal(amount, CRORE))
    } else if amount >= LAKH {
        format!("₹{} L", scaled_one_decimal(amount, LAKH))
    } else if amount >= THOUSAND {
        format!("₹{}K", (amount + THOUSAND / 2) / THOUSAND)
    } else {
        format!("₹{}", amount.to_formatted_string(&Locale::en_IN))
    }
}

/// `amount / unit` with one rounded decimal, or none when it divides evenly.
fn scaled_one_decimal(amount: u64, unit: u64) -> String {
    if amount % unit == 0 {
        return (amount / unit).to_string();
    }
    let tenths = (u128::from(amount) * 10 + u128::from(unit) / 2) / u128::from(unit);
    format!("{}.{}", tenths / 10, tenths % 10)
}

/// Listing price as shown on property cards: two decimals for lakh/crore.
pub fn format_price(price: u64) -> String {
    if price >= CRORE {
        format!("₹{:.2} Cr", price as f64 / CRORE as f64)
    } else if price >= LAKH {
        format!("₹{:.2} L", price as f64 / LAKH as f64)
    } else {
        format!("₹{}", price.to_formatted_string(&Locale::en_IN))
    }
}

/// Human price range. Zero bounds count as absent.
pub fn format_price_range(min_price: Option<u64>, max_price: Option<u64>) -> String {
    let min_price = min_price.filter(|v| *v > 0);
    let max_price = max_price.filter(|v| *v > 0);
    match (min_price, max_price) {
        (Some(min), Some(max)) if min == max => format_price(min),
        (Some(min), Some(max)) => format!("{} - {}", format_price(min), format_price(max)),
        (Some(min), None) => format!("From {}", format_price(min)),
        (None, Some(max)) => format!("Up to {}", format_price(max)),
        (None, None) => "Price on Request".to_owned(),
    }
}

/// Quick-pick bounds offered by price range inputs.
#[derive(Debug, Clone, Copy, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PricePreset {
    #[ts(type = "number")]
    pub value: u64,
    pub label: &'static str,
    pub full_label: &'static str,
}

pub const PRICE_PRESETS: &[PricePreset] = &[
    PricePreset { value: 10_000, label: "10K", full_label: "₹10,000" },
    PricePreset { value: 50_000, label: "50K", full_label: "₹50,000" },
    PricePreset { value: 1_00_000, label: "1L", full_label: "₹1 Lakh" },
    PricePreset { value: 5_00_000, label: "5L", full_label: "₹5 Lakh" },
    PricePreset { value: 10_00_000, label: "10L", full_label: "₹10 Lakh" },
    PricePreset { value: 25_00_000, label: "25L", full_label: "₹25 Lakh" },
    PricePreset { value: 50_00_000, label: "50L", full_label: "₹50 Lakh" },
    PricePreset { value: 75_00_000, label: "75L", full_label: "₹75 Lakh" },
    PricePreset { value: 1_00_00_000, label: "1Cr", full_label: "₹1 Crore" },
    PricePreset { value: 1_50_00_000, label: "1.5Cr", full_label: "₹1.5 Crore" },
    PricePreset { value: 2_00_00_000, label: "2Cr", full_label: "₹2 Crore" },
    PricePreset { value: 3_00_00_000, label: "3Cr", full_label: "₹3 Crore" },
    PricePreset { value: 5_00_00_000, label: "5Cr", full_label: "₹5 Crore" },
    PricePreset { value: 10_00_00_000, label: "10Cr", full_label: "₹10 Crore" },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_each_unit() {
        assert_eq!(format_price_notation("10000000"), "₹1 Cr");
        assert_eq!(format_price_notation("15000000"), "₹1.5 Cr");
        assert_eq!(format_price_notation("100000"), "₹1 L");
        assert_eq!(format_price_notation("7500000"), "₹75 L");
        assert_eq!(format_price_notation("10000"), "₹10K");
        assert_eq!(format_price_notation("950"), "₹950");
    }

    #[test]
    fn lakh_remainder_keeps_one_decimal() {
        assert_eq!(format_price_notation("250000"), "₹2.5 L");
        assert_eq!(format_price_notation("8575000"), "₹85.8 L");
    }

    #[test]
    fn thousands_round_to_whole_units() {
        assert_eq!(format_price_notation("12499"), "₹12K");
        assert_eq!(format_price_notation("12500"), "₹13K");
    }

    #[test]
    fn format_rejects_garbage() {
        assert_eq!(format_price_notation(""), "");
        assert_eq!(format_price_notation("abc"), "");
        assert_eq!(format_price_notation("-5"), "");
    }

    #[test]
    fn parse_handles_units_and_symbols() {
        assert_eq!(parse_price_notation("₹1.5cr").to_raw(), "15000000");
        assert_eq!(parse_price_notation("75L").to_raw(), "7500000");
        assert_eq!(parse_price_notation("10k").to_raw(), "10000");
        assert_eq!(parse_price_notation("₹ 2.5 L").to_raw(), "250000");
        assert_eq!(parse_price_notation("1,50,000").to_raw(), "150000");
    }

    #[test]
    fn unreadable_input_has_empty_raw_form() {
        assert_eq!(parse_price_notation("lots").to_raw(), "");
        assert_eq!(parse_price_notation("1.5M").to_raw(), "");
        assert_eq!(parse_price_notation(".5L").to_raw(), "");
        assert_eq!(parse_price_notation("").to_raw(), "");
    }

    #[test]
    fn raw_form_echoes_digit_strings() {
        assert_eq!(raw_price_notation("007"), "007");
        assert_eq!(raw_price_notation(" ₹ 1,50,000 "), "150000");
        assert_eq!(raw_price_notation("99999999999999999999999"), "99999999999999999999999");
        assert_eq!(raw_price_notation("75l"), "7500000");
        assert_eq!(raw_price_notation("lots"), "");
        assert_eq!(raw_price_notation(""), "");
        assert_eq!(parse_price_notation("007").to_raw(), "7");
    }

    #[test]
    fn empty_and_invalid_are_distinct() {
        assert_eq!(parse_price_notation("  "), PriceInput::Empty);
        assert_eq!(parse_price_notation("₹"), PriceInput::Empty);
        assert_eq!(parse_price_notation("soon"), PriceInput::Invalid);
        assert_eq!(parse_price_notation("80L"), PriceInput::Amount(8_000_000));
        assert_eq!(parse_price_notation("99999999999999999999999"), PriceInput::Invalid);
    }

    #[test]
    fn listing_format_uses_two_decimals() {
        assert_eq!(format_price(15_000_000), "₹1.50 Cr");
        assert_eq!(format_price(7_500_000), "₹75.00 L");
        assert_eq!(format_price(50_000), "₹50,000");
    }

    #[test]
    fn range_wording() {
        assert_eq!(format_price_range(None, None), "Price on Request");
        assert_eq!(format_price_range(Some(0), None), "Price on Request");
        assert_eq!(format_price_range(Some(5_000_000), None), "From ₹50.00 L");
        assert_eq!(format_price_range(None, Some(10_000_000)), "Up to ₹1.00 Cr");
        assert_eq!(
            format_price_range(Some(10_000_000), Some(10_000_000)),
            "₹1.00 Cr"
        );
        assert_eq!(
            format_price_range(Some(5_000_000), Some(10_000_000)),
            "₹50.00 L - ₹1.00 Cr"
        );
    }

    #[test]
    fn presets_are_ascending() {
        assert!(PRICE_PRESETS.windows(2).all(|w| w[0].value < w[1].value));
    }
}
