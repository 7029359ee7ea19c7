//! Field normalization
//!
//! Canonicalizes the heterogeneous date, number and text representations found
//! in client trade files and bank confirmations so that the comparator works on
//! well-defined values. Pure functions, no I/O.
//!
//! Values that are syntactically fine but unknown (a currency outside the ISO
//! set, an unfamiliar product name) normalize to [`CanonicalValue::Unrecognized`]
//! and never compare equal to anything.

use std::sync::OnceLock;

use chrono::{Datelike, Duration, NaiveDate};
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::error::NormalizationError;
use crate::models::{Direction, Field, Product, SettlementModality};

/// Plausible calendar range for trade-related dates
const MIN_YEAR: i32 = 1970;
const MAX_YEAR: i32 = 2100;

/// Decimal places kept for amounts
pub const AMOUNT_DP: u32 = 2;
/// Decimal places kept for prices and rates
pub const PRICE_DP: u32 = 4;

/// ISO 4217 codes accepted as currencies
const ISO_CURRENCIES: &[&str] = &[
    "AED", "ARS", "AUD", "BRL", "CAD", "CHF", "CLF", "CLP", "CNH", "CNY", "COP", "CZK", "DKK",
    "EUR", "GBP", "HKD", "HUF", "IDR", "ILS", "INR", "JPY", "KRW", "MXN", "MYR", "NOK", "NZD",
    "PEN", "PHP", "PLN", "RON", "RUB", "SAR", "SEK", "SGD", "THB", "TRY", "TWD", "USD", "UYU",
    "ZAR",
];

/// A normalized field value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum CanonicalValue {
    Date(NaiveDate),
    Decimal(Decimal),
    /// Member of a closed vocabulary (currency, direction, product, settlement type)
    Code(String),
    /// Free text folded for comparison
    Text(String),
    /// Well-formed but outside the known vocabulary; always a mismatch
    Unrecognized(String),
}

impl CanonicalValue {
    pub fn is_unrecognized(&self) -> bool {
        matches!(self, Self::Unrecognized(_))
    }
}

impl std::fmt::Display for CanonicalValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::Decimal(d) => write!(f, "{}", d),
            Self::Code(s) | Self::Text(s) => write!(f, "{}", s),
            Self::Unrecognized(s) => write!(f, "?{}", s),
        }
    }
}

/// How a field is normalized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Date,
    Amount,
    Price,
    Currency,
    Direction,
    Product,
    SettlementType,
    Counterparty,
    Identifier,
    Text,
}

fn kind_of(field: Field) -> FieldKind {
    match field {
        Field::TradeDate | Field::ValueDate | Field::MaturityDate | Field::PaymentDate => {
            FieldKind::Date
        }
        Field::Amount => FieldKind::Amount,
        Field::Price => FieldKind::Price,
        Field::Currency1 | Field::Currency2 | Field::SettlementCurrency => FieldKind::Currency,
        Field::Direction => FieldKind::Direction,
        Field::Product => FieldKind::Product,
        Field::SettlementType => FieldKind::SettlementType,
        Field::Counterparty => FieldKind::Counterparty,
        Field::TradeNumber => FieldKind::Identifier,
        Field::PaymentMethod => FieldKind::Text,
    }
}

/// Normalize one raw field value
pub fn normalize(field: Field, raw: &str) -> Result<CanonicalValue, NormalizationError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(NormalizationError::Empty {
            field: field.to_string(),
        });
    }

    match kind_of(field) {
        FieldKind::Date => normalize_date(value)
            .map(CanonicalValue::Date)
            .ok_or_else(|| NormalizationError::InvalidDate {
                field: field.to_string(),
                value: value.to_string(),
            }),
        FieldKind::Amount => normalize_number(value, false)
            .map(|d| CanonicalValue::Decimal(round(d, AMOUNT_DP)))
            .ok_or_else(|| invalid_number(field, value)),
        FieldKind::Price => normalize_number(value, true)
            .map(|d| CanonicalValue::Decimal(round(d, PRICE_DP)))
            .ok_or_else(|| invalid_number(field, value)),
        FieldKind::Currency => Ok(normalize_currency(value)),
        FieldKind::Direction => Ok(match value.parse::<Direction>() {
            Ok(d) => CanonicalValue::Code(d.as_str().to_string()),
            Err(_) => CanonicalValue::Unrecognized(value.to_lowercase()),
        }),
        FieldKind::Product => Ok(match value.parse::<Product>() {
            Ok(p) => CanonicalValue::Code(p.as_str().to_string()),
            Err(_) => CanonicalValue::Unrecognized(value.to_lowercase()),
        }),
        FieldKind::SettlementType => Ok(match value.parse::<SettlementModality>() {
            Ok(m) => CanonicalValue::Code(m.as_str().to_string()),
            Err(_) => CanonicalValue::Unrecognized(value.to_lowercase()),
        }),
        FieldKind::Counterparty => Ok(CanonicalValue::Text(fold_name(value))),
        FieldKind::Identifier => Ok(CanonicalValue::Text(
            value
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>()
                .to_uppercase(),
        )),
        FieldKind::Text => Ok(CanonicalValue::Text(collapse_whitespace(value).to_lowercase())),
    }
}

/// Normalize a field given by name
pub fn normalize_named(field: &str, raw: &str) -> Result<CanonicalValue, NormalizationError> {
    let field = field
        .parse::<Field>()
        .map_err(|_| NormalizationError::UnknownField(field.to_string()))?;
    normalize(field, raw)
}

fn invalid_number(field: Field, value: &str) -> NormalizationError {
    NormalizationError::InvalidNumber {
        field: field.to_string(),
        value: value.to_string(),
    }
}

fn round(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

fn iso_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})(?:[T ]\d{1,2}:\d{2}.*)?$").expect("valid regex")
    })
}

fn day_first_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{1,2})([-/.])(\d{1,2})([-/.])(\d{2}|\d{4})(?:[T ]\d{1,2}:\d{2}.*)?$")
            .expect("valid regex")
    })
}

fn serial_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4,6}(?:\.\d+)?$").expect("valid regex"))
}

/// Accepts YYYY-MM-DD, DD-MM-YYYY, DD/MM/YYYY, DD.MM.YYYY and Excel serial days.
///
/// Two-digit years and dates outside 1970..=2100 are rejected.
pub fn normalize_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();

    let date = if let Some(caps) = iso_re().captures(value) {
        ymd(&caps[1], &caps[2], &caps[3])?
    } else if let Some(caps) = day_first_re().captures(value) {
        // Mixed separators such as 15-01/2025 are not a date
        if caps[2] != caps[4] || caps[5].len() != 4 {
            return None;
        }
        ymd(&caps[5], &caps[3], &caps[1])?
    } else if serial_re().is_match(value) {
        excel_serial_to_date(value)?
    } else {
        return None;
    };

    (MIN_YEAR..=MAX_YEAR).contains(&date.year()).then_some(date)
}

fn ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

/// Excel counts days from 1899-12-30 (the 1900 leap-year bug is baked into that epoch)
fn excel_serial_to_date(value: &str) -> Option<NaiveDate> {
    let whole = value.split('.').next()?;
    let days: i64 = whole.parse().ok()?;
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(days))
}

/// Parse a human-formatted number.
///
/// Both `.` and `,` are accepted. With both present the last one is the decimal
/// separator. A separator repeated more than once groups thousands. A single
/// separator followed by exactly three digits groups thousands for amounts
/// (`100.000` is one hundred thousand) unless the integer part is zero; for
/// prices a single separator is always decimal.
pub fn normalize_number(value: &str, single_separator_is_decimal: bool) -> Option<Decimal> {
    let mut s = value.trim();
    let mut negative = false;

    if s.starts_with('(') && s.ends_with(')') && s.len() > 2 {
        negative = true;
        s = &s[1..s.len() - 1];
    }

    // Currency codes and symbols around the figure
    let s = s
        .trim()
        .trim_matches(|c: char| c.is_ascii_alphabetic() || c.is_whitespace())
        .trim_matches(|c: char| matches!(c, '$' | '€' | '£' | '¥') || c.is_whitespace());

    let s = if let Some(rest) = s.strip_prefix('-') {
        negative = !negative;
        rest
    } else if let Some(rest) = s.strip_suffix('-') {
        negative = !negative;
        rest
    } else {
        s.strip_prefix('+').unwrap_or(s)
    };

    let cleaned: String = s
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\'' && *c != '_')
        .collect();

    if cleaned.is_empty()
        || !cleaned.chars().any(|c| c.is_ascii_digit())
        || !cleaned
            .chars()
            .all(|c| c.is_ascii_digit() || c == '.' || c == ',')
    {
        return None;
    }

    let dots = cleaned.matches('.').count();
    let commas = cleaned.matches(',').count();

    let canonical = match (dots, commas) {
        (0, 0) => cleaned,
        (d, c) if d > 0 && c > 0 => {
            let last_dot = cleaned.rfind('.')?;
            let last_comma = cleaned.rfind(',')?;
            let (decimal, thousands) = if last_dot > last_comma {
                ('.', ',')
            } else {
                (',', '.')
            };
            if cleaned.matches(decimal).count() != 1 {
                return None;
            }
            cleaned.replace(thousands, "").replace(decimal, ".")
        }
        (d, c) => {
            let sep = if d > 0 { '.' } else { ',' };
            let count = d + c;
            if count > 1 {
                cleaned.replace(sep, "")
            } else {
                let (int_part, frac_part) = cleaned.split_once(sep)?;
                let grouping = !single_separator_is_decimal
                    && frac_part.len() == 3
                    && !int_part.trim_start_matches('0').is_empty();
                if grouping {
                    format!("{}{}", int_part, frac_part)
                } else {
                    format!("{}.{}", int_part, frac_part)
                }
            }
        }
    };

    let canonical = if canonical.starts_with('.') {
        format!("0{}", canonical)
    } else {
        canonical
    };
    if canonical.ends_with('.') {
        return None;
    }

    let parsed: Decimal = canonical.parse().ok()?;
    Some(if negative { -parsed } else { parsed })
}

fn normalize_currency(value: &str) -> CanonicalValue {
    let code = value.trim().to_uppercase();
    if ISO_CURRENCIES.contains(&code.as_str()) {
        CanonicalValue::Code(code)
    } else {
        CanonicalValue::Unrecognized(code)
    }
}

/// Whether a code is in the accepted ISO currency set
pub fn is_known_currency(code: &str) -> bool {
    ISO_CURRENCIES.contains(&code.trim().to_uppercase().as_str())
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercase, drop punctuation, collapse whitespace
pub fn fold_name(value: &str) -> String {
    let stripped: String = value
        .chars()
        .map(|c| if matches!(c, '.' | ',' | ';' | '"') { ' ' } else { c })
        .collect();
    collapse_whitespace(&stripped).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> CanonicalValue {
        CanonicalValue::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    fn dec(s: &str) -> CanonicalValue {
        CanonicalValue::Decimal(s.parse().unwrap())
    }

    #[test]
    fn test_date_formats() {
        let expected = date(2025, 1, 15);
        assert_eq!(normalize(Field::TradeDate, "15-01-2025").unwrap(), expected);
        assert_eq!(normalize(Field::TradeDate, "15/01/2025").unwrap(), expected);
        assert_eq!(normalize(Field::TradeDate, "15.01.2025").unwrap(), expected);
        assert_eq!(normalize(Field::TradeDate, "2025-01-15").unwrap(), expected);
        assert_eq!(
            normalize(Field::TradeDate, "2025-01-15T10:30:00Z").unwrap(),
            expected
        );
        assert_eq!(normalize(Field::TradeDate, " 15-1-2025 ").unwrap(), expected);
    }

    #[test]
    fn test_excel_serial_dates() {
        // 45672 is 2025-01-15 in Excel's 1900 date system
        assert_eq!(normalize(Field::ValueDate, "45672").unwrap(), date(2025, 1, 15));
        assert_eq!(normalize(Field::ValueDate, "45672.5").unwrap(), date(2025, 1, 15));
        assert_eq!(normalize(Field::ValueDate, "25569").unwrap(), date(1970, 1, 1));
    }

    #[test]
    fn test_invalid_dates() {
        for raw in ["15-01-25", "2025", "1234", "31-02-2025", "15-01/2025", "1969-12-31", "tomorrow"] {
            let err = normalize(Field::TradeDate, raw).unwrap_err();
            assert!(
                matches!(err, NormalizationError::InvalidDate { .. }),
                "{} should be an invalid date",
                raw
            );
        }
    }

    #[test]
    fn test_empty_value() {
        assert!(matches!(
            normalize(Field::Amount, "  "),
            Err(NormalizationError::Empty { .. })
        ));
    }

    #[test]
    fn test_amount_separators() {
        assert_eq!(normalize(Field::Amount, "100000.00").unwrap(), dec("100000.00"));
        assert_eq!(normalize(Field::Amount, "100.000,00").unwrap(), dec("100000"));
        assert_eq!(normalize(Field::Amount, "100,000.00").unwrap(), dec("100000"));
        assert_eq!(normalize(Field::Amount, "100.000").unwrap(), dec("100000"));
        assert_eq!(normalize(Field::Amount, "1.000.000").unwrap(), dec("1000000"));
        assert_eq!(normalize(Field::Amount, "1500,5").unwrap(), dec("1500.50"));
        assert_eq!(normalize(Field::Amount, "0,125").unwrap(), dec("0.13"));
        assert_eq!(normalize(Field::Amount, "USD 2,500.75").unwrap(), dec("2500.75"));
        assert_eq!(normalize(Field::Amount, "(1,200.00)").unwrap(), dec("-1200"));
        assert_eq!(normalize(Field::Amount, "-50").unwrap(), dec("-50"));
    }

    #[test]
    fn test_price_precision() {
        assert_eq!(normalize(Field::Price, "890,50").unwrap(), dec("890.5"));
        assert_eq!(normalize(Field::Price, "890.125").unwrap(), dec("890.125"));
        assert_eq!(normalize(Field::Price, "1.23456").unwrap(), dec("1.2346"));
        assert_eq!(normalize(Field::Price, "1.234,5678").unwrap(), dec("1234.5678"));
    }

    #[test]
    fn test_amount_rounds_to_cents() {
        // Three trailing digits group thousands, so only longer fractions round
        assert_eq!(normalize(Field::Amount, "10.005").unwrap(), dec("10005"));
        assert_eq!(normalize(Field::Amount, "10.0051").unwrap(), dec("10.01"));
    }

    #[test]
    fn test_invalid_numbers() {
        for raw in ["abc", "1,2.3,4", "12x4", "--", "1."] {
            assert!(
                matches!(
                    normalize(Field::Amount, raw),
                    Err(NormalizationError::InvalidNumber { .. })
                ),
                "{} should be invalid",
                raw
            );
        }
    }

    #[test]
    fn test_currency_codes() {
        assert_eq!(
            normalize(Field::Currency1, " usd ").unwrap(),
            CanonicalValue::Code("USD".into())
        );
        assert_eq!(
            normalize(Field::Currency2, "XXX").unwrap(),
            CanonicalValue::Unrecognized("XXX".into())
        );
        assert!(is_known_currency("clf"));
    }

    #[test]
    fn test_enum_fields() {
        assert_eq!(
            normalize(Field::Direction, "Compra").unwrap(),
            CanonicalValue::Code("buy".into())
        );
        assert_eq!(
            normalize(Field::Product, "FWD").unwrap(),
            CanonicalValue::Code("forward".into())
        );
        assert!(normalize(Field::Product, "cross-currency")
            .unwrap()
            .is_unrecognized());
        assert_eq!(
            normalize(Field::SettlementType, "compensacion").unwrap(),
            CanonicalValue::Code("net-settlement".into())
        );
    }

    #[test]
    fn test_counterparty_folding() {
        assert_eq!(
            normalize(Field::Counterparty, "  Banco   Uno S.A. ").unwrap(),
            normalize(Field::Counterparty, "banco uno s a").unwrap()
        );
        assert_eq!(
            normalize(Field::TradeNumber, "fx 1001").unwrap(),
            CanonicalValue::Text("FX1001".into())
        );
    }

    #[test]
    fn test_normalize_named() {
        assert!(normalize_named("amount", "1").is_ok());
        assert!(matches!(
            normalize_named("volume", "1"),
            Err(NormalizationError::UnknownField(_))
        ));
    }
}
