//! Field-weighted trade/confirmation comparison
//!
//! Every weighted field is critical and the weights sum to 100, so the
//! confidence score is simply the sum of the weights of the fields that agree.
//! Informational fields carry no weight: they are compared only when both
//! sides have a value and show up in `differing_fields` without lowering the
//! score.

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use crate::config::Tolerance;
use crate::models::{Field, TradeFields};
use crate::normalize::{normalize, CanonicalValue};

/// Weight and criticality of one comparable field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldWeight {
    pub field: Field,
    pub weight: u8,
    pub critical: bool,
}

const fn weighted(field: Field, weight: u8) -> FieldWeight {
    FieldWeight {
        field,
        weight,
        critical: true,
    }
}

const fn informational(field: Field) -> FieldWeight {
    FieldWeight {
        field,
        weight: 0,
        critical: false,
    }
}

/// Comparison table, in reporting order
pub const FIELD_WEIGHTS: [FieldWeight; 14] = [
    weighted(Field::Amount, 20),
    weighted(Field::Counterparty, 15),
    weighted(Field::Price, 15),
    weighted(Field::TradeDate, 10),
    weighted(Field::ValueDate, 10),
    weighted(Field::Currency1, 10),
    weighted(Field::Currency2, 10),
    weighted(Field::Direction, 10),
    informational(Field::Product),
    informational(Field::MaturityDate),
    informational(Field::PaymentDate),
    informational(Field::SettlementType),
    informational(Field::SettlementCurrency),
    informational(Field::PaymentMethod),
];

/// Sum of all weights; always 100
pub fn total_weight() -> u32 {
    FIELD_WEIGHTS.iter().map(|w| w.weight as u32).sum()
}

/// Weight entry for a field, if it is compared at all
pub fn weight_of(field: Field) -> Option<FieldWeight> {
    FIELD_WEIGHTS.iter().copied().find(|w| w.field == field)
}

/// Whether a differing field blocks a confirmed classification
pub fn is_critical(field: Field) -> bool {
    weight_of(field).map(|w| w.critical).unwrap_or(false)
}

/// Result of comparing one field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldOutcome {
    Equal,
    Differs,
    /// A weighted field is absent on at least one side
    Missing,
    /// At least one side failed to normalize
    Invalid,
    /// At least one side is outside the known vocabulary
    Unrecognized,
    /// Informational field absent on at least one side; not compared
    Skipped,
}

impl FieldOutcome {
    pub fn is_difference(&self) -> bool {
        !matches!(self, Self::Equal | Self::Skipped)
    }
}

/// Per-field comparison detail for discrepancy review
#[derive(Debug, Clone, Serialize)]
pub struct FieldVerdict {
    pub field: Field,
    pub weight: u8,
    pub critical: bool,
    pub trade_value: Option<String>,
    pub confirmation_value: Option<String>,
    pub outcome: FieldOutcome,
    /// Normalization failure message, when there was one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Overall comparison result
#[derive(Debug, Clone, Serialize)]
pub struct Comparison {
    pub confidence: u8,
    pub differing_fields: Vec<Field>,
    pub verdicts: Vec<FieldVerdict>,
}

impl Comparison {
    /// Any weighted field differs
    pub fn has_critical_difference(&self) -> bool {
        self.differing_fields.iter().any(|f| is_critical(*f))
    }

    pub fn differing_field_names(&self) -> Vec<String> {
        self.differing_fields
            .iter()
            .map(|f| f.as_str().to_string())
            .collect()
    }
}

/// Compare a trade with a confirmation
pub fn compare(trade: &TradeFields, confirmation: &TradeFields, tolerance: &Tolerance) -> Comparison {
    let verdicts = compare_fields(trade, confirmation, tolerance);

    let matched: u32 = verdicts
        .iter()
        .filter(|v| v.outcome == FieldOutcome::Equal)
        .map(|v| v.weight as u32)
        .sum();

    let differing_fields = verdicts
        .iter()
        .filter(|v| v.outcome.is_difference())
        .map(|v| v.field)
        .collect();

    Comparison {
        confidence: matched.min(100) as u8,
        differing_fields,
        verdicts,
    }
}

/// Per-field verdicts in table order
pub fn compare_fields(
    trade: &TradeFields,
    confirmation: &TradeFields,
    tolerance: &Tolerance,
) -> Vec<FieldVerdict> {
    FIELD_WEIGHTS
        .iter()
        .map(|spec| compare_field(spec, trade, confirmation, tolerance))
        .collect()
}

fn compare_field(
    spec: &FieldWeight,
    trade: &TradeFields,
    confirmation: &TradeFields,
    tolerance: &Tolerance,
) -> FieldVerdict {
    let left = trade.get(spec.field);
    let right = confirmation.get(spec.field);

    let mut verdict = FieldVerdict {
        field: spec.field,
        weight: spec.weight,
        critical: spec.critical,
        trade_value: left.map(str::to_string),
        confirmation_value: right.map(str::to_string),
        outcome: FieldOutcome::Equal,
        detail: None,
    };

    let (left, right) = match (left, right) {
        (Some(l), Some(r)) => (l, r),
        _ => {
            verdict.outcome = if spec.critical {
                FieldOutcome::Missing
            } else {
                FieldOutcome::Skipped
            };
            return verdict;
        }
    };

    let (left, right) = match (normalize(spec.field, left), normalize(spec.field, right)) {
        (Ok(l), Ok(r)) => (l, r),
        (Err(e), _) | (_, Err(e)) => {
            verdict.outcome = FieldOutcome::Invalid;
            verdict.detail = Some(e.to_string());
            return verdict;
        }
    };

    verdict.outcome = if left.is_unrecognized() || right.is_unrecognized() {
        FieldOutcome::Unrecognized
    } else if values_agree(spec.field, &left, &right, tolerance) {
        FieldOutcome::Equal
    } else {
        FieldOutcome::Differs
    };

    debug!(
        field = spec.field.as_str(),
        outcome = ?verdict.outcome,
        "compared {} with {}",
        left,
        right
    );
    verdict
}

fn values_agree(field: Field, left: &CanonicalValue, right: &CanonicalValue, tolerance: &Tolerance) -> bool {
    match (left, right) {
        (CanonicalValue::Decimal(a), CanonicalValue::Decimal(b)) => {
            let relative = match field {
                Field::Amount => tolerance.amount,
                Field::Price => tolerance.price,
                _ => Decimal::ZERO,
            };
            within_relative(*a, *b, relative)
        }
        _ => left == right,
    }
}

/// |a - b| <= tolerance * max(|a|, |b|)
pub fn within_relative(a: Decimal, b: Decimal, tolerance: Decimal) -> bool {
    let scale = a.abs().max(b.abs());
    (a - b).abs() <= tolerance * scale
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_fields() -> TradeFields {
        TradeFields {
            trade_number: Some("FX-1001".into()),
            counterparty: Some("Banco Uno".into()),
            product: Some("spot".into()),
            trade_date: Some("2025-01-15".into()),
            value_date: Some("2025-01-17".into()),
            direction: Some("buy".into()),
            currency_1: Some("USD".into()),
            currency_2: Some("CLP".into()),
            amount: Some("100000.00".into()),
            price: Some("890.50".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_weights_sum_to_100() {
        assert_eq!(total_weight(), 100);
    }

    #[test]
    fn test_identical_records_score_100() {
        let fields = base_fields();
        let result = compare(&fields, &fields, &Tolerance::default());
        assert_eq!(result.confidence, 100);
        assert!(result.differing_fields.is_empty());
    }

    #[test]
    fn test_price_within_tolerance() {
        let trade = base_fields();
        let mut confirmation = base_fields();
        confirmation.price = Some("890.75".into());

        let result = compare(&trade, &confirmation, &Tolerance::default());
        assert_eq!(result.confidence, 100);
        assert!(result.differing_fields.is_empty());
    }

    #[test]
    fn test_amount_and_counterparty_differ() {
        let trade = base_fields();
        let mut confirmation = base_fields();
        confirmation.amount = Some("150000.00".into());
        confirmation.counterparty = Some("Banco Dos".into());

        let result = compare(&trade, &confirmation, &Tolerance::default());
        assert_eq!(result.confidence, 65);
        assert_eq!(
            result.differing_fields,
            vec![Field::Amount, Field::Counterparty]
        );
        assert!(result.has_critical_difference());
    }

    #[test]
    fn test_formats_are_normalized_before_comparing() {
        let trade = base_fields();
        let mut confirmation = base_fields();
        confirmation.trade_date = Some("15/01/2025".into());
        confirmation.amount = Some("100.000,00".into());
        confirmation.direction = Some("Compra".into());
        confirmation.currency_1 = Some("usd".into());

        let result = compare(&trade, &confirmation, &Tolerance::default());
        assert_eq!(result.confidence, 100);
    }

    #[test]
    fn test_missing_weighted_field_differs() {
        let trade = base_fields();
        let mut confirmation = base_fields();
        confirmation.value_date = None;

        let result = compare(&trade, &confirmation, &Tolerance::default());
        assert_eq!(result.confidence, 90);
        assert_eq!(result.differing_fields, vec![Field::ValueDate]);
    }

    #[test]
    fn test_invalid_value_never_matches() {
        let mut trade = base_fields();
        let mut confirmation = base_fields();
        trade.trade_date = Some("15-01-25".into());
        confirmation.trade_date = Some("15-01-25".into());

        let result = compare(&trade, &confirmation, &Tolerance::default());
        assert_eq!(result.confidence, 90);
        let verdict = result
            .verdicts
            .iter()
            .find(|v| v.field == Field::TradeDate)
            .unwrap();
        assert_eq!(verdict.outcome, FieldOutcome::Invalid);
        assert!(verdict.detail.is_some());
    }

    #[test]
    fn test_unrecognized_currency_never_matches() {
        let mut trade = base_fields();
        let mut confirmation = base_fields();
        trade.currency_2 = Some("XYZ".into());
        confirmation.currency_2 = Some("XYZ".into());

        let result = compare(&trade, &confirmation, &Tolerance::default());
        assert_eq!(result.confidence, 90);
        assert_eq!(result.differing_fields, vec![Field::Currency2]);
    }

    #[test]
    fn test_informational_difference_is_not_critical() {
        let trade = base_fields();
        let mut confirmation = base_fields();
        confirmation.product = Some("forward".into());
        confirmation.payment_method = Some("swift".into());

        let result = compare(&trade, &confirmation, &Tolerance::default());
        assert_eq!(result.confidence, 100);
        assert_eq!(result.differing_fields, vec![Field::Product]);
        assert!(!result.has_critical_difference());
    }

    #[test]
    fn test_everything_missing_scores_zero() {
        let result = compare(
            &TradeFields::default(),
            &TradeFields::default(),
            &Tolerance::default(),
        );
        assert_eq!(result.confidence, 0);
        assert_eq!(result.differing_fields.len(), 8);
    }

    #[test]
    fn test_within_relative() {
        let a: Decimal = "100".parse().unwrap();
        let b: Decimal = "100.04".parse().unwrap();
        let tol: Decimal = "0.0005".parse().unwrap();
        assert!(within_relative(a, b, tol));
        assert!(!within_relative(a, "100.06".parse().unwrap(), tol));
        assert!(within_relative(Decimal::ZERO, Decimal::ZERO, Decimal::ZERO));
    }
}
