//! Extracted confirmation fields to [`TradeFields`]
//!
//! Document parsers hand over a flat map whose keys depend on the bank and
//! the language of the confirmation. Keys are folded (lowercase, accents and
//! separators dropped) and looked up in an alias table.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{Field, TradeFields};

/// Folded alias to field
const ALIASES: &[(&str, Field)] = &[
    ("tradenumber", Field::TradeNumber),
    ("tradeid", Field::TradeNumber),
    ("dealnumber", Field::TradeNumber),
    ("reference", Field::TradeNumber),
    ("numerooperacion", Field::TradeNumber),
    ("nrooperacion", Field::TradeNumber),
    ("noperacion", Field::TradeNumber),
    ("folio", Field::TradeNumber),
    ("counterparty", Field::Counterparty),
    ("bank", Field::Counterparty),
    ("contraparte", Field::Counterparty),
    ("banco", Field::Counterparty),
    ("product", Field::Product),
    ("producto", Field::Product),
    ("tradedate", Field::TradeDate),
    ("fechaoperacion", Field::TradeDate),
    ("fechacierre", Field::TradeDate),
    ("fechapacto", Field::TradeDate),
    ("valuedate", Field::ValueDate),
    ("fechavaluta", Field::ValueDate),
    ("fechavalor", Field::ValueDate),
    ("direction", Field::Direction),
    ("side", Field::Direction),
    ("buysell", Field::Direction),
    ("tipooperacion", Field::Direction),
    ("sentido", Field::Direction),
    ("currency1", Field::Currency1),
    ("currency", Field::Currency1),
    ("moneda1", Field::Currency1),
    ("moneda", Field::Currency1),
    ("currency2", Field::Currency2),
    ("countercurrency", Field::Currency2),
    ("moneda2", Field::Currency2),
    ("monedacontraparte", Field::Currency2),
    ("amount", Field::Amount),
    ("notional", Field::Amount),
    ("monto", Field::Amount),
    ("nocional", Field::Amount),
    ("price", Field::Price),
    ("rate", Field::Price),
    ("precio", Field::Price),
    ("tipodecambio", Field::Price),
    ("tasa", Field::Price),
    ("maturitydate", Field::MaturityDate),
    ("fechavencimiento", Field::MaturityDate),
    ("paymentdate", Field::PaymentDate),
    ("fechapago", Field::PaymentDate),
    ("settlementtype", Field::SettlementType),
    ("modalidad", Field::SettlementType),
    ("tipoliquidacion", Field::SettlementType),
    ("settlementcurrency", Field::SettlementCurrency),
    ("monedaliquidacion", Field::SettlementCurrency),
    ("paymentmethod", Field::PaymentMethod),
    ("formapago", Field::PaymentMethod),
    ("mediodepago", Field::PaymentMethod),
];

fn fold_key(key: &str) -> String {
    key.chars()
        .filter_map(|c| match c {
            'á' | 'Á' => Some('a'),
            'é' | 'É' => Some('e'),
            'í' | 'Í' => Some('i'),
            'ó' | 'Ó' => Some('o'),
            'ú' | 'Ú' | 'ü' | 'Ü' => Some('u'),
            'ñ' | 'Ñ' => Some('n'),
            c if c.is_ascii_alphanumeric() => Some(c.to_ascii_lowercase()),
            _ => None,
        })
        .collect()
}

/// Field a parser key refers to, if known
pub fn field_for_key(key: &str) -> Option<Field> {
    let folded = fold_key(key);
    // "de" is noise in Spanish keys ("fecha_de_valuta"), but part of "tipodecambio"
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == folded)
        .or_else(|| {
            let without_de = folded.replace("de", "");
            ALIASES.iter().find(|(alias, _)| *alias == without_de)
        })
        .map(|(_, field)| *field)
}

/// Build [`TradeFields`] from a loosely keyed map.
///
/// Unknown keys and null or blank values are skipped. Nested arrays or
/// objects are rejected. When two keys map to the same field the first
/// non-empty value in key order wins.
pub fn fields_from_extracted(map: &HashMap<String, Value>) -> Result<TradeFields> {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();

    let mut fields = TradeFields::default();
    for key in keys {
        let Some(field) = field_for_key(key) else {
            debug!("Ignoring unknown extracted key '{}'", key);
            continue;
        };

        let value = match &map[key] {
            Value::Null => continue,
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Array(_) | Value::Object(_) => {
                return Err(Error::InvalidData(format!(
                    "extracted field '{}' must be a scalar",
                    key
                )))
            }
        };

        if value.is_empty() || fields.get(field).is_some() {
            continue;
        }
        fields.set(field, Some(value));
    }

    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> HashMap<String, Value> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_spanish_keys() {
        let fields = fields_from_extracted(&map(json!({
            "Contraparte": "Banco Uno",
            "Monto": 1_000_000,
            "Fecha de Valuta": "17/01/2025",
            "Fecha_Operación": "15/01/2025",
            "Tipo de Cambio": "890,50",
            "Moneda 1": "USD",
            "Moneda 2": "CLP",
            "Sentido": "Compra",
        })))
        .unwrap();

        assert_eq!(fields.counterparty.as_deref(), Some("Banco Uno"));
        assert_eq!(fields.amount.as_deref(), Some("1000000"));
        assert_eq!(fields.value_date.as_deref(), Some("17/01/2025"));
        assert_eq!(fields.trade_date.as_deref(), Some("15/01/2025"));
        assert_eq!(fields.price.as_deref(), Some("890,50"));
        assert_eq!(fields.currency_1.as_deref(), Some("USD"));
        assert_eq!(fields.currency_2.as_deref(), Some("CLP"));
        assert_eq!(fields.direction.as_deref(), Some("Compra"));
    }

    #[test]
    fn test_english_keys_and_unknowns() {
        let fields = fields_from_extracted(&map(json!({
            "trade_number": "FX-1001",
            "counterparty": "Banco Uno",
            "notional": "250,000.00",
            "footer": "ignored",
            "price": null,
        })))
        .unwrap();

        assert_eq!(fields.trade_number.as_deref(), Some("FX-1001"));
        assert_eq!(fields.amount.as_deref(), Some("250,000.00"));
        assert!(fields.price.is_none());
    }

    #[test]
    fn test_nested_value_rejected() {
        let err = fields_from_extracted(&map(json!({ "amount": [1, 2] }))).unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
    }

    #[test]
    fn test_field_for_key() {
        assert_eq!(field_for_key("FECHA VALUTA"), Some(Field::ValueDate));
        assert_eq!(field_for_key("currency_2"), Some(Field::Currency2));
        assert_eq!(field_for_key("unrelated"), None);
    }
}
