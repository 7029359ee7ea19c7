//! Test utilities for confirma-core
//!
//! A client's trade and the same deal as a bank would confirm it, in the
//! bank's formatting, plus settlement rule builders.

use crate::db::Database;
use crate::models::{
    AccountLeg, DirectionFilter, NewConfirmation, NewSettlementRule, NewTrade, Product,
    SettlementModality, TradeFields,
};

pub const CLIENT: &str = "acme";
pub const OTHER_CLIENT: &str = "globex";

/// A fresh temp-file database
pub fn setup_db() -> Database {
    Database::in_memory().expect("Failed to create test database")
}

/// USD/CLP spot buy from Banco Uno, as the client books it
pub fn sample_trade_fields() -> TradeFields {
    TradeFields {
        trade_number: Some("FX-1001".into()),
        counterparty: Some("Banco Uno".into()),
        product: Some("spot".into()),
        trade_date: Some("2025-01-15".into()),
        value_date: Some("2025-01-17".into()),
        direction: Some("buy".into()),
        currency_1: Some("USD".into()),
        currency_2: Some("CLP".into()),
        amount: Some("1000000".into()),
        price: Some("890.50".into()),
        ..Default::default()
    }
}

/// The same deal as the bank confirms it
pub fn sample_confirmation_fields() -> TradeFields {
    TradeFields {
        trade_number: Some("fx 1001".into()),
        counterparty: Some("BANCO UNO".into()),
        product: Some("Spot".into()),
        trade_date: Some("15/01/2025".into()),
        value_date: Some("17/01/2025".into()),
        direction: Some("Compra".into()),
        currency_1: Some("usd".into()),
        currency_2: Some("clp".into()),
        amount: Some("1.000.000,00".into()),
        price: Some("890,50".into()),
        ..Default::default()
    }
}

pub fn insert_trade(db: &Database, client_id: &str, fields: TradeFields) -> i64 {
    db.insert_trade(client_id, &NewTrade { fields })
        .expect("Failed to insert trade")
}

pub fn ingest(db: &Database, client_id: &str, fields: TradeFields) -> i64 {
    db.ingest_confirmation(
        client_id,
        &NewConfirmation {
            fields,
            sender: Some("confirmaciones@bancouno.example".into()),
            subject: Some("Confirmacion operacion".into()),
            received_at: None,
            source: Some("email".into()),
        },
    )
    .expect("Failed to ingest confirmation")
}

pub fn leg(bank: &str, swift: &str, account_number: &str, currency: Option<&str>) -> AccountLeg {
    AccountLeg {
        bank: bank.into(),
        swift: swift.into(),
        account_number: account_number.into(),
        currency: currency.map(Into::into),
    }
}

/// Physical delivery spot rule, USD paid out and CLP received
pub fn physical_rule(
    counterparty: Option<&str>,
    direction: DirectionFilter,
    bank: &str,
) -> NewSettlementRule {
    NewSettlementRule {
        priority: None,
        active: true,
        direction,
        counterparty: counterparty.map(Into::into),
        product: Product::Spot,
        modality: SettlementModality::PhysicalDelivery,
        settlement_currency: None,
        pay: leg(bank, "BANKCLRMXXX", "001-USD-01", Some("USD")),
        receive: leg(bank, "BANKCLRMXXX", "001-CLP-01", Some("CLP")),
    }
}

/// Net settlement spot rule in `currency`
pub fn net_rule(counterparty: Option<&str>, currency: &str) -> NewSettlementRule {
    NewSettlementRule {
        priority: None,
        active: true,
        direction: DirectionFilter::Any,
        counterparty: counterparty.map(Into::into),
        product: Product::Spot,
        modality: SettlementModality::NetSettlement,
        settlement_currency: Some(currency.into()),
        pay: leg("Bank Net", "NETBCLRM", "900-01", None),
        receive: leg("Bank Net", "NETBCLRM", "900-02", None),
    }
}
