//! Settlement rule resolution and priority planning
//!
//! A client's rules form one priority list, densely numbered 1..N. Resolution
//! walks the active rules in ascending priority and returns the accounts of the
//! first rule whose predicate accepts the trade. There is never a fallback
//! account: no match is an error the caller has to surface.
//!
//! Every mutation is planned here as a new ordered list of rule ids and then
//! written as a full renumbering, so priorities cannot develop gaps or
//! duplicates.

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::models::{
    AccountBinding, AccountLeg, Direction, NewSettlementRule, Product, SettlementModality,
    SettlementRule, Trade,
};
use crate::normalize::{fold_name, is_known_currency};

/// Counterparty values that mean "any counterparty"
const WILDCARDS: &[&str] = &["", "*", "any", "all", "todas", "todos", "cualquiera"];

/// Trade attributes a rule predicate looks at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSubject {
    pub direction: Option<Direction>,
    pub counterparty: Option<String>,
    pub product: Option<Product>,
}

impl RuleSubject {
    pub fn from_trade(trade: &Trade) -> Self {
        let f = &trade.fields;
        Self {
            direction: f.direction.as_deref().and_then(|d| d.parse().ok()),
            counterparty: f.counterparty.as_deref().map(fold_name),
            product: f.product.as_deref().and_then(|p| p.parse().ok()),
        }
    }
}

/// Whether a rule's predicate accepts the subject; ignores the active flag
pub fn rule_matches(rule: &SettlementRule, subject: &RuleSubject) -> bool {
    let direction_ok = match subject.direction {
        Some(direction) => rule.direction.accepts(direction),
        None => rule.direction == crate::models::DirectionFilter::Any,
    };

    let counterparty_ok = match &rule.counterparty {
        None => true,
        Some(name) => subject.counterparty.as_deref() == Some(fold_name(name).as_str()),
    };

    let product_ok = subject.product == Some(rule.product);

    direction_ok && counterparty_ok && product_ok
}

/// Resolve the account pair for a trade from the client's rules.
///
/// `rules` may be in any order; inactive rules are skipped.
pub fn resolve_account(rules: &[SettlementRule], trade: &Trade) -> Result<AccountBinding> {
    let subject = RuleSubject::from_trade(trade);

    let mut active: Vec<&SettlementRule> = rules.iter().filter(|r| r.active).collect();
    active.sort_by_key(|r| r.priority);

    let rule = active
        .into_iter()
        .find(|r| rule_matches(r, &subject))
        .ok_or_else(|| no_rule_matched(trade))?;

    Ok(binding_for(rule))
}

fn no_rule_matched(trade: &Trade) -> Error {
    let f = &trade.fields;
    Error::NoRuleMatched {
        trade_id: trade.id,
        counterparty: f
            .counterparty
            .clone()
            .unwrap_or_else(|| "(none)".to_string()),
        direction: f.direction.clone().unwrap_or_else(|| "(none)".to_string()),
        product: f.product.clone().unwrap_or_else(|| "(none)".to_string()),
    }
}

/// The binding a rule produces; net settlement forces both legs to the settlement currency
pub fn binding_for(rule: &SettlementRule) -> AccountBinding {
    let mut pay = rule.pay.clone();
    let mut receive = rule.receive.clone();

    if rule.modality == SettlementModality::NetSettlement {
        pay.currency = rule.settlement_currency.clone();
        receive.currency = rule.settlement_currency.clone();
    }

    AccountBinding {
        rule_id: rule.id,
        priority: rule.priority,
        modality: rule.modality,
        pay,
        receive,
    }
}

fn clean_leg(leg: &AccountLeg, name: &str) -> Result<AccountLeg> {
    let bank = leg.bank.trim();
    let swift = leg.swift.trim().to_uppercase();
    let account_number = leg.account_number.trim();

    if bank.is_empty() || account_number.is_empty() {
        return Err(Error::InvalidData(format!(
            "{} leg needs a bank and an account number",
            name
        )));
    }
    if !(swift.len() == 8 || swift.len() == 11) || !swift.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(Error::InvalidData(format!(
            "{} leg SWIFT code must be 8 or 11 letters/digits, got {:?}",
            name, leg.swift
        )));
    }

    let currency = match leg.currency.as_deref().map(str::trim) {
        Some("") | None => None,
        Some(code) => Some(validate_currency(code)?),
    };

    Ok(AccountLeg {
        bank: bank.to_string(),
        swift,
        account_number: account_number.to_string(),
        currency,
    })
}

fn validate_currency(code: &str) -> Result<String> {
    let code = code.trim().to_uppercase();
    if is_known_currency(&code) {
        Ok(code)
    } else {
        Err(Error::InvalidData(format!("unknown currency code: {}", code)))
    }
}

/// Normalize and validate a rule before it touches storage.
///
/// Wildcard counterparty spellings become `None`. Net settlement requires a
/// settlement currency, which both legs take. Physical delivery requires a
/// currency on each leg and no settlement currency.
pub fn validate_rule(rule: &NewSettlementRule) -> Result<NewSettlementRule> {
    if let Some(p) = rule.priority {
        if p < 1 {
            return Err(Error::InvalidData(format!(
                "priority must be a positive integer, got {}",
                p
            )));
        }
    }

    let counterparty = rule
        .counterparty
        .as_deref()
        .map(|c| c.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|c| !WILDCARDS.contains(&c.to_lowercase().as_str()));

    let mut pay = clean_leg(&rule.pay, "pay")?;
    let mut receive = clean_leg(&rule.receive, "receive")?;

    let settlement_currency = match rule.settlement_currency.as_deref().map(str::trim) {
        Some("") | None => None,
        Some(code) => Some(validate_currency(code)?),
    };

    match rule.modality {
        SettlementModality::NetSettlement => {
            let currency = settlement_currency.clone().ok_or_else(|| {
                Error::InvalidData("net settlement rules need a settlement currency".into())
            })?;
            pay.currency = Some(currency.clone());
            receive.currency = Some(currency);
        }
        SettlementModality::PhysicalDelivery => {
            if settlement_currency.is_some() {
                return Err(Error::InvalidData(
                    "physical delivery rules settle each leg in its own currency; \
                    remove the settlement currency"
                        .into(),
                ));
            }
            if pay.currency.is_none() || receive.currency.is_none() {
                return Err(Error::InvalidData(
                    "physical delivery rules need a currency on both legs".into(),
                ));
            }
        }
    }

    Ok(NewSettlementRule {
        priority: rule.priority,
        active: rule.active,
        direction: rule.direction,
        counterparty,
        product: rule.product,
        modality: rule.modality,
        settlement_currency,
        pay,
        receive,
    })
}

/// Identity used for duplicate detection
fn rule_key(
    direction: crate::models::DirectionFilter,
    counterparty: Option<&str>,
    product: Product,
    modality: SettlementModality,
    settlement_currency: Option<&str>,
    pay_currency: Option<&str>,
    receive_currency: Option<&str>,
) -> String {
    format!(
        "{}|{}|{}|{}|{}|{}|{}",
        direction,
        counterparty.map(fold_name).unwrap_or_else(|| "*".into()),
        product,
        modality,
        settlement_currency.unwrap_or(""),
        pay_currency.unwrap_or(""),
        receive_currency.unwrap_or(""),
    )
}

/// Existing rule with the same direction, counterparty, product, modality and currencies
pub fn find_duplicate<'a>(
    existing: &'a [SettlementRule],
    candidate: &NewSettlementRule,
    exclude_id: Option<i64>,
) -> Option<&'a SettlementRule> {
    let key = rule_key(
        candidate.direction,
        candidate.counterparty.as_deref(),
        candidate.product,
        candidate.modality,
        candidate.settlement_currency.as_deref(),
        candidate.pay.currency.as_deref(),
        candidate.receive.currency.as_deref(),
    );

    existing.iter().filter(|r| Some(r.id) != exclude_id).find(|r| {
        rule_key(
            r.direction,
            r.counterparty.as_deref(),
            r.product,
            r.modality,
            r.settlement_currency.as_deref(),
            r.pay.currency.as_deref(),
            r.receive.currency.as_deref(),
        ) == key
    })
}

/// Reject a candidate that duplicates an existing rule
pub fn check_duplicate(
    existing: &[SettlementRule],
    candidate: &NewSettlementRule,
    exclude_id: Option<i64>,
) -> Result<()> {
    match find_duplicate(existing, candidate, exclude_id) {
        Some(dup) => Err(Error::DuplicateRule(format!(
            "rule {} (priority {}) already covers {} {} {} with the same modality and currencies",
            dup.id,
            dup.priority,
            dup.direction,
            dup.counterparty.as_deref().unwrap_or("any counterparty"),
            dup.product
        ))),
        None => Ok(()),
    }
}

fn check_position(priority: i64, max: usize) -> Result<usize> {
    if priority < 1 || priority as usize > max {
        return Err(Error::InvalidData(format!(
            "priority {} is out of range 1..={}",
            priority, max
        )));
    }
    Ok(priority as usize - 1)
}

/// Order after inserting `new_id` at `priority` (appended when `None`); later rules shift down
pub fn plan_insert(order: &[i64], new_id: i64, priority: Option<i64>) -> Result<Vec<i64>> {
    let mut planned = order.to_vec();
    let index = match priority {
        Some(p) => check_position(p, order.len() + 1)?,
        None => order.len(),
    };
    planned.insert(index, new_id);
    Ok(planned)
}

/// Order after moving `id` to `priority`
pub fn plan_move(order: &[i64], id: i64, priority: i64) -> Result<Vec<i64>> {
    let mut planned = order.to_vec();
    let current = planned
        .iter()
        .position(|r| *r == id)
        .ok_or_else(|| Error::NotFound(format!("settlement rule {}", id)))?;
    let target = check_position(priority, order.len())?;
    let moved = planned.remove(current);
    planned.insert(target, moved);
    Ok(planned)
}

/// Order after removing `id`
pub fn plan_remove(order: &[i64], id: i64) -> Result<Vec<i64>> {
    if !order.contains(&id) {
        return Err(Error::NotFound(format!("settlement rule {}", id)));
    }
    Ok(order.iter().copied().filter(|r| *r != id).collect())
}

/// Validate a full reorder: `new_order` must be a permutation of `order`
pub fn plan_reorder(order: &[i64], new_order: &[i64]) -> Result<Vec<i64>> {
    let mut seen = HashSet::new();
    for id in new_order {
        if !seen.insert(*id) {
            return Err(Error::DuplicatePriority(format!(
                "rule {} appears more than once in the new order",
                id
            )));
        }
    }

    let current: HashSet<i64> = order.iter().copied().collect();
    if let Some(unknown) = new_order.iter().find(|id| !current.contains(id)) {
        return Err(Error::InvalidData(format!(
            "rule {} does not belong to this client",
            unknown
        )));
    }
    if let Some(missing) = order.iter().find(|id| !seen.contains(id)) {
        return Err(Error::InvalidData(format!(
            "new order is missing rule {}",
            missing
        )));
    }

    Ok(new_order.to_vec())
}

/// Priorities are exactly 1..N
pub fn is_dense(rules: &[SettlementRule]) -> bool {
    let mut priorities: Vec<i64> = rules.iter().map(|r| r.priority).collect();
    priorities.sort_unstable();
    priorities
        .iter()
        .enumerate()
        .all(|(i, p)| *p == i as i64 + 1)
}
