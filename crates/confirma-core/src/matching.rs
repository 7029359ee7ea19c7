//! Match resolution
//!
//! One entry point, [`MatchResolver::perform_matching`], takes a confirmation
//! through duplicate detection, candidate scoring, classification and an
//! atomic commit. After a commit the trade's settlement accounts are resolved
//! and, when the client opted in, a deferred action is scheduled in the same
//! transaction as the match.

use std::cmp::{Ordering, Reverse};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use crate::compare::{compare, Comparison};
use crate::config::MatchingConfig;
use crate::db::{Database, Reversal};
use crate::error::{Error, Result};
use crate::models::{
    AccountBinding, Confirmation, ConfirmationStatus, Field, Match, MatchClassification, NewMatch,
    ScheduledAction, Trade, TradeFields,
};
use crate::normalize::{normalize, normalize_date, CanonicalValue};
use crate::settlement::resolve_account;

/// Identity hash of a confirmation, used for duplicate detection.
///
/// Counterparty plus trade number when the bank quotes one, otherwise
/// counterparty, trade date, direction, currencies and amount.
pub fn fingerprint(fields: &TradeFields) -> String {
    let part = |field: Field| -> String {
        match fields.get(field) {
            Some(raw) => match normalize(field, raw) {
                // Scale-free so 100000 and 100.000,00 hash alike
                Ok(CanonicalValue::Decimal(d)) => d.normalize().to_string(),
                Ok(value) => value.to_string(),
                Err(_) => raw.trim().to_lowercase(),
            },
            None => String::new(),
        }
    };

    let key = if fields.get(Field::TradeNumber).is_some() {
        format!("{}|#{}", part(Field::Counterparty), part(Field::TradeNumber))
    } else {
        [
            Field::Counterparty,
            Field::TradeDate,
            Field::Direction,
            Field::Currency1,
            Field::Currency2,
            Field::Amount,
        ]
        .iter()
        .map(|f| part(*f))
        .collect::<Vec<_>>()
        .join("|")
    };

    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// A scored candidate trade
#[derive(Debug, Clone)]
pub struct Candidate<'t> {
    pub trade: &'t Trade,
    pub comparison: Comparison,
}

/// Earliest trade date first; unparseable dates sort last
fn trade_date_key(trade: &Trade) -> (bool, Option<NaiveDate>) {
    let date = trade.fields.get(Field::TradeDate).and_then(normalize_date);
    (date.is_none(), date)
}

/// Best trade for a confirmation: highest confidence, then earliest trade
/// date, then lowest trade id
pub fn select_best<'t>(
    candidates: &'t [Trade],
    confirmation: &TradeFields,
    config: &MatchingConfig,
) -> Option<Candidate<'t>> {
    let tolerance = config.tolerance();

    let mut scored: Vec<Candidate<'t>> = candidates
        .iter()
        .map(|trade| Candidate {
            trade,
            comparison: compare(&trade.fields, confirmation, &tolerance),
        })
        .collect();

    for c in &scored {
        debug!(
            "candidate trade {} scored {} (differs: {:?})",
            c.trade.id, c.comparison.confidence, c.comparison.differing_fields
        );
    }

    scored.sort_by(|a, b| compare_candidates(a, b));
    scored.into_iter().next()
}

fn compare_candidates(a: &Candidate<'_>, b: &Candidate<'_>) -> Ordering {
    Reverse(a.comparison.confidence)
        .cmp(&Reverse(b.comparison.confidence))
        .then_with(|| trade_date_key(a.trade).cmp(&trade_date_key(b.trade)))
        .then_with(|| a.trade.id.cmp(&b.trade.id))
}

/// Confirmed needs the auto-confirm floor and no critical difference
pub fn classify(comparison: &Comparison, config: &MatchingConfig) -> MatchClassification {
    if comparison.confidence >= config.auto_confirm_floor && !comparison.has_critical_difference()
    {
        MatchClassification::Confirmed
    } else {
        MatchClassification::Disputed
    }
}

/// What happened to one confirmation
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MatchOutcome {
    Matched {
        #[serde(rename = "match")]
        matched: Match,
        /// Settlement accounts; `None` when no rule applies yet
        account: Option<AccountBinding>,
        #[serde(skip_serializing_if = "Option::is_none")]
        account_error: Option<String>,
        scheduled: Option<ScheduledAction>,
    },
    Duplicate {
        confirmation_id: i64,
        existing_match_id: i64,
    },
    Unrecognized {
        confirmation_id: i64,
        best_trade_id: Option<i64>,
        best_confidence: u8,
    },
    /// The confirmation was not open for matching
    Skipped {
        confirmation_id: i64,
        status: ConfirmationStatus,
    },
}

/// Counts from a batch run
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchMatchReport {
    pub processed: usize,
    pub matched: usize,
    pub disputed: usize,
    pub duplicates: usize,
    pub unrecognized: usize,
    /// Lost to a concurrent writer; left open for the next run
    pub conflicts: usize,
    pub outcomes: Vec<MatchOutcome>,
}

/// Runs matching for one client's confirmations
pub struct MatchResolver<'a> {
    db: &'a Database,
    config: &'a MatchingConfig,
}

impl<'a> MatchResolver<'a> {
    pub fn new(db: &'a Database, config: &'a MatchingConfig) -> Self {
        Self { db, config }
    }

    /// Match one confirmation against the client's unmatched trades
    pub fn perform_matching(
        &self,
        client_id: &str,
        confirmation_id: i64,
        actor: &str,
    ) -> Result<MatchOutcome> {
        self.perform_matching_at(client_id, confirmation_id, actor, Utc::now())
    }

    /// [`perform_matching`](Self::perform_matching) with an explicit clock
    pub fn perform_matching_at(
        &self,
        client_id: &str,
        confirmation_id: i64,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<MatchOutcome> {
        let confirmation = self.db.require_confirmation(client_id, confirmation_id)?;
        if !confirmation.status.is_open() {
            debug!(
                "confirmation {} is {}, not matching",
                confirmation.id, confirmation.status
            );
            return Ok(MatchOutcome::Skipped {
                confirmation_id,
                status: confirmation.status,
            });
        }

        if let Some(existing) = self.db.find_active_match_for_fingerprint(
            client_id,
            &confirmation.fingerprint,
            confirmation.id,
        )? {
            self.db.transition_confirmation(
                client_id,
                confirmation.id,
                confirmation.status,
                ConfirmationStatus::Duplicate,
            )?;
            info!(
                "Confirmation {} duplicates active match {}",
                confirmation.id, existing
            );
            return Ok(MatchOutcome::Duplicate {
                confirmation_id,
                existing_match_id: existing,
            });
        }

        let candidates = self.db.list_unmatched_trades(client_id)?;
        let best = select_best(&candidates, &confirmation.fields, self.config);

        let best = match best {
            Some(best) if best.comparison.confidence >= self.config.match_floor => best,
            other => return self.mark_unrecognized(client_id, &confirmation, other),
        };

        self.commit(client_id, &confirmation, best, actor, now)
    }

    fn mark_unrecognized(
        &self,
        client_id: &str,
        confirmation: &Confirmation,
        best: Option<Candidate<'_>>,
    ) -> Result<MatchOutcome> {
        if confirmation.status == ConfirmationStatus::Pending {
            self.db.transition_confirmation(
                client_id,
                confirmation.id,
                ConfirmationStatus::Pending,
                ConfirmationStatus::Unrecognized,
            )?;
        }

        let best_confidence = best.as_ref().map(|b| b.comparison.confidence).unwrap_or(0);
        warn!(
            "Confirmation {} unrecognized (best confidence {} below floor {})",
            confirmation.id, best_confidence, self.config.match_floor
        );
        Ok(MatchOutcome::Unrecognized {
            confirmation_id: confirmation.id,
            best_trade_id: best.map(|b| b.trade.id),
            best_confidence,
        })
    }

    fn commit(
        &self,
        client_id: &str,
        confirmation: &Confirmation,
        best: Candidate<'_>,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<MatchOutcome> {
        let classification = classify(&best.comparison, self.config);

        let new_match = NewMatch {
            trade_id: best.trade.id,
            confirmation_id: confirmation.id,
            confidence: best.comparison.confidence,
            classification,
            differing_fields: best.comparison.differing_field_names(),
            resolved_by: actor.to_string(),
        };

        let (matched, scheduled) = self.db.commit_match(client_id, &new_match, now)?;

        let (account, account_error) = match self.resolve_account(client_id, best.trade.id) {
            Ok(binding) => (Some(binding), None),
            Err(e @ Error::NoRuleMatched { .. }) => {
                warn!("Match {}: {}", matched.id, e);
                (None, Some(e.to_string()))
            }
            Err(e) => {
                error!("Match {}: settlement lookup failed: {}", matched.id, e);
                (None, Some(e.to_string()))
            }
        };

        Ok(MatchOutcome::Matched {
            matched,
            account,
            account_error,
            scheduled,
        })
    }

    /// Match every open confirmation of a client, oldest first
    pub fn perform_matching_all_pending(
        &self,
        client_id: &str,
        actor: &str,
    ) -> Result<BatchMatchReport> {
        let mut report = BatchMatchReport::default();

        for confirmation in self.db.list_open_confirmations(client_id)? {
            report.processed += 1;
            match self.perform_matching(client_id, confirmation.id, actor) {
                Ok(outcome) => {
                    match &outcome {
                        MatchOutcome::Matched { matched, .. } => match matched.classification {
                            MatchClassification::Confirmed => report.matched += 1,
                            MatchClassification::Disputed => report.disputed += 1,
                        },
                        MatchOutcome::Duplicate { .. } => report.duplicates += 1,
                        MatchOutcome::Unrecognized { .. } => report.unrecognized += 1,
                        MatchOutcome::Skipped { .. } => {}
                    }
                    report.outcomes.push(outcome);
                }
                Err(Error::ConcurrentModification(msg)) => {
                    warn!("Confirmation {} skipped: {}", confirmation.id, msg);
                    report.conflicts += 1;
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            "Batch matching for {}: {} processed, {} matched, {} disputed, {} duplicate, {} unrecognized, {} conflicts",
            client_id,
            report.processed,
            report.matched,
            report.disputed,
            report.duplicates,
            report.unrecognized,
            report.conflicts
        );
        Ok(report)
    }

    /// Settlement accounts for a trade
    pub fn resolve_account(&self, client_id: &str, trade_id: i64) -> Result<AccountBinding> {
        let trade = self.db.require_trade(client_id, trade_id)?;
        let rules = self.db.list_settlement_rules(client_id)?;
        resolve_account(&rules, &trade)
    }

    /// Reverse a match, reverting both sides and canceling its scheduled actions
    pub fn reverse_match(&self, client_id: &str, match_id: i64) -> Result<Reversal> {
        self.db.reverse_match(client_id, match_id, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TradeStatus;

    fn trade(id: i64, trade_date: &str, amount: &str) -> Trade {
        Trade {
            id,
            client_id: "acme".into(),
            fields: TradeFields {
                counterparty: Some("Banco Uno".into()),
                trade_date: Some(trade_date.into()),
                value_date: Some("2025-01-17".into()),
                direction: Some("buy".into()),
                currency_1: Some("USD".into()),
                currency_2: Some("CLP".into()),
                amount: Some(amount.into()),
                price: Some("890.50".into()),
                ..Default::default()
            },
            status: TradeStatus::Unmatched,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_fingerprint_prefers_trade_number() {
        let a = TradeFields {
            counterparty: Some("Banco Uno S.A.".into()),
            trade_number: Some("fx 1001".into()),
            amount: Some("100".into()),
            ..Default::default()
        };
        let b = TradeFields {
            counterparty: Some("BANCO  UNO s.a.".into()),
            trade_number: Some("FX1001".into()),
            amount: Some("999".into()),
            ..Default::default()
        };
        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_eq!(fingerprint(&a).len(), 64);
    }

    #[test]
    fn test_fingerprint_without_trade_number_uses_economics() {
        let base = trade(1, "2025-01-15", "100000").fields;
        let mut same = base.clone();
        same.trade_date = Some("15/01/2025".into());
        same.amount = Some("100.000,00".into());
        assert_eq!(fingerprint(&base), fingerprint(&same));

        let mut other = base.clone();
        other.amount = Some("100001".into());
        assert_ne!(fingerprint(&base), fingerprint(&other));
    }

    #[test]
    fn test_select_best_highest_confidence() {
        let trades = vec![trade(1, "2025-01-15", "150000"), trade(2, "2025-01-15", "100000")];
        let confirmation = trade(0, "2025-01-15", "100000").fields;
        let best = select_best(&trades, &confirmation, &MatchingConfig::default()).unwrap();
        assert_eq!(best.trade.id, 2);
        assert_eq!(best.comparison.confidence, 100);
    }

    #[test]
    fn test_tie_break_earliest_date_then_lowest_id() {
        // Same score: the confirmation's trade date differs from all of them
        let trades = vec![
            trade(7, "2025-01-12", "100000"),
            trade(3, "2025-01-13", "100000"),
            trade(5, "2025-01-12", "100000"),
            trade(1, "not a date", "100000"),
        ];
        let confirmation = trade(0, "2025-01-20", "100000").fields;
        let best = select_best(&trades, &confirmation, &MatchingConfig::default()).unwrap();
        assert_eq!(best.trade.id, 5);
    }

    #[test]
    fn test_classify_thresholds() {
        let config = MatchingConfig::default();
        let trades = vec![trade(1, "2025-01-15", "100000")];

        let exact = select_best(&trades, &trade(0, "2025-01-15", "100000").fields, &config).unwrap();
        assert_eq!(classify(&exact.comparison, &config), MatchClassification::Confirmed);

        let off = select_best(&trades, &trade(0, "2025-01-15", "150000").fields, &config).unwrap();
        assert_eq!(off.comparison.confidence, 80);
        assert_eq!(classify(&off.comparison, &config), MatchClassification::Disputed);
    }

    #[test]
    fn test_select_best_empty() {
        let confirmation = trade(0, "2025-01-15", "1").fields;
        assert!(select_best(&[], &confirmation, &MatchingConfig::default()).is_none());
    }
}
