//! Domain models for Confirma

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

/// The comparable fields shared by trades and confirmations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    TradeNumber,
    Counterparty,
    Product,
    TradeDate,
    ValueDate,
    Direction,
    Currency1,
    Currency2,
    Amount,
    Price,
    MaturityDate,
    PaymentDate,
    SettlementType,
    SettlementCurrency,
    PaymentMethod,
}

impl Field {
    pub const ALL: [Field; 15] = [
        Field::TradeNumber,
        Field::Counterparty,
        Field::Product,
        Field::TradeDate,
        Field::ValueDate,
        Field::Direction,
        Field::Currency1,
        Field::Currency2,
        Field::Amount,
        Field::Price,
        Field::MaturityDate,
        Field::PaymentDate,
        Field::SettlementType,
        Field::SettlementCurrency,
        Field::PaymentMethod,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TradeNumber => "trade_number",
            Self::Counterparty => "counterparty",
            Self::Product => "product",
            Self::TradeDate => "trade_date",
            Self::ValueDate => "value_date",
            Self::Direction => "direction",
            Self::Currency1 => "currency_1",
            Self::Currency2 => "currency_2",
            Self::Amount => "amount",
            Self::Price => "price",
            Self::MaturityDate => "maturity_date",
            Self::PaymentDate => "payment_date",
            Self::SettlementType => "settlement_type",
            Self::SettlementCurrency => "settlement_currency",
            Self::PaymentMethod => "payment_method",
        }
    }
}

impl std::str::FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == lowered)
            .ok_or_else(|| format!("Unknown field: {}", s))
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Accepts strings, numbers and booleans; upstream extractors are not consistent.
fn loose_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(serde_json::Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

/// Raw field values of a trade or a confirmation, exactly as captured.
///
/// Values stay raw so a failed normalization can be reported next to the
/// original text; the comparator normalizes on every comparison.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeFields {
    #[serde(default, deserialize_with = "loose_string")]
    pub trade_number: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub counterparty: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub product: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub trade_date: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub value_date: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub direction: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub currency_1: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub currency_2: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub amount: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub price: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub maturity_date: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub payment_date: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub settlement_type: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub settlement_currency: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub payment_method: Option<String>,
}

impl TradeFields {
    /// Raw value of a field, `None` when absent or blank
    pub fn get(&self, field: Field) -> Option<&str> {
        let value = match field {
            Field::TradeNumber => &self.trade_number,
            Field::Counterparty => &self.counterparty,
            Field::Product => &self.product,
            Field::TradeDate => &self.trade_date,
            Field::ValueDate => &self.value_date,
            Field::Direction => &self.direction,
            Field::Currency1 => &self.currency_1,
            Field::Currency2 => &self.currency_2,
            Field::Amount => &self.amount,
            Field::Price => &self.price,
            Field::MaturityDate => &self.maturity_date,
            Field::PaymentDate => &self.payment_date,
            Field::SettlementType => &self.settlement_type,
            Field::SettlementCurrency => &self.settlement_currency,
            Field::PaymentMethod => &self.payment_method,
        };
        value.as_deref().filter(|v| !v.trim().is_empty())
    }

    pub fn set(&mut self, field: Field, value: Option<String>) {
        let slot = match field {
            Field::TradeNumber => &mut self.trade_number,
            Field::Counterparty => &mut self.counterparty,
            Field::Product => &mut self.product,
            Field::TradeDate => &mut self.trade_date,
            Field::ValueDate => &mut self.value_date,
            Field::Direction => &mut self.direction,
            Field::Currency1 => &mut self.currency_1,
            Field::Currency2 => &mut self.currency_2,
            Field::Amount => &mut self.amount,
            Field::Price => &mut self.price,
            Field::MaturityDate => &mut self.maturity_date,
            Field::PaymentDate => &mut self.payment_date,
            Field::SettlementType => &mut self.settlement_type,
            Field::SettlementCurrency => &mut self.settlement_currency,
            Field::PaymentMethod => &mut self.payment_method,
        };
        *slot = value;
    }
}

/// Trade lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    #[default]
    Unmatched,
    Matched,
    Disputed,
    Confirmed,
    Rejected,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unmatched => "unmatched",
            Self::Matched => "matched",
            Self::Disputed => "disputed",
            Self::Confirmed => "confirmed",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Rejected)
    }
}

impl std::str::FromStr for TradeStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "unmatched" => Ok(Self::Unmatched),
            "matched" => Ok(Self::Matched),
            "disputed" => Ok(Self::Disputed),
            "confirmed" => Ok(Self::Confirmed),
            "rejected" => Ok(Self::Rejected),
            _ => Err(format!("Unknown trade status: {}", s)),
        }
    }
}

impl std::fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A client's own record of a transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: i64,
    pub client_id: String,
    #[serde(flatten)]
    pub fields: TradeFields,
    pub status: TradeStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// For creating new trades
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTrade {
    #[serde(flatten)]
    pub fields: TradeFields,
}

/// Confirmation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationStatus {
    #[default]
    Pending,
    Matched,
    Duplicate,
    Unrecognized,
}

impl ConfirmationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Matched => "matched",
            Self::Duplicate => "duplicate",
            Self::Unrecognized => "unrecognized",
        }
    }

    /// Whether the confirmation is still waiting for a trade
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Unrecognized)
    }
}

impl std::str::FromStr for ConfirmationStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "matched" => Ok(Self::Matched),
            "duplicate" => Ok(Self::Duplicate),
            "unrecognized" => Ok(Self::Unrecognized),
            _ => Err(format!("Unknown confirmation status: {}", s)),
        }
    }
}

impl std::fmt::Display for ConfirmationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The bank's record of a transaction, extracted upstream from an email or attachment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Confirmation {
    pub id: i64,
    pub client_id: String,
    #[serde(flatten)]
    pub fields: TradeFields,
    pub sender: Option<String>,
    pub subject: Option<String>,
    pub received_at: DateTime<Utc>,
    /// Channel the confirmation arrived through (email, attachment, manual)
    pub source: Option<String>,
    /// SHA-256 over normalized identity fields, used for duplicate detection
    pub fingerprint: String,
    pub status: ConfirmationStatus,
    pub created_at: DateTime<Utc>,
}

/// For ingesting new confirmations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewConfirmation {
    #[serde(flatten)]
    pub fields: TradeFields,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    /// Defaults to ingestion time
    #[serde(default)]
    pub received_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source: Option<String>,
}

/// How a match was classified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchClassification {
    Confirmed,
    Disputed,
}

impl MatchClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Disputed => "disputed",
        }
    }

    /// Trade status mirroring this classification
    pub fn trade_status(&self) -> TradeStatus {
        match self {
            Self::Confirmed => TradeStatus::Matched,
            Self::Disputed => TradeStatus::Disputed,
        }
    }
}

impl std::str::FromStr for MatchClassification {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "confirmed" => Ok(Self::Confirmed),
            "disputed" => Ok(Self::Disputed),
            _ => Err(format!("Unknown match classification: {}", s)),
        }
    }
}

impl std::fmt::Display for MatchClassification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Binds one trade to one confirmation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub id: i64,
    pub client_id: String,
    pub trade_id: i64,
    pub confirmation_id: i64,
    /// 0-100
    pub confidence: u8,
    pub classification: MatchClassification,
    /// In comparator field order
    pub differing_fields: Vec<String>,
    pub resolved_by: String,
    pub created_at: DateTime<Utc>,
    /// Set when the match is reversed; a reversed match is no longer active
    pub reversed_at: Option<DateTime<Utc>>,
    /// Status the confirmation had before it was matched, restored on reversal
    pub confirmation_prior_status: ConfirmationStatus,
}

impl Match {
    pub fn is_active(&self) -> bool {
        self.reversed_at.is_none()
    }
}

/// For committing a new match
#[derive(Debug, Clone)]
pub struct NewMatch {
    pub trade_id: i64,
    pub confirmation_id: i64,
    pub confidence: u8,
    pub classification: MatchClassification,
    pub differing_fields: Vec<String>,
    pub resolved_by: String,
}

/// Direction of a trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "buy" | "b" | "compra" | "c" | "purchase" => Ok(Self::Buy),
            "sell" | "s" | "venta" | "v" | "sale" => Ok(Self::Sell),
            _ => Err(format!("Unknown direction: {}", s)),
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Direction predicate of a settlement rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DirectionFilter {
    Buy,
    Sell,
    #[default]
    Any,
}

impl DirectionFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
            Self::Any => "any",
        }
    }

    pub fn accepts(&self, direction: Direction) -> bool {
        match self {
            Self::Any => true,
            Self::Buy => direction == Direction::Buy,
            Self::Sell => direction == Direction::Sell,
        }
    }
}

impl std::str::FromStr for DirectionFilter {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "any" | "*" | "ambas" | "both" => Ok(Self::Any),
            other => other.parse::<Direction>().map(|d| match d {
                Direction::Buy => Self::Buy,
                Direction::Sell => Self::Sell,
            }),
        }
    }
}

impl std::fmt::Display for DirectionFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Traded product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Product {
    Spot,
    Forward,
    Ndf,
    Swap,
    Option,
}

impl Product {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spot => "spot",
            Self::Forward => "forward",
            Self::Ndf => "ndf",
            Self::Swap => "swap",
            Self::Option => "option",
        }
    }
}

impl std::str::FromStr for Product {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "spot" | "contado" => Ok(Self::Spot),
            "forward" | "fwd" => Ok(Self::Forward),
            "ndf" | "non-deliverable forward" | "non deliverable forward" => Ok(Self::Ndf),
            "swap" | "fx swap" => Ok(Self::Swap),
            "option" | "opcion" | "opción" => Ok(Self::Option),
            _ => Err(format!("Unknown product: {}", s)),
        }
    }
}

impl std::fmt::Display for Product {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a rule settles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SettlementModality {
    /// Each leg settles in its own currency
    PhysicalDelivery,
    /// Both legs settle in one settlement currency
    NetSettlement,
}

impl SettlementModality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PhysicalDelivery => "physical-delivery",
            Self::NetSettlement => "net-settlement",
        }
    }
}

impl std::str::FromStr for SettlementModality {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "physical-delivery" | "physical" | "delivery" | "entrega-fisica" | "entrega física"
            | "entrega fisica" => Ok(Self::PhysicalDelivery),
            "net-settlement" | "net" | "compensacion" | "compensación" | "non-delivery" => {
                Ok(Self::NetSettlement)
            }
            _ => Err(format!("Unknown settlement modality: {}", s)),
        }
    }
}

impl std::fmt::Display for SettlementModality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One leg of a settlement instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountLeg {
    pub bank: String,
    pub swift: String,
    pub account_number: String,
    /// Required for physical delivery, forced to the settlement currency for net settlement
    #[serde(default)]
    pub currency: Option<String>,
}

/// A client-scoped, priority-ordered predicate to account mapping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementRule {
    pub id: i64,
    pub client_id: String,
    /// Dense 1..N within a client, 1 is evaluated first
    pub priority: i64,
    pub active: bool,
    pub direction: DirectionFilter,
    /// `None` matches any counterparty
    pub counterparty: Option<String>,
    pub product: Product,
    pub modality: SettlementModality,
    pub settlement_currency: Option<String>,
    /// Leg the client pays from (cargar)
    pub pay: AccountLeg,
    /// Leg the client receives into (abonar)
    pub receive: AccountLeg,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// For creating or replacing settlement rules
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSettlementRule {
    /// Insert position; appended when absent
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub direction: DirectionFilter,
    #[serde(default)]
    pub counterparty: Option<String>,
    pub product: Product,
    pub modality: SettlementModality,
    #[serde(default)]
    pub settlement_currency: Option<String>,
    pub pay: AccountLeg,
    pub receive: AccountLeg,
}

fn default_true() -> bool {
    true
}

/// The account pair that applies to a trade
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBinding {
    pub rule_id: i64,
    pub priority: i64,
    pub modality: SettlementModality,
    pub pay: AccountLeg,
    pub receive: AccountLeg,
}

/// Per-client automation toggles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationSettings {
    pub client_id: String,
    pub auto_confirm_enabled: bool,
    pub confirm_delay_minutes: i64,
    pub auto_dispute_enabled: bool,
    pub dispute_delay_minutes: i64,
}

impl AutomationSettings {
    /// Both automations off
    pub fn disabled(client_id: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            auto_confirm_enabled: false,
            confirm_delay_minutes: 0,
            auto_dispute_enabled: false,
            dispute_delay_minutes: 0,
        }
    }
}

/// Partial settings update; absent fields keep their current value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutomationSettingsUpdate {
    #[serde(default)]
    pub auto_confirm_enabled: Option<bool>,
    #[serde(default)]
    pub confirm_delay_minutes: Option<i64>,
    #[serde(default)]
    pub auto_dispute_enabled: Option<bool>,
    #[serde(default)]
    pub dispute_delay_minutes: Option<i64>,
}

/// What a scheduled action does when it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Confirm,
    Dispute,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirm => "confirm",
            Self::Dispute => "dispute",
        }
    }
}

impl std::str::FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "confirm" => Ok(Self::Confirm),
            "dispute" => Ok(Self::Dispute),
            _ => Err(format!("Unknown action kind: {}", s)),
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Scheduled action state: scheduled, then exactly one of fired or canceled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ActionState {
    #[default]
    Scheduled,
    Fired,
    Canceled,
}

impl ActionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Fired => "fired",
            Self::Canceled => "canceled",
        }
    }
}

impl std::str::FromStr for ActionState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "scheduled" => Ok(Self::Scheduled),
            "fired" => Ok(Self::Fired),
            "canceled" | "cancelled" => Ok(Self::Canceled),
            _ => Err(format!("Unknown action state: {}", s)),
        }
    }
}

impl std::fmt::Display for ActionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An at-most-once deferred confirm or dispute notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledAction {
    pub id: i64,
    pub client_id: String,
    pub match_id: i64,
    pub kind: ActionKind,
    pub fire_at: DateTime<Utc>,
    pub state: ActionState,
    pub fired_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    /// Delivery failure recorded after firing
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A planned action, not yet persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedAction {
    pub kind: ActionKind,
    pub fire_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trade_fields_accept_numbers() {
        let fields: TradeFields = serde_json::from_str(
            r#"{"counterparty": "Banco Uno", "amount": 100000.5, "trade_number": 4411}"#,
        )
        .unwrap();
        assert_eq!(fields.amount.as_deref(), Some("100000.5"));
        assert_eq!(fields.trade_number.as_deref(), Some("4411"));
        assert_eq!(fields.price, None);
    }

    #[test]
    fn test_trade_fields_get_skips_blank() {
        let fields = TradeFields {
            counterparty: Some("   ".into()),
            ..Default::default()
        };
        assert_eq!(fields.get(Field::Counterparty), None);
    }

    #[test]
    fn test_field_roundtrip_names() {
        for field in Field::ALL {
            assert_eq!(field.as_str().parse::<Field>().unwrap(), field);
        }
        assert!("volume".parse::<Field>().is_err());
    }

    #[test]
    fn test_direction_aliases() {
        assert_eq!("Compra".parse::<Direction>().unwrap(), Direction::Buy);
        assert_eq!("V".parse::<Direction>().unwrap(), Direction::Sell);
        assert_eq!("*".parse::<DirectionFilter>().unwrap(), DirectionFilter::Any);
        assert!(DirectionFilter::Any.accepts(Direction::Sell));
        assert!(!DirectionFilter::Buy.accepts(Direction::Sell));
    }

    #[test]
    fn test_modality_parse() {
        assert_eq!(
            "net_settlement".parse::<SettlementModality>().unwrap(),
            SettlementModality::NetSettlement
        );
        assert_eq!(
            "Physical-Delivery".parse::<SettlementModality>().unwrap(),
            SettlementModality::PhysicalDelivery
        );
    }

    #[test]
    fn test_classification_mirrors_trade_status() {
        assert_eq!(
            MatchClassification::Confirmed.trade_status(),
            TradeStatus::Matched
        );
        assert_eq!(
            MatchClassification::Disputed.trade_status(),
            TradeStatus::Disputed
        );
    }
}
