/// Core data types for the dashboard push channel and REST API
///
/// These types match the JSON message format from the trading bot backend. The
/// backend emits snake_case keys while newer builds emit camelCase, so both are
/// accepted. Every scalar goes through [`lenient`](crate::shared::coerce::lenient)
/// so a bad value becomes "unknown" instead of rejecting the message.
use crate::error::DecodeError;
use crate::shared::coerce::{lenient, parse_timestamp, to_number_or_null};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;
use tracing::{debug, warn};

/// Lifecycle phase of a trading position
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Phase {
    #[default]
    Open,
    Tp1,
    Tp2,
    Closed,
    Staled,
    Partial,
    Unknown,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Open => "OPEN",
            Phase::Tp1 => "TP1",
            Phase::Tp2 => "TP2",
            Phase::Closed => "CLOSED",
            Phase::Staled => "STALED",
            Phase::Partial => "PARTIAL",
            Phase::Unknown => "UNKNOWN",
        }
    }

    /// Check if the position still carries exposure
    pub fn is_active(&self) -> bool {
        matches!(self, Phase::Open | Phase::Tp1 | Phase::Tp2 | Phase::Partial)
    }
}

impl FromStr for Phase {
    type Err = DecodeError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Ok(match raw.trim().to_ascii_uppercase().as_str() {
            "OPEN" => Phase::Open,
            "TP1" => Phase::Tp1,
            "TP2" => Phase::Tp2,
            "CLOSED" => Phase::Closed,
            "STALED" | "STALE" => Phase::Staled,
            "PARTIAL" => Phase::Partial,
            _ => Phase::Unknown,
        })
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Order side (Buy or Sell)
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
    #[default]
    Unknown,
}

impl Side {
    /// Convert to display string
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
            Side::Unknown => "UNKNOWN",
        }
    }

    /// Check if this is a buy order
    pub fn is_buy(&self) -> bool {
        matches!(self, Side::Buy)
    }

    /// Check if this is a sell order
    pub fn is_sell(&self) -> bool {
        matches!(self, Side::Sell)
    }
}

impl FromStr for Side {
    type Err = DecodeError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Ok(match raw.trim().to_ascii_uppercase().as_str() {
            "BUY" => Side::Buy,
            "SELL" => Side::Sell,
            _ => Side::Unknown,
        })
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether a trade hit the chain or only the paper ledger
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeStatus {
    Live,
    #[default]
    Paper,
    Unknown,
}

impl FromStr for TradeStatus {
    type Err = DecodeError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Ok(match raw.trim().to_ascii_uppercase().as_str() {
            "LIVE" => TradeStatus::Live,
            "PAPER" => TradeStatus::Paper,
            _ => TradeStatus::Unknown,
        })
    }
}

/// Price movement relative to the previously stored snapshot
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    #[default]
    Flat,
}

impl FromStr for Direction {
    type Err = DecodeError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            "flat" => Ok(Direction::Flat),
            other => Err(DecodeError::Payload {
                kind: "direction".to_string(),
                reason: format!("unknown direction `{other}`"),
            }),
        }
    }
}

impl Direction {
    /// Compare a new price against the previous one. Unknown on either side is flat.
    pub fn between(previous: Option<f64>, current: Option<f64>) -> Self {
        match (previous, current) {
            (Some(previous), Some(current)) if current > previous => Direction::Up,
            (Some(previous), Some(current)) if current < previous => Direction::Down,
            _ => Direction::Flat,
        }
    }

    pub fn arrow(&self) -> &'static str {
        match self {
            Direction::Up => "↑",
            Direction::Down => "↓",
            Direction::Flat => "→",
        }
    }
}

/// One point of the equity curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl EquityPoint {
    /// Accepts `{t, v}` / `{timestamp, value}` objects or `[t, v]` pairs.
    fn from_value(value: &Value) -> Option<Self> {
        let (time, amount) = match value {
            Value::Array(pair) if pair.len() == 2 => (&pair[0], &pair[1]),
            Value::Object(map) => (
                map.get("t").or_else(|| map.get("timestamp"))?,
                map.get("v").or_else(|| map.get("value"))?,
            ),
            _ => return None,
        };

        Some(Self {
            timestamp: parse_timestamp(time)?,
            value: to_number_or_null(amount)?,
        })
    }
}

fn equity_curve<'de, D>(deserializer: D) -> Result<Vec<EquityPoint>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let points = match value {
        Value::Array(items) => items.iter().filter_map(EquityPoint::from_value).collect(),
        _ => Vec::new(),
    };
    Ok(points)
}

/// Portfolio snapshot, replaced wholesale on every update
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioSnapshot {
    #[serde(default, deserialize_with = "lenient::number")]
    pub equity: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub cash: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub holdings: Option<f64>,
    #[serde(default, alias = "unrealized_pnl", deserialize_with = "lenient::number")]
    pub unrealized_pnl: Option<f64>,
    #[serde(default, alias = "realized_pnl_24h", deserialize_with = "lenient::number")]
    pub realized_pnl_24h: Option<f64>,
    #[serde(default, alias = "realized_pnl_total", deserialize_with = "lenient::number")]
    pub realized_pnl_total: Option<f64>,
    #[serde(default, alias = "win_rate", deserialize_with = "lenient::number")]
    pub win_rate: Option<f64>,
    #[serde(
        default,
        alias = "updated_at",
        alias = "created_at",
        deserialize_with = "lenient::timestamp"
    )]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "equity_curve", deserialize_with = "equity_curve")]
    pub equity_curve: Vec<EquityPoint>,
}

/// Open (or recently closed) trading position
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub symbol: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub chain: String,
    #[serde(default, alias = "token_address", deserialize_with = "lenient::opt_string")]
    pub token_address: Option<String>,
    #[serde(default, alias = "pair_address", deserialize_with = "lenient::opt_string")]
    pub pair_address: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub qty: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub entry: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub tp1: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub tp2: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub stop: Option<f64>,
    #[serde(default, deserialize_with = "lenient::parsed")]
    pub phase: Phase,
    #[serde(default, alias = "opened_at", deserialize_with = "lenient::timestamp")]
    pub opened_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "updated_at", deserialize_with = "lenient::timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "closed_at", deserialize_with = "lenient::timestamp")]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "last_price", deserialize_with = "lenient::number")]
    pub last_price: Option<f64>,
    #[serde(default, alias = "last_direction", deserialize_with = "lenient::parsed_opt")]
    pub last_direction: Option<Direction>,
    #[serde(default, alias = "change_pct", deserialize_with = "lenient::number")]
    pub change_pct: Option<f64>,
}

impl Position {
    /// Logical key of a position: token address, falling back to pair address.
    pub fn address_key(&self) -> Option<&str> {
        self.token_address
            .as_deref()
            .or(self.pair_address.as_deref())
    }
}

/// Executed (live or paper) trade
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient::parsed")]
    pub side: Side,
    #[serde(default, deserialize_with = "lenient::string")]
    pub symbol: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub chain: String,
    #[serde(default, deserialize_with = "lenient::number")]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub qty: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub fee: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub pnl: Option<f64>,
    #[serde(default, deserialize_with = "lenient::parsed")]
    pub status: TradeStatus,
    #[serde(default, alias = "token_address", deserialize_with = "lenient::opt_string")]
    pub token_address: Option<String>,
    #[serde(default, alias = "pair_address", deserialize_with = "lenient::opt_string")]
    pub pair_address: Option<String>,
    #[serde(default, alias = "tx_hash", deserialize_with = "lenient::opt_string")]
    pub tx_hash: Option<String>,
    #[serde(default, alias = "created_at", deserialize_with = "lenient::timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Scoring stages of the candidate selection pipeline
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scores {
    #[serde(default, deserialize_with = "lenient::number")]
    pub quality: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub statistics: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub entry: Option<f64>,
    #[serde(default, rename = "final", deserialize_with = "lenient::number")]
    pub final_score: Option<f64>,
}

/// AI chart assessment attached to a candidate
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AiAssessment {
    #[serde(
        default,
        alias = "probability_tp1_before_sl",
        deserialize_with = "lenient::number"
    )]
    pub probability_tp1_before_sl: Option<f64>,
    #[serde(default, alias = "quality_score_delta", deserialize_with = "lenient::number")]
    pub quality_score_delta: Option<f64>,
}

/// Market fundamentals captured at evaluation time
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Fundamentals {
    #[serde(default, alias = "token_age_hours", deserialize_with = "lenient::number")]
    pub token_age_hours: Option<f64>,
    #[serde(default, alias = "volume_5m_usd", deserialize_with = "lenient::number")]
    pub volume_5m_usd: Option<f64>,
    #[serde(default, alias = "volume_1h_usd", deserialize_with = "lenient::number")]
    pub volume_1h_usd: Option<f64>,
    #[serde(default, alias = "volume_6h_usd", deserialize_with = "lenient::number")]
    pub volume_6h_usd: Option<f64>,
    #[serde(default, alias = "volume_24h_usd", deserialize_with = "lenient::number")]
    pub volume_24h_usd: Option<f64>,
    #[serde(default, alias = "liquidity_usd", deserialize_with = "lenient::number")]
    pub liquidity_usd: Option<f64>,
    #[serde(default, alias = "pct_5m", deserialize_with = "lenient::number")]
    pub pct_5m: Option<f64>,
    #[serde(default, alias = "pct_1h", deserialize_with = "lenient::number")]
    pub pct_1h: Option<f64>,
    #[serde(default, alias = "pct_6h", deserialize_with = "lenient::number")]
    pub pct_6h: Option<f64>,
    #[serde(default, alias = "pct_24h", deserialize_with = "lenient::number")]
    pub pct_24h: Option<f64>,
    #[serde(default, alias = "tx_5m", deserialize_with = "lenient::number")]
    pub tx_5m: Option<f64>,
    #[serde(default, alias = "tx_1h", deserialize_with = "lenient::number")]
    pub tx_1h: Option<f64>,
    #[serde(default, alias = "tx_6h", deserialize_with = "lenient::number")]
    pub tx_6h: Option<f64>,
    #[serde(default, alias = "tx_24h", deserialize_with = "lenient::number")]
    pub tx_24h: Option<f64>,
}

/// Sizing decision taken for a candidate
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub action: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub reason: Option<String>,
    #[serde(default, alias = "sizing_multiplier", deserialize_with = "lenient::number")]
    pub sizing_multiplier: Option<f64>,
    #[serde(default, alias = "order_notional_usd", deserialize_with = "lenient::number")]
    pub order_notional_usd: Option<f64>,
    #[serde(default, alias = "free_cash_before_usd", deserialize_with = "lenient::number")]
    pub free_cash_before_usd: Option<f64>,
    #[serde(default, alias = "free_cash_after_usd", deserialize_with = "lenient::number")]
    pub free_cash_after_usd: Option<f64>,
}

impl Decision {
    /// Case-insensitive action comparison
    pub fn is_action(&self, action: &str) -> bool {
        self.action
            .as_deref()
            .is_some_and(|own| own.eq_ignore_ascii_case(action))
    }
}

/// Realised result once the associated trade has closed
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    #[serde(default, alias = "has_outcome", deserialize_with = "lenient::flag")]
    pub has_outcome: bool,
    #[serde(default, alias = "trade_id", deserialize_with = "lenient::opt_string")]
    pub trade_id: Option<String>,
    #[serde(default, alias = "closed_at", deserialize_with = "lenient::timestamp")]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "holding_minutes", deserialize_with = "lenient::number")]
    pub holding_minutes: Option<f64>,
    #[serde(default, alias = "pnl_pct", deserialize_with = "lenient::number")]
    pub pnl_pct: Option<f64>,
    #[serde(default, alias = "pnl_usd", deserialize_with = "lenient::number")]
    pub pnl_usd: Option<f64>,
    #[serde(default, alias = "was_profit", deserialize_with = "lenient::opt_flag")]
    pub was_profit: Option<bool>,
    #[serde(default, alias = "exit_reason", deserialize_with = "lenient::opt_string")]
    pub exit_reason: Option<String>,
}

/// One evaluation of a trading candidate, with its eventual outcome
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsRecord {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub symbol: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub chain: String,
    #[serde(default, alias = "token_address", deserialize_with = "lenient::opt_string")]
    pub token_address: Option<String>,
    #[serde(default, alias = "pair_address", deserialize_with = "lenient::opt_string")]
    pub pair_address: Option<String>,
    #[serde(default, alias = "evaluated_at", deserialize_with = "lenient::timestamp")]
    pub evaluated_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub rank: Option<f64>,
    #[serde(default, deserialize_with = "lenient::object")]
    pub scores: Scores,
    #[serde(default, deserialize_with = "lenient::object")]
    pub ai: AiAssessment,
    #[serde(default, deserialize_with = "lenient::object")]
    pub fundamentals: Fundamentals,
    #[serde(default, deserialize_with = "lenient::object")]
    pub decision: Decision,
    #[serde(default, deserialize_with = "lenient::object")]
    pub outcome: Outcome,
    /// Opaque payloads (raw provider responses, settings snapshots, ...)
    #[serde(flatten)]
    pub raw: Map<String, Value>,
}

/// Bot runtime status, sent with `init` and served by `GET status`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BotStatus {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub mode: Option<String>,
    #[serde(default, alias = "paper_mode", deserialize_with = "lenient::opt_flag")]
    pub paper_mode: Option<bool>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub interval: Option<f64>,
    #[serde(
        default,
        alias = "prices_interval_seconds",
        deserialize_with = "lenient::number"
    )]
    pub prices_interval_seconds: Option<f64>,
}

/// Full snapshot sent by the backend on connect (and on `refresh`)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InitPayload {
    pub status: Option<BotStatus>,
    pub portfolio: Option<PortfolioSnapshot>,
    pub positions: Vec<Position>,
    pub trades: Vec<Trade>,
    pub analytics: Vec<AnalyticsRecord>,
}

/// Analytics payloads are either a full list or one record
#[derive(Debug, Clone, PartialEq)]
pub enum AnalyticsUpdate {
    Bulk(Vec<AnalyticsRecord>),
    Single(Box<AnalyticsRecord>),
}

/// Closed set of inbound push-channel messages
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Init(Box<InitPayload>),
    Portfolio(Box<PortfolioSnapshot>),
    Positions(Vec<Position>),
    Trades(Vec<Trade>),
    Trade(Box<Trade>),
    Analytics(AnalyticsUpdate),
    Pong,
    Error(Value),
    Unknown { kind: String },
}

/// Raw `{type, payload}` envelope as sent over the wire
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
}

impl InboundMessage {
    /// Decode a text frame into a known message variant.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    /// Decode an already parsed JSON value into a known message variant.
    pub fn from_value(value: Value) -> Result<Self, DecodeError> {
        if !value.get("type").is_some_and(Value::is_string) {
            return Err(DecodeError::MissingType);
        }
        let envelope: Envelope =
            serde_json::from_value(value).map_err(|_| DecodeError::MissingType)?;

        let kind = envelope.kind;
        let payload = envelope.payload;

        let message = match kind.as_str() {
            "init" => InboundMessage::Init(Box::new(decode_init(&kind, payload)?)),
            "portfolio" => {
                InboundMessage::Portfolio(Box::new(decode_object(&kind, payload)?))
            }
            "positions" => InboundMessage::Positions(decode_list(&kind, payload)?),
            "trades" => InboundMessage::Trades(decode_list(&kind, payload)?),
            "trade" => InboundMessage::Trade(Box::new(decode_object(&kind, payload)?)),
            "analytics" => InboundMessage::Analytics(match payload {
                Value::Array(_) => AnalyticsUpdate::Bulk(decode_list(&kind, payload)?),
                other => AnalyticsUpdate::Single(Box::new(decode_object(&kind, other)?)),
            }),
            "pong" => InboundMessage::Pong,
            "error" => InboundMessage::Error(payload),
            _ => InboundMessage::Unknown { kind },
        };

        Ok(message)
    }

    /// Wire name of the message kind, for logging
    pub fn kind(&self) -> &str {
        match self {
            InboundMessage::Init(_) => "init",
            InboundMessage::Portfolio(_) => "portfolio",
            InboundMessage::Positions(_) => "positions",
            InboundMessage::Trades(_) => "trades",
            InboundMessage::Trade(_) => "trade",
            InboundMessage::Analytics(_) => "analytics",
            InboundMessage::Pong => "pong",
            InboundMessage::Error(_) => "error",
            InboundMessage::Unknown { kind } => kind,
        }
    }
}

/// Outbound client frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundMessage {
    Ping,
    Refresh,
}

impl OutboundMessage {
    pub fn to_json(self) -> String {
        let kind = match self {
            OutboundMessage::Ping => "ping",
            OutboundMessage::Refresh => "refresh",
        };
        serde_json::json!({ "type": kind }).to_string()
    }
}

/// The backend names the token address plain `address`.
fn normalize_address_key(fields: &mut Map<String, Value>) {
    if fields.contains_key("tokenAddress") || fields.contains_key("token_address") {
        return;
    }
    if let Some(address) = fields.remove("address") {
        fields.insert("tokenAddress".to_string(), address);
    }
}

pub(crate) fn decode_object<T>(kind: &str, payload: Value) -> Result<T, DecodeError>
where
    T: DeserializeOwned,
{
    let Value::Object(mut fields) = payload else {
        return Err(DecodeError::Payload {
            kind: kind.to_string(),
            reason: format!("expected an object, got {}", json_type(&payload)),
        });
    };
    normalize_address_key(&mut fields);

    serde_json::from_value(Value::Object(fields)).map_err(|error| DecodeError::Payload {
        kind: kind.to_string(),
        reason: error.to_string(),
    })
}

/// Decode a list element-wise; malformed elements are dropped, not the whole list.
pub(crate) fn decode_list<T>(kind: &str, payload: Value) -> Result<Vec<T>, DecodeError>
where
    T: DeserializeOwned,
{
    let Value::Array(items) = payload else {
        return Err(DecodeError::Payload {
            kind: kind.to_string(),
            reason: format!("expected an array, got {}", json_type(&payload)),
        });
    };

    let total = items.len();
    let decoded: Vec<T> = items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match decode_object(kind, item) {
            Ok(entity) => Some(entity),
            Err(error) => {
                warn!(kind, index, %error, "dropping malformed list element");
                None
            }
        })
        .collect();

    if decoded.len() != total {
        debug!(kind, total, kept = decoded.len(), "partially decoded list payload");
    }

    Ok(decoded)
}

fn decode_init(kind: &str, payload: Value) -> Result<InitPayload, DecodeError> {
    let Value::Object(mut fields) = payload else {
        return Err(DecodeError::Payload {
            kind: kind.to_string(),
            reason: format!("expected an object, got {}", json_type(&payload)),
        });
    };

    let mut list_field = |name: &str| match fields.remove(name) {
        None | Some(Value::Null) => Value::Array(Vec::new()),
        Some(value) => value,
    };

    let positions = decode_list("init.positions", list_field("positions"))?;
    let trades = decode_list("init.trades", list_field("trades"))?;
    let analytics = decode_list("init.analytics", list_field("analytics"))?;

    let portfolio = match fields.remove("portfolio") {
        Some(Value::Object(map)) if map.is_empty() => None,
        Some(value @ Value::Object(_)) => Some(decode_object("init.portfolio", value)?),
        _ => None,
    };

    let status = match fields.remove("status") {
        Some(value @ Value::Object(_)) => decode_object("init.status", value).ok(),
        _ => None,
    };

    Ok(InitPayload {
        status,
        portfolio,
        positions,
        trades,
        analytics,
    })
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
