//! Live state store shared by every dashboard view.
//!
//! Single source of truth for connection status, portfolio, positions, trades and
//! analytics. Mutation goes exclusively through [`LiveStore::apply`] (plus the
//! connection/status setters used by the transport and REST collaborators); every
//! change bumps per-slice revisions published on a `watch` channel so observers
//! can recompute only what they depend on.

use crate::shared::types::{
    AnalyticsRecord, AnalyticsUpdate, BotStatus, Direction, InboundMessage, InitPayload,
    PortfolioSnapshot, Position, Trade,
};
use crate::shared::websocket::ConnectionStatus;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Most recent trades kept in memory
pub const TRADE_CAP: usize = 200;

/// Most recent (by `evaluatedAt`) analytics records kept in memory
pub const ANALYTICS_CAP: usize = 5000;

/// Store handle shared between the transport, pollers and readers.
///
/// Locks are held only for the synchronous duration of an `apply`/read, never across `.await`.
pub type SharedStore = Arc<Mutex<LiveStore>>;

/// Which slices an operation changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Slices {
    pub connection: bool,
    pub status: bool,
    pub portfolio: bool,
    pub positions: bool,
    pub trades: bool,
    pub analytics: bool,
}

impl Slices {
    pub const NONE: Slices = Slices {
        connection: false,
        status: false,
        portfolio: false,
        positions: false,
        trades: false,
        analytics: false,
    };

    pub fn is_empty(&self) -> bool {
        *self == Slices::NONE
    }

    pub fn union(self, other: Slices) -> Slices {
        Slices {
            connection: self.connection || other.connection,
            status: self.status || other.status,
            portfolio: self.portfolio || other.portfolio,
            positions: self.positions || other.positions,
            trades: self.trades || other.trades,
            analytics: self.analytics || other.analytics,
        }
    }

    fn portfolio() -> Self {
        Slices {
            portfolio: true,
            ..Slices::NONE
        }
    }

    fn positions() -> Self {
        Slices {
            positions: true,
            ..Slices::NONE
        }
    }

    fn trades() -> Self {
        Slices {
            trades: true,
            ..Slices::NONE
        }
    }

    fn analytics() -> Self {
        Slices {
            analytics: true,
            ..Slices::NONE
        }
    }
}

/// Monotonic per-slice change counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SliceRevisions {
    pub connection: u64,
    pub status: u64,
    pub portfolio: u64,
    pub positions: u64,
    pub trades: u64,
    pub analytics: u64,
}

impl SliceRevisions {
    fn bump(&mut self, changed: Slices) {
        let counters = [
            (changed.connection, &mut self.connection),
            (changed.status, &mut self.status),
            (changed.portfolio, &mut self.portfolio),
            (changed.positions, &mut self.positions),
            (changed.trades, &mut self.trades),
            (changed.analytics, &mut self.analytics),
        ];
        for (flag, counter) in counters {
            if flag {
                *counter += 1;
            }
        }
    }

    /// Sum of all counters; changes whenever any slice changes
    pub fn total(&self) -> u64 {
        self.connection + self.status + self.portfolio + self.positions + self.trades + self.analytics
    }
}

/// Owned copy of the store contents handed to UI layers
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    pub connection: ConnectionStatus,
    pub bot_status: Option<BotStatus>,
    pub portfolio: Option<PortfolioSnapshot>,
    pub positions: Vec<Position>,
    pub trades: Vec<Trade>,
    pub analytics: Vec<AnalyticsRecord>,
    pub revisions: SliceRevisions,
}

#[derive(Debug)]
pub struct LiveStore {
    connection: ConnectionStatus,
    bot_status: Option<BotStatus>,
    portfolio: Option<PortfolioSnapshot>,
    positions: Vec<Position>,
    trades: VecDeque<Trade>,
    analytics: Vec<AnalyticsRecord>,
    revisions: SliceRevisions,
    changes: watch::Sender<SliceRevisions>,
}

impl LiveStore {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(SliceRevisions::default());
        Self {
            connection: ConnectionStatus::Closed,
            bot_status: None,
            portfolio: None,
            positions: Vec::new(),
            trades: VecDeque::with_capacity(TRADE_CAP),
            analytics: Vec::new(),
            revisions: SliceRevisions::default(),
            changes,
        }
    }

    /// Wrap a fresh store for sharing across tasks
    pub fn shared() -> SharedStore {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Apply one inbound message and report which slices changed.
    ///
    /// Synchronous and O(n) in the payload size. Never fails: unknown kinds and
    /// backend errors are logged and leave state untouched.
    pub fn apply(&mut self, message: InboundMessage) -> Slices {
        let kind = message.kind().to_string();

        let changed = match message {
            InboundMessage::Init(init) => self.apply_init(*init),
            InboundMessage::Portfolio(portfolio) => {
                self.portfolio = Some(*portfolio);
                Slices::portfolio()
            }
            InboundMessage::Positions(positions) => {
                self.positions = self.enrich_positions(positions);
                Slices::positions()
            }
            InboundMessage::Trades(trades) => {
                self.replace_trades(trades);
                Slices::trades()
            }
            InboundMessage::Trade(trade) => {
                self.prepend_trade(*trade);
                Slices::trades()
            }
            InboundMessage::Analytics(AnalyticsUpdate::Bulk(records)) => {
                self.replace_analytics(records);
                Slices::analytics()
            }
            InboundMessage::Analytics(AnalyticsUpdate::Single(record)) => {
                self.upsert_analytics(*record);
                Slices::analytics()
            }
            InboundMessage::Pong => {
                debug!("keep-alive acknowledged");
                Slices::NONE
            }
            InboundMessage::Error(payload) => {
                warn!(%payload, "backend reported an error");
                Slices::NONE
            }
            InboundMessage::Unknown { kind } => {
                warn!(kind, "ignoring unrecognised message type");
                Slices::NONE
            }
        };

        if !changed.is_empty() {
            debug!(
                kind,
                positions = self.positions.len(),
                trades = self.trades.len(),
                analytics = self.analytics.len(),
                "applied message"
            );
        }

        self.publish(changed);
        changed
    }

    /// Decode and apply a raw text frame. Undecodable frames are logged and dropped.
    pub fn apply_frame(&mut self, text: &str) -> Slices {
        match InboundMessage::decode(text) {
            Ok(message) => self.apply(message),
            Err(error) => {
                debug!(%error, frame = %&text[..floor_char_boundary(text, 120)], "dropping undecodable frame");
                Slices::NONE
            }
        }
    }

    /// Record a transport state transition
    pub fn set_connection_status(&mut self, status: ConnectionStatus) -> bool {
        if self.connection == status {
            return false;
        }
        info!(from = ?self.connection, to = ?status, "connection status changed");
        self.connection = status;
        self.publish(Slices {
            connection: true,
            ..Slices::NONE
        });
        true
    }

    /// Record the bot runtime status (from `init` or `GET status`)
    pub fn set_bot_status(&mut self, status: BotStatus) -> bool {
        if self.bot_status.as_ref() == Some(&status) {
            return false;
        }
        self.bot_status = Some(status);
        self.publish(Slices {
            status: true,
            ..Slices::NONE
        });
        true
    }

    /// Receive the latest revisions whenever any slice changes
    pub fn subscribe(&self) -> watch::Receiver<SliceRevisions> {
        self.changes.subscribe()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.connection
    }

    pub fn bot_status(&self) -> Option<&BotStatus> {
        self.bot_status.as_ref()
    }

    pub fn portfolio(&self) -> Option<&PortfolioSnapshot> {
        self.portfolio.as_ref()
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    /// Newest first
    pub fn trades(&self) -> &VecDeque<Trade> {
        &self.trades
    }

    /// Newest `evaluatedAt` first (upserted records are prepended)
    pub fn analytics(&self) -> &[AnalyticsRecord] {
        &self.analytics
    }

    pub fn revisions(&self) -> SliceRevisions {
        self.revisions
    }

    /// Find a position by token or pair address
    pub fn position_by_address(&self, address: &str) -> Option<&Position> {
        self.positions.iter().find(|position| {
            position.token_address.as_deref() == Some(address)
                || position.pair_address.as_deref() == Some(address)
        })
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            connection: self.connection,
            bot_status: self.bot_status.clone(),
            portfolio: self.portfolio.clone(),
            positions: self.positions.clone(),
            trades: self.trades.iter().cloned().collect(),
            analytics: self.analytics.clone(),
            revisions: self.revisions,
        }
    }

    fn apply_init(&mut self, init: InitPayload) -> Slices {
        let InitPayload {
            status,
            portfolio,
            positions,
            trades,
            analytics,
        } = init;

        let mut changed = Slices {
            portfolio: true,
            positions: true,
            trades: true,
            analytics: true,
            ..Slices::NONE
        };

        if let Some(status) = status {
            if self.bot_status.as_ref() != Some(&status) {
                self.bot_status = Some(status);
                changed.status = true;
            }
        }

        self.portfolio = portfolio;
        self.positions = self.enrich_positions(positions);
        self.replace_trades(trades);
        self.replace_analytics(analytics);

        info!(
            positions = self.positions.len(),
            trades = self.trades.len(),
            analytics = self.analytics.len(),
            has_portfolio = self.portfolio.is_some(),
            "applied init snapshot"
        );

        changed
    }

    /// Derive direction and change % against the *currently stored* positions
    /// (matched by address key), then hand back the enriched batch.
    fn enrich_positions(&self, incoming: Vec<Position>) -> Vec<Position> {
        let previous_prices: HashMap<&str, Option<f64>> = self
            .positions
            .iter()
            .filter_map(|position| position.address_key().map(|key| (key, position.last_price)))
            .collect();

        incoming
            .into_iter()
            .map(|mut position| {
                let previous = position
                    .address_key()
                    .and_then(|key| previous_prices.get(key).copied().flatten());

                position.last_direction = Some(Direction::between(previous, position.last_price));
                position.change_pct = match (position.last_price, position.entry) {
                    (Some(last), Some(entry)) if entry > 0.0 => Some((last - entry) / entry * 100.0),
                    _ => None,
                };
                position
            })
            .collect()
    }

    fn replace_trades(&mut self, trades: Vec<Trade>) {
        self.trades = trades.into_iter().take(TRADE_CAP).collect();
    }

    fn prepend_trade(&mut self, trade: Trade) {
        self.trades.push_front(trade);
        self.trades.truncate(TRADE_CAP);
    }

    fn replace_analytics(&mut self, mut records: Vec<AnalyticsRecord>) {
        // Stable sort, newest first; records without a timestamp sink to the end
        records.sort_by(|a, b| b.evaluated_at.cmp(&a.evaluated_at));
        records.truncate(ANALYTICS_CAP);
        self.analytics = records;
    }

    fn upsert_analytics(&mut self, record: AnalyticsRecord) {
        let existing = record.id.as_deref().and_then(|id| {
            self.analytics
                .iter()
                .position(|stored| stored.id.as_deref() == Some(id))
        });

        match existing {
            Some(index) => self.analytics[index] = record,
            None => {
                self.analytics.insert(0, record);
                self.analytics.truncate(ANALYTICS_CAP);
            }
        }
    }

    fn publish(&mut self, changed: Slices) {
        if changed.is_empty() {
            return;
        }
        self.revisions.bump(changed);
        self.changes.send_replace(self.revisions);
    }
}

impl Default for LiveStore {
    fn default() -> Self {
        Self::new()
    }
}

fn floor_char_boundary(text: &str, max: usize) -> usize {
    if text.len() <= max {
        return text.len();
    }
    (0..=max).rev().find(|i| text.is_char_boundary(*i)).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::types::Side;
    use serde_json::{Value, json};

    fn frame(value: Value) -> String {
        value.to_string()
    }

    fn trade(id: usize) -> Value {
        json!({"id": id, "side": "BUY", "symbol": "PEPE", "price": 1.0, "qty": 1.0})
    }

    fn record(id: &str, evaluated_at: &str) -> Value {
        json!({"id": id, "symbol": "WIF", "evaluatedAt": evaluated_at})
    }

    #[test]
    fn test_init_then_positions_change_pct_without_direction() {
        let mut store = LiveStore::new();

        store.apply_frame(&frame(json!({
            "type": "init",
            "payload": {
                "portfolio": {"equity": 1000},
                "positions": [{"address": "0xA", "entry": 100, "lastPrice": null}],
                "trades": [],
                "analytics": []
            }
        })));

        store.apply_frame(&frame(json!({
            "type": "positions",
            "payload": [{"address": "0xA", "entry": 100, "lastPrice": 110}]
        })));

        let position = &store.positions()[0];
        assert_eq!(position.last_direction, Some(Direction::Flat));
        assert_eq!(position.change_pct, Some(10.0));
    }

    #[test]
    fn test_consecutive_positions_produce_down_direction() {
        let mut store = LiveStore::new();

        store.apply_frame(&frame(json!({
            "type": "positions",
            "payload": [{"address": "0xB", "entry": 80, "lastPrice": 100}]
        })));
        assert_eq!(store.positions()[0].last_direction, Some(Direction::Flat));

        store.apply_frame(&frame(json!({
            "type": "positions",
            "payload": [{"address": "0xB", "entry": 80, "lastPrice": 90}]
        })));

        let position = &store.positions()[0];
        assert_eq!(position.last_direction, Some(Direction::Down));
        assert_eq!(position.change_pct, Some(12.5));
    }

    #[test]
    fn test_direction_matches_by_address_not_batch_order() {
        let mut store = LiveStore::new();

        store.apply_frame(&frame(json!({
            "type": "positions",
            "payload": [
                {"address": "0xA", "entry": 1, "lastPrice": 1.0},
                {"address": "0xB", "entry": 1, "lastPrice": 5.0}
            ]
        })));
        store.apply_frame(&frame(json!({
            "type": "positions",
            "payload": [
                {"address": "0xB", "entry": 1, "lastPrice": 6.0},
                {"address": "0xA", "entry": 1, "lastPrice": 0.5},
                {"address": "0xC", "entry": 1, "lastPrice": 2.0}
            ]
        })));

        let directions: Vec<_> = store
            .positions()
            .iter()
            .map(|p| (p.address_key().unwrap().to_string(), p.last_direction))
            .collect();
        assert_eq!(
            directions,
            vec![
                ("0xB".to_string(), Some(Direction::Up)),
                ("0xA".to_string(), Some(Direction::Down)),
                ("0xC".to_string(), Some(Direction::Flat)),
            ]
        );
    }

    #[test]
    fn test_change_pct_requires_positive_entry() {
        let mut store = LiveStore::new();

        store.apply_frame(&frame(json!({
            "type": "positions",
            "payload": [
                {"address": "0xA", "entry": 0, "lastPrice": 10},
                {"address": "0xB", "entry": null, "lastPrice": 10},
                {"address": "0xC", "entry": 50},
                {"address": "0xD", "entry": "-5", "lastPrice": 10}
            ]
        })));

        assert!(store.positions().iter().all(|p| p.change_pct.is_none()));
    }

    #[test]
    fn test_unknown_type_leaves_state_unchanged() {
        let mut store = LiveStore::new();
        store.apply_frame(&frame(json!({"type": "trade", "payload": trade(1)})));
        let before = store.snapshot();

        let changed = store.apply_frame(&frame(json!({"type": "unknown_type"})));

        assert!(changed.is_empty());
        let after = store.snapshot();
        assert_eq!(after.revisions, before.revisions);
        assert_eq!(after.trades, before.trades);
        assert_eq!(after.positions, before.positions);
        assert_eq!(after.analytics, before.analytics);
        assert_eq!(after.portfolio, before.portfolio);
    }

    #[test]
    fn test_malformed_frames_never_corrupt_state() {
        let mut store = LiveStore::new();
        store.apply_frame(&frame(json!({
            "type": "positions",
            "payload": [{"address": "0xA", "entry": 1}]
        })));

        for bad in [
            "keep-alive",
            "{\"type\":\"positions\",\"payload\":{\"address\":\"0xB\"}}",
            "{\"type\":\"portfolio\",\"payload\":[1,2,3]}",
            "{\"payload\":[]}",
            "{\"type\":\"error\",\"payload\":\"database unavailable\"}",
            "{\"type\":\"pong\"}",
        ] {
            assert!(store.apply_frame(bad).is_empty(), "frame {bad} changed state");
        }

        assert_eq!(store.positions().len(), 1);
        assert!(store.portfolio().is_none());
    }

    #[test]
    fn test_trade_cap_holds_across_events() {
        let mut store = LiveStore::new();

        let bulk: Vec<Value> = (0..250).map(trade).collect();
        store.apply_frame(&frame(json!({"type": "trades", "payload": bulk})));
        assert_eq!(store.trades().len(), TRADE_CAP);

        for id in 1000..1050 {
            store.apply_frame(&frame(json!({"type": "trade", "payload": trade(id)})));
            assert!(store.trades().len() <= TRADE_CAP);
        }

        // Newest stays at the front, oldest evicted
        assert_eq!(store.trades()[0].id.as_deref(), Some("1049"));
        assert_eq!(store.trades()[TRADE_CAP - 1].id.as_deref(), Some("149"));
        assert_eq!(store.trades()[0].side, Side::Buy);
    }

    #[test]
    fn test_analytics_bulk_sorted_and_capped() {
        let mut store = LiveStore::new();

        let mut bulk: Vec<Value> = (0..ANALYTICS_CAP + 10)
            .map(|i| record(&i.to_string(), "2024-01-01T00:00:00Z"))
            .collect();
        bulk.push(record("newest", "2025-01-01T00:00:00Z"));
        bulk.push(json!({"id": "undated"}));

        store.apply_frame(&frame(json!({"type": "analytics", "payload": bulk})));

        assert_eq!(store.analytics().len(), ANALYTICS_CAP);
        assert_eq!(store.analytics()[0].id.as_deref(), Some("newest"));
        assert!(store.analytics().iter().all(|r| r.id.as_deref() != Some("undated")));
    }

    #[test]
    fn test_analytics_single_upsert_and_prepend() {
        let mut store = LiveStore::new();
        store.apply_frame(&frame(json!({
            "type": "analytics",
            "payload": [record("a", "2024-01-02T00:00:00Z"), record("b", "2024-01-01T00:00:00Z")]
        })));

        // Matching id replaces in place
        store.apply_frame(&frame(json!({
            "type": "analytics",
            "payload": {"id": "b", "evaluatedAt": "2024-01-01T00:00:00Z", "outcome": {"hasOutcome": true}}
        })));
        assert_eq!(store.analytics().len(), 2);
        assert_eq!(store.analytics()[1].id.as_deref(), Some("b"));
        assert!(store.analytics()[1].outcome.has_outcome);

        // New id is prepended
        store.apply_frame(&frame(json!({
            "type": "analytics",
            "payload": record("c", "2024-01-03T00:00:00Z")
        })));
        assert_eq!(store.analytics().len(), 3);
        assert_eq!(store.analytics()[0].id.as_deref(), Some("c"));
    }

    #[test]
    fn test_analytics_single_prepend_respects_cap() {
        let mut store = LiveStore::new();
        let bulk: Vec<Value> = (0..ANALYTICS_CAP)
            .map(|i| record(&format!("r{i}"), "2024-01-01T00:00:00Z"))
            .collect();
        store.apply_frame(&frame(json!({"type": "analytics", "payload": bulk})));

        store.apply_frame(&frame(json!({
            "type": "analytics",
            "payload": record("fresh", "2024-06-01T00:00:00Z")
        })));

        assert_eq!(store.analytics().len(), ANALYTICS_CAP);
        assert_eq!(store.analytics()[0].id.as_deref(), Some("fresh"));
        let last_id = format!("r{}", ANALYTICS_CAP - 2);
        assert_eq!(store.analytics()[ANALYTICS_CAP - 1].id.as_deref(), Some(last_id.as_str()));
    }

    #[test]
    fn test_portfolio_replaced_wholesale() {
        let mut store = LiveStore::new();
        store.apply_frame(&frame(json!({
            "type": "portfolio",
            "payload": {"equity": 1000, "cash": 400, "winRate": 0.6}
        })));
        store.apply_frame(&frame(json!({
            "type": "portfolio",
            "payload": {"equity": 1100}
        })));

        let portfolio = store.portfolio().unwrap();
        assert_eq!(portfolio.equity, Some(1100.0));
        assert_eq!(portfolio.cash, None);
        assert_eq!(portfolio.win_rate, None);
    }

    #[test]
    fn test_revisions_published_per_slice() {
        let mut store = LiveStore::new();
        let receiver = store.subscribe();

        store.apply_frame(&frame(json!({"type": "trade", "payload": trade(1)})));
        store.set_connection_status(ConnectionStatus::Connecting);
        // Same status twice is not a change
        assert!(!store.set_connection_status(ConnectionStatus::Connecting));

        let revisions = *receiver.borrow();
        assert_eq!(revisions.trades, 1);
        assert_eq!(revisions.connection, 1);
        assert_eq!(revisions.analytics, 0);
        assert_eq!(revisions, store.revisions());
    }

    #[test]
    fn test_init_replaces_everything() {
        let mut store = LiveStore::new();
        store.apply_frame(&frame(json!({"type": "trade", "payload": trade(1)})));
        store.apply_frame(&frame(json!({
            "type": "analytics",
            "payload": record("old", "2024-01-01T00:00:00Z")
        })));

        let changed = store.apply_frame(&frame(json!({
            "type": "init",
            "payload": {
                "status": {"paperMode": true, "interval": 30},
                "portfolio": {"equity": 5},
                "positions": [],
                "trades": [trade(2), trade(3)],
                "analytics": [record("new", "2024-02-01T00:00:00Z")]
            }
        })));

        assert!(changed.portfolio && changed.positions && changed.trades && changed.analytics);
        assert!(changed.status);
        assert_eq!(store.trades().len(), 2);
        assert_eq!(store.trades()[0].id.as_deref(), Some("2"));
        assert_eq!(store.analytics().len(), 1);
        assert_eq!(store.analytics()[0].id.as_deref(), Some("new"));
        assert_eq!(store.bot_status().and_then(|s| s.interval), Some(30.0));
    }
}
