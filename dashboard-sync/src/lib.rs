/// Dashboard Sync - Shared Library
///
/// Real-time state synchronisation for the trading bot monitoring dashboard:
/// - Lenient coercion of backend numbers and timestamps
/// - Typed push-channel message taxonomy and entities
/// - Live state store with per-slice revisions
/// - WebSocket transport with fixed-delay reconnect and REST polling fallback
/// - On-demand derived views and the analytics aggregation engine
pub mod config;
pub mod error;
pub mod logging;
pub mod shared;

// Re-export commonly used types for convenience
pub use shared::types::{
    AnalyticsRecord, AnalyticsUpdate, BotStatus, Direction, InboundMessage, OutboundMessage,
    Phase, PortfolioSnapshot, Position, Side, Trade,
};

pub use shared::store::{LiveStore, SharedStore, SliceRevisions, Slices, StoreSnapshot};

pub use shared::websocket::ConnectionStatus;
pub use shared::websocket::{ConnectionHandle, WebSocketClient, WebSocketConfig, derive_endpoint};

pub use shared::rest::{RestClient, spawn_polling_fallback};

pub use shared::coerce::{DisplayZone, to_iso_timestamp, to_number_or_null};

pub use shared::derived::{PositionDetails, best_analytics_for, originating_buy_trade, percent_change};

pub use shared::analytics::{AnalyticsEngine, ChartOutput, ChartSpec};

pub use config::DashboardConfig;
pub use error::{DecodeError, SyncError};
