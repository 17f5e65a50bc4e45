//! Runtime configuration loaded from environment variables.

use crate::error::SyncError;
use crate::shared::analytics::lttb::DEFAULT_SCATTER_CAP;
use crate::shared::coerce::DisplayZone;
use crate::shared::rest::DEFAULT_POLL_INTERVAL;
use crate::shared::websocket::{
    DEFAULT_PING_INTERVAL, DEFAULT_RECONNECT_DELAY, DEFAULT_WS_PATH, WebSocketConfig,
    derive_endpoint,
};
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

pub const DEFAULT_PAGE_URL: &str = "http://127.0.0.1:8000";

/// Dashboard connection and rendering settings
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardConfig {
    /// Address the dashboard is served from (`DASHBOARD_PAGE_URL`)
    pub page_url: Url,
    /// Push channel override, `host[:port]` or a full ws URL (`DASHBOARD_WS_URL`)
    pub ws_override: Option<String>,
    /// Push channel path (`DASHBOARD_WS_PATH`)
    pub ws_path: String,
    /// REST base address (`DASHBOARD_API_URL`), defaults to the page address
    pub api_url: Url,
    /// `RECONNECT_DELAY_MS`
    pub reconnect_delay: Duration,
    /// `PING_INTERVAL_SECS`
    pub ping_interval: Duration,
    /// `POLL_INTERVAL_SECS`
    pub poll_interval: Duration,
    /// `DISPLAY_TZ`
    pub display_zone: DisplayZone,
    /// `SCATTER_CAP`
    pub scatter_cap: usize,
}

impl DashboardConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, SyncError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary key lookup; unset or blank keys take their default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SyncError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let page_url = parse_url(
            "DASHBOARD_PAGE_URL",
            get("DASHBOARD_PAGE_URL").as_deref().unwrap_or(DEFAULT_PAGE_URL),
        )?;
        let api_url = match get("DASHBOARD_API_URL") {
            Some(raw) => parse_url("DASHBOARD_API_URL", &raw)?,
            None => page_url.clone(),
        };

        let config = Self {
            page_url,
            api_url,
            ws_override: get("DASHBOARD_WS_URL"),
            ws_path: get("DASHBOARD_WS_PATH").unwrap_or_else(|| DEFAULT_WS_PATH.to_string()),
            reconnect_delay: Duration::from_millis(parse_or(
                "RECONNECT_DELAY_MS",
                get("RECONNECT_DELAY_MS"),
                DEFAULT_RECONNECT_DELAY.as_millis() as u64,
            )?),
            ping_interval: Duration::from_secs(parse_or(
                "PING_INTERVAL_SECS",
                get("PING_INTERVAL_SECS"),
                DEFAULT_PING_INTERVAL.as_secs(),
            )?),
            poll_interval: Duration::from_secs(parse_or(
                "POLL_INTERVAL_SECS",
                get("POLL_INTERVAL_SECS"),
                DEFAULT_POLL_INTERVAL.as_secs(),
            )?),
            display_zone: get("DISPLAY_TZ")
                .map(|name| DisplayZone::cached(&name))
                .unwrap_or_default(),
            scatter_cap: parse_or("SCATTER_CAP", get("SCATTER_CAP"), DEFAULT_SCATTER_CAP)?,
        };

        config.validate()
    }

    /// Set page URL
    pub fn with_page_url(mut self, page_url: Url) -> Self {
        self.page_url = page_url;
        self
    }

    /// Set push channel override
    pub fn with_ws_override(mut self, endpoint: impl Into<String>) -> Self {
        self.ws_override = Some(endpoint.into());
        self
    }

    /// Set REST base URL
    pub fn with_api_url(mut self, api_url: Url) -> Self {
        self.api_url = api_url;
        self
    }

    /// Set reconnect delay
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set polling fallback interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set display time zone
    pub fn with_display_zone(mut self, zone: DisplayZone) -> Self {
        self.display_zone = zone;
        self
    }

    /// Resolved push channel endpoint
    pub fn websocket_url(&self) -> Result<Url, SyncError> {
        derive_endpoint(&self.page_url, self.ws_override.as_deref(), &self.ws_path)
    }

    pub fn websocket_config(&self) -> Result<WebSocketConfig, SyncError> {
        Ok(WebSocketConfig::new(self.websocket_url()?.to_string())
            .with_ping_interval(self.ping_interval)
            .with_reconnect_delay(self.reconnect_delay))
    }

    fn validate(self) -> Result<Self, SyncError> {
        let non_zero = [
            ("RECONNECT_DELAY_MS", self.reconnect_delay),
            ("PING_INTERVAL_SECS", self.ping_interval),
            ("POLL_INTERVAL_SECS", self.poll_interval),
        ];
        if let Some((key, _)) = non_zero.iter().find(|(_, value)| value.is_zero()) {
            return Err(config_error(key, "must be greater than zero"));
        }

        self.websocket_url()?;
        Ok(self)
    }
}

fn parse_url(key: &str, raw: &str) -> Result<Url, SyncError> {
    Url::parse(raw).map_err(|error| config_error(key, error))
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> Result<T, SyncError>
where
    T: FromStr,
    T::Err: Display,
{
    match raw {
        Some(raw) => raw
            .parse()
            .map_err(|error| config_error(key, format!("`{raw}`: {error}"))),
        None => Ok(default),
    }
}

fn config_error(key: &str, reason: impl Display) -> SyncError {
    SyncError::Config {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
