//! REST collaborators of the dashboard backend and the polling fallback used
//! while the push channel is down.

use crate::error::{DecodeError, SyncError};
use crate::shared::store::{SharedStore, Slices};
use crate::shared::types::{
    AnalyticsRecord, AnalyticsUpdate, BotStatus, InboundMessage, Position, decode_list,
    decode_object,
};
use crate::shared::websocket::ConnectionStatus;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use url::Url;

/// Per-request timeout for every REST call
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default polling interval of the fallback poller
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

const STATUS_PATH: &str = "api/status";
const PAPER_RESET_PATH: &str = "api/paper/reset";
const ANALYTICS_PATH: &str = "api/analytics";
const POSITIONS_PATH: &str = "api/positions";

/// Thin reqwest wrapper around the backend HTTP API
#[derive(Debug, Clone)]
pub struct RestClient {
    base: Url,
    http: reqwest::Client,
}

impl RestClient {
    pub fn new(base: Url) -> Self {
        Self {
            base,
            http: reqwest::Client::new(),
        }
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// `GET status` → `{ok, status: {mode, interval, pricesIntervalSeconds}}`
    pub async fn status(&self) -> Result<BotStatus, SyncError> {
        let body = self.get_json(STATUS_PATH).await?;
        parse_status(body)
    }

    /// `POST paper-reset` → `{ok}`
    pub async fn paper_reset(&self) -> Result<(), SyncError> {
        let url = endpoint_url(&self.base, PAPER_RESET_PATH)?;
        let response = self
            .http
            .post(url.clone())
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;
        let body: Value = response.json().await?;

        if body.get("ok").and_then(Value::as_bool) == Some(true) {
            info!(%url, "paper portfolio reset");
            Ok(())
        } else {
            Err(SyncError::Http(format!("{url} rejected the reset: {body}")))
        }
    }

    /// `GET analytics` → `{analytics: AnalyticsRecord[]}`
    pub async fn analytics(&self) -> Result<Vec<AnalyticsRecord>, SyncError> {
        let body = self.get_json(ANALYTICS_PATH).await?;
        parse_collection("analytics", body)
    }

    /// `GET positions` → `{positions: Position[]}`
    pub async fn positions(&self) -> Result<Vec<Position>, SyncError> {
        let body = self.get_json(POSITIONS_PATH).await?;
        parse_collection("positions", body)
    }

    async fn get_json(&self, path: &str) -> Result<Value, SyncError> {
        let url = endpoint_url(&self.base, path)?;
        debug!(%url, "GET");

        let response = self
            .http
            .get(url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }
}

/// Join `path` onto `base`, treating the base path as a directory.
pub fn endpoint_url(base: &Url, path: &str) -> Result<Url, SyncError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let directory = format!("{}/", base.path());
        base.set_path(&directory);
    }
    Ok(base.join(path.trim_start_matches('/'))?)
}

/// Accepts either the `{ok, status}` wrapper or a bare status object.
pub fn parse_status(body: Value) -> Result<BotStatus, SyncError> {
    let status = match body {
        Value::Object(mut fields) if fields.get("status").is_some_and(Value::is_object) => {
            fields.remove("status").unwrap_or_default()
        }
        other => other,
    };
    Ok(decode_object("status", status)?)
}

/// Accepts either `{<key>: [...]}` or a bare array.
pub fn parse_collection<T>(key: &str, body: Value) -> Result<Vec<T>, SyncError>
where
    T: DeserializeOwned,
{
    let items = match body {
        Value::Array(items) => Value::Array(items),
        Value::Object(mut fields) => fields.remove(key).ok_or_else(|| DecodeError::Payload {
            kind: key.to_string(),
            reason: format!("response has no `{key}` field"),
        })?,
        other => other,
    };
    Ok(decode_list(key, items)?)
}

/// Fetch analytics, positions and bot status once and apply them to the store
/// through the regular bulk-replace path.
pub async fn poll_once(store: &SharedStore, client: &RestClient) -> Slices {
    let (analytics, positions, status) =
        tokio::join!(client.analytics(), client.positions(), client.status());

    let mut changed = Slices::NONE;

    match analytics {
        Ok(records) => {
            let applied = store
                .lock()
                .apply(InboundMessage::Analytics(AnalyticsUpdate::Bulk(records)));
            changed = changed.union(applied);
        }
        Err(error) => warn!(%error, transient = error.is_transient(), "analytics poll failed"),
    }

    match positions {
        Ok(positions) => {
            let applied = store.lock().apply(InboundMessage::Positions(positions));
            changed = changed.union(applied);
        }
        Err(error) => warn!(%error, transient = error.is_transient(), "positions poll failed"),
    }

    match status {
        Ok(status) => {
            changed.status = store.lock().set_bot_status(status);
        }
        Err(error) => debug!(%error, "status poll failed"),
    }

    changed
}

/// Poll the REST API while the push channel is not `open`.
///
/// Stops once `shutdown` flips to `true` or its sender is dropped.
pub fn spawn_polling_fallback(
    store: SharedStore,
    client: RestClient,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(base = %client.base(), ?interval, "starting polling fallback");

        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = timer.tick() => {}
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            let connection = store.lock().connection_status();
            if connection == ConnectionStatus::Open {
                continue;
            }

            let changed = poll_once(&store, &client).await;
            debug!(%connection, ?changed, "polled REST fallback");
        }

        info!("polling fallback stopped");
    })
}
