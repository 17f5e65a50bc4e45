use dashboard_sync::{
    AnalyticsEngine, ChartOutput, DashboardConfig, DisplayZone, LiveStore, RestClient,
    StoreSnapshot, WebSocketClient, logging::init_logging, shared::coerce::format_timestamp,
    spawn_polling_fallback,
};
use itertools::Itertools;
use tracing::{debug, info, warn};

/// Headless dashboard consumer: keeps the live store in sync and logs a
/// summary every time it changes.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install rustls crypto provider before any TLS connections (REST + WSS)
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        debug!("rustls crypto provider already installed");
    }

    init_logging();

    let config = DashboardConfig::from_env()?;
    let websocket = config.websocket_config()?;
    info!(
        ws = %websocket.url,
        api = %config.api_url,
        poll = ?config.poll_interval,
        "starting dashboard monitor"
    );

    let store = LiveStore::shared();
    let mut changes = store.lock().subscribe();

    let mut client = WebSocketClient::new(websocket, store.clone());
    let handle = client.connect();

    let poller = spawn_polling_fallback(
        store.clone(),
        RestClient::new(config.api_url.clone()),
        config.poll_interval,
        handle.shutdown_signal(),
    );

    let mut engine = AnalyticsEngine::with_default_charts(config.scatter_cap);
    let ids: Vec<String> = engine.chart_ids().map(str::to_string).collect();
    for id in &ids {
        engine.set_visible(id, true);
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                if let Err(error) = result {
                    warn!(%error, "failed to listen for ctrl-c");
                }
                break;
            }
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        // Clone under a short lock, compute without it
        let snapshot = store.lock().snapshot();
        let recomputed = engine.refresh_snapshot(&snapshot);

        log_summary(&snapshot, &config.display_zone);
        if !recomputed.is_empty() {
            log_charts(&engine, &recomputed);
        }
    }

    info!("shutting down dashboard monitor");
    handle.shutdown();
    if let Err(error) = poller.await {
        warn!(%error, "polling fallback task failed");
    }

    Ok(())
}

fn log_summary(snapshot: &StoreSnapshot, zone: &DisplayZone) {
    let portfolio = snapshot.portfolio.as_ref();
    let updated = portfolio
        .and_then(|portfolio| portfolio.updated_at)
        .map(|time| format_timestamp(time, zone))
        .unwrap_or_default();

    let active = snapshot
        .positions
        .iter()
        .filter(|position| position.phase.is_active())
        .count();
    let moves = snapshot
        .positions
        .iter()
        .filter_map(|position| {
            position
                .last_direction
                .map(|direction| format!("{}{}", position.symbol, direction.arrow()))
        })
        .join(" ");

    info!(
        connection = %snapshot.connection,
        equity = ?portfolio.and_then(|portfolio| portfolio.equity),
        win_rate = ?portfolio.and_then(|portfolio| portfolio.win_rate),
        updated = %updated,
        positions = snapshot.positions.len(),
        active,
        moves = %moves,
        trades = snapshot.trades.len(),
        analytics = snapshot.analytics.len(),
        revision = snapshot.revisions.total(),
        "store updated"
    );
}

fn log_charts(engine: &AnalyticsEngine, recomputed: &[String]) {
    let summary = recomputed
        .iter()
        .filter_map(|id| engine.output(id).map(|output| (id, output)))
        .map(|(id, output)| format!("{id}={}", describe(output)))
        .join(", ");

    info!(charts = %summary, "charts recomputed");
}

fn describe(output: &ChartOutput) -> String {
    match output {
        ChartOutput::Histogram(histogram) => format!("{} samples", histogram.total()),
        ChartOutput::Calibration(buckets) => format!("{} buckets", buckets.len()),
        ChartOutput::ScoreBuckets(buckets) => format!("{} buckets", buckets.len()),
        ChartOutput::Heatmap(heatmap) => match heatmap.best {
            Some((y, x)) => format!("best cell ({x}, {y})"),
            None => "no notable cell".to_string(),
        },
        ChartOutput::Scatter(series) => format!("{}/{} points", series.points.len(), series.total),
    }
}
