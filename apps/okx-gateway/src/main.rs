//! OKX Gateway Binary
//!
//! Connects to OKX and logs every normalized event.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin okx-gateway
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `OKX_API_KEY`, `OKX_SECRET_KEY`, `OKX_PASSPHRASE`: API credentials
//!
//! ## Optional
//! - `OKX_SERVER`: REAL | TEST (default: REAL)
//! - `OKX_PROXY_HOST`, `OKX_PROXY_PORT`: HTTP proxy for REST
//! - `OKX_GATEWAY_NAME`: name stamped on events (default: OKX)
//! - `OKX_METRICS_PORT`: Prometheus metrics port (default: 0, no listener)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint
//! - `OTEL_SERVICE_NAME`: Service name (default: okx-gateway)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use okx_gateway::infrastructure::telemetry;
use okx_gateway::{
    ChannelEventSink, EventSink, GatewayConfig, GatewayEvent, LogLevel, OkxGateway, init_metrics,
};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Keep-alive timer period.
const TIMER_PERIOD: Duration = Duration::from_secs(1);

/// Time allowed for the gateway to close.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting OKX Gateway");

    let config = GatewayConfig::from_env().context("failed to load configuration")?;
    log_config(&config);

    init_metrics(config.ports.metrics_port).context("failed to start metrics exporter")?;

    let shutdown_token = CancellationToken::new();

    let (sink, events_rx) = ChannelEventSink::channel();
    let gateway = Arc::new(
        OkxGateway::from_config(&config, Arc::new(sink) as Arc<dyn EventSink>)
            .context("failed to build gateway")?,
    );

    let consumer = tokio::spawn(consume_events(events_rx));

    gateway.connect();

    let timer_gateway = Arc::clone(&gateway);
    let timer_shutdown = shutdown_token.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(TIMER_PERIOD);
        loop {
            tokio::select! {
                () = timer_shutdown.cancelled() => break,
                _ = ticker.tick() => timer_gateway.on_timer(Instant::now()),
            }
        }
    });

    tracing::info!("Gateway ready");

    await_shutdown(shutdown_token)
        .await
        .context("failed to listen for shutdown signals")?;

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, gateway.close())
        .await
        .is_err()
    {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Gateway did not close in time"
        );
    }
    drop(gateway);
    consumer.abort();

    tracing::info!("Gateway stopped");
    Ok(())
}

/// Log every event the gateway emits.
async fn consume_events(mut rx: mpsc::UnboundedReceiver<GatewayEvent>) {
    while let Some(event) = rx.recv().await {
        match &event {
            GatewayEvent::Log(record) => match record.level {
                LogLevel::Info => tracing::info!(gateway = %record.gateway_name, "{}", record.msg),
                LogLevel::Warn => tracing::warn!(gateway = %record.gateway_name, "{}", record.msg),
                LogLevel::Error => {
                    tracing::error!(gateway = %record.gateway_name, "{}", record.msg);
                }
            },
            GatewayEvent::Order(order) => tracing::info!(
                order_id = %order.vt_orderid(),
                symbol = %order.symbol,
                status = ?order.status,
                traded = %order.traded,
                "Order"
            ),
            GatewayEvent::Trade(trade) => tracing::info!(
                trade_id = %trade.vt_tradeid(),
                order_id = %trade.order_id,
                price = %trade.price,
                volume = %trade.volume,
                "Trade"
            ),
            other => tracing::debug!(kind = other.kind(), "Event"),
        }
    }
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &GatewayConfig) {
    tracing::info!(
        gateway = %config.gateway_name,
        server = config.server.as_str(),
        proxy = config.proxy.is_some(),
        metrics_port = config.ports.metrics_port,
        rest_concurrency = config.rest.concurrency,
        "Configuration loaded"
    );
    tracing::debug!(
        public = config.server.public_ws_url(),
        private = config.server.private_ws_url(),
        business = config.server.business_ws_url(),
        rest = config.server.rest_host(),
        "Endpoints"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown(shutdown_token: CancellationToken) -> std::io::Result<()> {
    #[cfg(unix)]
    let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    #[cfg(unix)]
    let terminate = async move {
        terminate.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = signal::ctrl_c() => {
            result?;
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
    Ok(())
}
