//! MT4 Bridge Binary
//!
//! Connects to a MetaTrader 4 terminal, logs stream events and serves
//! health/metrics until shutdown.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin mt4-bridge
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `MT4_REQ_URL`: Address of the terminal's REP socket
//! - `MT4_PULL_URL`: Address of the terminal's PUSH socket
//!
//! ## Optional
//! - `MT4_API_KEY`: Key prepended to every request (default: CHANGEME)
//! - `MT4_REQUEST_TIMEOUT_MS`: Reply timeout (default: 15000)
//! - `MT4_QUEUE_DELAY_MS`: Delay before a request is sent (default: 5)
//! - `MT4_DELIMITER_POLICY`: warn | reject (default: warn)
//! - `MT4_BRIDGE_HEALTH_PORT`: Health check HTTP port, 0 disables (default: 8083)
//! - `OTEL_ENABLED`: Enable OpenTelemetry export (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `OTEL_SERVICE_NAME`: Service name (default: mt4-bridge)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use anyhow::Context as _;
use mt4_bridge::infrastructure::telemetry;
use mt4_bridge::{
    BridgeConfig, BridgeEvent, HealthServer, HealthServerState, Mt4Connection, Mt4Terminal,
    Topic, ZmqChannel, init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let _telemetry_guard = telemetry::init().context("failed to initialise telemetry")?;

    tracing::info!("Starting MT4 bridge");

    init_metrics().context("failed to install Prometheus recorder")?;

    let config = BridgeConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let connection = Arc::new(Mt4Connection::new(config.connection.clone()));
    let terminal = Mt4Terminal::new(Arc::clone(&connection));
    register_listeners(&terminal);

    if config.server.health_port == 0 {
        tracing::info!("Health server disabled");
    } else {
        let health_state = Arc::new(HealthServerState::new(
            env!("CARGO_PKG_VERSION").to_string(),
            connection.status(),
        ));
        let health_server = HealthServer::new(
            config.server.health_port,
            health_state,
            shutdown_token.clone(),
        );
        tokio::spawn(async move {
            if let Err(e) = health_server.run().await {
                tracing::error!(error = %e, "Health server error");
            }
        });
    }

    let context = zmq::Context::new();
    connection
        .connect(
            Box::new(ZmqChannel::request(
                &context,
                config.connection.request_timeout,
            )),
            Box::new(ZmqChannel::pull(&context)),
        )
        .context("failed to connect to terminal")?;

    tracing::info!("MT4 bridge ready");

    await_shutdown(shutdown_token).await;

    connection.shutdown().await;
    tracing::info!("MT4 bridge stopped");
    Ok(())
}

/// Log link changes and stream traffic.
fn register_listeners(terminal: &Mt4Terminal) {
    let subscriber = terminal.clone();
    terminal.connection().on(Topic::Connect, move |_| {
        let subscriber = subscriber.clone();
        tokio::spawn(async move {
            if let Err(e) = subscriber.subscribe_account().await {
                tracing::warn!(error = %e, "Account subscription failed");
            }
        });
    });

    terminal.connection().on(Topic::Disconnect, |event| {
        if let BridgeEvent::Disconnected { channel } = event {
            tracing::warn!(channel = %channel, "Terminal link lost");
        }
    });

    terminal.listen_account(|account| {
        tracing::info!(
            currency = %account.currency,
            balance = %account.balance,
            equity = %account.equity,
            "Account update"
        );
    });

    terminal.listen_orders(|orders| {
        tracing::info!(count = orders.len(), "Orders update");
    });

    terminal.listen_prices(|prices| {
        for rate in prices {
            tracing::debug!(symbol = %rate.symbol, bid = %rate.bid, ask = %rate.ask, "Price update");
        }
    });
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
fn log_config(config: &BridgeConfig) {
    tracing::info!(
        request_address = %config.connection.request_address,
        push_address = %config.connection.push_address,
        request_timeout_ms = config.connection.request_timeout.as_millis(),
        queue_delay_ms = config.connection.queue_delay.as_millis(),
        delimiter_policy = config.connection.delimiter_policy.as_str(),
        health_port = config.server.health_port,
        "Configuration loaded"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
