use crate::config::Config;
use crate::state::{AppState, ServiceStatus};
use crate::utils::fmt_duration;
use crate::web::create_router;
use anyhow::Context;
use sqlx::ConnectOptions;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::net::SocketAddr;
use std::process::ExitCode;
use std::str::FromStr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Main application struct containing all necessary components
pub struct App {
    config: Config,
    app_state: AppState,
}

impl App {
    /// Connect to the database, apply migrations and build the shared state.
    pub async fn new(config: Config) -> Result<Self, anyhow::Error> {
        let slow_threshold = Duration::from_millis(500);

        let connect_options = PgConnectOptions::from_str(&config.database_url)
            .context("Failed to parse database URL")?
            .log_statements(tracing::log::LevelFilter::Debug)
            .log_slow_statements(tracing::log::LevelFilter::Warn, Duration::from_secs(1));

        let db_pool = PgPoolOptions::new()
            .min_connections(0)
            .max_connections(8)
            .acquire_slow_threshold(slow_threshold)
            .acquire_timeout(Duration::from_secs(4))
            .idle_timeout(Duration::from_secs(60 * 2))
            .max_lifetime(Duration::from_secs(60 * 30))
            .connect_with(connect_options)
            .await
            .context("Failed to create database pool")?;

        info!(
            max_connections = 8,
            acquire_timeout = "4s",
            acquire_slow_threshold = fmt_duration(slow_threshold),
            "database pool established"
        );

        info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&db_pool)
            .await
            .context("Failed to run database migrations")?;
        info!("Database migrations completed successfully");

        let app_state = AppState::from_config(&config, db_pool)?;
        app_state
            .service_statuses
            .set("database", ServiceStatus::Connected);

        Ok(App { config, app_state })
    }

    /// Serve until a shutdown signal arrives, then drain within `shutdown_timeout`.
    pub async fn run(self) -> ExitCode {
        let cancel = CancellationToken::new();
        let state = &self.app_state;

        let sweeper = state.rate_limiter.spawn_sweeper(
            self.config.rate_limit_sweep_interval,
            self.config.rate_limit_retention,
            cancel.child_token(),
        );
        let feed = state.change_feed.spawn(
            state.db_pool.clone(),
            state.service_statuses.clone(),
            cancel.child_token(),
        );

        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(error = %e, %addr, "Failed to bind web server");
                cancel.cancel();
                return ExitCode::FAILURE;
            }
        };
        info!(%addr, "web server listening");
        state.service_statuses.set("web", ServiceStatus::Active);

        let router = create_router(self.app_state.clone());
        let server_cancel = cancel.clone();
        let mut server = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { server_cancel.cancelled().await })
                .await
        });

        let early_exit = tokio::select! {
            signal = wait_for_signal() => {
                info!(signal, "shutdown signal received");
                None
            }
            result = &mut server => Some(result),
        };
        cancel.cancel();

        if let Some(result) = early_exit {
            match result {
                Ok(Ok(())) => warn!("web server stopped unexpectedly"),
                Ok(Err(e)) => error!(error = %e, "web server failed"),
                Err(e) => error!(error = %e, "web server task panicked"),
            }
            return ExitCode::FAILURE;
        }

        let timeout = self.config.shutdown_timeout;
        let drain = async {
            if let Ok(Err(e)) = server.await {
                warn!(error = %e, "web server error during shutdown");
            }
            let _ = tokio::join!(sweeper, feed);
        };

        match tokio::time::timeout(timeout, drain).await {
            Ok(()) => {
                info!("graceful shutdown complete");
                ExitCode::SUCCESS
            }
            Err(_) => {
                warn!(
                    timeout = fmt_duration(timeout),
                    "graceful shutdown timed out, exiting"
                );
                ExitCode::FAILURE
            }
        }
    }
}

async fn wait_for_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => tokio::select! {
                _ = tokio::signal::ctrl_c() => "SIGINT",
                _ = sigterm.recv() => "SIGTERM",
            },
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable, listening for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
                "SIGINT"
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        "SIGINT"
    }
}
