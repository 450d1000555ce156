//! Startup helpers for the chemistry assistant server.
//!
//! Wires together tracing, environment configuration, the session
//! sweeper, and the HTTP server.

use std::process::ExitCode;

use crate::chat::SessionSweeper;
use crate::server::{self, AppState};

/// Environment variable overriding the listen port.
const PORT_ENV: &str = "RASAYAN_PORT";

/// Run the server (used by the `rasayan-server` binary).
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting রসায়ন সহায়িকা v{}", env!("CARGO_PKG_VERSION"));

    let state = match AppState::new() {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to create state: {e}");
            return ExitCode::from(1);
        }
    };

    let port = get_port();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    let served = rt.block_on(async {
        let sweeper = SessionSweeper::new(state.chat.store());
        let shutdown = sweeper.shutdown_notifier();
        let sweeper_handle = sweeper.spawn();

        let result = server::run_server_with_shutdown(state, port, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("Ctrl+C handler failed: {e}");
            }
        })
        .await;

        shutdown.notify_one();
        let _ = sweeper_handle.await;
        result
    });

    if let Err(e) = served {
        tracing::error!("Server error: {e}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

/// Get configured server port.
#[must_use]
pub fn get_port() -> u16 {
    std::env::var(PORT_ENV)
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(server::DEFAULT_PORT)
}
