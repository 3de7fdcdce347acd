// SPDX-FileCopyrightText: 2025 blinry <mail@blinry.org>
// SPDX-FileCopyrightText: 2025 zormit <nt4u@kpvn.de>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use anyhow::{Context, Result};
use clap::Parser;
use collabtext::{config::Config, logging, persistence::PersistenceHandle, registry::Registry, server};
use tokio::signal;
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_panic(info);
        std::process::exit(1);
    }));

    let config = Config::parse();
    logging::initialize();

    let persistence = match config.database_url() {
        Some(url) => {
            info!("connecting to database");
            let pool = sqlx::postgres::PgPoolOptions::new()
                .connect(&url)
                .await
                .context("Failed to connect to database")?;
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("Failed to run database migrations")?;
            PersistenceHandle::postgres(pool, config.debounce_window())
        }
        None => {
            warn!("no DB_HOST configured, falling back to the in-process store");
            PersistenceHandle::in_memory(config.debounce_window())
        }
    };

    let registry = Registry::with_expiry_and_history_limit(
        persistence.clone(),
        config.room_expiry(),
        config.history_size,
    );
    let app = server::router(registry);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("Failed to bind to port {}", config.port))?;
    info!(port = config.port, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown())
        .await
        .context("Server error")?;

    info!("flushing pending writes before exit");
    persistence.flush_all().await;

    Ok(())
}

async fn wait_for_shutdown() {
    let mut signal_terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("Should have been able to create terminate signal stream");
    tokio::select! {
        _ = signal::ctrl_c() => {
            debug!("Got SIGINT (Ctrl+C), shutting down");
        }
        _ = signal_terminate.recv() => {
            debug!("Got SIGTERM, shutting down");
        }
    }
}
