use anyhow::Result;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tokio_tungstenite::accept_async;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod auth;
pub mod config;
pub mod context;
pub mod db;
pub mod delivery;
pub mod error;
pub mod handlers;
pub mod health;
pub mod message;
pub mod metrics;
pub mod registry;
pub mod routes;
pub mod store;
pub mod sync;

use auth::AuthManager;
use config::Config;
use context::AppContext;
use delivery::DeliveryCoordinator;
use handlers::handle_websocket;
use registry::ConnectionRegistry;
use store::PgMessageStore;

/// Accept loop for live connections. Each connection runs as its own task;
/// the registry and the store are the only shared state.
pub async fn run_websocket_server(app_context: AppContext, listener: TcpListener) {
    loop {
        let (socket, addr) = match listener.accept().await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Failed to accept socket: {}", e);
                continue;
            }
        };

        let ctx = app_context.clone();

        tokio::spawn(async move {
            if let Ok(ws_stream) = accept_async(socket).await {
                handle_websocket(ws_stream, addr, ctx).await;
            }
        });
    }
}

/// REST server: history retrieval, durable send, auth/user routes, health
/// and metrics.
pub async fn run_rest_server(app_context: AppContext, listener: TcpListener) -> Result<()> {
    let router = routes::create_router(Arc::new(app_context));
    axum::serve(listener, router).await?;
    Ok(())
}

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    let app_config = Arc::new(config);

    // Connect to database
    let db_pool = Arc::new(db::create_pool(&app_config.database_url).await?);
    tracing::info!("Connected to database");

    // Apply database migrations
    tracing::info!("Applying database migrations...");
    sqlx::migrate!().run(&*db_pool).await?;
    tracing::info!("Database migrations applied successfully.");

    let store = Arc::new(PgMessageStore::new(db_pool.clone()));
    let registry = Arc::new(ConnectionRegistry::new());
    let delivery = Arc::new(DeliveryCoordinator::new(store.clone(), registry.clone()));
    let auth_manager = Arc::new(AuthManager::new(&app_config));

    let app_context = AppContext::new(
        db_pool,
        store,
        registry,
        delivery,
        auth_manager,
        app_config.clone(),
    );

    // Websocket listener (live connections)
    let ws_addr = format!("0.0.0.0:{}", app_config.port);
    let ws_listener = TcpListener::bind(&ws_addr).await?;
    tracing::info!("Tether server listening on {} (WebSocket)", ws_addr);

    // REST listener (history, auth, health, metrics)
    let http_addr = format!("0.0.0.0:{}", app_config.http_port);
    let http_listener = TcpListener::bind(&http_addr).await?;
    tracing::info!("REST server listening on http://{}", http_addr);

    let websocket_server = run_websocket_server(app_context.clone(), ws_listener);
    let rest_server = run_rest_server(app_context, http_listener);

    tokio::select! {
        _ = websocket_server => {
            tracing::info!("WebSocket server shut down.");
        },
        res = rest_server => {
            if let Err(e) = res {
                tracing::error!("REST server failed: {}", e);
            }
        },
        _ = signal::ctrl_c() => {
            tracing::info!("Shutdown signal received. Shutting down...");
        }
    }

    Ok(())
}
