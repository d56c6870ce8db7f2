//! Realtime hub server binary.
//!
//! Wires the in-process adapters together and serves the WebSocket hub and
//! the internal HTTP endpoints.

use std::error::Error;
use std::io;
use std::sync::Arc;

use axum::Router;
use secrecy::SecretString;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use realtime_hub::adapters::auth::StaticIdentityResolver;
use realtime_hub::adapters::events::InMemoryEventBus;
use realtime_hub::adapters::http::{hub_http_routes, HubHttpState};
use realtime_hub::adapters::registry::InMemoryConnectionRegistry;
use realtime_hub::adapters::websocket::{websocket_router, WebSocketState, WebSocketTransport};
use realtime_hub::application::{ConnectionLifecycle, EventRouter, MessageBusHub};
use realtime_hub::config::{AppConfig, LogFormat};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = AppConfig::load()?;
    init_tracing(&config)?;
    config.validate()?;

    let addr = config.server.socket_addr()?;
    let app = build_app(&config)?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        %addr,
        hub_path = %config.hub.path,
        environment = ?config.server.environment,
        "Realtime hub listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Realtime hub stopped");
    Ok(())
}

fn init_tracing(config: &AppConfig) -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.server.log_level))?;

    match config.server.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stdout).json())
            .try_init()?,
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stdout).pretty())
            .try_init()?,
    }
    Ok(())
}

fn build_app(config: &AppConfig) -> Result<Router, Box<dyn Error>> {
    let registry = Arc::new(InMemoryConnectionRegistry::new());
    let transport = Arc::new(WebSocketTransport::new(config.hub.outbound_buffer));
    let bus = Arc::new(InMemoryEventBus::new());

    let identity = match &config.auth.identities_file {
        Some(path) => StaticIdentityResolver::from_json_file(path)?,
        None => {
            warn!("No identities file configured; every client will be rejected");
            StaticIdentityResolver::new()
        }
    };

    let hub = MessageBusHub::new_shared(EventRouter::new(registry.clone(), transport.clone()));
    hub.register(bus.as_ref());

    let lifecycle = Arc::new(ConnectionLifecycle::new(registry.clone(), transport.clone()));
    let ws_state = WebSocketState::new(transport, lifecycle, Arc::new(identity));

    let mut http_state = HubHttpState::new(bus, registry);
    if let Some(token) = &config.hub.publish_token {
        http_state = http_state.with_publish_token(SecretString::new(token.clone()));
    }

    Ok(Router::new()
        .merge(websocket_router(&config.hub.path).with_state(ws_state))
        .merge(hub_http_routes(&config.hub.publish_path, http_state))
        .layer(TraceLayer::new_for_http()))
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, shutting down gracefully");
        },
        _ = terminate => {
            warn!("Received terminate signal, shutting down gracefully");
        },
    }
}
