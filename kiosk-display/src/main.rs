//! Kiosk display renderer (kiosk-display) - Main entry point
//!
//! Runs one screen: watches its asset for changes, plays video through the
//! loop choreography and applies overlays pushed over the WebSocket channel.
//! The HTTP API exposes the current scene and a live event stream.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use kiosk_common::events::EventBus;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kiosk_display::api::{self, AppState};
use kiosk_display::config::{Args, DisplayConfig};
use kiosk_display::freshness::HttpHeadProbe;
use kiosk_display::playback::RemoteMediaElement;
use kiosk_display::renderer::{DisplayRenderer, RendererDeps};

/// Events retained for slow SSE subscribers
const EVENT_BUS_CAPACITY: usize = 256;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = DisplayConfig::load(&args).context("Failed to load configuration")?;

    let level = config.logging.level.as_str();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("kiosk_display={level},kiosk_common={level},tower_http=info").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        screen = %config.screen,
        asset_url = %config.asset_url,
        "Starting kiosk display on port {}",
        config.port
    );
    match &config.push_url {
        Some(url) => info!("Overlay push channel: {}", url),
        None => info!("No push channel configured, overlays disabled"),
    }

    let bus = EventBus::new(EVENT_BUS_CAPACITY);
    let cancel = CancellationToken::new();

    let tools = Arc::new(config.ffmpeg_tools());
    let deps = RendererDeps {
        resolver: Arc::new(config.resolver()?),
        probe: Arc::new(
            HttpHeadProbe::new(config.probe_timeout()).context("Failed to build HTTP client")?,
        ),
        inspector: tools.clone(),
        capture: tools,
        element: Arc::new(RemoteMediaElement::new(bus.clone())),
    };

    let (renderer, handle) =
        DisplayRenderer::new(config.renderer_settings()?, deps, bus, cancel.clone())
            .context("Failed to initialize renderer")?;
    let renderer_task = tokio::spawn(renderer.run());

    let app = api::create_router(AppState {
        renderer: handle,
        port: config.port,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    let shutdown = cancel.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = shutdown_signal() => {}
                _ = shutdown.cancelled() => {}
            }
            shutdown.cancel();
        })
        .await
        .context("Server error");

    cancel.cancel();
    if let Err(e) = renderer_task.await {
        warn!("Renderer task ended abnormally: {}", e);
    }

    served?;
    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
