mod api;
mod bridge_sink;
mod config;
mod controller;
mod descriptor;
mod events;
mod idle_timer;
mod links;
mod models;
mod openapi;
mod playback_sink;
mod queue;
mod resolver;
mod sessions;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use actix_web::{App, HttpServer, middleware::Logger, web};
use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::bridge_sink::BridgeSink;
use crate::events::EventBus;
use crate::resolver::Resolver;
use crate::resolver::spotify::SpotifyClient;
use crate::resolver::ytdlp::YtDlpBackend;
use crate::sessions::SessionRegistry;
use crate::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "audio-queue-server", version = concat!(env!("GIT_SHA"), " ", env!("BUILD_DATE")))]
struct Args {
    /// HTTP bind address, e.g. 0.0.0.0:8080
    #[arg(long)]
    bind: Option<std::net::SocketAddr>,

    /// Server config file (TOML); defaults to config.toml next to the executable
    #[arg(long)]
    config: Option<PathBuf>,
}

fn load_config(path: Option<&PathBuf>) -> Result<config::ServerConfig> {
    if let Some(path) = path {
        return config::ServerConfig::load(path);
    }
    let auto_path = std::env::current_exe()
        .ok()
        .and_then(|path| path.parent().map(|dir| dir.join("config.toml")))
        .filter(|path| path.exists())
        .ok_or_else(|| anyhow::anyhow!("config file is required; use --config"))?;
    config::ServerConfig::load(&auto_path)
}

#[actix_web::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,actix_web=info,audio_queue_server=info")),
        )
        .init();

    let cfg = load_config(args.config.as_ref())?;
    let bind = match args.bind {
        Some(addr) => addr,
        None => config::bind_from_config(&cfg)?,
    };
    let bridges = config::bridges_from_config(&cfg)?;
    if bridges.is_empty() {
        tracing::warn!("no configured bridges; no playback sessions will be available");
    }
    tracing::info!(
        bind = %bind,
        sessions = ?bridges.iter().map(|b| b.id.clone()).collect::<Vec<_>>(),
        "starting audio-queue-server"
    );

    let credentials = config::spotify_credentials_from_config(&cfg);
    if credentials.is_none() {
        tracing::info!("no Spotify API credentials; playlists are read from public pages");
    }
    let spotify = SpotifyClient::new(credentials).context("build Spotify client")?;
    let backend = YtDlpBackend::new(config::ytdlp_path_from_config(&cfg));
    let resolver = Resolver::new(
        Arc::new(backend),
        config::resolver_settings_from_config(&cfg),
        spotify,
    )?;
    let version = resolver.warm_up().context("extraction backend unavailable")?;
    tracing::info!(version = %version, "extraction backend ready");

    let settings = config::controller_settings_from_config(&cfg);
    let poll_interval = config::poll_interval_from_config(&cfg);
    let mut sessions = SessionRegistry::new(EventBus::new());
    for bridge in &bridges {
        let sink = BridgeSink::new(bridge.id.clone(), bridge.http_addr, poll_interval);
        sessions.add(&bridge.id, &bridge.name, resolver.clone(), Arc::new(sink), settings.clone())?;
    }

    let state = web::Data::new(AppState::new(sessions));
    let app_state = state.clone();
    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(Logger::default().exclude("/health"))
            .service(SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-doc/openapi.json", openapi::ApiDoc::openapi()))
            .configure(api::configure)
    })
    .bind(bind)?
    .run()
    .await?;

    tracing::info!("shutting down sessions");
    state.sessions.shutdown().await;
    Ok(())
}
