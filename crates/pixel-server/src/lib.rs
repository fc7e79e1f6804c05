use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use pixel_api::middleware::require_api_key;
use pixel_api::pixels;
use pixel_api::{AppState, AppStateInner};
use pixel_db::Database;
use pixel_gateway::connection;
pub use pixel_gateway::connection::SessionConfig;
use pixel_gateway::dispatcher::ChangeFeed;

/// Server settings, read from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub anon_key: String,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the config from any variable source; `from_env` passes the process env.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let anon_key = lookup("PIXEL_ANON_KEY").unwrap_or_default();
        if anon_key.trim().is_empty() {
            bail!("PIXEL_ANON_KEY is unset");
        }

        let host = lookup("PIXEL_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = lookup("PIXEL_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("PIXEL_PORT is not a port number")?;
        let db_path: PathBuf = lookup("PIXEL_DB_PATH")
            .unwrap_or_else(|| "pixels.db".into())
            .into();

        Ok(Self {
            host,
            port,
            db_path,
            anon_key,
        })
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

pub fn build_state(db: Database, anon_key: String) -> AppState {
    build_state_with(db, anon_key, SessionConfig::default())
}

pub fn build_state_with(db: Database, anon_key: String, session: SessionConfig) -> AppState {
    Arc::new(AppStateInner {
        db,
        feed: ChangeFeed::new(),
        anon_key,
        session,
    })
}

/// All routes. Everything except `/health` requires the access key.
pub fn router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/rest/v1/pixels", get(pixels::list_pixels).post(pixels::upsert_pixels))
        .route("/rest/v1/pixels/reset", post(pixels::reset_pixels))
        .route("/rest/v1/pixels/{id}/adopt", post(pixels::adopt_pixel))
        .route("/realtime/v1/websocket", get(ws_upgrade))
        .layer(middleware::from_fn_with_state(state.clone(), require_api_key))
        .with_state(state);

    Router::new()
        .route("/health", get(pixels::health))
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let feed = state.feed.clone();
    let session = state.session;
    ws.on_upgrade(move |socket| connection::handle_connection(socket, feed, session))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn config_requires_anon_key() {
        assert!(ServerConfig::from_lookup(lookup(&[])).is_err());
        assert!(ServerConfig::from_lookup(lookup(&[("PIXEL_ANON_KEY", "  ")])).is_err());
    }

    #[test]
    fn config_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[("PIXEL_ANON_KEY", "anon")])).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.db_path, PathBuf::from("pixels.db"));
        assert_eq!(config.addr().unwrap().to_string(), "0.0.0.0:3000");
    }

    #[test]
    fn config_rejects_bad_port() {
        let vars = [("PIXEL_ANON_KEY", "anon"), ("PIXEL_PORT", "http")];
        assert!(ServerConfig::from_lookup(lookup(&vars)).is_err());
    }
}
