pub mod middleware;
pub mod pixels;

use std::sync::Arc;

use pixel_db::Database;
use pixel_gateway::connection::SessionConfig;
use pixel_gateway::dispatcher::ChangeFeed;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub feed: ChangeFeed,
    pub anon_key: String,
    pub session: SessionConfig,
}
