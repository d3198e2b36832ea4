use dashmap::DashMap;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::config::{Config, GatewayLimits};
use crate::db::store::SqliteStore;
use crate::gateway::access::{AccessGate, Authenticator};
use crate::gateway::hub::Hub;
use crate::gateway::router::CommandRouter;
use crate::middleware::rate_limit::RateLimitBucket;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub hub: Hub,
    pub auth: Arc<dyn Authenticator>,
    pub router: Arc<CommandRouter>,
    pub limits: GatewayLimits,
    pub token_ttl_hours: i64,
    pub rate_limits: Arc<DashMap<String, RateLimitBucket>>,
}

impl AppState {
    /// Wire the SQLite store into the gateway and spawn the hub. Must be
    /// called inside a Tokio runtime.
    pub fn new(db: SqlitePool, config: &Config) -> Self {
        Self::with_limits(db, config.limits.clone(), config.token_ttl_hours)
    }

    pub fn with_limits(db: SqlitePool, limits: GatewayLimits, token_ttl_hours: i64) -> Self {
        let store = Arc::new(SqliteStore::new(db.clone()));
        let hub = Hub::spawn(limits.hub_mailbox);
        let router = CommandRouter::new(hub.clone(), AccessGate::new(store.clone()), store.clone());

        Self {
            db,
            hub,
            auth: store,
            router: Arc::new(router),
            limits,
            token_ttl_hours,
            rate_limits: Arc::new(DashMap::new()),
        }
    }
}
