use std::sync::Arc;

use crate::auth::AuthManager;
use crate::config::Config;
use crate::db::DbPool;
use crate::delivery::DeliveryCoordinator;
use crate::registry::ConnectionRegistry;
use crate::store::MessageStore;

/// Application context containing shared dependencies
/// This reduces parameter passing and makes it easier to add new dependencies
#[derive(Clone)]
pub struct AppContext {
    pub db_pool: Arc<DbPool>,
    pub store: Arc<dyn MessageStore>,
    pub registry: Arc<ConnectionRegistry>,
    pub delivery: Arc<DeliveryCoordinator>,
    pub auth_manager: Arc<AuthManager>,
    pub config: Arc<Config>,
}

impl AppContext {
    pub fn new(
        db_pool: Arc<DbPool>,
        store: Arc<dyn MessageStore>,
        registry: Arc<ConnectionRegistry>,
        delivery: Arc<DeliveryCoordinator>,
        auth_manager: Arc<AuthManager>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            db_pool,
            store,
            registry,
            delivery,
            auth_manager,
            config,
        }
    }
}
