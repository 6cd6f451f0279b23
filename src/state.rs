use std::sync::Arc;

use crate::config::{Config, DispatchSettings};
use crate::engine::DispatchEngine;
use crate::observability::metrics::Metrics;
use crate::orders::OrderStateMachine;
use crate::presence::PresenceRegistry;
use crate::router::ConnectionRouter;
use crate::router::auth::{Authenticator, StaticTokenAuthenticator};
use crate::storage::{InMemoryOrderStore, OrderStore};

pub struct AppState {
    pub presence: Arc<PresenceRegistry>,
    pub router: Arc<ConnectionRouter>,
    pub store: Arc<dyn OrderStore>,
    pub orders: Arc<OrderStateMachine>,
    pub engine: Arc<DispatchEngine>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        settings: DispatchSettings,
        store: Arc<dyn OrderStore>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        let metrics = Metrics::new();
        let presence = Arc::new(PresenceRegistry::new());
        let router = Arc::new(ConnectionRouter::new(authenticator));
        let orders = Arc::new(OrderStateMachine::new(store.clone()));
        let engine = Arc::new(DispatchEngine::new(
            presence.clone(),
            router.clone(),
            orders.clone(),
            store.clone(),
            settings,
            metrics.clone(),
        ));

        Self {
            presence,
            router,
            store,
            orders,
            engine,
            metrics,
        }
    }

    /// Standalone wiring: in-memory orders and the configured token table.
    pub fn from_config(config: &Config) -> Self {
        let store = Arc::new(InMemoryOrderStore::new());
        let authenticator = Arc::new(StaticTokenAuthenticator::new(config.auth_tokens.clone()));
        Self::new(config.dispatch, store, authenticator)
    }
}
