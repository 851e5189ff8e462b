//! Service wiring: picks store backends from [`AppConfig`] and builds the engine.

use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::config::{AppConfig, StoreBackend};
use crate::fulfillment::{BatchAdmissionController, FulfillmentConfig, OrderFulfillmentCoordinator};
use crate::store::{
    InMemoryInventoryStore, InMemoryMenuCatalog, InMemoryOrderStore, InventoryStore, MenuCatalog,
    OrderStore, PostgresInventoryStore, PostgresMenuCatalog, PostgresOrderStore, postgres,
};

pub type SharedMenuCatalog = Arc<dyn MenuCatalog>;
pub type SharedInventoryStore = Arc<dyn InventoryStore>;
pub type SharedOrderStore = Arc<dyn OrderStore>;

pub type Coordinator =
    OrderFulfillmentCoordinator<SharedMenuCatalog, SharedInventoryStore, SharedOrderStore>;
pub type BatchController =
    BatchAdmissionController<SharedMenuCatalog, SharedInventoryStore, SharedOrderStore>;

/// Entry points for callers (transport layers, jobs, tools).
#[derive(Clone)]
pub struct Services {
    pub coordinator: Arc<Coordinator>,
    pub batch: BatchController,
}

impl Services {
    pub fn new(
        menu: SharedMenuCatalog,
        inventory: SharedInventoryStore,
        orders: SharedOrderStore,
        config: FulfillmentConfig,
    ) -> Self {
        let coordinator = Arc::new(OrderFulfillmentCoordinator::new(
            menu, inventory, orders, config,
        ));
        Self {
            batch: BatchAdmissionController::new(Arc::clone(&coordinator)),
            coordinator,
        }
    }
}

/// Build services for the configured backend.
///
/// For Postgres this connects, sizes the pool, and applies the schema.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<Services> {
    match &config.backend {
        StoreBackend::InMemory => {
            info!("using in-memory stores");
            Ok(Services::new(
                Arc::new(InMemoryMenuCatalog::new()),
                Arc::new(InMemoryInventoryStore::new()),
                Arc::new(InMemoryOrderStore::new()),
                config.fulfillment(),
            ))
        }
        StoreBackend::Postgres {
            database_url,
            max_connections,
        } => {
            let pool = PgPoolOptions::new()
                .max_connections(*max_connections)
                .acquire_timeout(config.store_timeout)
                .connect(database_url)
                .await
                .context("failed to connect to Postgres")?;
            postgres::migrate(&pool)
                .await
                .context("failed to apply database schema")?;
            info!(max_connections, "using Postgres stores");

            Ok(Services::new(
                Arc::new(PostgresMenuCatalog::new(pool.clone())),
                Arc::new(PostgresInventoryStore::new(pool.clone())),
                Arc::new(PostgresOrderStore::new(pool)),
                config.fulfillment(),
            ))
        }
    }
}
