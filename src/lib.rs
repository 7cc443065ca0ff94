pub mod api;
pub mod config;
pub mod demo;
pub mod error;
pub mod logic;
pub mod model;
pub mod store;

// Export API types
pub use api::handlers;
pub use api::routes;

pub use error::{CrudError, HookError, Result};

pub use logic::{CrudService, Hook, HookSet, Operation};

// Export all model types
pub use model::*;

// Export store types
pub use store::{MemoryStore, PostgresStore, Store};

/// Router serving the demo `Person` records under `/people`
pub fn app<S: Store + 'static>(store: std::sync::Arc<S>) -> Result<axum::Router> {
    let router = routes::create_router::<S>();
    let router = routes::mount::<demo::Person, S>(router, "people")?;
    Ok(router.with_state(store))
}
