use axum::{
    routing::{get, put},
    Extension, Router,
};
use log::info;
use std::sync::Arc;

use crate::api::handlers::{self, AddressField};
use crate::error::CrudError;
use crate::logic::registry::describe;
use crate::model::Record;
use crate::store::traits::Store;

pub fn create_router<S: Store + 'static>() -> Router<Arc<S>> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
}

/// Mount the CRUD routes of `T` under `/{name}`:
///
/// - `GET /{name}` lists, `POST /{name}` creates one record or a batch
/// - `GET|PUT|DELETE /{name}/{field}/:value` addresses records by one value
/// - `PUT|DELETE /{name}/{field}` takes a batch addressed by `field`
///
/// `{field}` is registered under both the logical and the storage name.
pub fn mount<T: Record, S: Store + 'static>(
    router: Router<Arc<S>>,
    name: &str,
) -> Result<Router<Arc<S>>, CrudError> {
    let schema = describe::<T>()?;
    let base = format!("/{}", name.trim_matches('/'));

    let mut router = router.route(
        &base,
        get(handlers::list_records::<T, S>).post(handlers::create_records::<T, S>),
    );

    let segments = schema.address_paths();
    for segment in &segments {
        let by_field = Router::new()
            .route(
                &format!("{}/{}/:value", base, segment),
                get(handlers::read_record::<T, S>)
                    .put(handlers::update_record::<T, S>)
                    .delete(handlers::delete_record::<T, S>),
            )
            .route(
                &format!("{}/{}", base, segment),
                put(handlers::update_records::<T, S>).delete(handlers::delete_records::<T, S>),
            )
            .layer(Extension(AddressField(segment.clone())));
        router = router.merge(by_field);
    }

    info!(
        "Mounted {} at {} with {} address path(s)",
        schema.type_name,
        base,
        segments.len()
    );
    Ok(router)
}
