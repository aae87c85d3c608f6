use axum::routing::get;
use axum::{Extension, Router};

use crate::api::rest::handlers;
use crate::domain::builder::RecordApi;

/// One collection route and one item route per mount.
#[must_use]
pub fn router(api: &RecordApi) -> Router {
    api.all_endpoints()
        .iter()
        .fold(Router::new(), |router, endpoints| {
            let mount = endpoints.mount();
            tracing::debug!(
                record_type = %mount.record_type(),
                collection = %mount.collection_path(),
                "mounting record routes"
            );
            let routes = Router::new()
                .route(
                    &mount.collection_path(),
                    get(handlers::list_records).post(handlers::create_record),
                )
                .route(
                    &mount.item_path(),
                    get(handlers::get_record)
                        .put(handlers::update_record)
                        .delete(handlers::delete_record),
                )
                .layer(Extension(endpoints.clone()));
            router.merge(routes)
        })
}
