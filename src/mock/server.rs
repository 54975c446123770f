use crate::error::{Error, Result};
use crate::mock::api::*;
use crate::mock::store::MockStore;

use axum::{
    error_handling::HandleErrorLayer,
    http::StatusCode,
    routing::get,
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::task::JoinHandle;
use tokio::time;
use tower::{BoxError, ServiceBuilder};
use tower_http::trace::TraceLayer;

pub fn router(db: Arc<MockStore>) -> Router {
    // Compose the routes
    Router::new()
        .route("/api/services", get(services_index).post(service_create))
        .route(
            "/api/services/:id",
            get(service_show).put(service_update).delete(service_delete),
        )
        .route("/api/services/:id/events", get(events_index))
        // Add middleware to all routes
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(|error: BoxError| async move {
                    if error.is::<tower::timeout::error::Elapsed>() {
                        Ok(StatusCode::REQUEST_TIMEOUT)
                    } else {
                        Err((
                            StatusCode::INTERNAL_SERVER_ERROR,
                            format!("Unhandled internal error: {}", error),
                        ))
                    }
                }))
                .timeout(time::Duration::from_secs(10))
                .layer(TraceLayer::new_for_http())
                .into_inner(),
        )
        .with_state(db)
}

/// Binds `addr` and serves the mock API in the background. Port 0 picks a
/// free port; the bound address is returned.
pub async fn spawn(addr: SocketAddr, db: Arc<MockStore>) -> Result<(SocketAddr, JoinHandle<()>)> {
    let server = axum::Server::try_bind(&addr)
        .map_err(|err| Error::Bind {
            addr: addr.to_string(),
            message: err.to_string(),
        })?
        .serve(router(db).into_make_service());
    let local = server.local_addr();
    tracing::debug!("mock api listening on {}", local);
    let handle = tokio::spawn(async move {
        if let Err(err) = server.await {
            tracing::error!("mock api stopped: {}", err);
        }
    });
    Ok((local, handle))
}
