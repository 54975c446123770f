//! Serves the mock services API and runs a dashboard session against it.
//!
//! API will be:
//!
//! - `GET /api/services`: return a filtered page of services.
//! - `POST /api/services`: create a new Service.
//! - `PUT /api/services/:id`: update a specific Service.
//! - `DELETE /api/services/:id`: delete a specific Service.
//! - `GET /api/services/:id/events`: return a page of a Service's history.
//!
//! Run with
//!
//! ```not_rust
//! cargo run
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use monito::config::{load_bootstrap_config, Bootstrap};
use monito::core::logger;
use monito::core::*;
use monito::mock::{self, MockStore};
use monito::{Error, Result};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "monito=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_bootstrap_config().unwrap_or_else(|err| {
        tracing::warn!("{}, using defaults", err);
        Bootstrap::default()
    });

    // 1. the backend
    let addr: SocketAddr = config.server.addr.parse().map_err(|err| Error::Bind {
        addr: config.server.addr.clone(),
        message: format!("{}", err),
    })?;
    let store = MockStore::seeded(config.seed.services, config.seed.events_per_service);
    let (local, server) = mock::spawn(addr, Arc::new(store)).await?;
    tracing::info!("mock api on http://{}", local);

    // 2. query traffic log
    let (tx, rx) = mpsc::channel(32);
    let log = logger::spawn(rx);

    // 3. a dashboard session: first page of the list and the head of one history
    let client = QueryClient::from_config(&config.client)?.with_events(tx);
    let toaster = Toaster::new();
    let mut list = ServiceListView::new(
        client.clone(),
        toaster.clone(),
        ListState::new(config.client.page_limit, config.client.debounce()),
    );
    if let Err(err) = list.refresh().await {
        tracing::warn!("first list load failed: {}", err);
    }
    let first = match list.render() {
        ListRender::Ready { page, .. } => {
            tracing::info!(
                "page {}/{} ({} services)",
                page.page,
                page.total_pages,
                page.total_items
            );
            for service in &page.data {
                tracing::info!("{:<12} {:<14} {}", service.status, service.service_type, service.name);
            }
            page.data.first().cloned()
        }
        ListRender::Error(err) => {
            tracing::error!("service list unavailable: {}", err);
            None
        }
        ListRender::Loading => None,
    };
    if let Some(service) = first {
        let mut feed = HistoryFeed::new(client.clone(), service.id.clone(), config.client.event_page_limit);
        if let Err(err) = feed.on_sentinel(true).await {
            tracing::warn!("loading history of {} failed: {}", service.name, err);
        }
        tracing::info!(
            "{} has {} events loaded, more: {}",
            service.name,
            feed.events().count(),
            feed.has_next_page()
        );
    }

    // 4. keep the list fresh until interrupted
    let revalidator = Revalidator::spawn(client.clone(), config.client.refetch_interval());
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("waiting for ctrl-c failed: {}", err);
    }
    tracing::info!("shutting down");
    revalidator.shutdown();
    server.abort();
    list.unmount();
    drop(list);
    drop(client);
    if let Ok(stats) = log.await {
        tracing::info!("{} failed requests, {} writes", stats.failures(), stats.mutations());
    }
    Ok(())
}
