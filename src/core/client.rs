//! Cached data access: reads go through [`QueryCache`], writes invalidate it.

use crate::config;
use crate::core::api::ServiceApi;
use crate::core::cache::*;
use crate::core::ent::*;
use crate::core::error::ApiResult;
use crate::core::logger::{Mutation, QueryEvent};
use futures::future::{join_all, FutureExt};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Clone)]
pub struct QueryClient {
    api: ServiceApi,
    cache: QueryCache,
    events: Option<mpsc::Sender<QueryEvent>>,
}

impl QueryClient {
    pub fn new(api: ServiceApi, stale_time: Duration) -> QueryClient {
        QueryClient {
            api,
            cache: QueryCache::new(stale_time),
            events: None,
        }
    }

    pub fn from_config(config: &config::Client) -> ApiResult<QueryClient> {
        let api = ServiceApi::new(config.base_url.clone(), config.http_timeout())?;
        Ok(QueryClient::new(api, config.stale_time()).with_gc_time(config.gc_time()))
    }

    pub fn with_gc_time(mut self, gc_time: Duration) -> QueryClient {
        self.cache = self.cache.with_gc_time(gc_time);
        self
    }

    /// Publishes a [`QueryEvent`] for every request and write.
    pub fn with_events(mut self, tx: mpsc::Sender<QueryEvent>) -> QueryClient {
        self.events = Some(tx);
        self
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Network requests issued so far.
    pub fn requests(&self) -> u64 {
        self.api.requests()
    }

    pub async fn fetch_service(&self, id: &str) -> ApiResult<Service> {
        self.query(QueryKey::service(id), false)
            .await?
            .into_service()
    }

    pub async fn fetch_services(
        &self,
        page: u32,
        limit: u32,
        filters: &ServiceFilters,
    ) -> ApiResult<Page<Service>> {
        self.query(QueryKey::services(page, limit, filters.clone()), false)
            .await?
            .into_services()
    }

    pub async fn fetch_service_events(
        &self,
        service_id: &str,
        page: u32,
        limit: u32,
    ) -> ApiResult<Page<Event>> {
        self.query(QueryKey::events(service_id, page, limit), false)
            .await?
            .into_events()
    }

    pub async fn create_service(&self, input: &ServiceInput) -> ApiResult<ServiceId> {
        let result = self.api.create_service(input).await;
        self.after_write(Mutation::Create, None, result)
    }

    pub async fn update_service(&self, id: &str, input: &ServiceInput) -> ApiResult<ServiceId> {
        let result = self.api.update_service(id, input).await;
        self.after_write(Mutation::Update, Some(id), result)
    }

    pub async fn delete_service(&self, id: &str) -> ApiResult<ServiceId> {
        let result = self.api.delete_service(id).await;
        self.after_write(Mutation::Delete, Some(id), result)
    }

    /// Fetches `key` ignoring freshness; joins a request already in flight.
    pub async fn refetch(&self, key: QueryKey) -> ApiResult<QueryData> {
        self.query(key, true).await
    }

    /// Refetches every key some view currently observes. Returns how many
    /// keys were revalidated.
    pub async fn refetch_active(&self) -> usize {
        let keys = self.cache.active_keys();
        let count = keys.len();
        let results = join_all(keys.into_iter().map(|key| self.refetch(key))).await;
        let failed = results.iter().filter(|result| result.is_err()).count();
        if failed > 0 {
            tracing::warn!("revalidation: {} of {} queries failed", failed, count);
        }
        count
    }

    async fn query(&self, key: QueryKey, force: bool) -> ApiResult<QueryData> {
        let api = &self.api;
        let (result, started) = self
            .cache
            .fetch(&key, force, || fetch_remote(api.clone(), key.clone()).boxed())
            .await;
        if started {
            match &result {
                Ok(_) => self.publish(QueryEvent::Fetched { key }),
                Err(error) => self.publish(QueryEvent::FetchFailed {
                    key,
                    error: error.clone(),
                }),
            }
        }
        result
    }

    // Invalidation runs before the caller sees the result, so any read issued
    // afterwards refetches.
    fn after_write(
        &self,
        op: Mutation,
        id: Option<&str>,
        result: ApiResult<ServiceId>,
    ) -> ApiResult<ServiceId> {
        match result {
            Ok(created) => {
                let entries = self.cache.invalidate_root(QueryRoot::Services);
                self.publish(QueryEvent::Invalidated {
                    root: QueryRoot::Services,
                    entries,
                });
                if let Some(id) = id {
                    self.cache.invalidate_key(&QueryKey::service(id));
                }
                self.publish(QueryEvent::Mutated {
                    op,
                    id: created.id.clone(),
                });
                Ok(created)
            }
            Err(error) => {
                self.publish(QueryEvent::MutationFailed {
                    op,
                    error: error.clone(),
                });
                Err(error)
            }
        }
    }

    fn publish(&self, event: QueryEvent) {
        if let Some(tx) = &self.events {
            if let Err(err) = tx.try_send(event) {
                tracing::warn!("query event dropped: {}", err);
            }
        }
    }
}

async fn fetch_remote(api: ServiceApi, key: QueryKey) -> ApiResult<QueryData> {
    match key {
        QueryKey::Service { id } => api.get_service(&id).await.map(QueryData::Service),
        QueryKey::Services {
            page,
            limit,
            filters,
        } => api
            .list_services(page, limit, &filters)
            .await
            .map(QueryData::Services),
        QueryKey::Events {
            service_id,
            page,
            limit,
        } => api
            .list_events(&service_id, page, limit)
            .await
            .map(QueryData::Events),
    }
}

impl std::fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryClient")
            .field("api", &self.api)
            .finish_non_exhaustive()
    }
}
