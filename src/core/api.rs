//! HTTP access to the services REST API. No caching happens here; see
//! [`crate::core::client::QueryClient`] for the cached layer.

use crate::core::ent::*;
use crate::core::error::{ApiError, ApiResult};
use reqwest::{Client, Response, Url};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
struct PageQuery {
    page: u32,
    limit: u32,
}

#[derive(Debug, Clone)]
pub struct ServiceApi {
    client: Client,
    base_url: Url,
    requests: Arc<AtomicU64>,
}

impl ServiceApi {
    pub fn new(base_url: impl Into<String>, http_timeout: Duration) -> ApiResult<Self> {
        let base_url = base_url.into();
        let parsed = Url::parse(&base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| ApiError::Network(format!("invalid base url {:?}", base_url)))?;
        let client = Client::builder()
            .timeout(http_timeout)
            .user_agent(format!("monito/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(ServiceApi {
            client,
            base_url: parsed,
            requests: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Number of requests issued so far.
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// `{base}/api/{segments..}`, each segment percent-encoded.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("api").extend(segments);
        }
        url
    }

    pub async fn get_service(&self, id: &str) -> ApiResult<Service> {
        let what = format!("service {}", id);
        let resp = self.send(self.client.get(self.url(&["services", id]))).await?;
        decode(resp, &what).await
    }

    pub async fn list_services(
        &self,
        page: u32,
        limit: u32,
        filters: &ServiceFilters,
    ) -> ApiResult<Page<Service>> {
        let mut query = vec![("page", page.to_string()), ("limit", limit.to_string())];
        if let Some(status) = filters.status {
            query.push(("status", status.as_str().to_string()));
        }
        if let Some(name_like) = &filters.name_like {
            query.push(("name_like", name_like.clone()));
        }
        if let Some(kind) = filters.service_type {
            query.push(("type", kind.as_str().to_string()));
        }
        let resp = self
            .send(self.client.get(self.url(&["services"])).query(&query))
            .await?;
        decode(resp, "services").await
    }

    pub async fn create_service(&self, input: &ServiceInput) -> ApiResult<ServiceId> {
        let resp = self
            .send(self.client.post(self.url(&["services"])).json(input))
            .await?;
        decode(resp, "service").await
    }

    pub async fn update_service(&self, id: &str, input: &ServiceInput) -> ApiResult<ServiceId> {
        let what = format!("service {}", id);
        let resp = self
            .send(
                self.client
                    .put(self.url(&["services", id]))
                    .json(input),
            )
            .await?;
        decode(resp, &what).await
    }

    pub async fn delete_service(&self, id: &str) -> ApiResult<ServiceId> {
        let what = format!("service {}", id);
        let resp = self
            .send(self.client.delete(self.url(&["services", id])))
            .await?;
        decode(resp, &what).await
    }

    pub async fn list_events(&self, service_id: &str, page: u32, limit: u32) -> ApiResult<Page<Event>> {
        let what = format!("events of service {}", service_id);
        let resp = self
            .send(
                self.client
                    .get(self.url(&["services", service_id, "events"]))
                    .query(&PageQuery { page, limit }),
            )
            .await?;
        decode(resp, &what).await
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> ApiResult<Response> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let resp = request.send().await?;
        debug!("{} {}", resp.status(), resp.url());
        Ok(resp)
    }
}

async fn decode<T: DeserializeOwned>(resp: Response, what: &str) -> ApiResult<T> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ApiError::from_status(status, what, body));
    }
    resp.json::<T>()
        .await
        .map_err(|err| ApiError::Decode(format!("{}: {}", what, err)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::client::tests::start;
    use crate::mock::MockStore;

    #[test]
    fn test_ids_are_escaped_in_paths() {
        let api = ServiceApi::new("http://localhost:3000/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            api.url(&["services", "a b/c", "events"]).as_str(),
            "http://localhost:3000/api/services/a%20b%2Fc/events"
        );
        let nested = ServiceApi::new("http://localhost:3000/dash", Duration::from_secs(1)).unwrap();
        assert_eq!(nested.url(&["services"]).as_str(), "http://localhost:3000/dash/api/services");
    }

    #[test]
    fn test_unusable_base_url_is_rejected() {
        let err = ServiceApi::new("not a url", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ApiError::Network(_)));
    }

    #[tokio::test]
    async fn test_ids_with_reserved_characters_round_trip() {
        let odd = Service {
            id: "a b/c".to_string(),
            name: "Odd".to_string(),
            status: ServiceStatus::Online,
            service_type: ServiceType::Api,
        };
        let client = start(MockStore::with_services(vec![odd.clone()], 3), Duration::from_secs(15)).await;
        assert_eq!(client.fetch_service("a b/c").await.unwrap(), odd);
        assert_eq!(client.fetch_service_events("a b/c", 1, 20).await.unwrap().total_items, 3);
        client.delete_service("a b/c").await.unwrap();
        assert!(client.fetch_service("a b/c").await.unwrap_err().is_not_found());
    }
}
