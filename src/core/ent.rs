use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Online,
    Offline,
    Degraded,
}

impl ServiceStatus {
    pub const ALL: [ServiceStatus; 3] = [
        ServiceStatus::Online,
        ServiceStatus::Offline,
        ServiceStatus::Degraded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Online => "online",
            ServiceStatus::Offline => "offline",
            ServiceStatus::Degraded => "degraded",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceType {
    #[serde(rename = "API")]
    Api,
    Database,
    #[serde(rename = "Web Service")]
    WebService,
    Microservice,
}

impl ServiceType {
    pub const ALL: [ServiceType; 4] = [
        ServiceType::Api,
        ServiceType::Database,
        ServiceType::WebService,
        ServiceType::Microservice,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Api => "API",
            ServiceType::Database => "Database",
            ServiceType::WebService => "Web Service",
            ServiceType::Microservice => "Microservice",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown value {:?}", self.0)
    }
}

impl FromStr for ServiceStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ServiceStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownVariant(s.to_string()))
    }
}

impl FromStr for ServiceType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ServiceType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownVariant(s.to_string()))
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A monitored service as owned by the remote API.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Service {
    pub id: String,
    pub name: String,
    pub status: ServiceStatus,
    #[serde(rename = "type")]
    pub service_type: ServiceType,
}

/// Body of create and update requests. Only name and type are writable.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct ServiceInput {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub service_type: Option<ServiceType>,
}

impl ServiceInput {
    pub fn new(name: impl Into<String>, service_type: ServiceType) -> Self {
        ServiceInput {
            name: name.into(),
            service_type: Some(service_type),
        }
    }
}

/// `{id}` body returned by every write.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ServiceId {
    pub id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Event {
    pub id: String,
    pub title: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub data: Vec<T>,
    pub page: u32,
    pub total_pages: u32,
    pub total_items: u32,
}

impl<T: Clone> Page<T> {
    /// Cuts the 1-based `page` of size `limit` out of `items`.
    pub fn slice(items: &[T], page: u32, limit: u32) -> Page<T> {
        let total_items = items.len() as u32;
        let start = (page.saturating_sub(1) as usize).saturating_mul(limit as usize);
        let data = items
            .iter()
            .skip(start)
            .take(limit as usize)
            .cloned()
            .collect();
        Page {
            data,
            page,
            total_pages: total_items.div_ceil(limit.max(1)),
            total_items,
        }
    }
}

impl<T> Page<T> {
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

/// Constraints applied to a service listing; `None` means unconstrained.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash, Default)]
pub struct ServiceFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ServiceStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_like: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub service_type: Option<ServiceType>,
}

impl ServiceFilters {
    pub fn matches(&self, service: &Service) -> bool {
        self.status.map_or(true, |status| service.status == status)
            && self
                .service_type
                .map_or(true, |kind| service.service_type == kind)
            && self
                .name_like
                .as_deref()
                .map_or(true, |needle| service.name.contains(needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(name: &str, status: ServiceStatus, service_type: ServiceType) -> Service {
        Service {
            id: name.to_lowercase(),
            name: name.to_string(),
            status,
            service_type,
        }
    }

    #[test]
    fn test_wire_names() {
        let json = serde_json::to_value(service(
            "Billing",
            ServiceStatus::Degraded,
            ServiceType::WebService,
        ))
        .unwrap();
        assert_eq!(json["type"], "Web Service");
        assert_eq!(json["status"], "degraded");

        let page: Page<Service> =
            serde_json::from_str(r#"{"data":[],"page":2,"totalPages":3,"totalItems":50}"#).unwrap();
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.total_items, 50);
    }

    #[test]
    fn test_input_without_type_omits_field() {
        let input = ServiceInput {
            name: "x".to_string(),
            service_type: None,
        };
        assert_eq!(serde_json::to_string(&input).unwrap(), r#"{"name":"x"}"#);
    }

    #[test]
    fn test_page_slice() {
        let items: Vec<u32> = (1..=50).collect();
        let page = Page::slice(&items, 3, 20);
        assert_eq!(page.data, (41..=50).collect::<Vec<_>>());
        assert_eq!(page.total_pages, 3);
        assert!(!page.has_next());

        let beyond = Page::slice(&items, 4, 20);
        assert!(beyond.data.is_empty());
        assert_eq!(beyond.page, 4);
    }

    #[test]
    fn test_filters_match() {
        let svc = service("Service 12", ServiceStatus::Online, ServiceType::Api);
        assert!(ServiceFilters::default().matches(&svc));

        let filters = ServiceFilters {
            status: Some(ServiceStatus::Online),
            name_like: Some("ice 1".to_string()),
            service_type: Some(ServiceType::Api),
        };
        assert!(filters.matches(&svc));

        let case_sensitive = ServiceFilters {
            name_like: Some("service".to_string()),
            ..Default::default()
        };
        assert!(!case_sensitive.matches(&svc));
    }

    #[test]
    fn test_parse_variants() {
        assert_eq!("Web Service".parse::<ServiceType>(), Ok(ServiceType::WebService));
        assert_eq!("offline".parse::<ServiceStatus>(), Ok(ServiceStatus::Offline));
        assert!("all".parse::<ServiceStatus>().is_err());
    }
}
