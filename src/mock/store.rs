use crate::core::ent::*;
use chrono::{Duration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

const TYPES: [ServiceType; 4] = ServiceType::ALL;
const STATUSES: [ServiceStatus; 3] = ServiceStatus::ALL;

fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()[..9].to_string()
}

fn generate_services(count: usize) -> Vec<Service> {
    (1..=count)
        .map(|i| Service {
            id: generate_id(),
            name: format!("Service {}", i),
            service_type: TYPES[i % TYPES.len()],
            status: STATUSES[i % STATUSES.len()],
        })
        .collect()
}

fn generate_events(count: usize, service_id: &str) -> Vec<Event> {
    let now = Utc::now();
    (1..=count)
        .map(|i| Event {
            id: format!("{}-event-{}", service_id, i),
            title: format!("Event {}", i),
            timestamp: now - Duration::milliseconds(i as i64 * 1_000_000),
        })
        .collect()
}

/// In-memory state behind the mock API. Services keep insertion order.
pub struct MockStore {
    services: RwLock<Vec<Service>>,
    events: RwLock<HashMap<String, Vec<Event>>>, // generated on first read
    events_per_service: usize,
}

impl MockStore {
    pub fn seeded(services: usize, events_per_service: usize) -> MockStore {
        MockStore::with_services(generate_services(services), events_per_service)
    }

    pub fn with_services(services: Vec<Service>, events_per_service: usize) -> MockStore {
        MockStore {
            services: RwLock::new(services),
            events: RwLock::new(HashMap::new()),
            events_per_service,
        }
    }

    pub fn len(&self) -> usize {
        self.services.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn list(&self, page: u32, limit: u32, filters: &ServiceFilters) -> Page<Service> {
        let services = self.services.read();
        let matching: Vec<Service> = services
            .iter()
            .filter(|service| filters.matches(service))
            .cloned()
            .collect();
        Page::slice(&matching, page, limit)
    }

    pub fn get(&self, id: &str) -> Option<Service> {
        self.services
            .read()
            .iter()
            .find(|service| service.id == id)
            .cloned()
    }

    /// New services always start online.
    pub fn create(&self, name: String, service_type: ServiceType) -> Service {
        let service = Service {
            id: generate_id(),
            name,
            status: ServiceStatus::Online,
            service_type,
        };
        self.services.write().push(service.clone());
        service
    }

    /// Rewrites name and type; status is not writable.
    pub fn update(&self, id: &str, name: String, service_type: ServiceType) -> bool {
        let mut services = self.services.write();
        match services.iter_mut().find(|service| service.id == id) {
            Some(service) => {
                service.name = name;
                service.service_type = service_type;
                true
            }
            None => false,
        }
    }

    pub fn delete(&self, id: &str) -> bool {
        let mut services = self.services.write();
        let Some(index) = services.iter().position(|service| service.id == id) else {
            return false;
        };
        services.remove(index);
        self.events.write().remove(id);
        true
    }

    pub fn events(&self, service_id: &str, page: u32, limit: u32) -> Option<Page<Event>> {
        self.get(service_id)?;
        let mut events = self.events.write();
        let all = events
            .entry(service_id.to_string())
            .or_insert_with(|| generate_events(self.events_per_service, service_id));
        Some(Page::slice(all, page, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_cycles_types_and_statuses() {
        let store = MockStore::seeded(50, 50);
        assert_eq!(store.len(), 50);
        let page = store.list(1, 4, &ServiceFilters::default());
        let first = &page.data[0];
        assert_eq!(first.name, "Service 1");
        assert_eq!(first.service_type, ServiceType::Database);
        assert_eq!(first.status, ServiceStatus::Offline);
        assert_eq!(page.data[2].service_type, ServiceType::Microservice);
        assert_eq!(page.data[2].status, ServiceStatus::Online);
    }

    #[test]
    fn test_pages_partition_the_collection() {
        let store = MockStore::seeded(50, 0);
        let filters = ServiceFilters::default();
        let mut seen = Vec::new();
        for page in 1..=3 {
            seen.extend(store.list(page, 20, &filters).data.into_iter().map(|s| s.name));
        }
        let expected: Vec<String> = (1..=50).map(|i| format!("Service {}", i)).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_filtered_listing() {
        let store = MockStore::seeded(50, 0);
        let filters = ServiceFilters {
            status: Some(ServiceStatus::Online),
            name_like: None,
            service_type: Some(ServiceType::Api),
        };
        let page = store.list(1, 50, &filters);
        // i % 3 == 0 and i % 4 == 0
        assert_eq!(page.total_items, 4);
        assert!(page.data.iter().all(|s| filters.matches(s)));
    }

    #[test]
    fn test_crud() {
        let store = MockStore::seeded(2, 3);
        let created = store.create("New".to_string(), ServiceType::Api);
        assert_eq!(created.status, ServiceStatus::Online);
        assert_eq!(store.list(1, 20, &ServiceFilters::default()).data[2], created);

        assert!(store.update(&created.id, "Renamed".to_string(), ServiceType::Database));
        let fetched = store.get(&created.id).unwrap();
        assert_eq!(fetched.name, "Renamed");
        assert_eq!(fetched.status, ServiceStatus::Online);

        assert_eq!(store.events(&created.id, 1, 20).unwrap().total_items, 3);
        assert!(store.delete(&created.id));
        assert!(!store.delete(&created.id));
        assert!(store.events(&created.id, 1, 20).is_none());
        assert!(!store.update("nope", "x".to_string(), ServiceType::Api));
    }

    #[test]
    fn test_events_are_stable_between_reads() {
        let store = MockStore::seeded(1, 50);
        let id = store.list(1, 1, &ServiceFilters::default()).data[0].id.clone();
        let a = store.events(&id, 2, 20).unwrap();
        let b = store.events(&id, 2, 20).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.data[0].title, "Event 21");
        assert_eq!(a.total_pages, 3);
    }
}
