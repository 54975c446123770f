use crate::core::cache::{QueryKey, QueryRoot};
use crate::core::error::ApiError;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Create,
    Update,
    Delete,
}

/// What the query client reports about its traffic.
#[derive(Debug, Clone)]
pub enum QueryEvent {
    Fetched { key: QueryKey },
    FetchFailed { key: QueryKey, error: ApiError },
    Invalidated { root: QueryRoot, entries: usize },
    Mutated { op: Mutation, id: String },
    MutationFailed { op: Mutation, error: ApiError },
}

// Records query traffic and logs it
#[derive(Debug, Default)]
pub struct Logger {
    fetches: HashMap<String, u64>, // requests per canonical key
    failures: u64,
    mutations: u64,
}

impl Logger {
    pub fn new() -> Logger {
        Logger::default()
    }

    pub fn log(&mut self, event: QueryEvent) {
        match event {
            QueryEvent::Fetched { key } => {
                tracing::debug!("fetched {}", key);
                *self.fetches.entry(key.to_string()).or_default() += 1;
            }
            QueryEvent::FetchFailed { key, error } => {
                tracing::warn!("fetch {} failed: {}", key, error);
                *self.fetches.entry(key.to_string()).or_default() += 1;
                self.failures += 1;
            }
            QueryEvent::Invalidated { root, entries } => {
                tracing::debug!("invalidated {} cached {} entries", entries, root.as_str())
            }
            QueryEvent::Mutated { op, id } => {
                tracing::info!("{:?} service {}", op, id);
                self.mutations += 1;
            }
            QueryEvent::MutationFailed { op, error } => {
                tracing::warn!("{:?} failed: {}", op, error);
                self.failures += 1;
            }
        };
    }

    pub fn fetch_count(&self, key: &QueryKey) -> u64 {
        self.fetches.get(&key.to_string()).copied().unwrap_or(0)
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub fn mutations(&self) -> u64 {
        self.mutations
    }
}

/// Drains `rx` until every sender is gone, then hands back the tallies.
pub fn spawn(mut rx: mpsc::Receiver<QueryEvent>) -> JoinHandle<Logger> {
    tokio::spawn(async move {
        let mut logger = Logger::new();
        tracing::debug!("query logger started");
        loop {
            tokio::select! {
                Some(event) = rx.recv() => logger.log(event),
                else => { break }
            };
        }
        tracing::debug!("query logger stopped");
        logger
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ent::ServiceFilters;

    #[tokio::test]
    async fn test_logger_tallies_events() {
        let (tx, rx) = mpsc::channel(8);
        let handle = spawn(rx);
        let key = QueryKey::services(1, 20, ServiceFilters::default());

        tx.send(QueryEvent::Fetched { key: key.clone() }).await.unwrap();
        tx.send(QueryEvent::FetchFailed {
            key: key.clone(),
            error: ApiError::Network("refused".to_string()),
        })
        .await
        .unwrap();
        tx.send(QueryEvent::Mutated {
            op: Mutation::Delete,
            id: "s1".to_string(),
        })
        .await
        .unwrap();
        drop(tx);

        let logger = handle.await.unwrap();
        assert_eq!(logger.fetch_count(&key), 2);
        assert_eq!(logger.failures(), 1);
        assert_eq!(logger.mutations(), 1);
    }
}
