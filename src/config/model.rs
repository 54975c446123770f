use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use crate::error::{Error, Result};

#[derive(Serialize, Deserialize, Debug)]
pub struct Profiles {
    pub active: String,
}
// Result of parsing application.yml
#[derive(Serialize, Deserialize, Debug)]
pub struct EnvConfig {
    pub profiles: Profiles,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Bootstrap {
    pub server: Server,
    pub client: Client,
    pub seed: Seed,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Server {
    pub addr: String,
}

impl Default for Server {
    fn default() -> Self {
        Server {
            addr: "127.0.0.1:3000".to_string(),
        }
    }
}

/// Settings for the dashboard's data-access layer.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Client {
    pub base_url: String,
    pub page_limit: u32,
    pub event_page_limit: u32,
    /// Freshness window of cached reads.
    pub stale_secs: u64,
    /// How long unused cache entries are kept.
    pub gc_secs: u64,
    pub refetch_interval_secs: u64,
    pub debounce_ms: u64,
    pub http_timeout_secs: u64,
}

impl Default for Client {
    fn default() -> Self {
        Client {
            base_url: "http://127.0.0.1:3000".to_string(),
            page_limit: 20,
            event_page_limit: 20,
            stale_secs: 15,
            gc_secs: 300,
            refetch_interval_secs: 15,
            debounce_ms: 500,
            http_timeout_secs: 10,
        }
    }
}

impl Client {
    pub fn stale_time(&self) -> Duration {
        Duration::from_secs(self.stale_secs)
    }

    pub fn gc_time(&self) -> Duration {
        Duration::from_secs(self.gc_secs)
    }

    pub fn refetch_interval(&self) -> Duration {
        Duration::from_secs(self.refetch_interval_secs)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Seed {
    pub services: usize,
    pub events_per_service: usize,
}

impl Default for Seed {
    fn default() -> Self {
        Seed {
            services: 50,
            events_per_service: 50,
        }
    }
}

// Load and parse one yaml file
fn load_config<T>(path: &str) -> Result<T>
where
    T: DeserializeOwned,
{
    let raw = std::fs::read_to_string(path).map_err(|err| Error::Io {
        path: path.to_string(),
        source: err,
    })?;
    let config = serde_yaml::from_str::<T>(&raw).map_err(|err| Error::Config {
        path: path.to_string(),
        source: err,
    })?;
    info!("loaded config {}", path);
    Ok(config)
}

fn load_env_config(dir: &str) -> Result<EnvConfig> {
    load_config::<EnvConfig>(&format!("{}/application.yml", dir))
}

fn load_bootstrap_config_from_env(dir: &str, active: &str) -> Result<Bootstrap> {
    let path = format!("{}/application-{}.yml", dir, active);
    load_config::<Bootstrap>(&path)
}

/// Loads `application.yml` from `dir`, then the `application-{active}.yml`
/// profile it points to.
pub fn load_bootstrap_config_from(dir: &str) -> Result<Bootstrap> {
    let env_config = load_env_config(dir)?;
    load_bootstrap_config_from_env(dir, &env_config.profiles.active)
}

pub fn load_bootstrap_config() -> Result<Bootstrap> {
    load_bootstrap_config_from(".")
}

#[cfg(test)]
mod test {
    use crate::config::model::*;

    #[test]
    pub fn load_config_test() {
        let config = load_bootstrap_config_from(env!("CARGO_MANIFEST_DIR")).unwrap();
        assert_eq!(config.server.addr, "127.0.0.1:3000");
        assert_eq!(config.client.page_limit, 20);
        assert_eq!(config.client.debounce(), Duration::from_millis(500));
        assert_eq!(config.seed.services, 50);
    }

    #[test]
    pub fn partial_profile_uses_defaults_test() {
        let config: Bootstrap = serde_yaml::from_str("client:\n  page_limit: 5\n").unwrap();
        assert_eq!(config.client.page_limit, 5);
        assert_eq!(config.client.stale_secs, 15);
        assert_eq!(config.client.gc_time(), Duration::from_secs(300));
        assert_eq!(config.server.addr, "127.0.0.1:3000");
    }

    #[test]
    pub fn missing_profile_is_an_error_test() {
        let err = load_bootstrap_config_from("/nonexistent-monito-dir").unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
