//! Gateway configuration.
//!
//! Layered the usual way: serde defaults, then an optional TOML file, then
//! `PLUME_`-prefixed environment overrides. A missing service id gets a
//! generated one so unconfigured gateways still come up with a unique
//! identity.

use std::env;
use std::path::{Path, PathBuf};

use rand::RngCore;
use serde::Deserialize;

use plume_core::{PlumeError, PlumeResult};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Gateway identity used as the routing gateway id. Generated when
    /// left empty.
    pub service_id: String,
    /// Listen address for the WebSocket endpoint.
    pub listen: String,
    /// Address advertised to peers and registries.
    pub public_address: String,
    pub public_port: u16,
    /// Free-form capability tags advertised alongside the identity.
    pub tags: Vec<String>,
    /// Service registry endpoint, empty to run standalone.
    pub registry_url: String,
    /// Shared cache endpoint, empty to run standalone.
    pub cache_addr: String,
    pub log_level: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            service_id: String::new(),
            listen: "0.0.0.0:8000".to_string(),
            public_address: "127.0.0.1".to_string(),
            public_port: 8000,
            tags: Vec::new(),
            registry_url: String::new(),
            cache_addr: String::new(),
            log_level: "info".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Load from an optional TOML file, then apply env overrides and fill
    /// in a generated service id if none was given.
    pub fn load(path: Option<&Path>) -> PlumeResult<Self> {
        let mut config = match path {
            Some(path) => {
                let path = expand_tilde(path);
                let raw = std::fs::read_to_string(&path)?;
                toml::from_str(&raw).map_err(|e| {
                    PlumeError::Decode(format!("config parse error in {}: {e}", path.display()))
                })?
            }
            None => Self::default(),
        };
        config.apply_env_overrides();
        if config.service_id.is_empty() {
            config.service_id = generate_service_id();
        }
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = env::var("PLUME_SERVICE_ID") {
            self.service_id = v;
        }
        if let Ok(v) = env::var("PLUME_LISTEN") {
            self.listen = v;
        }
        if let Ok(v) = env::var("PLUME_PUBLIC_ADDRESS") {
            self.public_address = v;
        }
        if let Ok(v) = env::var("PLUME_PUBLIC_PORT") {
            if let Ok(port) = v.parse() {
                self.public_port = port;
            }
        }
        if let Ok(v) = env::var("PLUME_TAGS") {
            self.tags = v.split(',').map(|t| t.trim().to_string()).collect();
        }
        if let Ok(v) = env::var("PLUME_REGISTRY_URL") {
            self.registry_url = v;
        }
        if let Ok(v) = env::var("PLUME_CACHE_ADDR") {
            self.cache_addr = v;
        }
        if let Ok(v) = env::var("PLUME_LOG_LEVEL") {
            self.log_level = v;
        }
    }
}

fn generate_service_id() -> String {
    let mut bytes = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("gate_{}", hex::encode(bytes))
}

fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_standalone() {
        let config = GatewayConfig::default();
        assert_eq!(config.listen, "0.0.0.0:8000");
        assert!(config.registry_url.is_empty());
        assert!(config.cache_addr.is_empty());
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn parses_a_partial_toml_document() {
        let config: GatewayConfig = toml::from_str(
            r#"
            service_id = "gate01"
            listen = "127.0.0.1:9000"
            tags = ["edge", "zone:cn-east"]
            "#,
        )
        .unwrap();
        assert_eq!(config.service_id, "gate01");
        assert_eq!(config.listen, "127.0.0.1:9000");
        assert_eq!(config.tags, vec!["edge", "zone:cn-east"]);
        // Unspecified keys keep their defaults.
        assert_eq!(config.public_port, 8000);
    }

    #[test]
    fn generated_service_ids_are_unique() {
        let a = generate_service_id();
        let b = generate_service_id();
        assert!(a.starts_with("gate_"));
        assert_ne!(a, b);
    }
}
