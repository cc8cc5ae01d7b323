//! Upstream service descriptors.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::config::schema::{CacheConfig, ServiceConfig};
use crate::config::validation::ValidationError;

/// One upstream business service: an opaque HTTP origin identified by
/// name, base URL, and timeout.
#[derive(Debug, Clone)]
pub struct Upstream {
    pub name: String,
    pub base_url: Url,
    pub timeout: Duration,
    pub auth_required: bool,
    pub admin_only: bool,
    /// TTL for cached responses; `None` disables caching for this service.
    pub cache_ttl: Option<Duration>,
}

/// Immutable name → upstream lookup table built from configuration.
#[derive(Debug, Default)]
pub struct UpstreamRegistry {
    upstreams: HashMap<String, Arc<Upstream>>,
}

impl UpstreamRegistry {
    pub fn from_config(
        services: &[ServiceConfig],
        cache_defaults: &CacheConfig,
    ) -> Result<Self, Vec<ValidationError>> {
        let mut upstreams = HashMap::new();
        let mut errors = Vec::new();

        for service in services {
            let base_url = match Url::parse(&service.url) {
                Ok(url) => url,
                Err(_) => {
                    errors.push(ValidationError::InvalidServiceUrl {
                        name: service.name.clone(),
                        url: service.url.clone(),
                    });
                    continue;
                }
            };
            let cache_ttl = if service.cache || service.cache_ttl_secs.is_some() {
                Some(Duration::from_secs(
                    service.cache_ttl_secs.unwrap_or(cache_defaults.default_ttl_secs),
                ))
            } else {
                None
            };
            upstreams.insert(
                service.name.clone(),
                Arc::new(Upstream {
                    name: service.name.clone(),
                    base_url,
                    timeout: Duration::from_millis(service.timeout_ms),
                    auth_required: service.auth_required,
                    admin_only: service.admin_only,
                    cache_ttl,
                }),
            );
        }

        if errors.is_empty() {
            Ok(Self { upstreams })
        } else {
            Err(errors)
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<Upstream>> {
        self.upstreams.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.upstreams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.upstreams.is_empty()
    }
}
