//! Configuration validation.
//!
//! Semantic checks that Serde cannot express: referential integrity,
//! value ranges, and unsafe defaults. All errors are collected and returned
//! together rather than failing on the first one.

use std::collections::HashSet;
use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;

/// A single semantic configuration error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("duplicate service name '{0}'")]
    DuplicateService(String),

    #[error("service '{name}': invalid url '{url}'")]
    InvalidServiceUrl { name: String, url: String },

    #[error("service '{0}': timeout_ms must be greater than zero")]
    ZeroTimeout(String),

    #[error("listener.max_connections must be greater than zero")]
    ZeroMaxConnections,

    #[error("circuit_breaker.failure_threshold must be greater than zero")]
    ZeroFailureThreshold,

    #[error("circuit_breaker.reset_timeout_ms must be greater than zero")]
    ZeroResetTimeout,

    #[error("rate limit rule '{0}': window_ms and max must be greater than zero")]
    InvalidRateRule(String),

    #[error("auth.jwt_secret must be set when a service requires authentication")]
    MissingJwtSecret,

    #[error("admin.api_key must be changed from the default placeholder")]
    PlaceholderAdminKey,
}

/// Validate a configuration, returning every error found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.max_connections == 0 {
        errors.push(ValidationError::ZeroMaxConnections);
    }

    let mut seen = HashSet::new();
    for service in &config.services {
        if !seen.insert(service.name.as_str()) {
            errors.push(ValidationError::DuplicateService(service.name.clone()));
        }
        if Url::parse(&service.url).is_err() {
            errors.push(ValidationError::InvalidServiceUrl {
                name: service.name.clone(),
                url: service.url.clone(),
            });
        }
        if service.timeout_ms == 0 {
            errors.push(ValidationError::ZeroTimeout(service.name.clone()));
        }
    }

    if config.circuit_breaker.failure_threshold == 0 {
        errors.push(ValidationError::ZeroFailureThreshold);
    }
    if config.circuit_breaker.reset_timeout_ms == 0 {
        errors.push(ValidationError::ZeroResetTimeout);
    }

    if config.rate_limit.enabled {
        let rules = [
            ("global", config.rate_limit.global),
            ("per_user", config.rate_limit.per_user),
        ];
        for (name, rule) in rules {
            if rule.window_ms == 0 || rule.max == 0 {
                errors.push(ValidationError::InvalidRateRule(name.to_string()));
            }
        }
        for rule in &config.rate_limit.endpoints {
            if rule.window_ms == 0 || rule.max == 0 {
                errors.push(ValidationError::InvalidRateRule(format!(
                    "{} {}",
                    rule.method, rule.path
                )));
            }
        }
    }

    let needs_auth = config.services.iter().any(|s| s.auth_required || s.admin_only);
    if needs_auth && config.auth.jwt_secret.is_empty() {
        errors.push(ValidationError::MissingJwtSecret);
    }

    if config.admin.enabled && config.admin.api_key == "CHANGE_ME_IN_PRODUCTION" {
        errors.push(ValidationError::PlaceholderAdminKey);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ServiceConfig;

    fn service(name: &str, url: &str) -> ServiceConfig {
        ServiceConfig {
            name: name.to_string(),
            url: url.to_string(),
            timeout_ms: 5000,
            auth_required: false,
            admin_only: false,
            cache: false,
            cache_ttl_secs: None,
        }
    }

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn collects_all_errors() {
        let mut config = GatewayConfig::default();
        config.services.push(service("orders", "not a url"));
        config.services.push(service("orders", "http://127.0.0.1:3001"));
        config.circuit_breaker.failure_threshold = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::ZeroFailureThreshold));
        assert!(errors.contains(&ValidationError::DuplicateService("orders".into())));
    }

    #[test]
    fn auth_required_service_needs_secret() {
        let mut config = GatewayConfig::default();
        let mut svc = service("crm", "http://127.0.0.1:3002");
        svc.auth_required = true;
        config.services.push(svc);

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::MissingJwtSecret));

        config.auth.jwt_secret = "test-secret".into();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn zero_max_connections_rejected() {
        let mut config = GatewayConfig::default();
        config.listener.max_connections = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::ZeroMaxConnections));
    }

    #[test]
    fn admin_placeholder_key_rejected() {
        let mut config = GatewayConfig::default();
        config.admin.enabled = true;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::PlaceholderAdminKey));
    }
}
