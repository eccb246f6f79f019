//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses and value ranges
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::resolver::Destination;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("{:?} is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be greater than 0"));
    }

    if config.upstream.address.is_empty() {
        errors.push(ValidationError::new("upstream.address", "is required"));
    } else if let Err(e) = config.upstream.address.parse::<Destination>() {
        errors.push(ValidationError::new("upstream.address", e.to_string()));
    }
    if config.upstream.connect_timeout_secs == 0 {
        errors.push(ValidationError::new("upstream.connect_timeout_secs", "must be greater than 0"));
    }

    if let Some(forced) = &config.resolver.forced_destination {
        if let Err(e) = forced.parse::<Destination>() {
            errors.push(ValidationError::new("resolver.forced_destination", e.to_string()));
        }
    }

    if config.relay.buffer_size == 0 {
        errors.push(ValidationError::new("relay.buffer_size", "must be greater than 0"));
    }
    if config.relay.handshake_buffer_size == 0 {
        errors.push(ValidationError::new("relay.handshake_buffer_size", "must be greater than 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("{:?} is not a socket address", config.observability.metrics_address),
        ));
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

    fn valid() -> ProxyConfig {
        let mut config = ProxyConfig::default();
        config.upstream.address = "proxy.internal:3128".into();
        config
    }

    #[test]
    fn accepts_valid_config() {
        assert_eq!(validate_config(&valid()), Ok(()));
    }

    #[test]
    fn default_config_needs_upstream() {
        let errors = validate_config(&ProxyConfig::default()).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "upstream.address");
    }

    #[test]
    fn unclosed_ipv6_bracket_is_rejected() {
        let mut config = valid();
        config.resolver.forced_destination = Some("[::1:80".into());
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "resolver.forced_destination");
    }

    #[test]
    fn reports_every_problem() {
        let mut config = valid();
        config.listener.bind_address = "nowhere".into();
        config.upstream.address = "no-port".into();
        config.resolver.forced_destination = Some("example.com:http".into());
        config.relay.buffer_size = 0;

        let fields: Vec<_> = validate_config(&config)
            .unwrap_err()
            .into_iter()
            .map(|e| e.field)
            .collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "upstream.address",
                "resolver.forced_destination",
                "relay.buffer_size",
            ]
        );
    }
}
