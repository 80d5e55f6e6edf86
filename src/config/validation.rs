//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (buffers > 0, intervals > 0, ports valid)
//! - Check addresses parse before anything binds
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// A single semantic problem with a loaded configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("protocol.max_header_bytes ({max}) is smaller than protocol.read_buffer_bytes ({read})")]
    HeaderLimitBelowBuffer { max: usize, read: usize },

    #[error("discovery.service_type {0:?} must end with \".local.\"")]
    ServiceType(String),

    #[error("observability.log_level {0:?} is not one of trace, debug, info, warn, error")]
    LogLevel(String),
}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::Zero { field: "listener.max_connections" });
    }

    if config.upstream.default_port == 0 {
        errors.push(ValidationError::Zero { field: "upstream.default_port" });
    }
    if config.upstream.connect_timeout_secs == 0 {
        errors.push(ValidationError::Zero { field: "upstream.connect_timeout_secs" });
    }

    if config.protocol.read_buffer_bytes == 0 {
        errors.push(ValidationError::Zero { field: "protocol.read_buffer_bytes" });
    } else if config.protocol.max_header_bytes < config.protocol.read_buffer_bytes {
        errors.push(ValidationError::HeaderLimitBelowBuffer {
            max: config.protocol.max_header_bytes,
            read: config.protocol.read_buffer_bytes,
        });
    }

    if config.discovery.refresh_interval_secs == 0 {
        errors.push(ValidationError::Zero { field: "discovery.refresh_interval_secs" });
    }
    if !config.discovery.service_type.ends_with(".local.") {
        errors.push(ValidationError::ServiceType(config.discovery.service_type.clone()));
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !matches!(level.as_str(), "trace" | "debug" | "info" | "warn" | "error") {
        errors.push(ValidationError::LogLevel(config.observability.log_level.clone()));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
