//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, handle bound).
    pub listener: ListenerConfig,

    /// Outbound connection settings.
    pub upstream: UpstreamConfig,

    /// Buffer sizes for request/response framing.
    pub protocol: ProtocolConfig,

    /// mDNS discovery settings.
    pub discovery: DiscoveryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:9097").
    pub bind_address: String,

    /// Maximum number of open connection handles (inbound + outbound).
    /// Accepts beyond this bound are closed immediately.
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:9097".to_string(),
            max_connections: 1024,
        }
    }
}

/// Outbound (origin) connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Port used when the forwarded host carries none.
    pub default_port: u16,

    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl UpstreamConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            default_port: 80,
            connect_timeout_secs: 5,
        }
    }
}

/// Framing limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Size of the per-read buffer.
    pub read_buffer_bytes: usize,

    /// Upper bound on a buffered origin response header block.
    pub max_header_bytes: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            read_buffer_bytes: 2048,
            max_header_bytes: 16 * 1024,
        }
    }
}

/// mDNS discovery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Run the mDNS browser at all.
    pub enabled: bool,

    /// Service type to browse (PTR query name).
    pub service_type: String,

    /// Interval between discovery queries in seconds.
    pub refresh_interval_secs: u64,

    /// Only cache services whose `vendor` TXT property equals this value.
    pub vendor: Option<String>,
}

impl DiscoveryConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            service_type: "_http._tcp.local.".to_string(),
            refresh_interval_secs: 10,
            vendor: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human format.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9098".to_string(),
        }
    }
}
