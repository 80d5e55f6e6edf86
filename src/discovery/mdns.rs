//! mDNS browsing through `mdns-sd`.
//!
//! Each `issue_query` restarts the browse for the configured service type,
//! which makes the daemon send a fresh PTR query and replay what it already
//! knows. Resolved services become JSON payloads of the form
//! `{"name","address","port","properties"}`.

use mdns_sd::{Receiver, ServiceDaemon, ServiceEvent, ServiceInfo};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::config::DiscoveryConfig;
use crate::discovery::{DiscoveryError, DiscoverySource, DiscoveryUpdate};

const PROP_VENDOR: &str = "vendor";

/// Browses one service type on the local network.
pub struct MdnsBrowser {
    daemon: ServiceDaemon,
    service_type: String,
    vendor: Option<String>,
    events: Option<Receiver<ServiceEvent>>,
}

impl MdnsBrowser {
    /// Start the mDNS daemon. No query is sent until `issue_query`.
    pub fn new(config: &DiscoveryConfig) -> Result<Self, DiscoveryError> {
        let daemon = ServiceDaemon::new()?;
        info!(service_type = %config.service_type, vendor = ?config.vendor, "mDNS daemon started");
        Ok(Self {
            daemon,
            service_type: config.service_type.clone(),
            vendor: config.vendor.clone(),
            events: None,
        })
    }

    fn translate(&self, event: ServiceEvent) -> Option<DiscoveryUpdate> {
        match event {
            ServiceEvent::ServiceResolved(info) => {
                if !vendor_matches(&info, self.vendor.as_deref()) {
                    debug!(name = %info.get_fullname(), "mDNS: ignoring service from other vendor");
                    return None;
                }
                debug!(name = %info.get_fullname(), "mDNS: service resolved");
                Some(DiscoveryUpdate::Resolved {
                    name: info.get_fullname().to_string(),
                    payload: service_payload(&info).to_string(),
                })
            }
            ServiceEvent::ServiceRemoved(_ty, fullname) => {
                debug!(name = %fullname, "mDNS: service removed");
                Some(DiscoveryUpdate::Removed { name: fullname })
            }
            ServiceEvent::SearchStarted(_) => {
                debug!("mDNS: browse started");
                None
            }
            _ => None,
        }
    }
}

impl DiscoverySource for MdnsBrowser {
    fn issue_query(&mut self) -> Result<(), DiscoveryError> {
        // Replacing the receiver ends the previous browse.
        self.events = Some(self.daemon.browse(&self.service_type)?);
        Ok(())
    }

    async fn next_update(&mut self) -> DiscoveryUpdate {
        loop {
            let Some(events) = self.events.as_ref() else {
                return std::future::pending().await;
            };
            let received = events.recv_async().await;
            match received {
                Ok(event) => {
                    if let Some(update) = self.translate(event) {
                        return update;
                    }
                }
                Err(_) => {
                    debug!("mDNS browse channel closed");
                    self.events = None;
                }
            }
        }
    }

    fn shutdown(&mut self) {
        self.events = None;
        if let Err(e) = self.daemon.shutdown() {
            warn!("mDNS: failed to shut daemon down: {e}");
        }
    }
}

fn vendor_matches(info: &ServiceInfo, vendor: Option<&str>) -> bool {
    match vendor {
        None => true,
        Some(wanted) => info.get_property_val_str(PROP_VENDOR) == Some(wanted),
    }
}

/// JSON payload describing a resolved service.
pub fn service_payload(info: &ServiceInfo) -> Value {
    let addresses = info.get_addresses();
    let address = addresses
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addresses.iter().next())
        .map(ToString::to_string);

    let properties: Map<String, Value> = info
        .get_properties()
        .iter()
        .map(|p| (p.key().to_string(), Value::String(p.val_str().to_string())))
        .collect();

    json!({
        "name": info.get_fullname(),
        "address": address,
        "port": info.get_port(),
        "properties": properties,
    })
}
