//! Optional embedded MQTT broker (rumqttd) for standalone nodes

use crate::infra::config::Config as AppConfig;
use rumqttd::{Broker, Config, ConnectionSettings, RouterConfig, ServerSettings};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::thread;
use tracing::{info, warn};

/// Parse the configured listen address for the broker
fn listen_addr(app_config: &AppConfig) -> Option<SocketAddr> {
    let addr_str = format!("{}:{}", app_config.broker_bind_address(), app_config.broker_port());
    match addr_str.parse() {
        Ok(addr) => Some(addr),
        Err(e) => {
            warn!(error = %e, addr = %addr_str, "broker_invalid_bind_address");
            None
        }
    }
}

/// Start the embedded broker if enabled in config
///
/// Returns true if a broker thread was spawned.
pub fn start_embedded_broker(app_config: &AppConfig) -> bool {
    if !app_config.broker_enabled() {
        return false;
    }
    let Some(listen) = listen_addr(app_config) else {
        return false;
    };

    // Sensor payloads are small JSON objects; keep the router lean
    let router_config = RouterConfig {
        max_segment_size: 10 * 1024 * 1024,
        max_segment_count: 10,
        max_connections: 1000,
        max_outgoing_packet_count: 200,
        initialized_filters: None,
        ..Default::default()
    };

    let mut servers = HashMap::new();
    servers.insert(
        "v4".to_string(),
        ServerSettings {
            name: "v4".to_string(),
            listen,
            tls: None,
            next_connection_delay_ms: 1,
            connections: ConnectionSettings {
                connection_timeout_ms: 5000,
                max_payload_size: 65536,
                max_inflight_count: 200,
                auth: None,
                dynamic_filters: false,
                external_auth: None,
            },
        },
    );

    let config = Config {
        id: 0,
        router: router_config,
        v4: Some(servers),
        v5: None,
        ws: None,
        prometheus: None,
        metrics: None,
        bridge: None,
        console: None,
        cluster: None,
    };

    thread::spawn(move || {
        let mut broker = Broker::new(config);
        // start() blocks for the lifetime of the broker
        if let Err(e) = broker.start() {
            warn!(error = %e, "broker_start_failed");
        }
    });

    // Give broker time to bind before clients connect
    thread::sleep(std::time::Duration::from_millis(100));
    info!(listen = %listen, "broker_started");
    true
}
