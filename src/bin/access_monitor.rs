//! Access monitor
//!
//! Subscribes to the detections of every node, resolves which node raised
//! each one and logs an access decision. The decision is a placeholder
//! (always granted); no alarm policy is applied.
//!
//! Usage:
//!   cargo run --bin access-monitor -- --config config/dev.toml

use clap::Parser;
use fusion_gateway::domain::types::PersonId;
use fusion_gateway::infra::{Config, ConfigArgs};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "access-monitor")]
#[command(about = "Logs access decisions for published detections")]
struct Args {
    #[command(flatten)]
    config: ConfigArgs,

    /// Subscription filter covering the detection topics of all nodes
    #[arg(long, default_value = "/Nodes/+/Tracking/Detection/+")]
    filter: String,
}

/// The subset of a detection record the monitor needs
#[derive(Debug, Deserialize)]
struct Detection {
    timestamp: String,
    person: PersonId,
    detection: bool,
}

#[derive(Debug, Serialize)]
struct AccessDecision {
    node: String,
    location: String,
    timestamp: String,
    person: PersonId,
    access: bool,
}

/// Node id is the segment following `Nodes` in the topic
fn node_from_topic(topic: &str) -> Option<&str> {
    let mut segments = topic.split('/').skip_while(|s| *s != "Nodes");
    segments.next()?;
    segments.next().filter(|s| !s.is_empty())
}

fn decide(config: &Config, topic: &str, payload: &[u8]) -> anyhow::Result<Option<AccessDecision>> {
    let detection: Detection = serde_json::from_slice(payload)?;
    if !detection.detection {
        return Ok(None);
    }
    let node = node_from_topic(topic).unwrap_or("unknown").to_string();
    let location = if node == config.node_id() {
        config.node_location().to_string()
    } else {
        "unknown".to_string()
    };
    Ok(Some(AccessDecision {
        node,
        location,
        timestamp: detection.timestamp,
        person: detection.person,
        access: true,
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = Args::parse();
    let config = args.config.load();

    let client_id = format!("access-monitor-{}", std::process::id());
    let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
    mqttoptions.set_keep_alive(Duration::from_secs(config.mqtt_keep_alive_secs().max(1)));
    if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
        mqttoptions.set_credentials(username, password);
    }

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 100);
    client.subscribe(&args.filter, QoS::AtLeastOnce).await?;
    info!(filter = %args.filter, "access_monitor_subscribed");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown_signal_received");
                return Ok(());
            }
            result = eventloop.poll() => {
                match result {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        match decide(&config, &publish.topic, &publish.payload) {
                            Ok(Some(decision)) => info!(
                                node = %decision.node,
                                location = %decision.location,
                                person = %decision.person,
                                timestamp = %decision.timestamp,
                                access = %decision.access,
                                decision = %serde_json::to_string(&decision).unwrap_or_default(),
                                "access_decision"
                            ),
                            Ok(None) => {}
                            Err(e) => warn!(topic = %publish.topic, error = %e, "detection_invalid"),
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => info!("mqtt_connected"),
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "mqtt_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }
}
