//! MQTT ingress for sensor node readings
//!
//! Topic layout: `/Nodes/<node>/Tracking/Sensor/<Modality>`. The modality
//! comes from the last topic segment; the payload is the JSON reading.

use crate::domain::types::{
    CameraReading, Modality, PresenceReading, RawReading, RfidReading, WifiReading,
};
use crate::error::{FusionError, Result};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, trace, warn};

/// Resolve the modality from the last topic segment
pub fn modality_from_topic(topic: &str) -> Result<Modality> {
    let segment = topic.rsplit('/').next().unwrap_or(topic);
    segment.parse().map_err(|_| FusionError::UnknownModality(segment.to_string()))
}

fn decode<T: DeserializeOwned>(modality: Modality, payload: &[u8]) -> Result<T> {
    serde_json::from_slice(payload)
        .map_err(|e| FusionError::MalformedReading { modality, reason: e.to_string() })
}

/// Decode one reading payload for a known modality
pub fn parse_reading(modality: Modality, payload: &[u8]) -> Result<RawReading> {
    let reading = match modality {
        Modality::Camera => RawReading::Camera(decode::<CameraReading>(modality, payload)?),
        Modality::Presence => RawReading::Presence(decode::<PresenceReading>(modality, payload)?),
        Modality::Rfid => RawReading::Rfid(decode::<RfidReading>(modality, payload)?),
        Modality::Wifi => {
            let wifi: WifiReading = decode(modality, payload)?;
            if wifi.connected_device_count < 0 {
                return Err(FusionError::MalformedReading {
                    modality,
                    reason: format!("negative device count {}", wifi.connected_device_count),
                });
            }
            RawReading::Wifi(wifi)
        }
    };
    Ok(reading)
}

/// Topic and payload to a reading
pub fn parse_message(topic: &str, payload: &[u8]) -> Result<RawReading> {
    parse_reading(modality_from_topic(topic)?, payload)
}

/// Start the MQTT client and forward parsed readings to the window controller
///
/// Readings are sent via try_send to avoid blocking the MQTT eventloop.
/// Dropped and malformed readings are counted in metrics and logged (rate-limited).
pub async fn start_mqtt_client(
    config: &Config,
    reading_tx: mpsc::Sender<RawReading>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let client_id = format!("{}-ingress-{}", config.mqtt_client_id(), std::process::id());
    let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
    mqttoptions.set_keep_alive(Duration::from_secs(config.mqtt_keep_alive_secs().max(1)));

    if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
        mqttoptions.set_credentials(username, password);
    }

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 100);
    client.subscribe(config.sensors_topic(), QoS::AtMostOnce).await?;

    info!(
        topic = %config.sensors_topic(),
        host = %config.mqtt_host(),
        port = %config.mqtt_port(),
        "mqtt_ingress_subscribed"
    );

    // Rate-limit warnings to 1 per second
    let mut last_drop_warn = Instant::now() - Duration::from_secs(2);
    let mut last_malformed_warn = Instant::now() - Duration::from_secs(2);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("mqtt_ingress_shutdown");
                    return Ok(());
                }
            }
            result = eventloop.poll() => {
                match result {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let reading = match parse_message(&publish.topic, &publish.payload) {
                            Ok(reading) => reading,
                            Err(e) => {
                                metrics.record_malformed();
                                if last_malformed_warn.elapsed() > Duration::from_secs(1) {
                                    warn!(topic = %publish.topic, error = %e, "reading_malformed");
                                    last_malformed_warn = Instant::now();
                                }
                                continue;
                            }
                        };

                        trace!(topic = %publish.topic, reading = ?reading, "reading_received");
                        match reading_tx.try_send(reading) {
                            Ok(()) => {}
                            Err(TrySendError::Full(_)) => {
                                metrics.record_dropped();
                                if last_drop_warn.elapsed() > Duration::from_secs(1) {
                                    warn!("reading_dropped: channel full");
                                    last_drop_warn = Instant::now();
                                }
                            }
                            Err(TrySendError::Closed(_)) => {
                                warn!("reading channel closed");
                                return Ok(());
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("mqtt_ingress_connected");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "mqtt_ingress_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }
}
