//! MQTT publisher for egress messages
//!
//! - window flag topic - JSON `true`/`false` window state (QoS 0)
//! - detection topic - one labelled record per detected person (QoS 1)

use crate::infra::config::Config;
use crate::io::egress_channel::{EgressMessage, EgressReceiver};
use rumqttc::{AsyncClient, Event, MqttOptions, Outgoing, Packet, QoS};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Upper bound on waiting for the final publishes to leave the socket
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// MQTT publisher actor
///
/// Receives messages from the egress channel and publishes to MQTT topics.
/// Lives until every `EgressSender` is dropped, so nothing queued at
/// shutdown is lost.
pub struct MqttPublisher {
    client: AsyncClient,
    poller: JoinHandle<()>,
    rx: EgressReceiver,
    window_flag_topic: String,
    config: Config,
}

impl MqttPublisher {
    /// Create a new MQTT publisher connected to the configured broker
    pub fn new(config: &Config, rx: EgressReceiver) -> Self {
        let client_id = format!("{}-egress-{}", config.mqtt_client_id(), std::process::id());
        let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
        mqttoptions.set_keep_alive(Duration::from_secs(config.mqtt_keep_alive_secs().max(1)));
        mqttoptions.set_clean_session(true);

        if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
            mqttoptions.set_credentials(username, password);
        }

        let (client, eventloop) = AsyncClient::new(mqttoptions, 100);

        let poller = tokio::spawn(async move {
            let mut eventloop = eventloop;
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("mqtt_egress_connected");
                    }
                    Ok(Event::Incoming(Packet::PubAck(_))) => {
                        debug!("mqtt_egress_puback");
                    }
                    // Everything requested before the disconnect has been written
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "mqtt_egress_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Self {
            client,
            poller,
            rx,
            window_flag_topic: config.window_flag_topic().to_string(),
            config: config.clone(),
        }
    }

    /// Publish until all senders are dropped and the channel is drained
    pub async fn run(mut self) {
        info!(
            window_flag = %self.window_flag_topic,
            detection = %self.config.detection_topic(),
            "mqtt_egress_started"
        );

        while let Some(msg) = self.rx.recv().await {
            self.publish_message(msg).await;
        }

        info!("mqtt_egress_shutdown");
        if let Err(e) = self.client.disconnect().await {
            warn!(error = %e, "mqtt_egress_disconnect_failed");
        }
        match tokio::time::timeout(DISCONNECT_TIMEOUT, &mut self.poller).await {
            Ok(_) => debug!("mqtt_egress_flushed"),
            Err(_) => {
                warn!("mqtt_egress_flush_timeout");
                self.poller.abort();
            }
        }
    }

    async fn publish_message(&self, msg: EgressMessage) {
        match msg {
            EgressMessage::WindowState(open) => {
                let payload = if open { "true" } else { "false" };
                if let Err(e) = self
                    .client
                    .publish(&self.window_flag_topic, QoS::AtMostOnce, false, payload.as_bytes())
                    .await
                {
                    error!(error = %e, "mqtt_egress_window_flag_failed");
                }
            }
            EgressMessage::Detection(payload) => {
                let topic = self.config.detection_topic_for(payload.person_id);
                if let Err(e) = self
                    .client
                    .publish(&topic, QoS::AtLeastOnce, false, payload.json.as_bytes())
                    .await
                {
                    error!(person = %payload.person_id, error = %e, "mqtt_egress_detection_failed");
                }
            }
        }
    }
}
