//! Sensor node simulator
//!
//! Publishes scripted camera, presence, RFID and WiFi readings on the
//! node's sensor topics. Follows the gateway's window flag: while a window
//! is open every reading is sent, otherwise only readings passing the
//! node's local admission check.
//!
//! Usage:
//!   cargo run --bin sensor-node -- --config config/dev.toml
//!   cargo run --bin sensor-node -- --persons 4 --interval-ms 20 --ticks 500

use clap::Parser;
use fusion_gateway::domain::types::{
    CameraReading, PersonId, PresenceReading, RawReading, RfidReading, Timestamp, WifiReading,
};
use fusion_gateway::infra::ConfigArgs;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sensor-node")]
#[command(about = "Simulated sensor node publishing scripted readings")]
struct Args {
    #[command(flatten)]
    config: ConfigArgs,

    /// Number of distinct people in the script
    #[arg(long, default_value = "3")]
    persons: i64,

    /// Delay between script ticks
    #[arg(long, default_value = "50")]
    interval_ms: u64,

    /// Stop after this many ticks (0 = run forever)
    #[arg(long, default_value = "0")]
    ticks: u64,
}

/// Seconds since the epoch with millisecond precision, as nodes report it
fn now_token() -> Timestamp {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
    let millis = nanos / 1_000_000;
    Timestamp(format!("{}.{:03}", millis / 1000, millis % 1000))
}

/// Readings produced at one tick of the script
///
/// Values cycle deterministically so a run is reproducible.
fn script_tick(tick: u64, persons: i64) -> Vec<RawReading> {
    let persons = persons.max(1);
    let timestamp = now_token();
    let person = |offset: u64| PersonId(((tick + offset) % persons as u64) as i64 + 1);

    vec![
        RawReading::Camera(CameraReading {
            sensor_id: "camera-1".to_string(),
            timestamp: timestamp.clone(),
            person_id: person(0),
        }),
        RawReading::Presence(PresenceReading {
            sensor_id: "presence-1".to_string(),
            timestamp: timestamp.clone(),
            detected: tick % 7 == 0,
        }),
        RawReading::Rfid(RfidReading {
            sensor_id: "rfid-1".to_string(),
            timestamp: timestamp.clone(),
            person_id: person(tick / 2),
            power: ((tick * 37) % 100) as f64,
        }),
        RawReading::Wifi(WifiReading {
            sensor_id: "wifi-1".to_string(),
            timestamp,
            connected_device_count: (tick % 4) as i64,
            person_id: Some(person(1)),
            rssi: Some(-40.0 - ((tick * 13) % 50) as f64),
        }),
    ]
}

fn parse_flag(payload: &[u8]) -> Option<bool> {
    serde_json::from_slice::<bool>(payload).ok()
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

    let client_id = format!("sensor-node-{}-{}", config.node_id(), std::process::id());
    let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
    mqttoptions.set_keep_alive(Duration::from_secs(config.mqtt_keep_alive_secs().max(1)));
    if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
        mqttoptions.set_credentials(username, password);
    }

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 100);
    client.subscribe(config.window_flag_topic(), QoS::AtMostOnce).await?;

    info!(
        node_id = %config.node_id(),
        window_flag = %config.window_flag_topic(),
        persons = %args.persons,
        interval_ms = %args.interval_ms,
        "sensor_node_started"
    );

    // Tracks the gateway's window flag
    let window_open = Arc::new(AtomicBool::new(false));
    let flag = window_open.clone();
    let flag_topic = config.window_flag_topic().to_string();
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) if publish.topic == flag_topic => {
                    match parse_flag(&publish.payload) {
                        Some(open) => {
                            flag.store(open, Ordering::Release);
                            debug!(open = %open, "window_flag");
                        }
                        None => warn!(payload = ?publish.payload, "window_flag_invalid"),
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
    });

    let mut interval = tokio::time::interval(Duration::from_millis(args.interval_ms.max(1)));
    let mut tick: u64 = 0;
    let mut sent: u64 = 0;
    let mut held: u64 = 0;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown_signal_received");
                break;
            }
            _ = interval.tick() => {
                let open = window_open.load(Ordering::Acquire);
                for reading in script_tick(tick, args.persons) {
                    if !open && !reading.passes_local_admission() {
                        held += 1;
                        continue;
                    }
                    let topic = config.sensor_topic_for(reading.modality());
                    let payload = reading.to_payload()?;
                    if let Err(e) = client.publish(topic, QoS::AtMostOnce, false, payload).await {
                        warn!(error = %e, "reading_publish_failed");
                        continue;
                    }
                    sent += 1;
                }
                tick += 1;
                if args.ticks > 0 && tick >= args.ticks {
                    break;
                }
            }
        }
    }

    info!(ticks = %tick, sent = %sent, held = %held, "sensor_node_stopped");
    Ok(())
}
