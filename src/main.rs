//! Fusion gateway - windowed multi-modal sensor fusion
//!
//! Collects camera, presence, RFID and WiFi readings from sensor nodes over
//! MQTT in short windows, fuses them into per-person feature rows, runs a
//! classifier and publishes positive detections.
//!
//! Module structure:
//! - `domain/` - Readings, window summaries, fused records
//! - `io/` - MQTT ingress and egress
//! - `services/` - Store, window controller, fusion pipeline
//! - `infra/` - Config, Metrics, Broker

use anyhow::Context;
use clap::Parser;
use fusion_gateway::infra::{ConfigArgs, Metrics};
use fusion_gateway::io::{create_egress_channel, MqttPublisher};
use fusion_gateway::services::{classifier, create_window_controller, FusionPipeline, ModalityColumns};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Fusion gateway - windowed sensor fusion node
#[derive(Parser, Debug)]
#[command(name = "fusion-gateway", version, about)]
struct Args {
    #[command(flatten)]
    config: ConfigArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides; default INFO
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(git_hash = %env!("GIT_HASH"), profile = %env!("BUILD_PROFILE"), "fusion-gateway starting");

    let args = Args::parse();
    let config = args.config.load();

    fusion_gateway::infra::broker::start_embedded_broker(&config);

    let columns = ModalityColumns::from_config(&config);
    info!(
        config_file = %config.config_file(),
        node_id = %config.node_id(),
        mqtt_host = %config.mqtt_host(),
        mqtt_port = %config.mqtt_port(),
        sensors_topic = %config.sensors_topic(),
        window_flag_topic = %config.window_flag_topic(),
        window_duration_ms = %config.window_duration_ms(),
        classifier_mode = ?config.classifier_mode(),
        columns = ?columns.columns().iter().map(|c| c.name()).collect::<Vec<_>>(),
        "config_loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());

    // Egress: window flag and detections
    let (egress_sender, egress_rx) = create_egress_channel(config.channel_capacity());
    // Runs until the controller and pipeline drop their senders
    let publisher = MqttPublisher::new(&config, egress_rx);
    let publisher_handle = tokio::spawn(publisher.run());

    // Periodic metrics summary
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    let classifier = classifier::from_config(&config).context("failed to build classifier")?;
    let pipeline = Arc::new(FusionPipeline::new(
        classifier,
        columns,
        Some(egress_sender.clone()),
        metrics.clone(),
    ));

    let (reading_tx, controller) = create_window_controller(
        Duration::from_millis(config.window_duration_ms()),
        config.channel_capacity(),
        pipeline,
        Some(egress_sender),
        metrics.clone(),
    );

    // Start MQTT ingress
    let mqtt_config = config.clone();
    let mqtt_metrics = metrics.clone();
    let mqtt_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        if let Err(e) = fusion_gateway::io::mqtt::start_mqtt_client(
            &mqtt_config,
            reading_tx,
            mqtt_metrics,
            mqtt_shutdown,
        )
        .await
        {
            tracing::error!(error = %e, "MQTT ingress error");
        }
    });

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    // Run the window controller until shutdown, then let the publisher flush
    controller.run(shutdown_rx).await;
    if let Err(e) = publisher_handle.await {
        tracing::error!(error = %e, "mqtt_egress_task_failed");
    }

    metrics.report().log();
    info!("fusion-gateway shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_build_stamps_present() {
        assert!(!env!("GIT_HASH").is_empty());
        assert!(!env!("GIT_HASH").contains(char::is_whitespace));
        assert!(matches!(env!("BUILD_PROFILE"), "debug" | "release"));
    }
}
