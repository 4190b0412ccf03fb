//! Configuration loading from TOML files
//!
//! Every binary flattens [`ConfigArgs`] into its clap arguments, so the file
//! is selected the same way everywhere:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use crate::domain::types::Modality;
use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Base feature weights, in column order
/// [presence, conndevices, rfiduser, power, camerauser]
const DEFAULT_BASE_WEIGHTS: [f64; 5] = [0.02, 0.1, 2.0, 0.03, 3.0];
const DEFAULT_WIFI_SHARE_WEIGHT: f64 = 1.0;
const DEFAULT_WIFI_RSSI_WEIGHT: f64 = 0.0;
const DEFAULT_BIAS: f64 = -3.0;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierMode {
    Logistic,
    Http,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_node_id")]
    pub id: String,
    /// Human-readable location attached to access decisions
    #[serde(default = "default_node_location")]
    pub location: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self { id: default_node_id(), location: default_node_location() }
    }
}

fn default_node_id() -> String {
    "node_1".to_string()
}

fn default_node_location() -> String {
    "unassigned".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            client_id: default_client_id(),
            username: None,
            password: None,
            keep_alive_secs: default_keep_alive_secs(),
        }
    }
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "fusion-gateway".to_string()
}

fn default_keep_alive_secs() -> u64 {
    2
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopicsConfig {
    /// Subscription filter for sensor readings; the last segment names the modality
    #[serde(default = "default_sensors_topic")]
    pub sensors: String,
    /// Window open/closed flag broadcast to sensor nodes
    #[serde(default = "default_window_flag_topic")]
    pub window_flag: String,
    /// Detection topic template; `{person}` is replaced by the person ID
    #[serde(default = "default_detection_topic")]
    pub detection: String,
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            sensors: default_sensors_topic(),
            window_flag: default_window_flag_topic(),
            detection: default_detection_topic(),
        }
    }
}

fn default_sensors_topic() -> String {
    "/Nodes/node_1/Tracking/Sensor/+".to_string()
}

fn default_window_flag_topic() -> String {
    "/Nodes/node_1/Tracking/TxFlag".to_string()
}

fn default_detection_topic() -> String {
    "/Nodes/node_1/Tracking/Detection/{person}".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_window_duration_ms")]
    pub duration_ms: u64,
    /// Capacity of the ingest channel feeding the window controller
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self { duration_ms: default_window_duration_ms(), channel_capacity: default_channel_capacity() }
    }
}

fn default_window_duration_ms() -> u64 {
    200
}

fn default_channel_capacity() -> usize {
    1000
}

/// Optional per-person WiFi feature columns
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default)]
    pub wifi_share: bool,
    #[serde(default)]
    pub wifi_rssi: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_classifier_mode")]
    pub mode: ClassifierMode,
    /// One weight per active feature column
    #[serde(default)]
    pub weights: Option<Vec<f64>>,
    #[serde(default = "default_bias")]
    pub bias: f64,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_http_url")]
    pub http_url: String,
    #[serde(default = "default_classifier_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            mode: default_classifier_mode(),
            weights: None,
            bias: default_bias(),
            threshold: default_threshold(),
            http_url: default_http_url(),
            timeout_ms: default_classifier_timeout_ms(),
        }
    }
}

fn default_classifier_mode() -> ClassifierMode {
    ClassifierMode::Logistic
}

fn default_bias() -> f64 {
    DEFAULT_BIAS
}

fn default_threshold() -> f64 {
    0.5
}

fn default_http_url() -> String {
    "http://127.0.0.1:8080/classify".to_string()
}

fn default_classifier_timeout_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_broker_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self { enabled: false, bind_address: default_broker_bind_address(), port: default_mqtt_port() }
    }
}

fn default_broker_bind_address() -> String {
    "0.0.0.0".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval_secs")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval_secs() }
    }
}

fn default_metrics_interval_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub topics: TopicsConfig,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    node_id: String,
    node_location: String,
    mqtt_host: String,
    mqtt_port: u16,
    mqtt_client_id: String,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
    mqtt_keep_alive_secs: u64,
    sensors_topic: String,
    window_flag_topic: String,
    detection_topic: String,
    window_duration_ms: u64,
    channel_capacity: usize,
    wifi_share: bool,
    wifi_rssi: bool,
    classifier_mode: ClassifierMode,
    classifier_weights: Option<Vec<f64>>,
    classifier_bias: f64,
    classifier_threshold: f64,
    classifier_http_url: String,
    classifier_timeout_ms: u64,
    broker_enabled: bool,
    broker_bind_address: String,
    broker_port: u16,
    metrics_interval_secs: u64,
    config_file: String,
}

/// Config file selection shared by every binary
#[derive(clap::Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Path to TOML configuration file
    #[arg(short, long, env = "CONFIG_FILE", default_value = "config/dev.toml")]
    pub config: String,
}

impl ConfigArgs {
    /// Load the selected file, falling back to defaults
    pub fn load(&self) -> Config {
        Config::load_from_path(&self.config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            node_id: toml_config.node.id,
            node_location: toml_config.node.location,
            mqtt_host: toml_config.mqtt.host,
            mqtt_port: toml_config.mqtt.port,
            mqtt_client_id: toml_config.mqtt.client_id,
            mqtt_username: toml_config.mqtt.username,
            mqtt_password: toml_config.mqtt.password,
            mqtt_keep_alive_secs: toml_config.mqtt.keep_alive_secs,
            sensors_topic: toml_config.topics.sensors,
            window_flag_topic: toml_config.topics.window_flag,
            detection_topic: toml_config.topics.detection,
            window_duration_ms: toml_config.window.duration_ms,
            channel_capacity: toml_config.window.channel_capacity,
            wifi_share: toml_config.features.wifi_share,
            wifi_rssi: toml_config.features.wifi_rssi,
            classifier_mode: toml_config.classifier.mode,
            classifier_weights: toml_config.classifier.weights,
            classifier_bias: toml_config.classifier.bias,
            classifier_threshold: toml_config.classifier.threshold,
            classifier_http_url: toml_config.classifier.http_url,
            classifier_timeout_ms: toml_config.classifier.timeout_ms,
            broker_enabled: toml_config.broker.enabled,
            broker_bind_address: toml_config.broker.bind_address,
            broker_port: toml_config.broker.port,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file,
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    /// Load configuration from an explicit path, falling back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    /// Detection topic for a person
    pub fn detection_topic_for(&self, person: impl std::fmt::Display) -> String {
        self.detection_topic.replace("{person}", &person.to_string())
    }

    /// Logistic weights for the active column set
    ///
    /// Uses the configured weights verbatim when present, otherwise the
    /// built-in defaults extended for the active WiFi columns.
    pub fn classifier_weights(&self) -> Vec<f64> {
        if let Some(weights) = &self.classifier_weights {
            return weights.clone();
        }
        let mut weights = DEFAULT_BASE_WEIGHTS.to_vec();
        if self.wifi_share {
            weights.push(DEFAULT_WIFI_SHARE_WEIGHT);
        }
        if self.wifi_rssi {
            weights.push(DEFAULT_WIFI_RSSI_WEIGHT);
        }
        weights
    }

    /// Publish topic for one modality, derived from the sensors filter
    ///
    /// `/Nodes/node_1/Tracking/Sensor/+` gives `/Nodes/node_1/Tracking/Sensor/Rfid`.
    pub fn sensor_topic_for(&self, modality: Modality) -> String {
        let prefix = self.sensors_topic.trim_end_matches(['+', '#']).trim_end_matches('/');
        format!("{}/{}", prefix, modality.topic_segment())
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn node_location(&self) -> &str {
        &self.node_location
    }

    pub fn mqtt_host(&self) -> &str {
        &self.mqtt_host
    }

    pub fn mqtt_port(&self) -> u16 {
        self.mqtt_port
    }

    pub fn mqtt_client_id(&self) -> &str {
        &self.mqtt_client_id
    }

    pub fn mqtt_username(&self) -> Option<&str> {
        self.mqtt_username.as_deref()
    }

    pub fn mqtt_password(&self) -> Option<&str> {
        self.mqtt_password.as_deref()
    }

    pub fn mqtt_keep_alive_secs(&self) -> u64 {
        self.mqtt_keep_alive_secs
    }

    pub fn sensors_topic(&self) -> &str {
        &self.sensors_topic
    }

    pub fn window_flag_topic(&self) -> &str {
        &self.window_flag_topic
    }

    pub fn detection_topic(&self) -> &str {
        &self.detection_topic
    }

    pub fn window_duration_ms(&self) -> u64 {
        self.window_duration_ms
    }

    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }

    pub fn wifi_share(&self) -> bool {
        self.wifi_share
    }

    pub fn wifi_rssi(&self) -> bool {
        self.wifi_rssi
    }

    pub fn classifier_mode(&self) -> &ClassifierMode {
        &self.classifier_mode
    }

    pub fn classifier_bias(&self) -> f64 {
        self.classifier_bias
    }

    pub fn classifier_threshold(&self) -> f64 {
        self.classifier_threshold
    }

    pub fn classifier_http_url(&self) -> &str {
        &self.classifier_http_url
    }

    pub fn classifier_timeout_ms(&self) -> u64 {
        self.classifier_timeout_ms
    }

    pub fn broker_enabled(&self) -> bool {
        self.broker_enabled
    }

    pub fn broker_bind_address(&self) -> &str {
        &self.broker_bind_address
    }

    pub fn broker_port(&self) -> u16 {
        self.broker_port
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to set the window duration
    pub fn with_window_duration_ms(mut self, ms: u64) -> Self {
        self.window_duration_ms = ms;
        self
    }

    /// Builder method for tests to toggle the per-person WiFi columns
    pub fn with_wifi_columns(mut self, share: bool, rssi: bool) -> Self {
        self.wifi_share = share;
        self.wifi_rssi = rssi;
        self
    }
}
