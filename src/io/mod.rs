//! IO modules - external system interfaces
//!
//! - `mqtt` - MQTT ingress for sensor node readings
//! - `mqtt_egress` - MQTT publisher for the window flag and detections
//! - `egress_channel` - Typed channel for MQTT egress messages

pub mod egress_channel;
pub mod mqtt;
pub mod mqtt_egress;

pub use egress_channel::{
    create_egress_channel, DetectionPayload, EgressMessage, EgressReceiver, EgressSender,
};
pub use mqtt_egress::MqttPublisher;
