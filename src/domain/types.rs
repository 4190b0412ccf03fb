//! Shared types for the fusion gateway

use serde::{Deserialize, Serialize};

/// Newtype wrapper for person IDs to provide type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct PersonId(pub i64);

impl std::fmt::Display for PersonId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque sensor timestamp token
///
/// Compared lexicographically. The empty token means "no timestamp" and is
/// what zero-valued summaries carry. Nodes may send it as a JSON string or
/// a number; both are kept as text.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Timestamp(pub String);

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum TimestampValue {
            Text(String),
            Integer(i64),
            Float(f64),
        }

        Ok(match TimestampValue::deserialize(deserializer)? {
            TimestampValue::Text(s) => Timestamp(s),
            TimestampValue::Integer(n) => Timestamp(n.to_string()),
            TimestampValue::Float(x) => Timestamp(x.to_string()),
        })
    }
}

impl Timestamp {
    pub fn empty() -> Self {
        Self(String::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Earliest non-empty token, or the empty token if all are empty
    pub fn earliest<'a, I>(tokens: I) -> Timestamp
    where
        I: IntoIterator<Item = &'a Timestamp>,
    {
        tokens.into_iter().filter(|t| !t.is_empty()).min().cloned().unwrap_or_default()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Timestamp {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Sensor modality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Camera,
    Presence,
    Rfid,
    Wifi,
}

impl Modality {
    pub const ALL: [Modality; 4] =
        [Modality::Camera, Modality::Presence, Modality::Rfid, Modality::Wifi];

    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Camera => "camera",
            Modality::Presence => "presence",
            Modality::Rfid => "rfid",
            Modality::Wifi => "wifi",
        }
    }

    /// Topic segment used by sensor nodes (e.g. `Sensor/Camera`)
    pub fn topic_segment(&self) -> &'static str {
        match self {
            Modality::Camera => "Camera",
            Modality::Presence => "Presence",
            Modality::Rfid => "Rfid",
            Modality::Wifi => "Wifi",
        }
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Modality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "camera" => Ok(Modality::Camera),
            "presence" => Ok(Modality::Presence),
            "rfid" => Ok(Modality::Rfid),
            "wifi" => Ok(Modality::Wifi),
            other => Err(other.to_string()),
        }
    }
}

/// Camera person sighting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraReading {
    #[serde(rename = "sensor")]
    pub sensor_id: String,
    pub timestamp: Timestamp,
    #[serde(rename = "person")]
    pub person_id: PersonId,
}

/// Binary presence detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceReading {
    #[serde(rename = "sensor")]
    pub sensor_id: String,
    pub timestamp: Timestamp,
    #[serde(rename = "detection")]
    pub detected: bool,
}

/// RFID tag read with received power
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RfidReading {
    #[serde(rename = "sensor")]
    pub sensor_id: String,
    pub timestamp: Timestamp,
    #[serde(rename = "person")]
    pub person_id: PersonId,
    pub power: f64,
}

/// WiFi connected-device count
///
/// Nodes running the per-person variant also report which person's device
/// was seen and its signal strength.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WifiReading {
    #[serde(rename = "sensor")]
    pub sensor_id: String,
    pub timestamp: Timestamp,
    #[serde(rename = "connecteddevices")]
    pub connected_device_count: i64,
    #[serde(rename = "person", default, skip_serializing_if = "Option::is_none")]
    pub person_id: Option<PersonId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rssi: Option<f64>,
}

/// Minimum RFID power a node sends unprompted
pub const RFID_ADMISSION_POWER: f64 = 60.0;
/// Minimum connected device count a node sends unprompted
pub const WIFI_ADMISSION_DEVICES: i64 = 2;

/// A raw reading, tagged by modality
#[derive(Debug, Clone, PartialEq)]
pub enum RawReading {
    Camera(CameraReading),
    Presence(PresenceReading),
    Rfid(RfidReading),
    Wifi(WifiReading),
}

impl RawReading {
    pub fn modality(&self) -> Modality {
        match self {
            RawReading::Camera(_) => Modality::Camera,
            RawReading::Presence(_) => Modality::Presence,
            RawReading::Rfid(_) => Modality::Rfid,
            RawReading::Wifi(_) => Modality::Wifi,
        }
    }

    pub fn timestamp(&self) -> &Timestamp {
        match self {
            RawReading::Camera(r) => &r.timestamp,
            RawReading::Presence(r) => &r.timestamp,
            RawReading::Rfid(r) => &r.timestamp,
            RawReading::Wifi(r) => &r.timestamp,
        }
    }

    /// Whether a node transmits this reading while the window flag is closed
    ///
    /// Outside a window only readings that suggest someone is present get
    /// through: presence hits, strong RFID reads and busy WiFi. Camera
    /// sightings are only sent while a window is open.
    pub fn passes_local_admission(&self) -> bool {
        match self {
            RawReading::Camera(_) => false,
            RawReading::Presence(r) => r.detected,
            RawReading::Rfid(r) => r.power >= RFID_ADMISSION_POWER,
            RawReading::Wifi(r) => r.connected_device_count >= WIFI_ADMISSION_DEVICES,
        }
    }

    /// Serialize the reading as a sensor node would publish it
    pub fn to_payload(&self) -> serde_json::Result<Vec<u8>> {
        match self {
            RawReading::Camera(r) => serde_json::to_vec(r),
            RawReading::Presence(r) => serde_json::to_vec(r),
            RawReading::Rfid(r) => serde_json::to_vec(r),
            RawReading::Wifi(r) => serde_json::to_vec(r),
        }
    }
}
