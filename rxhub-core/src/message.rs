//! Message catalogue: the closed set of tags and payloads carried from the
//! baseband core to the application core.
//!
//! Tag values are the wire contract between both sides. They index the
//! handler table directly, so they stay small and are never reused.
//! Payloads are already-decoded protocol objects and are moved by value
//! through the cross-core queue.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Implemented by every payload type so handlers can subscribe to a payload
/// instead of matching on [`Message`].
pub trait MessagePayload: Sized {
    const ID: MessageId;

    fn from_message(message: &Message) -> Option<&Self>;
}

macro_rules! messages {
    ($($name:ident = $tag:literal),* $(,)?) => {
        /// Tag identifying a message kind.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[repr(u32)]
        pub enum MessageId {
            $($name = $tag),*
        }

        impl MessageId {
            /// Every tag, in declaration order.
            pub const ALL: &'static [MessageId] = &[$(MessageId::$name),*];

            pub fn from_u32(tag: u32) -> Option<Self> {
                match tag {
                    $($tag => Some(MessageId::$name),)*
                    _ => None,
                }
            }
        }

        /// A tagged message. Payload is owned by the message.
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        pub enum Message {
            $($name($name)),*
        }

        impl Message {
            pub fn id(&self) -> MessageId {
                match self {
                    $(Message::$name(_) => MessageId::$name),*
                }
            }
        }

        $(
            impl MessagePayload for $name {
                const ID: MessageId = MessageId::$name;

                fn from_message(message: &Message) -> Option<&Self> {
                    match message {
                        Message::$name(p) => Some(p),
                        #[allow(unreachable_patterns)]
                        _ => None,
                    }
                }
            }

            impl From<$name> for Message {
                fn from(payload: $name) -> Self {
                    Message::$name(payload)
                }
            }
        )*
    };
}

messages! {
    RssiStatistics = 0,
    BasebandStatistics = 1,
    ChannelStatistics = 2,
    DisplayFrameSync = 3,
    AudioStatistics = 4,
    TpmsPacket = 6,
    AisPacket = 7,
    Shutdown = 8,
    ErtPacket = 9,
    AdsbPacket = 10,
    BlePacket = 11,
    PocsagPacket = 12,
    WeatherPacket = 13,
    GpsFix = 14,
    DisplaySleep = 16,
    TxProgress = 17,
    TxDone = 18,
    Retune = 19,
}

impl MessageId {
    /// Size of a table indexed by tag (highest tag + 1).
    pub const COUNT: usize = {
        let mut max = 0;
        let mut i = 0;
        while i < Self::ALL.len() {
            let tag = Self::ALL[i] as usize;
            if tag > max {
                max = tag;
            }
            i += 1;
        }
        max + 1
    };

    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RssiStatistics {
    pub accumulator: u32,
    pub min: u32,
    pub max: u32,
    pub count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BasebandStatistics {
    pub idle_ticks: u32,
    pub main_ticks: u32,
    pub rssi_ticks: u32,
    pub baseband_ticks: u32,
    pub saturation: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStatistics {
    pub max_db: i32,
    pub count: u32,
}

impl Default for ChannelStatistics {
    fn default() -> Self {
        ChannelStatistics {
            max_db: -120,
            count: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioStatistics {
    pub rms_db: i32,
    pub max_db: i32,
    pub count: u32,
}

impl Default for AudioStatistics {
    fn default() -> Self {
        AudioStatistics {
            rms_db: -120,
            max_db: -120,
            count: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Control / display
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DisplayFrameSync;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DisplaySleep;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Shutdown;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TxProgress {
    pub progress: u32,
    pub done: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TxDone {
    pub n: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Retune {
    pub freq_hz: i64,
}

// ---------------------------------------------------------------------------
// Decoded packets
// ---------------------------------------------------------------------------

/// AIS report from a vessel or base station.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AisPacket {
    pub mmsi: u32,
    pub message_type: u8,
    #[serde(default)]
    pub navigational_status: Option<u8>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub speed_over_ground: Option<f32>,
    #[serde(default)]
    pub course_over_ground: Option<f32>,
    #[serde(default)]
    pub true_heading: Option<u16>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub call_sign: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub received_at: f64,
}

/// Mode S / ADS-B report, already paired and CPR-resolved.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AdsbPacket {
    pub icao: u32,
    #[serde(default)]
    pub callsign: Option<String>,
    #[serde(default)]
    pub altitude_ft: Option<i32>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub speed_kts: Option<f64>,
    #[serde(default)]
    pub heading_deg: Option<f64>,
    #[serde(default)]
    pub amplitude: u32,
    #[serde(default)]
    pub received_at: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TpmsSensorType {
    #[default]
    Fsk19k2Schrader,
    Ook8k192Schrader,
    Ook8k4Schrader,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TpmsPacket {
    pub id: u32,
    #[serde(default)]
    pub sensor_type: TpmsSensorType,
    #[serde(default)]
    pub pressure_kpa: Option<f32>,
    #[serde(default)]
    pub temperature_c: Option<i16>,
    #[serde(default)]
    pub flags: Option<u8>,
    #[serde(default)]
    pub received_at: f64,
}

/// Utility meter (ERT) consumption report.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ErtPacket {
    pub id: u32,
    pub commodity_type: u8,
    pub consumption: u32,
    #[serde(default)]
    pub received_at: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BlePacket {
    pub mac: [u8; 6],
    pub rssi: i8,
    pub channel: u8,
    pub pdu_type: u8,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub received_at: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PocsagPacket {
    pub address: u32,
    pub function: u8,
    pub bitrate: u16,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub received_at: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WeatherPacket {
    pub sensor_id: u32,
    pub channel: u8,
    #[serde(default)]
    pub temperature_c: Option<f32>,
    #[serde(default)]
    pub humidity: Option<u8>,
    #[serde(default)]
    pub received_at: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GpsFix {
    pub lat: f64,
    pub lon: f64,
    pub altitude_m: f32,
    pub satellites: u8,
    #[serde(default)]
    pub received_at: f64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
