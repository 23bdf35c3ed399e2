//! Runtime configuration for the gateway.
//!
//! All structures deserialize with serde and provide defaults; reading them
//! from a file is left to the embedding application.
use std::path::PathBuf;
use std::time::Duration;

use chrono::TimeDelta;
use serde::Deserialize;

/// Default capacity of the shared decoded-message channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Default SLCAN bit-rate code (`S5` = 250 kbit/s, the NMEA 2000 rate).
pub const DEFAULT_SLCAN_BITRATE: u8 = 5;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub adapters: Vec<AdapterConfig>,
    pub channel_capacity: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            adapters: Vec::new(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// One adapter connection, served by its own worker.
#[derive(Debug, Clone, Deserialize)]
pub struct AdapterConfig {
    /// Label used in logs and worker reports.
    pub name: String,
    pub protocol: AdapterProtocol,
    pub source: AdapterSource,
    #[serde(default)]
    pub reassembly: ReassemblerConfig,
}

impl AdapterConfig {
    pub fn new(name: impl Into<String>, protocol: AdapterProtocol, source: AdapterSource) -> Self {
        Self {
            name: name.into(),
            protocol,
            source,
            reassembly: ReassemblerConfig::default(),
        }
    }
}

/// Wire protocol spoken by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AdapterProtocol {
    /// ASCII hex framing (CANUSB / SLCAN).
    Slcan {
        #[serde(default = "default_bitrate")]
        bitrate: u8,
    },
    /// Binary escaped framing (Actisense NGT-1).
    Actisense,
}

fn default_bitrate() -> u8 {
    DEFAULT_SLCAN_BITRATE
}

impl Default for AdapterProtocol {
    fn default() -> Self {
        AdapterProtocol::Slcan {
            bitrate: DEFAULT_SLCAN_BITRATE,
        }
    }
}

/// Where the adapter byte stream comes from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AdapterSource {
    /// Serial device node (opened read/write).
    Device { path: PathBuf },
    /// Captured stream replayed from a file; writes are discarded.
    Replay { path: PathBuf },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReassemblerConfig {
    /// Idle time after which a partial fast packet is evicted. `None` keeps
    /// partials until a new first frame replaces them.
    pub partial_timeout_ms: Option<u64>,
}

impl ReassemblerConfig {
    pub fn with_partial_timeout(timeout: Duration) -> Self {
        Self {
            partial_timeout_ms: Some(timeout.as_millis() as u64),
        }
    }

    pub fn partial_timeout(&self) -> Option<TimeDelta> {
        self.partial_timeout_ms
            .and_then(|ms| TimeDelta::try_milliseconds(i64::try_from(ms).ok()?))
    }
}
