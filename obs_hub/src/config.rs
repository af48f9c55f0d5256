use crate::error::HubError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

pub const DEFAULT_OBS_ADDRESS: &str = "ws://127.0.0.1:4455";
pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(5);
pub const MIN_NOTIFY_INTERVAL: Duration = Duration::from_secs(1);
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_TARGET_DB: f64 = -10.0;
pub const DEFAULT_CROSSFADE_SECS: f64 = 10.0;
pub const DEFAULT_VISUAL_DELAY_SECS: f64 = 5.0;
pub const VOLUME_CEILING_DB: f64 = 0.0;

/// Which hotkey the timetable "advance" signal maps to.
///
/// The external sequencing device can be mounted either way round, so the
/// mapping is flipped per installation rather than rewired.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimetablePolarity {
    #[default]
    Advance,
    Retract,
}

impl FromStr for TimetablePolarity {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "advance" | "cw" => Ok(TimetablePolarity::Advance),
            "retract" | "ccw" => Ok(TimetablePolarity::Retract),
            other => Err(HubError::InvalidPolarity(other.to_string())),
        }
    }
}

impl fmt::Display for TimetablePolarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimetablePolarity::Advance => f.write_str("advance"),
            TimetablePolarity::Retract => f.write_str("retract"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HubConfig {
    pub obs_address: Url,
    pub timetable_polarity: TimetablePolarity,
    /// Passthrough scene whose item visibility follows the live sources.
    pub aux_scene: Option<String>,
    pub transition_target_db: f64,
    pub transition_crossfade_secs: f64,
    pub transition_visual_delay_secs: f64,
    pub reconnect_interval: Duration,
    pub notify_interval: Duration,
    pub request_timeout: Duration,
}

impl HubConfig {
    pub fn new(obs_address: &str) -> Result<Self, HubError> {
        Ok(Self {
            obs_address: parse_obs_address(obs_address)?,
            timetable_polarity: TimetablePolarity::default(),
            aux_scene: None,
            transition_target_db: DEFAULT_TARGET_DB,
            transition_crossfade_secs: DEFAULT_CROSSFADE_SECS,
            transition_visual_delay_secs: DEFAULT_VISUAL_DELAY_SECS,
            reconnect_interval: RECONNECT_INTERVAL,
            notify_interval: MIN_NOTIFY_INTERVAL,
            request_timeout: REQUEST_TIMEOUT,
        })
    }
}

/// Accepts `ws://host:port` / `wss://host:port`, or a bare `host:port`
/// which is treated as plain `ws://`.
pub fn parse_obs_address(raw: &str) -> Result<Url, HubError> {
    let raw = raw.trim();
    let invalid = |reason: &str| HubError::InvalidAddress {
        address: raw.to_string(),
        reason: reason.to_string(),
    };
    if raw.is_empty() {
        return Err(invalid("empty"));
    }

    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("ws://{raw}")
    };
    let url = Url::parse(&candidate).map_err(|e| invalid(&e.to_string()))?;
    match url.scheme() {
        "ws" | "wss" => {}
        other => return Err(invalid(&format!("unsupported scheme {other}"))),
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host"));
    }
    Ok(url)
}

/// Volume ceiling check for collaborators that accept operator-typed levels.
/// The hub itself never clamps; it forwards whatever it is given.
pub fn guard_volume_db(requested: f64) -> Result<f64, HubError> {
    if !requested.is_finite() || requested > VOLUME_CEILING_DB {
        return Err(HubError::VolumeAboveCeiling {
            requested,
            ceiling: VOLUME_CEILING_DB,
        });
    }
    Ok(requested)
}
