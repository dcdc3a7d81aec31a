//! LTE signal quality snapshot and the parsers for `/api/device/signal`.
//!
//! The firmware reports most values as unit-suffixed strings (`-86dBm`,
//! `15MHz`) or space-separated `key:value` lists. Parsing is lenient: any
//! malformed or missing sub-field becomes 0 instead of failing the call,
//! because field formats vary across hardware revisions.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Upload/download channel bandwidth in MHz.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Bandwidth {
    #[serde(rename = "Upload")]
    pub upload: i32,
    #[serde(rename = "Download")]
    pub download: i32,
}

/// Transmit power per uplink channel, in dBm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Power {
    #[serde(rename = "PUSCH")]
    pub pusch: i32,
    #[serde(rename = "PUCCH")]
    pub pucch: i32,
    #[serde(rename = "SRS")]
    pub srs: i32,
    #[serde(rename = "PRACH")]
    pub prach: i32,
}

/// Uplink/downlink channel numbers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Earfcn {
    #[serde(rename = "Uplink")]
    pub uplink: i32,
    #[serde(rename = "Downlink")]
    pub downlink: i32,
}

/// Signal quality snapshot returned by [`RouterClient::signal_stats`](crate::RouterClient::signal_stats).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Signal {
    /// Reference Signal Received Quality (dB).
    #[serde(rename = "RSRQ")]
    pub rsrq: i32,
    /// Reference Signal Received Power (dBm).
    #[serde(rename = "RSRP")]
    pub rsrp: i32,
    /// Received Signal Strength Indicator (dBm).
    #[serde(rename = "RSSI")]
    pub rssi: i32,
    /// Signal-to-Interference-plus-Noise Ratio (dB).
    #[serde(rename = "SINR")]
    pub sinr: i32,
    #[serde(rename = "Bandwidth")]
    pub bandwidth: Bandwidth,
    #[serde(rename = "Power")]
    pub power: Power,
    #[serde(rename = "EARFCN")]
    pub earfcn: Earfcn,
}

impl Signal {
    /// Signal quality as 1-5 bars, derived from RSRP (or RSSI when RSRP is
    /// not reported).
    pub fn bars(&self) -> u8 {
        if self.rsrp != 0 {
            return match self.rsrp {
                r if r >= -80 => 5,
                r if r >= -90 => 4,
                r if r >= -100 => 3,
                r if r >= -110 => 2,
                _ => 1,
            };
        }
        match self.rssi {
            r if r >= -65 => 5,
            r if r >= -75 => 4,
            r if r >= -85 => 3,
            r if r >= -95 => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "RSRQ:      {} dB", self.rsrq)?;
        writeln!(f, "RSRP:      {} dBm", self.rsrp)?;
        writeln!(f, "RSSI:      {} dBm", self.rssi)?;
        writeln!(f, "SINR:      {} dB", self.sinr)?;
        writeln!(
            f,
            "Bandwidth: {} MHz up / {} MHz down",
            self.bandwidth.upload, self.bandwidth.download
        )?;
        writeln!(
            f,
            "TX power:  PUSCH {} / PUCCH {} / SRS {} / PRACH {} dBm",
            self.power.pusch, self.power.pucch, self.power.srs, self.power.prach
        )?;
        writeln!(
            f,
            "EARFCN:    UL {} / DL {}",
            self.earfcn.uplink, self.earfcn.downlink
        )?;
        write!(f, "Bars:      {}/5", self.bars())
    }
}

/// Raw `/api/device/signal` response. Every field the firmware may omit
/// defaults to an empty string.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SignalResponse {
    pub rsrq: String,
    pub rsrp: String,
    pub rssi: String,
    pub sinr: String,
    pub ulbandwidth: String,
    pub dlbandwidth: String,
    pub txpower: String,
    pub earfcn: String,
}

impl From<SignalResponse> for Signal {
    fn from(raw: SignalResponse) -> Self {
        Signal {
            rsrq: parse_suffixed(&raw.rsrq, "dB"),
            rsrp: parse_suffixed(&raw.rsrp, "dBm"),
            rssi: parse_suffixed(&raw.rssi, "dBm"),
            sinr: parse_suffixed(&raw.sinr, "dB"),
            bandwidth: Bandwidth {
                upload: parse_suffixed(&raw.ulbandwidth, "MHz"),
                download: parse_suffixed(&raw.dlbandwidth, "MHz"),
            },
            power: parse_power(&raw.txpower),
            earfcn: parse_earfcn(&raw.earfcn),
        }
    }
}

// ── Parsers ──────────────────────────────────────────────────────────

/// Strip `unit` from `value` and parse the rest as a signed integer.
/// Empty, wrongly-suffixed or unparsable input yields 0.
pub fn parse_suffixed(value: &str, unit: &str) -> i32 {
    if value.is_empty() {
        return 0;
    }
    match value.strip_suffix(unit).map(str::parse::<i32>) {
        Some(Ok(v)) => v,
        _ => {
            warn!("ignoring unparsable {unit} value {value:?}");
            0
        }
    }
}

/// Parse `earfcn` → uplink/downlink, e.g. `DL:3025 UL:21025`.
pub fn parse_earfcn(value: &str) -> Earfcn {
    let mut earfcn = Earfcn::default();
    for field in value.split_whitespace() {
        if field.len() < 4 {
            continue;
        }
        let (Some(prefix), Some(number)) = (field.get(..3), field.get(3..)) else {
            continue;
        };
        let Ok(n) = number.parse::<i32>() else {
            continue;
        };
        match prefix {
            "UL:" => earfcn.uplink = n,
            "DL:" => earfcn.downlink = n,
            _ => {}
        }
    }
    earfcn
}

/// Parse `txpower` → per-channel power, e.g.
/// `PPusch:8dBm PPucch:-5dBm PSrs:0dBm PPrach:-4dBm`.
pub fn parse_power(value: &str) -> Power {
    let mut power = Power::default();
    for field in value.split_whitespace() {
        let Some((key, val)) = field.split_once(':') else {
            continue;
        };
        let slot = match key {
            "PPusch" => &mut power.pusch,
            "PPucch" => &mut power.pucch,
            "PSrs" => &mut power.srs,
            "PPrach" => &mut power.prach,
            _ => continue,
        };
        *slot = parse_suffixed(val, "dBm");
    }
    power
}
