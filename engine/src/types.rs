use std::fmt;

use serde::{Deserialize, Serialize};

use crate::pulse::lead_lag::LeadLag;

/// Tracked instrument identifier, e.g. "BTC".
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Instrument(String);

impl Instrument {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Instrument {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl std::borrow::Borrow<str> for Instrument {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// The two independent series kept per instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesKind {
    Price,
    Info,
}

/// A timestamped scalar. Never mutated once appended.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub ts_ms: u64,
    pub value: f64,
}

impl Sample {
    pub fn new(ts_ms: u64, value: f64) -> Self {
        Self { ts_ms, value }
    }
}

/// Per-instrument output of one compute tick.
///
/// Replaced wholesale on every tick; consumers only ever see complete values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSnapshot {
    pub instrument: Instrument,

    /// Most recently appended price, if any is retained.
    pub last_price: Option<f64>,

    /// Price change over the trailing minute, as a percentage of the first
    /// price in that minute.
    pub price_delta_1m_pct: f64,

    /// Raw sentiment change over the trailing minute.
    pub info_delta_1m: f64,

    /// First-difference z-scores over the full retained window.
    pub z_price: f64,
    pub z_info: f64,

    /// `z_info - z_price`.
    pub divergence: f64,

    pub strong: bool,

    /// Linear heuristic over the two z-scores. Not a validated forecast.
    pub predicted_return_pct: f64,

    pub price_updated_at: Option<u64>,
    pub info_updated_at: Option<u64>,

    /// Number of sentiment samples in the trailing minute.
    pub info_count_1m: usize,

    /// Samples retained in each series after this tick's prune.
    pub price_samples: usize,
    pub info_samples: usize,

    /// Advisory lead-lag estimate between the two series.
    pub lead_lag: LeadLag,

    pub updated_at: u64,
}

impl SignalSnapshot {
    /// Neutral snapshot published before the first tick.
    pub fn empty(instrument: Instrument) -> Self {
        Self {
            instrument,
            last_price: None,
            price_delta_1m_pct: 0.0,
            info_delta_1m: 0.0,
            z_price: 0.0,
            z_info: 0.0,
            divergence: 0.0,
            strong: false,
            predicted_return_pct: 0.0,
            price_updated_at: None,
            info_updated_at: None,
            info_count_1m: 0,
            price_samples: 0,
            info_samples: 0,
            lead_lag: LeadLag::NEUTRAL,
            updated_at: 0,
        }
    }
}

/// Realized price move measured a fixed delay after a sentiment spike.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactRecord {
    pub instrument: Instrument,

    /// Detection time of the spike.
    pub ts_ms: u64,

    pub z_info_at_spike: f64,
    pub reference_price: f64,
    pub exit_price: f64,
    pub realized_return_pct: f64,

    /// Time the record entered the impact log.
    pub resolved_at: u64,
}
