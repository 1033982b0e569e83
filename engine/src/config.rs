use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

pub const ENV_PREFIX: &str = "SIGNAL_";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // =========================
    // Series retention
    // =========================
    /// Retention window for both series of every instrument.
    ///
    /// Samples older than `now - window_ms` are pruned on each tick.
    /// Z-scores are computed over everything that survives, so this also
    /// sets how much history "normal variability" is measured against.
    pub window_ms: u64,

    /// High-water mark per series. Crossing it drops the oldest half at
    /// append time, independently of age.
    pub series_capacity: usize,

    // =========================
    // Signal computation
    // =========================
    /// Period of the compute tick.
    pub tick_interval_ms: u64,

    /// Lookback used for the 1-minute deltas and the info count.
    pub delta_lookback_ms: u64,

    /// Minimum |divergence| for the snapshot to be flagged strong.
    pub strong_threshold: f64,

    /// Minimum number of sentiment samples in the trailing lookback for the
    /// snapshot to be flagged strong.
    pub min_info_count: usize,

    /// Heuristic predictor weights:
    /// `predicted = predict_weight_info * z_info + predict_weight_price * z_price`.
    pub predict_weight_info: f64,
    pub predict_weight_price: f64,

    // =========================
    // Impact detection
    // =========================
    /// Minimum |z_info| for a spike.
    pub spike_threshold: f64,

    /// Minimum time between two confirmed spikes of one instrument.
    pub debounce_ms: u64,

    /// Delay between detection and the realized-return measurement.
    pub impact_window_ms: u64,

    /// Number of impact records retained; oldest are evicted first.
    pub impact_log_capacity: usize,

    // =========================
    // Lead-lag
    // =========================
    pub lead_lag_lookback_ms: u64,

    /// Candidate lags; positive means sentiment leads price.
    pub lead_lag_candidates_ms: Vec<i64>,

    /// Minimum points per series before any correlation is attempted.
    pub lead_lag_min_points: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_ms: 600_000,
            series_capacity: 20_000,

            tick_interval_ms: 1_000,
            delta_lookback_ms: 60_000,
            strong_threshold: 1.5,
            min_info_count: 3,
            predict_weight_info: 0.5,
            predict_weight_price: -0.25,

            spike_threshold: 2.0,
            debounce_ms: 60_000,
            impact_window_ms: 60_000,
            impact_log_capacity: 50,

            lead_lag_lookback_ms: 300_000,
            lead_lag_candidates_ms: vec![-60_000, -30_000, -15_000, 0, 15_000, 30_000, 60_000],
            lead_lag_min_points: 8,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `SIGNAL_*` environment variables.
    pub fn from_env() -> Result<Self, EngineError> {
        let mut cfg = Self::default();
        cfg.apply_env(|key| std::env::var(key).ok())?;
        Ok(cfg)
    }

    /// Overrides fields from a key lookup, e.g. `SIGNAL_WINDOW_MS`.
    ///
    /// Lag candidates are read as a comma-separated list of milliseconds.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), EngineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        override_parsed(&get, "WINDOW_MS", &mut self.window_ms)?;
        override_parsed(&get, "SERIES_CAPACITY", &mut self.series_capacity)?;
        override_parsed(&get, "TICK_INTERVAL_MS", &mut self.tick_interval_ms)?;
        override_parsed(&get, "DELTA_LOOKBACK_MS", &mut self.delta_lookback_ms)?;
        override_parsed(&get, "STRONG_THRESHOLD", &mut self.strong_threshold)?;
        override_parsed(&get, "MIN_INFO_COUNT", &mut self.min_info_count)?;
        override_parsed(&get, "PREDICT_WEIGHT_INFO", &mut self.predict_weight_info)?;
        override_parsed(&get, "PREDICT_WEIGHT_PRICE", &mut self.predict_weight_price)?;
        override_parsed(&get, "SPIKE_THRESHOLD", &mut self.spike_threshold)?;
        override_parsed(&get, "DEBOUNCE_MS", &mut self.debounce_ms)?;
        override_parsed(&get, "IMPACT_WINDOW_MS", &mut self.impact_window_ms)?;
        override_parsed(&get, "IMPACT_LOG_CAPACITY", &mut self.impact_log_capacity)?;
        override_parsed(&get, "LEAD_LAG_LOOKBACK_MS", &mut self.lead_lag_lookback_ms)?;
        override_parsed(&get, "LEAD_LAG_MIN_POINTS", &mut self.lead_lag_min_points)?;

        if let Some(raw) = get("LEAD_LAG_CANDIDATES_MS") {
            self.lead_lag_candidates_ms = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<i64>().map_err(|_| {
                        EngineError::InvalidConfig(format!(
                            "{ENV_PREFIX}LEAD_LAG_CANDIDATES_MS: cannot parse {s:?}"
                        ))
                    })
                })
                .collect::<Result<_, _>>()?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let invalid = |msg: &str| Err(EngineError::InvalidConfig(msg.to_string()));

        if self.window_ms == 0 {
            return invalid("window_ms must be > 0");
        }
        if self.tick_interval_ms == 0 {
            return invalid("tick_interval_ms must be > 0");
        }
        if self.impact_window_ms == 0 {
            return invalid("impact_window_ms must be > 0");
        }
        if self.delta_lookback_ms > self.window_ms {
            return invalid("delta_lookback_ms must not exceed window_ms");
        }
        if self.lead_lag_lookback_ms > self.window_ms {
            return invalid("lead_lag_lookback_ms must not exceed window_ms");
        }
        if self.series_capacity < 2 {
            return invalid("series_capacity must be >= 2");
        }
        if self.impact_log_capacity == 0 {
            return invalid("impact_log_capacity must be > 0");
        }
        if self.lead_lag_candidates_ms.is_empty() {
            return invalid("lead_lag_candidates_ms must not be empty");
        }

        for (name, v) in [
            ("spike_threshold", self.spike_threshold),
            ("strong_threshold", self.strong_threshold),
        ] {
            if !v.is_finite() || v < 0.0 {
                return invalid(&format!("{name} must be finite and >= 0"));
            }
        }
        for (name, v) in [
            ("predict_weight_info", self.predict_weight_info),
            ("predict_weight_price", self.predict_weight_price),
        ] {
            if !v.is_finite() {
                return invalid(&format!("{name} must be finite"));
            }
        }

        Ok(())
    }
}

fn override_parsed<T, G>(get: &G, name: &str, slot: &mut T) -> Result<(), EngineError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    if let Some(raw) = get(name) {
        *slot = raw.trim().parse().map_err(|_| {
            EngineError::InvalidConfig(format!("{ENV_PREFIX}{name}: cannot parse {raw:?}"))
        })?;
    }
    Ok(())
}
