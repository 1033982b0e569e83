use super::lead_lag::LeadLagEstimator;
use super::{Pulse, SeriesInput};
use crate::config::EngineConfig;
use crate::stats::{first_difference_zscore, windowed_count, windowed_delta, windowed_delta_pct};
use crate::types::SignalSnapshot;

/// Divergence Pulse
///
/// Compares how surprising the latest sentiment step is against how
/// surprising the latest price step is. A large positive divergence means
/// sentiment moved unusually while price did not (yet).
#[derive(Clone, Debug)]
pub struct DivergencePulse {
    delta_lookback_ms: u64,
    strong_threshold: f64,
    min_info_count: usize,
    weight_info: f64,
    weight_price: f64,
    lead_lag: LeadLagEstimator,
}

impl DivergencePulse {
    pub fn new(cfg: &EngineConfig) -> Self {
        Self {
            delta_lookback_ms: cfg.delta_lookback_ms,
            strong_threshold: cfg.strong_threshold,
            min_info_count: cfg.min_info_count,
            weight_info: cfg.predict_weight_info,
            weight_price: cfg.predict_weight_price,
            lead_lag: LeadLagEstimator::from_config(cfg),
        }
    }
}

impl Pulse for DivergencePulse {
    type Input = SeriesInput;
    type Output = SignalSnapshot;

    fn evaluate(&mut self, input: Self::Input) -> Self::Output {
        let SeriesInput {
            instrument,
            now_ms,
            price,
            info,
        } = input;

        let z_price = first_difference_zscore(&price);
        let z_info = first_difference_zscore(&info);
        let divergence = z_info - z_price;
        let info_count_1m = windowed_count(&info, now_ms, self.delta_lookback_ms);

        SignalSnapshot {
            instrument,
            last_price: price.last().map(|s| s.value),
            price_delta_1m_pct: windowed_delta_pct(&price, now_ms, self.delta_lookback_ms),
            info_delta_1m: windowed_delta(&info, now_ms, self.delta_lookback_ms),
            z_price,
            z_info,
            divergence,
            strong: is_strong(divergence, info_count_1m, self.strong_threshold, self.min_info_count),
            predicted_return_pct: predicted_return(z_info, z_price, self.weight_info, self.weight_price),
            price_updated_at: price.last().map(|s| s.ts_ms),
            info_updated_at: info.last().map(|s| s.ts_ms),
            info_count_1m,
            price_samples: price.len(),
            info_samples: info.len(),
            lead_lag: self.lead_lag.estimate(&price, &info, now_ms),
            updated_at: now_ms,
        }
    }
}

/// Divergence is strong only when it is both large and backed by enough
/// recent sentiment samples.
pub fn is_strong(divergence: f64, info_count: usize, threshold: f64, min_info: usize) -> bool {
    divergence.abs() >= threshold && info_count >= min_info
}

/// Fixed linear combination of the two z-scores. A heuristic carried
/// through for display, not a validated forecast.
pub fn predicted_return(z_info: f64, z_price: f64, weight_info: f64, weight_price: f64) -> f64 {
    weight_info * z_info + weight_price * z_price
}
