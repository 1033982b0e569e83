use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::stats::{first_differences, pearson};
use crate::types::Sample;

/// Lag with the strongest absolute correlation between sentiment and
/// price differences. Positive `lag_ms` means sentiment moves first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LeadLag {
    pub lag_ms: i64,
    pub corr: f64,
}

impl LeadLag {
    pub const NEUTRAL: Self = Self {
        lag_ms: 0,
        corr: 0.0,
    };
}

impl Default for LeadLag {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

/// Coarse cross-correlation at a fixed set of lags.
///
/// Lags are mapped to index shifts proportionally (`lag / lookback * n`),
/// which assumes evenly spaced samples. The result is advisory only.
#[derive(Clone, Debug)]
pub struct LeadLagEstimator {
    lookback_ms: u64,
    candidates_ms: Vec<i64>,
    min_points: usize,
}

impl LeadLagEstimator {
    pub fn new(lookback_ms: u64, candidates_ms: Vec<i64>, min_points: usize) -> Self {
        Self {
            lookback_ms,
            candidates_ms,
            min_points,
        }
    }

    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self::new(
            cfg.lead_lag_lookback_ms,
            cfg.lead_lag_candidates_ms.clone(),
            cfg.lead_lag_min_points,
        )
    }

    pub fn estimate(&self, price: &[Sample], info: &[Sample], now_ms: u64) -> LeadLag {
        if self.lookback_ms == 0 {
            return LeadLag::NEUTRAL;
        }

        let cutoff = now_ms.saturating_sub(self.lookback_ms);
        let recent = |s: &[Sample]| -> Vec<Sample> {
            s.iter().filter(|x| x.ts_ms >= cutoff).copied().collect()
        };
        let price = recent(price);
        let info = recent(info);

        if price.len() < self.min_points || info.len() < self.min_points {
            return LeadLag::NEUTRAL;
        }

        let dp = first_differences(&price);
        let di = first_differences(&info);

        // Align on the most recent n differences of each side.
        let n = dp.len().min(di.len());
        let dp = &dp[dp.len() - n..];
        let di = &di[di.len() - n..];

        let mut best = LeadLag::NEUTRAL;
        for &lag_ms in &self.candidates_ms {
            let k = index_shift(lag_ms, self.lookback_ms, n);
            let shift = k.unsigned_abs();
            if shift + 2 > n {
                continue;
            }

            let (x, y) = if k >= 0 {
                (&di[..n - shift], &dp[shift..])
            } else {
                (&di[shift..], &dp[..n - shift])
            };

            let corr = pearson(x, y);
            if corr.abs() > best.corr.abs() {
                best = LeadLag { lag_ms, corr };
            }
        }

        best
    }
}

fn index_shift(lag_ms: i64, lookback_ms: u64, n: usize) -> isize {
    (lag_ms as f64 / lookback_ms as f64 * n as f64).round() as isize
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAGS: [i64; 7] = [-60_000, -30_000, -15_000, 0, 15_000, 30_000, 60_000];

    fn estimator() -> LeadLagEstimator {
        LeadLagEstimator::new(300_000, LAGS.to_vec(), 8)
    }

    /// Deterministic pseudo-random steps in [-1, 1).
    fn steps(n: usize, mut seed: u64) -> Vec<f64> {
        (0..n)
            .map(|_| {
                seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                ((seed >> 11) as f64 / (1u64 << 53) as f64) * 2.0 - 1.0
            })
            .collect()
    }

    /// Builds a series every 5s from t = 0 by accumulating `steps`.
    fn integrate(start: f64, steps: &[f64]) -> Vec<Sample> {
        let mut v = start;
        let mut out = vec![Sample::new(0, v)];
        for (i, d) in steps.iter().enumerate() {
            v += d;
            out.push(Sample::new((i as u64 + 1) * 5_000, v));
        }
        out
    }

    #[test]
    fn undersized_series_are_neutral() {
        let info = integrate(0.0, &steps(6, 1));
        let price = integrate(100.0, &steps(60, 2));

        assert_eq!(estimator().estimate(&price, &info, 300_000), LeadLag::NEUTRAL);
        assert_eq!(estimator().estimate(&info, &price, 300_000), LeadLag::NEUTRAL);
    }

    #[test]
    fn recovers_sentiment_leading_price() {
        // 60 steps over 300s => 15s lag is a 3-step shift.
        let info_steps = steps(60, 42);
        let mut price_steps = steps(3, 7);
        price_steps.extend_from_slice(&info_steps[..57]);

        let info = integrate(0.0, &info_steps);
        let price = integrate(100.0, &price_steps);

        let ll = estimator().estimate(&price, &info, 300_000);

        assert_eq!(ll.lag_ms, 15_000);
        assert!(ll.corr > 0.999, "corr = {}", ll.corr);
    }

    #[test]
    fn recovers_price_leading_sentiment() {
        let price_steps = steps(60, 99);
        let mut info_steps = steps(6, 5);
        info_steps.extend_from_slice(&price_steps[..54]);

        let info = integrate(0.0, &info_steps);
        let price = integrate(100.0, &price_steps);

        let ll = estimator().estimate(&price, &info, 300_000);

        assert_eq!(ll.lag_ms, -30_000);
        assert!(ll.corr > 0.999, "corr = {}", ll.corr);
    }

    #[test]
    fn samples_outside_lookback_are_ignored() {
        let info = integrate(0.0, &steps(60, 3));
        let price = integrate(100.0, &steps(60, 4));

        // Only t >= 270s remain: 7 samples each.
        assert_eq!(estimator().estimate(&price, &info, 570_000), LeadLag::NEUTRAL);
    }
}
