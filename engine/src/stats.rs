//! Stateless statistics over sample views.
//!
//! Insufficient data is never an error here: every function resolves it to
//! a neutral value (0) so cold starts and feed gaps flow through silently.

use crate::types::Sample;

/// Minimum samples (not differences) before a z-score is attempted.
pub const MIN_ZSCORE_SAMPLES: usize = 5;

fn in_window(series: &[Sample], now_ms: u64, lookback_ms: u64) -> impl Iterator<Item = &Sample> {
    let cutoff = now_ms.saturating_sub(lookback_ms);
    series.iter().filter(move |s| s.ts_ms >= cutoff)
}

/// Last value minus first value among samples inside the lookback, by
/// arrival order. Zero for an empty or single-sample window.
pub fn windowed_delta(series: &[Sample], now_ms: u64, lookback_ms: u64) -> f64 {
    let mut it = in_window(series, now_ms, lookback_ms);
    let Some(first) = it.next() else {
        return 0.0;
    };
    let last = it.last().unwrap_or(first);
    last.value - first.value
}

/// Same window as [`windowed_delta`], expressed as a percentage of the first
/// value. Zero when the first value is zero or missing.
pub fn windowed_delta_pct(series: &[Sample], now_ms: u64, lookback_ms: u64) -> f64 {
    let mut it = in_window(series, now_ms, lookback_ms);
    let Some(first) = it.next() else {
        return 0.0;
    };
    if first.value == 0.0 {
        return 0.0;
    }
    let last = it.last().unwrap_or(first);
    (last.value - first.value) / first.value * 100.0
}

pub fn windowed_count(series: &[Sample], now_ms: u64, lookback_ms: u64) -> usize {
    in_window(series, now_ms, lookback_ms).count()
}

/// Consecutive differences `v[i] - v[i-1]` in arrival order.
pub fn first_differences(series: &[Sample]) -> Vec<f64> {
    series.windows(2).map(|w| w[1].value - w[0].value).collect()
}

/// How unusual the latest step is relative to the steps before it.
///
/// Works on first differences rather than levels so a steady trend does not
/// read as an outlier. Returns 0 below [`MIN_ZSCORE_SAMPLES`] samples, and
/// treats a zero standard deviation as 1.
pub fn first_difference_zscore(series: &[Sample]) -> f64 {
    if series.len() < MIN_ZSCORE_SAMPLES {
        return 0.0;
    }

    let diffs = first_differences(series);
    let n = diffs.len();
    let mean = diffs.iter().sum::<f64>() / n as f64;
    let var = diffs.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / (n - 1).max(1) as f64;

    let mut sd = var.sqrt();
    if sd == 0.0 || !sd.is_finite() {
        sd = 1.0;
    }

    let latest = diffs[n - 1];
    let z = (latest - mean) / sd;
    if z.is_finite() { z } else { 0.0 }
}

/// Pearson correlation of two equal-length slices. Zero when either side is
/// constant or fewer than two pairs are available.
pub fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return 0.0;
    }
    let (xs, ys) = (&xs[..n], &ys[..n]);

    let mx = xs.iter().sum::<f64>() / n as f64;
    let my = ys.iter().sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mx;
        let dy = y - my;
        cov += dx * dy;
        vx += dx * dx;
        vy += dy * dy;
    }

    let denom = (vx * vy).sqrt();
    if denom == 0.0 || !denom.is_finite() {
        return 0.0;
    }
    cov / denom
}
