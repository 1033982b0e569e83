//! Per-instrument series store.
//!
//! The instrument map is built once and never mutated afterwards, so the
//! only locks taken at runtime are the per-series ones. Producers on one
//! instrument never contend with ticks on another.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::warn;

use crate::error::EngineError;
use crate::rolling_window::RollingWindow;
use crate::types::{Instrument, Sample, SeriesKind};

struct InstrumentSeries {
    price: Mutex<RollingWindow>,
    info: Mutex<RollingWindow>,
}

impl InstrumentSeries {
    fn new(window_ms: u64, capacity: usize) -> Self {
        Self {
            price: Mutex::new(RollingWindow::new(window_ms, capacity)),
            info: Mutex::new(RollingWindow::new(window_ms, capacity)),
        }
    }

    fn get(&self, kind: SeriesKind) -> &Mutex<RollingWindow> {
        match kind {
            SeriesKind::Price => &self.price,
            SeriesKind::Info => &self.info,
        }
    }
}

pub struct SeriesStore {
    series: HashMap<Instrument, InstrumentSeries>,
}

impl SeriesStore {
    pub fn new<I>(instruments: I, window_ms: u64, capacity: usize) -> Self
    where
        I: IntoIterator<Item = Instrument>,
    {
        let series = instruments
            .into_iter()
            .map(|i| (i, InstrumentSeries::new(window_ms, capacity)))
            .collect();
        Self { series }
    }

    fn lookup(&self, instrument: &str, kind: SeriesKind) -> Result<&Mutex<RollingWindow>, EngineError> {
        self.series
            .get(instrument)
            .map(|s| s.get(kind))
            .ok_or_else(|| EngineError::UnknownInstrument(instrument.to_string()))
    }

    /// Appends a sample. Never blocks on series size; a series past its
    /// high-water mark silently loses its oldest half.
    pub fn append(&self, instrument: &str, kind: SeriesKind, sample: Sample) -> Result<(), EngineError> {
        let dropped = self.lookup(instrument, kind)?.lock().push(sample);

        if dropped > 0 {
            warn!(%instrument, ?kind, dropped, "series over capacity; oldest block dropped");
        }
        Ok(())
    }

    /// Window eviction for one series. Returns the number of samples removed.
    pub fn prune(&self, instrument: &str, kind: SeriesKind, now_ms: u64) -> Result<usize, EngineError> {
        Ok(self.lookup(instrument, kind)?.lock().prune(now_ms))
    }

    /// Copy of the samples with `ts_ms >= now - lookback_ms`, in arrival order.
    pub fn snapshot_since(
        &self,
        instrument: &str,
        kind: SeriesKind,
        now_ms: u64,
        lookback_ms: u64,
    ) -> Result<Vec<Sample>, EngineError> {
        Ok(self.lookup(instrument, kind)?.lock().since(now_ms, lookback_ms))
    }

    pub fn latest(&self, instrument: &str, kind: SeriesKind) -> Result<Option<Sample>, EngineError> {
        Ok(self.lookup(instrument, kind)?.lock().latest())
    }

    pub fn len(&self, instrument: &str, kind: SeriesKind) -> Result<usize, EngineError> {
        Ok(self.lookup(instrument, kind)?.lock().len())
    }
}
