//! SignalEngine
//!
//! Owns all per-instrument state and drives it:
//!   • accepts price and sentiment samples from producers
//!   • runs the compute tick (prune, divergence pulse, spike detection)
//!   • resolves due spikes into impact records
//!   • publishes an immutable [`EngineView`] after every change
//!
//! Like the rest of the crate, core operations take `now` explicitly.
//! [`SignalEngine::spawn`] wires them to a [`Clock`] with two independent
//! tokio tasks, so a slow tick never delays a resolution and vice versa.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::logger::{TraceId, spike_span, tick_span};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, sleep};
use tracing::{Instrument as _, debug, error, info, instrument, warn};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::impact::{self, ImpactLog, PendingQueue};
use crate::pulse::divergence::DivergencePulse;
use crate::pulse::spike::{PendingSpike, SpikeDetector, SpikeInput};
use crate::pulse::{Pulse, SeriesInput};
use crate::store::SeriesStore;
use crate::time::Clock;
use crate::types::{ImpactRecord, Instrument, Sample, SeriesKind, SignalSnapshot};
use crate::view::{EngineView, SnapshotStore};

/// Per-instrument pulse engines.
struct InstrumentPulses {
    divergence: DivergencePulse,
    spike: SpikeDetector,
}

pub struct SignalEngine {
    config: EngineConfig,

    /// Tracked instruments, sorted and de-duplicated.
    instruments: Vec<Instrument>,

    store: SeriesStore,
    snapshots: SnapshotStore,
    pulses: HashMap<Instrument, Mutex<InstrumentPulses>>,

    pending: Mutex<PendingQueue>,
    impacts: RwLock<ImpactLog>,

    /// Wakes the resolution loop when a spike is scheduled.
    scheduled: Notify,

    view_tx: watch::Sender<Arc<EngineView>>,
}

impl SignalEngine {
    /// Builds an engine for a fixed instrument set.
    pub fn new<I, S>(config: EngineConfig, instruments: I) -> Result<Arc<Self>, EngineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        config.validate()?;

        let mut instruments: Vec<Instrument> =
            instruments.into_iter().map(Instrument::new).collect();
        instruments.sort();
        instruments.dedup();

        if instruments.is_empty() {
            return Err(EngineError::InvalidConfig(
                "at least one instrument is required".to_string(),
            ));
        }

        let store = SeriesStore::new(
            instruments.iter().cloned(),
            config.window_ms,
            config.series_capacity,
        );
        let snapshots = SnapshotStore::new(&instruments);
        let pulses = instruments
            .iter()
            .map(|i| {
                let p = InstrumentPulses {
                    divergence: DivergencePulse::new(&config),
                    spike: SpikeDetector::new(i.clone(), &config),
                };
                (i.clone(), Mutex::new(p))
            })
            .collect();

        let initial = EngineView {
            snapshots: snapshots.all(),
            impacts: Vec::new(),
        };
        let (view_tx, _) = watch::channel(Arc::new(initial));

        info!(
            instruments = ?instruments.iter().map(Instrument::id).collect::<Vec<_>>(),
            window_ms = config.window_ms,
            tick_interval_ms = config.tick_interval_ms,
            spike_threshold = config.spike_threshold,
            impact_window_ms = config.impact_window_ms,
            "signal engine created"
        );

        Ok(Arc::new(Self {
            impacts: RwLock::new(ImpactLog::new(config.impact_log_capacity)),
            config,
            instruments,
            store,
            snapshots,
            pulses,
            pending: Mutex::new(PendingQueue::new()),
            scheduled: Notify::new(),
            view_tx,
        }))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    // =========================
    // Ingestion
    // =========================

    pub fn ingest_price(&self, instrument: &str, ts_ms: u64, value: f64) -> Result<(), EngineError> {
        self.ingest(instrument, SeriesKind::Price, ts_ms, value)
    }

    /// Sentiment scores are conventionally in [-1, 1] but not clamped.
    pub fn ingest_info(&self, instrument: &str, ts_ms: u64, score: f64) -> Result<(), EngineError> {
        self.ingest(instrument, SeriesKind::Info, ts_ms, score)
    }

    fn ingest(
        &self,
        instrument: &str,
        kind: SeriesKind,
        ts_ms: u64,
        value: f64,
    ) -> Result<(), EngineError> {
        if !value.is_finite() {
            warn!(%instrument, ?kind, ts_ms, value, "rejecting non-finite sample");
            return Err(EngineError::NonFiniteSample {
                instrument: instrument.to_string(),
                value,
            });
        }
        self.store.append(instrument, kind, Sample::new(ts_ms, value))
    }

    // =========================
    // Compute tick
    // =========================

    /// Recomputes every instrument's snapshot and runs spike detection.
    ///
    /// Returns the spikes scheduled on this tick.
    pub fn compute_tick(&self, now_ms: u64) -> Vec<PendingSpike> {
        let trace_id = TraceId::new();
        let _span = tick_span(&trace_id, now_ms).entered();

        let mut scheduled = Vec::new();
        for instrument in &self.instruments {
            match self.compute_instrument(instrument, now_ms) {
                Ok(Some(spike)) => scheduled.push(spike),
                Ok(None) => {}
                Err(e) => error!(error = %e, %instrument, "instrument tick failed"),
            }
        }

        if !scheduled.is_empty() {
            self.scheduled.notify_one();
        }

        self.publish();
        scheduled
    }

    fn compute_instrument(
        &self,
        instrument: &Instrument,
        now_ms: u64,
    ) -> Result<Option<PendingSpike>, EngineError> {
        let id = instrument.id();

        let pruned_price = self.store.prune(id, SeriesKind::Price, now_ms)?;
        let pruned_info = self.store.prune(id, SeriesKind::Info, now_ms)?;

        let input = SeriesInput {
            instrument: instrument.clone(),
            now_ms,
            price: self
                .store
                .snapshot_since(id, SeriesKind::Price, now_ms, self.config.window_ms)?,
            info: self
                .store
                .snapshot_since(id, SeriesKind::Info, now_ms, self.config.window_ms)?,
        };

        let mut pulses = self
            .pulses
            .get(id)
            .ok_or_else(|| EngineError::UnknownInstrument(id.to_string()))?
            .lock();

        let snapshot = pulses.divergence.evaluate(input);

        debug!(
            %instrument,
            pruned_price,
            pruned_info,
            z_price = snapshot.z_price,
            z_info = snapshot.z_info,
            divergence = snapshot.divergence,
            strong = snapshot.strong,
            info_count_1m = snapshot.info_count_1m,
            "snapshot computed"
        );

        let spike_input = SpikeInput {
            now_ms,
            z_info: snapshot.z_info,
            last_price: snapshot.last_price,
        };
        self.snapshots.set(snapshot)?;

        let spike = pulses.spike.evaluate(spike_input);

        // Queue while the detector is still locked: a concurrent discard
        // must see the spike if it sees the Pending phase. Lock order is
        // pulses -> pending.
        if let Some(spike) = &spike {
            self.pending.lock().push(spike.clone());
        }
        drop(pulses);

        if let Some(spike) = &spike {
            let _span = spike_span(&spike.id, id).entered();
            info!(
                z_info = spike.z_info_at_spike,
                reference_price = spike.reference_price,
                due_at = spike.due_at,
                "sentiment spike detected"
            );
        }

        Ok(spike)
    }

    // =========================
    // Resolution
    // =========================

    /// Measures every pending spike that is due at `now_ms` and appends the
    /// results to the impact log.
    #[instrument(level = "debug", skip(self))]
    pub fn resolve_due(&self, now_ms: u64) -> Vec<ImpactRecord> {
        let due = self.pending.lock().pop_due(now_ms);
        if due.is_empty() {
            return Vec::new();
        }

        let mut records = Vec::with_capacity(due.len());
        for spike in due {
            let id = spike.instrument.id();
            let _span = spike_span(&spike.id, id).entered();

            let current = match self.store.latest(id, SeriesKind::Price) {
                Ok(sample) => sample.map(|s| s.value),
                Err(e) => {
                    warn!(error = %e, "no price series for pending spike");
                    None
                }
            };

            let record = impact::measure(&spike, current, now_ms);
            self.impacts.write().push(record.clone());

            if let Some(p) = self.pulses.get(id) {
                p.lock().spike.resolve();
            }

            info!(
                reference_price = record.reference_price,
                exit_price = record.exit_price,
                realized_return_pct = record.realized_return_pct,
                delay_ms = now_ms.saturating_sub(record.ts_ms),
                "impact resolved"
            );
            records.push(record);
        }

        self.publish();
        records
    }

    /// Due time of the earliest pending spike.
    pub fn next_resolution_at(&self) -> Option<u64> {
        self.pending.lock().next_due()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Drops every pending spike without measuring it and returns the
    /// detectors to Idle. The impact log is untouched.
    pub fn discard_pending(&self) -> Vec<PendingSpike> {
        let discarded = self.pending.lock().drain();
        for spike in &discarded {
            if let Some(p) = self.pulses.get(spike.instrument.id()) {
                p.lock().spike.resolve();
            }
        }
        discarded
    }

    // =========================
    // Outbound
    // =========================

    pub fn snapshot(&self, instrument: &str) -> Result<Arc<SignalSnapshot>, EngineError> {
        self.snapshots.get(instrument)
    }

    /// Impact records currently retained, oldest first.
    pub fn impacts(&self) -> Vec<ImpactRecord> {
        self.impacts.read().all()
    }

    /// Current snapshots and impact log.
    pub fn view(&self) -> EngineView {
        EngineView {
            snapshots: self.snapshots.all(),
            impacts: self.impacts.read().all(),
        }
    }

    /// Receiver that always holds the latest published view.
    pub fn subscribe(&self) -> watch::Receiver<Arc<EngineView>> {
        self.view_tx.subscribe()
    }

    fn publish(&self) {
        self.view_tx.send_replace(Arc::new(self.view()));
    }

    // =========================
    // Runtime
    // =========================

    /// Starts the compute loop and the resolution loop.
    pub fn spawn(self: &Arc<Self>, clock: Arc<dyn Clock>) -> EngineHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let compute = tokio::spawn(
            Arc::clone(self)
                .run_compute_loop(Arc::clone(&clock), shutdown_rx.clone())
                .instrument(tracing::info_span!("compute_loop")),
        );
        let resolver = tokio::spawn(
            Arc::clone(self)
                .run_resolution_loop(clock, shutdown_rx)
                .instrument(tracing::info_span!("resolution_loop")),
        );

        EngineHandle {
            engine: Arc::clone(self),
            shutdown_tx,
            tasks: vec![compute, resolver],
        }
    }

    async fn run_compute_loop(
        self: Arc<Self>,
        clock: Arc<dyn Clock>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = interval(Duration::from_millis(self.config.tick_interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(every_ms = self.config.tick_interval_ms, "compute loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.compute_tick(clock.now_ms());
                }
                _ = shutdown.changed() => break,
            }
        }

        info!("compute loop stopped");
    }

    async fn run_resolution_loop(
        self: Arc<Self>,
        clock: Arc<dyn Clock>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("resolution loop started");

        loop {
            let wait = self
                .next_resolution_at()
                .map(|due| Duration::from_millis(due.saturating_sub(clock.now_ms())));

            tokio::select! {
                _ = sleep_or_park(wait) => {
                    self.resolve_due(clock.now_ms());
                }
                // A new spike may be due earlier than what we are sleeping on.
                _ = self.scheduled.notified() => {}
                _ = shutdown.changed() => break,
            }
        }

        info!("resolution loop stopped");
    }
}

async fn sleep_or_park(wait: Option<Duration>) {
    match wait {
        Some(d) => sleep(d).await,
        None => std::future::pending().await,
    }
}

/// Running engine. Dropping it also stops both loops, but only
/// [`EngineHandle::shutdown`] waits for them and clears pending spikes.
pub struct EngineHandle {
    engine: Arc<SignalEngine>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl EngineHandle {
    pub fn engine(&self) -> &Arc<SignalEngine> {
        &self.engine
    }

    /// Stops both loops, waits for them, and discards spikes that were
    /// still pending. Returns the discarded spikes.
    pub async fn shutdown(self) -> Vec<PendingSpike> {
        let _ = self.shutdown_tx.send(true);

        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = ?e, "engine task ended abnormally");
            }
        }

        let discarded = self.engine.discard_pending();
        if !discarded.is_empty() {
            warn!(count = discarded.len(), "discarding pending spikes at shutdown");
        }
        discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(cfg: EngineConfig) -> Arc<SignalEngine> {
        SignalEngine::new(cfg, ["BTC", "ETH"]).unwrap()
    }

    #[test]
    fn rejects_empty_instrument_set() {
        let err = SignalEngine::new(EngineConfig::default(), Vec::<String>::new())
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_invalid_config() {
        let cfg = EngineConfig {
            tick_interval_ms: 0,
            ..EngineConfig::default()
        };
        assert!(SignalEngine::new(cfg, ["BTC"]).is_err());
    }

    #[test]
    fn rejects_non_finite_and_unknown_samples() {
        let e = engine(EngineConfig::default());

        assert!(matches!(
            e.ingest_price("BTC", 0, f64::NAN),
            Err(EngineError::NonFiniteSample { .. })
        ));
        assert_eq!(
            e.ingest_info("DOGE", 0, 0.1),
            Err(EngineError::UnknownInstrument("DOGE".into()))
        );
    }

    #[test]
    fn instruments_are_sorted_and_deduplicated() {
        let e = SignalEngine::new(EngineConfig::default(), ["ETH", "BTC", "ETH"]).unwrap();
        let ids: Vec<_> = e.instruments().iter().map(Instrument::id).collect();
        assert_eq!(ids, vec!["BTC", "ETH"]);
        assert_eq!(e.view().snapshots.len(), 2);
    }

    #[test]
    fn tick_publishes_to_subscribers() {
        let e = engine(EngineConfig::default());
        let mut rx = e.subscribe();

        for t in 0..5u64 {
            e.ingest_price("BTC", t * 1_000, 100.0 + (t / 4) as f64).unwrap();
        }
        e.compute_tick(5_000);

        assert!(rx.has_changed().unwrap());
        let view = rx.borrow_and_update().clone();
        let btc = view.snapshot("BTC").unwrap();
        assert!((btc.z_price - 1.5).abs() < 1e-12);
        assert_eq!(btc.updated_at, 5_000);
    }

    #[test]
    fn discard_pending_returns_detector_to_idle() {
        let cfg = EngineConfig {
            spike_threshold: 1.0,
            debounce_ms: 0,
            ..EngineConfig::default()
        };
        let e = engine(cfg);
        for (t, v) in [0.0, 0.0, 0.0, 0.0, 0.9].iter().enumerate() {
            e.ingest_info("BTC", t as u64 * 1_000, *v).unwrap();
        }

        assert_eq!(e.compute_tick(5_000).len(), 1);
        assert_eq!(e.pending_count(), 1);

        assert_eq!(e.discard_pending().len(), 1);
        assert_eq!(e.pending_count(), 0);
        assert!(e.impacts().is_empty());

        // Idle again, so the same surprise can be confirmed on the next tick.
        assert_eq!(e.compute_tick(5_001).len(), 1);
    }

    #[test]
    fn concurrent_discard_never_leaves_two_pending_spikes() {
        let cfg = EngineConfig {
            spike_threshold: 0.0,
            debounce_ms: 0,
            ..EngineConfig::default()
        };
        let e = SignalEngine::new(cfg, ["BTC"]).unwrap();

        let discarder = {
            let e = Arc::clone(&e);
            std::thread::spawn(move || {
                for _ in 0..5_000 {
                    e.discard_pending();
                }
            })
        };

        for t in 0..5_000u64 {
            e.compute_tick(t);
            assert!(e.pending_count() <= 1, "two spikes pending at {t}");
        }
        discarder.join().unwrap();
    }
}
