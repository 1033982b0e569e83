use common::logger::TraceId;

use super::Pulse;
use crate::config::EngineConfig;
use crate::types::Instrument;

/// A confirmed spike waiting for its delayed price measurement.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingSpike {
    pub id: TraceId,
    pub instrument: Instrument,
    pub detected_at: u64,
    pub z_info_at_spike: f64,

    /// Last price at detection; 0 when none was retained.
    pub reference_price: f64,

    /// Earliest time the measurement may be taken.
    pub due_at: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SpikePhase {
    #[default]
    Idle,

    Pending { detected_at: u64 },
}

#[derive(Clone, Copy, Debug)]
pub struct SpikeInput {
    pub now_ms: u64,
    pub z_info: f64,
    pub last_price: Option<f64>,
}

/// Per-instrument spike state machine: Idle -> Pending -> Idle.
///
/// The debounce clock starts at detection, so it runs alongside the impact
/// window rather than after it.
#[derive(Clone, Debug)]
pub struct SpikeDetector {
    instrument: Instrument,
    threshold: f64,
    debounce_ms: u64,
    impact_window_ms: u64,
    phase: SpikePhase,
    last_spike_at: Option<u64>,
}

impl SpikeDetector {
    pub fn new(instrument: Instrument, cfg: &EngineConfig) -> Self {
        Self {
            instrument,
            threshold: cfg.spike_threshold,
            debounce_ms: cfg.debounce_ms,
            impact_window_ms: cfg.impact_window_ms,
            phase: SpikePhase::Idle,
            last_spike_at: None,
        }
    }

    pub fn phase(&self) -> SpikePhase {
        self.phase
    }

    /// Returns to Idle once the pending measurement has been taken.
    pub fn resolve(&mut self) {
        self.phase = SpikePhase::Idle;
    }

    fn debounced(&self, now_ms: u64) -> bool {
        match self.last_spike_at {
            Some(t) => now_ms.saturating_sub(t) < self.debounce_ms,
            None => false,
        }
    }
}

impl Pulse for SpikeDetector {
    type Input = SpikeInput;
    type Output = Option<PendingSpike>;

    fn evaluate(&mut self, input: Self::Input) -> Self::Output {
        if matches!(self.phase, SpikePhase::Pending { .. }) {
            return None;
        }
        if !input.z_info.is_finite() || input.z_info.abs() < self.threshold {
            return None;
        }
        if self.debounced(input.now_ms) {
            return None;
        }

        self.last_spike_at = Some(input.now_ms);
        self.phase = SpikePhase::Pending {
            detected_at: input.now_ms,
        };

        Some(PendingSpike {
            id: TraceId::new(),
            instrument: self.instrument.clone(),
            detected_at: input.now_ms,
            z_info_at_spike: input.z_info,
            reference_price: input.last_price.unwrap_or(0.0),
            due_at: input.now_ms.saturating_add(self.impact_window_ms),
        })
    }
}
