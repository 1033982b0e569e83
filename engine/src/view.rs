use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::types::{ImpactRecord, Instrument, SignalSnapshot};

/// Everything the presentation layer reads, captured at one moment.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineView {
    /// One snapshot per tracked instrument, ordered by instrument id.
    pub snapshots: Vec<SignalSnapshot>,

    /// Most recent impact records, oldest first.
    pub impacts: Vec<ImpactRecord>,
}

impl EngineView {
    pub fn snapshot(&self, instrument: &str) -> Option<&SignalSnapshot> {
        self.snapshots.iter().find(|s| s.instrument.id() == instrument)
    }
}

/// Latest snapshot per instrument.
///
/// Each snapshot is swapped in whole behind its own lock, so readers see
/// either the previous tick or the current one, never a mix.
pub struct SnapshotStore {
    inner: HashMap<Instrument, RwLock<Arc<SignalSnapshot>>>,
}

impl SnapshotStore {
    pub fn new<'a, I>(instruments: I) -> Self
    where
        I: IntoIterator<Item = &'a Instrument>,
    {
        let inner = instruments
            .into_iter()
            .map(|i| (i.clone(), RwLock::new(Arc::new(SignalSnapshot::empty(i.clone())))))
            .collect();
        Self { inner }
    }

    /// Replaces the snapshot for its instrument. Last write wins.
    pub fn set(&self, snapshot: SignalSnapshot) -> Result<(), EngineError> {
        let slot = self
            .inner
            .get(snapshot.instrument.id())
            .ok_or_else(|| EngineError::UnknownInstrument(snapshot.instrument.to_string()))?;
        *slot.write() = Arc::new(snapshot);
        Ok(())
    }

    pub fn get(&self, instrument: &str) -> Result<Arc<SignalSnapshot>, EngineError> {
        self.inner
            .get(instrument)
            .map(|slot| Arc::clone(&slot.read()))
            .ok_or_else(|| EngineError::UnknownInstrument(instrument.to_string()))
    }

    /// All snapshots, ordered by instrument id.
    pub fn all(&self) -> Vec<SignalSnapshot> {
        let mut out: Vec<SignalSnapshot> = self
            .inner
            .values()
            .map(|slot| SignalSnapshot::clone(&slot.read()))
            .collect();
        out.sort_by(|a, b| a.instrument.cmp(&b.instrument));
        out
    }
}
