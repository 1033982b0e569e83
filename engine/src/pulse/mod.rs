pub mod divergence;
pub mod lead_lag;
pub mod spike;

use crate::types::{Instrument, Sample};

/// One instrument's evaluator, called once per compute tick.
///
/// The engine keeps one instance per instrument behind that instrument's
/// lock, so implementations carry state across ticks freely.
pub trait Pulse {
    type Input;
    type Output;

    fn evaluate(&mut self, input: Self::Input) -> Self::Output;
}

/// Both retained series of one instrument, as read on a tick.
#[derive(Clone, Debug)]
pub struct SeriesInput {
    pub instrument: Instrument,
    pub now_ms: u64,
    pub price: Vec<Sample>,
    pub info: Vec<Sample>,
}
