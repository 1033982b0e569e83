pub mod config;
pub mod error;
pub mod impact;
pub mod manager;
pub mod pulse;
pub mod rolling_window;
pub mod stats;
pub mod store;
pub mod time;
pub mod types;
pub mod view;

pub use config::EngineConfig;
pub use error::EngineError;
pub use manager::{EngineHandle, SignalEngine};
pub use time::{Clock, ManualClock, TokioClock};
pub use types::{ImpactRecord, Instrument, Sample, SeriesKind, SignalSnapshot};
pub use view::EngineView;
