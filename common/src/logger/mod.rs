mod init;
mod spans;
mod trace_id;

pub use init::{LogFormat, init_logger};
pub use spans::{spike_span, tick_span};
pub use trace_id::TraceId;
