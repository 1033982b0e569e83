use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("unknown instrument: {0}")]
    UnknownInstrument(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("non-finite sample {value} for {instrument}")]
    NonFiniteSample { instrument: String, value: f64 },
}
