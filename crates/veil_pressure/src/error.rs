use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum PressureError {
    /// Query or tick named a region that was never registered.
    #[error("unknown region: {0}")]
    UnknownRegion(String),

    /// Tick called with a non-positive or non-finite delta time. The
    /// tick is a no-op; prior state is unchanged.
    #[error("invalid delta time: {0}")]
    InvalidDelta(f64),
}
