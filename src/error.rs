use thiserror::Error;

/// Errors raised by the simulator core.
///
/// Hazards (no free station, operands not ready, address clash) are never
/// errors; they show up as a phase doing nothing for a cycle.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("unknown register '{0}'")]
    UnknownRegister(String),
}
