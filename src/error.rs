use corrosion_common::ConfigError;
use std::{error::Error, fmt};

/// Failures surfaced by the grid, the transition engine and the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum SimError {
    /// Rejected before any step ran.
    Config(ConfigError),
    /// A step produced a value the clamping invariants should have ruled out.
    NumericDegeneracy {
        row: usize,
        col: usize,
        quantity: &'static str,
        value: f64,
    },
    /// Stepping a run that already finished or was interrupted.
    InvalidState(&'static str),
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::Config(e) => write!(f, "configuration error: {e}"),
            SimError::NumericDegeneracy {
                row,
                col,
                quantity,
                value,
            } => write!(
                f,
                "numeric degeneracy at cell ({row}, {col}): {quantity} = {value}"
            ),
            SimError::InvalidState(msg) => write!(f, "invalid run state: {msg}"),
        }
    }
}

impl From<ConfigError> for SimError {
    fn from(err: ConfigError) -> Self {
        SimError::Config(err)
    }
}

impl Error for SimError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SimError::Config(e) => Some(e),
            _ => None,
        }
    }
}

pub type SimResult<T> = std::result::Result<T, SimError>;
