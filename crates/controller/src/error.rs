use shared::{
    domain::{Mode, SignalId},
    error::{ApiError, ErrorCode, UnknownValue},
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("invalid mode '{0}'; must be one of auto, manual, emergency or smart")]
    InvalidModeValue(String),
    #[error("invalid phase '{0}'; must be one of red, yellow or green")]
    InvalidPhaseValue(String),
    #[error("invalid status '{0}'; must be one of active, inactive or maintenance")]
    InvalidStatusValue(String),
    #[error("traffic light {id} must be in manual mode to change phase (current mode: {mode})")]
    PhaseChangeNotAllowed { id: SignalId, mode: Mode },
    #[error("traffic light {0} not found")]
    UnknownSignalId(SignalId),
    #[error("manual phase duration must be at least one second")]
    InvalidDuration,
    #[error(transparent)]
    UnrecognizedValue(UnknownValue),
}

impl ControlError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ControlError::UnknownSignalId(_) => ErrorCode::NotFound,
            _ => ErrorCode::Validation,
        }
    }
}

impl From<UnknownValue> for ControlError {
    fn from(value: UnknownValue) -> Self {
        match value.kind {
            "mode" => ControlError::InvalidModeValue(value.value),
            "status" => ControlError::InvalidStatusValue(value.value),
            "phase" => ControlError::InvalidPhaseValue(value.value),
            _ => ControlError::UnrecognizedValue(value),
        }
    }
}

impl From<ControlError> for ApiError {
    fn from(value: ControlError) -> Self {
        ApiError::new(value.code(), value.to_string())
    }
}

#[cfg(test)]
#[path = "tests/error_tests.rs"]
mod tests;
