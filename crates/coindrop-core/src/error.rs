use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Device discovery / lifetime errors
    #[error("Device interface not present: {0}")]
    DeviceNotFound(String),

    #[error("Device open failed: {path}: {message}")]
    OpenFailed { path: String, message: String },

    #[error("Device channel closed")]
    ChannelClosed,

    // Channel errors
    #[error("Control request {function} failed: {message}")]
    ControlFailed { function: String, message: String },

    #[error("Invalid change record: {0}")]
    InvalidRecord(String),

    #[error("Unsupported control function: {0}")]
    UnsupportedFunction(String),

    // Decoder errors
    //
    // Desynchronization is a programming-invariant failure, not a hardware
    // fault: the decode stages ran out of order and the pass must be aborted.
    #[error("Decoder desynchronized: expected {expected} stage, got {actual}")]
    DecoderDesynchronized { expected: String, actual: String },

    // Lifecycle errors
    #[error("Coin acceptor not initialized")]
    NotInitialized,

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a control failure for a named device function.
    pub fn control_failed(function: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ControlFailed {
            function: function.into(),
            message: message.into(),
        }
    }

    /// Create a desynchronization error for a guard-token violation.
    pub fn desynchronized(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::DecoderDesynchronized {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// True for the fatal invariant failure that must abort a decode pass.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::DecoderDesynchronized { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_failed_display() {
        let error = Error::control_failed("RejectOn", "device gone");
        assert_eq!(
            error.to_string(),
            "Control request RejectOn failed: device gone"
        );
    }

    #[test]
    fn test_desynchronized_display_and_fatality() {
        let error = Error::desynchronized("Sense", "Credit");
        assert_eq!(
            error.to_string(),
            "Decoder desynchronized: expected Sense stage, got Credit"
        );
        assert!(error.is_fatal());
    }

    #[test]
    fn test_recoverable_errors_are_not_fatal() {
        assert!(!Error::DeviceNotFound("coin acceptor".into()).is_fatal());
        assert!(!Error::ChannelClosed.is_fatal());
        assert!(!Error::control_failed("DiverterOn", "timeout").is_fatal());
    }
}
