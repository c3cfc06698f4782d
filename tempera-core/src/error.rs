//! Error types for the control stack.
//!
//! Validation errors are raised at the API boundary that received the bad
//! input. Transport errors are isolated per message and travel back through
//! the submitter's [`Delivery`](crate::dispatcher::Delivery) receipt.

use std::fmt;

use tempera_types::{BankId, EmitterId};

/// Failure reported by a [`MessageSink`](crate::midi::sink::MessageSink).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkError(pub String);

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for SinkError {}

impl From<String> for SinkError {
    fn from(s: String) -> Self {
        SinkError(s)
    }
}

impl From<&str> for SinkError {
    fn from(s: &str) -> Self {
        SinkError(s.to_string())
    }
}

/// Rejected by an encoder before anything is queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    ParameterOutOfRange {
        param: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },
    UnknownParameter(String),
}

impl EncodeError {
    pub(crate) fn out_of_range(param: &'static str, value: impl Into<i64>, min: i64, max: i64) -> Self {
        EncodeError::ParameterOutOfRange {
            param,
            value: value.into(),
            min,
            max,
        }
    }
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::ParameterOutOfRange {
                param,
                value,
                min,
                max,
            } => write!(f, "{} must be in range {}..={}, got {}", param, min, max, value),
            EncodeError::UnknownParameter(name) => write!(f, "unknown parameter: {}", name),
        }
    }
}

impl std::error::Error for EncodeError {}

/// Dispatcher lifecycle and delivery errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The sink could not be opened (or closed cleanly).
    ChannelUnavailable(String),
    /// One message of a request could not be written. Later messages and
    /// requests were still delivered.
    SendFailure(String),
    AlreadyStarted,
    Closed,
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::ChannelUnavailable(e) => write!(f, "channel unavailable: {}", e),
            DispatchError::SendFailure(e) => write!(f, "send failed: {}", e),
            DispatchError::AlreadyStarted => write!(f, "dispatcher already started"),
            DispatchError::Closed => write!(f, "dispatcher is closed"),
        }
    }
}

impl std::error::Error for DispatchError {}

/// Error from a controller handle call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    Encode(EncodeError),
    Dispatch(DispatchError),
}

impl From<EncodeError> for ControlError {
    fn from(e: EncodeError) -> Self {
        Self::Encode(e)
    }
}

impl From<DispatchError> for ControlError {
    fn from(e: DispatchError) -> Self {
        Self::Dispatch(e)
    }
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encode(e) => write!(f, "{}", e),
            Self::Dispatch(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ControlError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Encode(e) => Some(e),
            Self::Dispatch(e) => Some(e),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SequencerError {
    /// The event's action is unknown, or not handled by this topology.
    UnsupportedEvent(String),
    /// The action is known but its payload could not be read.
    MalformedEvent(String),
    InvalidMutePattern,
    InvalidTiming(f64),
    BankOutOfRange(BankId),
    StepOutOfRange(u16),
    CellOutOfRange { bank: BankId, cell: u8 },
    EmitterOutOfRange(EmitterId),
    AlreadyRunning,
    NotRunning,
    Control(ControlError),
}

impl From<ControlError> for SequencerError {
    fn from(e: ControlError) -> Self {
        Self::Control(e)
    }
}

impl From<DispatchError> for SequencerError {
    fn from(e: DispatchError) -> Self {
        Self::Control(ControlError::Dispatch(e))
    }
}

impl fmt::Display for SequencerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedEvent(action) => write!(f, "unsupported event: {}", action),
            Self::MalformedEvent(e) => write!(f, "malformed event: {}", e),
            Self::InvalidMutePattern => write!(f, "mute pattern must not be empty"),
            Self::InvalidTiming(v) => write!(f, "invalid timing value: {}", v),
            Self::BankOutOfRange(bank) => write!(f, "bank {} is out of range", bank),
            Self::StepOutOfRange(step) => write!(f, "step {} is out of range", step),
            Self::CellOutOfRange { bank, cell } => {
                write!(f, "cell {} is out of range for bank {}", cell, bank)
            }
            Self::EmitterOutOfRange(id) => write!(f, "emitter {} is out of range", id),
            Self::AlreadyRunning => write!(f, "sequencer is already running"),
            Self::NotRunning => write!(f, "sequencer is not running"),
            Self::Control(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SequencerError {}
