use std::fmt;

use thiserror::Error;

use super::enums::{Cause, NativeEnum, System};
use super::state::StreamState;

/// Non-zero status code returned across the driver boundary. Zero is success
/// and is never carried in an `Err`.
pub type Fault = u32;

/// Combined code of a driver fault as it crosses a C-style boundary: the
/// native system id in the upper 32 bits, the fault in the lower 32.
pub fn error_code(system: System, fault: Fault) -> u64 {
    ((system.to_native() as u64) << 32) | fault as u64
}

/// Inverse of [`error_code`]. `None` for an unknown system or a zero fault.
pub fn split_error_code(code: u64) -> Option<(System, Fault)> {
    let system = System::from_native((code >> 32) as i32)?;
    let fault = (code & 0xffff_ffff) as Fault;
    (fault != 0).then_some((system, fault))
}

/// Misuse of the buffer protocol by application code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolViolation {
    /// `lock` called while the safe buffer was already locked.
    DoubleLock,
    /// `unlock` called without a matching `lock`.
    UnlockWithoutLock,
    /// Safe buffer contents accessed outside a lock scope.
    AccessWhileUnlocked,
    /// The callback returned while the safe buffer was still locked.
    MissingUnlock,
    /// `unlock` was given a different buffer than the one locked.
    MismatchedUnlock,
    /// The driver delivered more frames than the safe buffer was sized for.
    FrameOverflow,
    /// The stream was closed while a safe buffer was still registered.
    SafeBufferStillRegistered,
}

impl ProtocolViolation {
    const ALL: [ProtocolViolation; 7] = [
        ProtocolViolation::DoubleLock,
        ProtocolViolation::UnlockWithoutLock,
        ProtocolViolation::AccessWhileUnlocked,
        ProtocolViolation::MissingUnlock,
        ProtocolViolation::MismatchedUnlock,
        ProtocolViolation::FrameOverflow,
        ProtocolViolation::SafeBufferStillRegistered,
    ];

    /// Stable non-zero code, suitable for an atomic slot.
    pub const fn code(self) -> u8 {
        match self {
            Self::DoubleLock => 1,
            Self::UnlockWithoutLock => 2,
            Self::AccessWhileUnlocked => 3,
            Self::MissingUnlock => 4,
            Self::MismatchedUnlock => 5,
            Self::FrameOverflow => 6,
            Self::SafeBufferStillRegistered => 7,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.code() == code)
    }
}

impl fmt::Display for ProtocolViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DoubleLock => "safe buffer locked twice",
            Self::UnlockWithoutLock => "safe buffer unlocked without a lock",
            Self::AccessWhileUnlocked => "safe buffer accessed outside a lock scope",
            Self::MissingUnlock => "callback returned with the safe buffer still locked",
            Self::MismatchedUnlock => "safe buffer unlocked with a different buffer than it was locked with",
            Self::FrameOverflow => "buffer has more frames than the safe buffer was sized for",
            Self::SafeBufferStillRegistered => "stream closed with a safe buffer still registered",
        })
    }
}

/// Errors surfaced by the audio stream API.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AudioError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("device does not support {} access", access_name(*.interleaved))]
    UnsupportedAccess { interleaved: bool },

    #[error("{system} driver fault {fault} ({cause}){}", text_suffix(.text))]
    Driver {
        system: System,
        fault: Fault,
        cause: Cause,
        text: Option<String>,
    },

    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("cannot {operation} a stream in the {state} state")]
    InvalidState {
        operation: &'static str,
        state: StreamState,
    },

    #[error("buffer protocol violation: {0}")]
    ProtocolViolation(ProtocolViolation),

    #[error("a safe buffer is already registered on this stream")]
    SafeBufferRegistered,

    #[error("stream callback failed: {0}")]
    Callback(String),

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("storage error: {0}")]
    StorageError(String),
}

impl AudioError {
    /// Combined native code of a driver error, see [`error_code`].
    pub fn native_code(&self) -> Option<u64> {
        match self {
            Self::Driver { system, fault, .. } => Some(error_code(*system, *fault)),
            _ => None,
        }
    }
}

impl From<ProtocolViolation> for AudioError {
    fn from(violation: ProtocolViolation) -> Self {
        Self::ProtocolViolation(violation)
    }
}

fn access_name(interleaved: bool) -> &'static str {
    if interleaved {
        "interleaved"
    } else {
        "non-interleaved"
    }
}

fn text_suffix(text: &Option<String>) -> String {
    text.as_deref().map(|t| format!(": {t}")).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_error_includes_lookup_text() {
        let err = AudioError::Driver {
            system: System::Simulated,
            fault: 2,
            cause: Cause::Endpoint,
            text: Some("device busy".into()),
        };
        assert_eq!(err.to_string(), "Simulated driver fault 2 (endpoint): device busy");
    }

    #[test]
    fn driver_error_without_text() {
        let err = AudioError::Driver {
            system: System::Alsa,
            fault: 22,
            cause: Cause::Unknown,
            text: None,
        };
        assert_eq!(err.to_string(), "ALSA driver fault 22 (unknown)");
    }

    #[test]
    fn native_code_packs_system_and_fault() {
        let err = AudioError::Driver {
            system: System::Simulated,
            fault: 3,
            cause: Cause::Format,
            text: None,
        };
        let code = err.native_code().unwrap();
        assert_eq!(code, (7 << 32) | 3);
        assert_eq!(split_error_code(code), Some((System::Simulated, 3)));
        assert_eq!(split_error_code(7 << 32), None);
        assert_eq!(split_error_code((99 << 32) | 1), None);
        assert_eq!(AudioError::SafeBufferRegistered.native_code(), None);
    }

    #[test]
    fn violation_codes_round_trip() {
        for violation in ProtocolViolation::ALL {
            assert_ne!(violation.code(), 0);
            assert_eq!(ProtocolViolation::from_code(violation.code()), Some(violation));
        }
        assert_eq!(ProtocolViolation::from_code(0), None);
    }

    #[test]
    fn invalid_state_message() {
        let err = AudioError::InvalidState {
            operation: "close",
            state: StreamState::Running,
        };
        assert_eq!(err.to_string(), "cannot close a stream in the running state");
    }
}
