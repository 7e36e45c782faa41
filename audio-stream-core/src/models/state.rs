use std::fmt;

use super::error::AudioError;
use super::recording_result::RecordingResult;

/// Stream lifecycle.
///
/// State transitions:
/// ```text
/// opened → running ⇄ stopped
///             ↓         ↓
///           (stop)   closed
/// ```
/// `closed` is terminal. A running stream must be stopped before it can be
/// closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamState {
    Opened,
    Running,
    Stopped,
    Closed,
}

impl StreamState {
    pub fn can_start(self) -> bool {
        matches!(self, Self::Opened | Self::Stopped)
    }

    pub fn can_close(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Opened => "opened",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Closed => "closed",
        })
    }
}

/// Capture session state machine.
///
/// State transitions:
/// ```text
/// idle → ready → capturing → stopping → completed / failed
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureState {
    Idle,
    Ready,
    Capturing,
    Stopping,
    Completed(Box<RecordingResult>),
    Failed(AudioError),
}

impl CaptureState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self, Self::Capturing)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Failed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_opened_or_stopped_can_start() {
        assert!(StreamState::Opened.can_start());
        assert!(StreamState::Stopped.can_start());
        assert!(!StreamState::Running.can_start());
        assert!(!StreamState::Closed.can_start());
    }

    #[test]
    fn running_cannot_close() {
        assert!(!StreamState::Running.can_close());
        assert!(StreamState::Stopped.can_close());
        assert!(StreamState::Opened.can_close());
    }

    #[test]
    fn capture_terminal_states() {
        assert!(CaptureState::Failed(AudioError::Callback("x".into())).is_terminal());
        assert!(!CaptureState::Capturing.is_terminal());
        assert!(CaptureState::Idle.is_idle());
    }
}
