use super::error::ProtocolViolation;

/// Counters collected by a stream's dispatcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamDiagnostics {
    /// Buffers handed to the application callback.
    pub callbacks: u64,
    /// Buffers delivered while the stream was not running and answered with silence.
    pub silenced: u64,
    /// Xruns reported while the stream was running.
    pub xruns: u64,
    pub callback_errors: u64,
    pub protocol_violations: u64,
    pub last_violation: Option<ProtocolViolation>,
}
