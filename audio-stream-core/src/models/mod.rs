pub mod buffer;
pub mod caps;
pub mod config;
pub mod diagnostics;
pub mod enums;
pub mod error;
pub mod format;
pub mod recording_result;
pub mod sample;
pub mod state;
