//! Driver backends.

pub mod simulated;
