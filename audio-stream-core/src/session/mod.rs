//! Capture pipeline from a stream to disk.

pub mod capture;
