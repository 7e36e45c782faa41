//! Recording files: headerless PCM plus a JSON sidecar.

pub mod metadata;
pub mod raw_writer;
