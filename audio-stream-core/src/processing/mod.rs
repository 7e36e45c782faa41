pub mod interleave;
pub mod ring_buffer;
pub mod routing;
pub mod samples;
