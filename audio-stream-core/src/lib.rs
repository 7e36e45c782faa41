//! # audio-stream-core
//!
//! Real-time audio stream abstraction over native driver systems.
//!
//! Applications pick a driver system through a [`Platform`], open a
//! [`Device`], negotiate a [`Format`], and run a [`Stream`] whose callback
//! receives one [`Buffer`] per hardware period. A registered [`SafeBuffer`]
//! presents driver memory in a chosen layout and checks the lock/unlock
//! protocol. Drivers plug in behind the `ServiceBackend` family of traits;
//! the in-process simulated driver ships with the crate.
//!
//! ## Architecture
//!
//! ```text
//! audio-stream-core (this crate)
//! ├── traits/       ← ServiceBackend, DeviceBackend, StreamBackend, BufferSink, callbacks
//! ├── models/       ← SampleType, Format, Buffer, AudioError, StreamState, CaptureConfiguration
//! ├── host/         ← Platform, Service, DeviceList, Device
//! ├── stream/       ← Stream, dispatcher gate, SafeBuffer, aggregate streams
//! ├── processing/   ← sample codecs, interleaving, channel routing, SPSC byte ring
//! ├── backend/      ← simulated driver
//! ├── session/      ← CaptureSession (stream → ring buffer → file)
//! └── storage/      ← RawPcmWriter, metadata
//! ```

pub mod backend;
pub mod host;
pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod stream;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use backend::simulated::{SimulatedClock, SimulatedDeviceSpec, SimulatedProbe, SimulatedService};
pub use host::device::{Device, DeviceList};
pub use host::platform::{Platform, PlatformBuilder};
pub use host::service::Service;
pub use models::buffer::{Buffer, InputData, OutputData};
pub use models::caps::{DeviceCaps, EnumFlags, ServiceCaps};
pub use models::config::CaptureConfiguration;
pub use models::diagnostics::StreamDiagnostics;
pub use models::enums::{BufferAccess, Cause, NativeEnum, Setup, System};
pub use models::error::{error_code, split_error_code, AudioError, Fault, ProtocolViolation};
pub use models::format::{BufferSizeRange, Channels, Direction, Format, Latency, MaskOrder, Mix};
pub use models::recording_result::{RecordingMetadata, RecordingResult};
pub use models::sample::{SampleAttributes, SampleType};
pub use models::state::{CaptureState, StreamState};
pub use processing::ring_buffer::{byte_ring, RingConsumer, RingProducer};
pub use processing::samples::{SampleBuffer, Samples, SamplesMut};
pub use session::capture::CaptureSession;
pub use storage::raw_writer::RawPcmWriter;
pub use stream::safe_buffer::{SafeBuffer, SafeBufferRegistration};
pub use stream::views::{ChannelSlices, ChannelSlicesMut, SafeData, SafeDataMut};
pub use stream::aggregate::{AggregateDeviceParams, AggregateStreamParams};
pub use stream::{Stream, StreamContext};
pub use traits::callbacks::{DeviceStreamParams, OnBuffer, OnRunning, OnXRun, StreamParams};
pub use traits::driver::{BufferSink, DeviceBackend, DeviceListBackend, ServiceBackend, StreamBackend, StreamRequest};
