use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::stream::{Engine, SimulatedProbe, SimulatedStream};
use super::{FAULT_BUSY, FAULT_FORMAT, FAULT_INVALID_ARGUMENT};
use crate::models::caps::{DeviceCaps, EnumFlags};
use crate::models::error::Fault;
use crate::models::format::{BufferSizeRange, Direction, Format, MaskOrder, Mix};
use crate::models::sample::SampleType;
use crate::processing::routing::ChannelRouter;
use crate::traits::driver::{BufferSink, DeviceBackend, DeviceListBackend, StreamBackend, StreamRequest};

/// How a simulated stream is clocked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SimulatedClock {
    /// Buffers are delivered only when the probe is pumped.
    #[default]
    Manual,
    /// A dedicated thread delivers buffers at the stream's rate while the
    /// stream is started.
    RealTime,
}

/// Description of one simulated device.
#[derive(Debug, Clone)]
pub struct SimulatedDeviceSpec {
    pub id: String,
    pub name: String,
    /// Hardware input channels.
    pub inputs: usize,
    /// Hardware output channels.
    pub outputs: usize,
    pub mix: Mix,
    pub rates: Vec<u32>,
    pub samples: Vec<SampleType>,
    pub buffer_range: BufferSizeRange,
    pub interleaved: bool,
    pub non_interleaved: bool,
    pub channel_mask: bool,
    pub mask_order: MaskOrder,
    /// Only one stream may be open at a time.
    pub exclusive: bool,
    pub default_input: bool,
    pub default_output: bool,
    /// Fault returned by every stream open, e.g. to mimic a disconnected device.
    pub open_fault: Option<Fault>,
    pub clock: SimulatedClock,
    pub probe: SimulatedProbe,
}

impl SimulatedDeviceSpec {
    /// Stereo in/out device at 48 kHz float32 with both layouts, masks, and
    /// buffers from 1 ms to 100 ms (10 ms default).
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            inputs: 2,
            outputs: 2,
            mix: Mix::new(48000, SampleType::Float32),
            rates: vec![22050, 44100, 48000, 96000],
            samples: SampleType::ALL.to_vec(),
            buffer_range: BufferSizeRange {
                min: Duration::from_millis(1),
                max: Duration::from_millis(100),
                current: Duration::from_millis(10),
            },
            interleaved: true,
            non_interleaved: true,
            channel_mask: true,
            mask_order: MaskOrder::Ascending,
            exclusive: false,
            default_input: false,
            default_output: false,
            open_fault: None,
            clock: SimulatedClock::Manual,
            probe: SimulatedProbe::new(),
        }
    }

    pub fn with_channels(mut self, inputs: usize, outputs: usize) -> Self {
        self.inputs = inputs;
        self.outputs = outputs;
        self
    }

    pub fn with_mix(mut self, mix: Mix) -> Self {
        self.mix = mix;
        self
    }

    pub fn with_rates(mut self, rates: &[u32]) -> Self {
        self.rates = rates.to_vec();
        self
    }

    pub fn with_samples(mut self, samples: &[SampleType]) -> Self {
        self.samples = samples.to_vec();
        self
    }

    pub fn with_buffer_range(mut self, min: Duration, max: Duration, current: Duration) -> Self {
        self.buffer_range = BufferSizeRange { min, max, current };
        self
    }

    pub fn with_access(mut self, interleaved: bool, non_interleaved: bool) -> Self {
        self.interleaved = interleaved;
        self.non_interleaved = non_interleaved;
        self
    }

    pub fn with_channel_mask(mut self, supported: bool) -> Self {
        self.channel_mask = supported;
        self
    }

    pub fn with_mask_order(mut self, order: MaskOrder) -> Self {
        self.mask_order = order;
        self
    }

    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    pub fn as_default(mut self, input: bool, output: bool) -> Self {
        self.default_input = input;
        self.default_output = output;
        self
    }

    pub fn with_open_fault(mut self, fault: Fault) -> Self {
        self.open_fault = Some(fault);
        self
    }

    pub fn with_clock(mut self, clock: SimulatedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn probe(&self) -> SimulatedProbe {
        self.probe.clone()
    }

    pub(crate) fn capabilities(&self) -> DeviceCaps {
        let mut caps = DeviceCaps::NONE;
        if self.inputs > 0 {
            caps |= DeviceCaps::INPUT;
        }
        if self.outputs > 0 {
            caps |= DeviceCaps::OUTPUT;
        }
        if self.exclusive {
            caps |= DeviceCaps::HW_DIRECT;
        }
        if self.default_input || self.default_output {
            caps |= DeviceCaps::DEFAULT_DEVICE;
        }
        caps
    }

    pub(crate) fn matches(&self, flags: EnumFlags) -> bool {
        (flags.contains(EnumFlags::INPUT) && self.inputs > 0) || (flags.contains(EnumFlags::OUTPUT) && self.outputs > 0)
    }

    fn supports(&self, format: &Format) -> bool {
        let channels = &format.channels;
        if format.validate().is_err()
            || !self.rates.contains(&format.mix.rate)
            || !self.samples.contains(&format.mix.sample)
            || channels.inputs > self.inputs
            || channels.outputs > self.outputs
        {
            return false;
        }
        if channels.in_mask != 0 || channels.out_mask != 0 {
            if !self.channel_mask {
                return false;
            }
            let inputs = ChannelRouter::new(channels, Direction::Input, self.mask_order);
            let outputs = ChannelRouter::new(channels, Direction::Output, self.mask_order);
            if inputs.check(self.inputs).is_err() || outputs.check(self.outputs).is_err() {
                return false;
            }
        }
        true
    }
}

/// Shared state of one simulated device.
#[derive(Debug)]
pub(crate) struct DeviceState {
    pub(crate) spec: SimulatedDeviceSpec,
    busy: AtomicBool,
}

impl DeviceState {
    pub(crate) fn new(spec: SimulatedDeviceSpec) -> Self {
        Self {
            spec,
            busy: AtomicBool::new(false),
        }
    }

    fn acquire(&self) -> Result<(), Fault> {
        if !self.spec.exclusive {
            return Ok(());
        }
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| FAULT_BUSY)
    }

    pub(crate) fn release(&self) {
        if self.spec.exclusive {
            self.busy.store(false, Ordering::Release);
        }
    }
}

/// An opened simulated device.
pub(crate) struct SimulatedDevice {
    state: Arc<DeviceState>,
}

impl SimulatedDevice {
    pub(crate) fn new(state: Arc<DeviceState>) -> Self {
        Self { state }
    }
}

impl DeviceBackend for SimulatedDevice {
    fn name(&self) -> Result<String, Fault> {
        Ok(self.state.spec.name.clone())
    }

    fn mix(&self) -> Result<Option<Mix>, Fault> {
        Ok(Some(self.state.spec.mix))
    }

    fn channel_count(&self, output: bool) -> Result<usize, Fault> {
        let spec = &self.state.spec;
        Ok(if output { spec.outputs } else { spec.inputs })
    }

    fn channel_name(&self, output: bool, index: usize) -> Result<String, Fault> {
        if index >= self.channel_count(output)? {
            return Err(FAULT_INVALID_ARGUMENT);
        }
        Ok(format!("{} {}", if output { "Output" } else { "Input" }, index + 1))
    }

    fn supports_access(&self, interleaved: bool) -> Result<bool, Fault> {
        let spec = &self.state.spec;
        Ok(if interleaved { spec.interleaved } else { spec.non_interleaved })
    }

    fn supports_format(&self, format: &Format) -> Result<bool, Fault> {
        Ok(self.state.spec.supports(format))
    }

    fn buffer_size_range(&self, format: &Format) -> Result<BufferSizeRange, Fault> {
        if !self.state.spec.supports(format) {
            return Err(FAULT_FORMAT);
        }
        Ok(self.state.spec.buffer_range)
    }

    fn open_stream(
        &self,
        request: &StreamRequest,
        sink: Arc<dyn BufferSink>,
    ) -> Result<Box<dyn StreamBackend>, Fault> {
        let spec = &self.state.spec;
        if let Some(fault) = spec.open_fault {
            return Err(fault);
        }
        if !spec.supports(&request.format) {
            return Err(FAULT_FORMAT);
        }
        if !self.supports_access(request.interleaved)? || !spec.buffer_range.is_valid() {
            return Err(FAULT_INVALID_ARGUMENT);
        }
        self.state.acquire()?;

        let buffer_size = spec.buffer_range.clamp(request.buffer_size);
        let frames = request.format.frames_for(buffer_size).max(1);
        let channels = &request.format.channels;
        let engine = Arc::new(Engine::new(
            sink,
            request.format,
            request.interleaved,
            frames,
            ChannelRouter::new(channels, Direction::Input, spec.mask_order),
            ChannelRouter::new(channels, Direction::Output, spec.mask_order),
            spec.probe.clone(),
        ));
        spec.probe.attach(&engine, spec.outputs);
        Ok(Box::new(SimulatedStream::new(engine, Arc::clone(&self.state))))
    }
}

/// Device list snapshot.
pub(crate) struct SimulatedDeviceList {
    entries: Vec<Arc<DeviceState>>,
}

impl SimulatedDeviceList {
    pub(crate) fn new(entries: Vec<Arc<DeviceState>>) -> Self {
        Self { entries }
    }

    fn find(&self, id: &str) -> Result<&SimulatedDeviceSpec, Fault> {
        self.entries
            .iter()
            .map(|d| &d.spec)
            .find(|spec| spec.id == id)
            .ok_or(super::FAULT_NOT_FOUND)
    }
}

impl DeviceListBackend for SimulatedDeviceList {
    fn count(&self) -> usize {
        self.entries.len()
    }

    fn id(&self, index: usize) -> Result<String, Fault> {
        self.entries
            .get(index)
            .map(|d| d.spec.id.clone())
            .ok_or(FAULT_INVALID_ARGUMENT)
    }

    fn name(&self, id: &str) -> Result<String, Fault> {
        self.find(id).map(|spec| spec.name.clone())
    }

    fn capabilities(&self, id: &str) -> Result<DeviceCaps, Fault> {
        self.find(id).map(SimulatedDeviceSpec::capabilities)
    }
}
