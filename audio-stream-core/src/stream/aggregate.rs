//! Aggregate streams: one application stream spanning several devices.
//!
//! Every member device runs its own native stream. Each member exchanges
//! interleaved frames with the aggregate through two SPSC byte rings, one
//! per direction. Buffers of the master member drive the application
//! callback: they gather every member's input into one wide buffer, call
//! the application, then hand each member its share of the output.
//!
//! ```text
//! slave  ──input ring──▶ ┐                       ┌ ──output ring──▶ slave
//! master ──input ring──▶ ┴─▶ application callback ┴─ ──output ring──▶ master
//! ```
//!
//! Aggregate channels are the members' channels in device order. Xruns
//! carry the index of the member they happened on.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;

use super::dispatch::{Dispatcher, InFlight};
use super::Stream;
use crate::host::device::Device;
use crate::models::buffer::{Buffer, InputData, OutputData};
use crate::models::error::{AudioError, Fault};
use crate::models::format::{Channels, Direction, Format, Latency, Mix};
use crate::processing::interleave::{deinterleave, interleave, unweave_from, weave_into};
use crate::processing::ring_buffer::{byte_ring, RingConsumer, RingProducer};
use crate::traits::callbacks::StreamParams;
use crate::traits::driver::{BufferSink, ServiceBackend, StreamBackend};

/// Ring capacity per member and direction, in buffers of the largest member.
const RING_BUFFERS: usize = 4;

/// One member of an aggregate stream.
#[derive(Debug, Clone, Copy)]
pub struct AggregateDeviceParams<'a> {
    pub device: &'a Device,
    /// Channels taken from this device. Masks select hardware channels the
    /// same way they do for a single-device stream.
    pub channels: Channels,
    pub buffer_size: Duration,
}

impl<'a> AggregateDeviceParams<'a> {
    pub fn new(device: &'a Device, channels: Channels, buffer_size: Duration) -> Self {
        Self {
            device,
            channels,
            buffer_size,
        }
    }
}

/// Everything needed to open an aggregate stream.
pub struct AggregateStreamParams<'a, U> {
    pub stream: StreamParams<U>,
    pub devices: Vec<AggregateDeviceParams<'a>>,
    /// Shared by every member.
    pub mix: Mix,
    /// Index into `devices` of the member whose buffers drive the callback.
    pub master: usize,
}

impl<'a, U> AggregateStreamParams<'a, U> {
    pub fn new(stream: StreamParams<U>, devices: Vec<AggregateDeviceParams<'a>>, mix: Mix, master: usize) -> Self {
        Self {
            stream,
            devices,
            mix,
            master,
        }
    }
}

/// One direction of a member's exchange with the aggregate. Each half is
/// only ever used from one thread; `try_lock` never waits there.
struct LaneRing {
    producer: Mutex<RingProducer>,
    consumer: Mutex<RingConsumer>,
    /// Bytes queued as last seen by either side.
    fill: AtomicUsize,
}

impl LaneRing {
    fn new(capacity: usize) -> Self {
        let (producer, consumer) = byte_ring(capacity);
        Self {
            producer: Mutex::new(producer),
            consumer: Mutex::new(consumer),
            fill: AtomicUsize::new(0),
        }
    }

    fn push(&self, data: &[u8]) -> bool {
        let Some(mut producer) = self.producer.try_lock() else {
            return false;
        };
        let pushed = producer.push_all(&[data]);
        self.fill.store(producer.capacity() - producer.vacant(), Ordering::Relaxed);
        pushed
    }

    fn pop(&self, out: &mut [u8]) -> usize {
        let Some(mut consumer) = self.consumer.try_lock() else {
            return 0;
        };
        let read = consumer.pop_into(out);
        self.fill.store(consumer.occupied(), Ordering::Relaxed);
        read
    }

    /// Empty the ring, then queue `prefill`. Only while members are stopped.
    fn reset(&self, prefill: &[u8]) {
        self.consumer.lock().clear();
        let queued = self.producer.lock().push(prefill);
        self.fill.store(queued, Ordering::Relaxed);
    }

    fn queued_frames(&self, frame_bytes: usize) -> usize {
        self.fill.load(Ordering::Relaxed) / frame_bytes.max(1)
    }
}

struct Lane {
    format: Format,
    input_offset: usize,
    output_offset: usize,
    input: LaneRing,
    output: LaneRing,
    /// Layout conversion space for the member's own thread.
    scratch: Mutex<Vec<u8>>,
}

impl Lane {
    fn new(format: Format, input_offset: usize, output_offset: usize, frames: usize) -> Self {
        let input_bytes = format.buffer_bytes(Direction::Input, frames);
        let output_bytes = format.buffer_bytes(Direction::Output, frames);
        Self {
            format,
            input_offset,
            output_offset,
            input: LaneRing::new(input_bytes * RING_BUFFERS),
            output: LaneRing::new(output_bytes * RING_BUFFERS),
            scratch: Mutex::new(vec![0; input_bytes.max(output_bytes)]),
        }
    }

    fn silence_byte(&self) -> u8 {
        self.format.mix.sample.silence_byte()
    }
}

/// Working buffers of the master thread.
struct Weave {
    input: Vec<u8>,
    output: Vec<u8>,
    lane: Vec<u8>,
    input_planes: Vec<Vec<u8>>,
    output_planes: Vec<Vec<u8>>,
}

impl Weave {
    fn new(format: &Format, interleaved: bool, frames: usize, lanes: &[Lane]) -> Self {
        let lane = lanes
            .iter()
            .map(|l| l.format.buffer_bytes(Direction::Input, frames).max(l.format.buffer_bytes(Direction::Output, frames)))
            .max()
            .unwrap_or(0);
        let plane = format.sample_size() * frames;
        let planes = |direction: Direction| {
            if interleaved {
                Vec::new()
            } else {
                vec![vec![0; plane]; format.channels.count(direction)]
            }
        };
        Self {
            input: vec![0; format.buffer_bytes(Direction::Input, frames)],
            output: vec![0; format.buffer_bytes(Direction::Output, frames)],
            lane: vec![0; lane],
            input_planes: planes(Direction::Input),
            output_planes: planes(Direction::Output),
        }
    }
}

/// State shared by the member sinks and the aggregate backend.
///
/// `running` and `inside` form the same gate as the dispatcher's: members
/// touch the rings only while `running` is set, and `stop` waits for
/// `inside` to drain before stopping any member.
struct AggregateCore {
    dispatcher: Arc<Dispatcher>,
    format: Format,
    interleaved: bool,
    frames: usize,
    master: usize,
    running: AtomicBool,
    inside: AtomicUsize,
    lanes: Vec<Lane>,
    weave: Mutex<Weave>,
}

impl AggregateCore {
    fn xrun(&self, index: usize) {
        self.dispatcher.on_xrun(index as i32);
    }

    fn reset_rings(&self) {
        for lane in &self.lanes {
            lane.input.reset(&[]);
            // One buffer of silence keeps members from starving before the
            // first master buffer has produced output.
            let prefill = vec![lane.silence_byte(); lane.format.buffer_bytes(Direction::Output, self.frames)];
            lane.output.reset(&prefill);
        }
    }

    /// Queue a member's input and fetch its output.
    fn exchange(&self, index: usize, buffer: &mut Buffer<'_>) {
        let lane = &self.lanes[index];
        let Some(mut scratch) = lane.scratch.try_lock() else {
            silence(&lane.format, buffer);
            return;
        };
        let size = lane.format.sample_size();
        let frames = buffer.frames.min(self.frames);

        if let Some(input) = &buffer.input {
            let bytes = lane.format.buffer_bytes(Direction::Input, frames);
            let data = match input {
                InputData::Interleaved(data) => &data[..bytes],
                InputData::NonInterleaved(channels) => {
                    interleave(channels, size, frames, &mut scratch[..bytes]);
                    &scratch[..bytes]
                }
            };
            if !lane.input.push(data) {
                self.xrun(index);
            }
        }

        if let Some(output) = buffer.output.as_mut() {
            let bytes = lane.format.buffer_bytes(Direction::Output, frames);
            let region = match output {
                OutputData::Interleaved(out) => &mut out[..bytes],
                OutputData::NonInterleaved(_) => &mut scratch[..bytes],
            };
            let read = lane.output.pop(region);
            if read < bytes {
                region[read..].fill(lane.silence_byte());
                self.xrun(index);
            }
            if let OutputData::NonInterleaved(channels) = output {
                deinterleave(&scratch[..bytes], size, frames, channels);
            }
        }
    }

    /// Gather member input, run the application, scatter its output.
    fn run_master(&self, buffer: &Buffer<'_>) {
        let Some(mut weave) = self.weave.try_lock() else {
            return;
        };
        let Weave {
            input: wide_in,
            output: wide_out,
            lane: chunk,
            input_planes,
            output_planes,
        } = &mut *weave;

        let frames = buffer.frames.min(self.frames);
        let size = self.format.sample_size();
        let plane = size * frames;
        let inputs = self.format.channels.inputs;
        let outputs = self.format.channels.outputs;
        let wide_in = &mut wide_in[..self.format.buffer_bytes(Direction::Input, frames)];
        let wide_out = &mut wide_out[..self.format.buffer_bytes(Direction::Output, frames)];

        for (index, lane) in self.lanes.iter().enumerate() {
            let channels = lane.format.channels.inputs;
            if channels == 0 {
                continue;
            }
            let region = &mut chunk[..lane.format.buffer_bytes(Direction::Input, frames)];
            let read = lane.input.pop(region);
            if read < region.len() {
                region[read..].fill(lane.silence_byte());
                self.xrun(index);
            }
            weave_into(region, channels, wide_in, inputs, lane.input_offset, size, frames);
        }

        if !self.interleaved && inputs > 0 {
            let mut planes: Vec<&mut [u8]> = input_planes.iter_mut().map(|p| &mut p[..plane]).collect();
            deinterleave(wide_in, size, frames, &mut planes);
        }

        {
            let input_refs: Vec<&[u8]> = input_planes.iter().map(|p| &p[..plane]).collect();
            let mut output_refs: Vec<&mut [u8]> = output_planes.iter_mut().map(|p| &mut p[..plane]).collect();
            let input = match (inputs, self.interleaved) {
                (0, _) => None,
                (_, true) => Some(InputData::Interleaved(&*wide_in)),
                (_, false) => Some(InputData::NonInterleaved(&input_refs)),
            };
            let output = match (outputs, self.interleaved) {
                (0, _) => None,
                (_, true) => Some(OutputData::Interleaved(&mut *wide_out)),
                (_, false) => Some(OutputData::NonInterleaved(&mut output_refs)),
            };

            let mut app = Buffer::new(frames, input, output);
            app.position = buffer.position;
            app.time = buffer.time;
            app.time_valid = buffer.time_valid;
            app.xrun = buffer.xrun;
            self.dispatcher.on_buffer(&mut app);
        }

        if outputs == 0 {
            return;
        }
        if !self.interleaved {
            let planes: Vec<&[u8]> = output_planes.iter().map(|p| &p[..plane]).collect();
            interleave(&planes, size, frames, wide_out);
        }
        for (index, lane) in self.lanes.iter().enumerate() {
            let channels = lane.format.channels.outputs;
            if channels == 0 {
                continue;
            }
            let region = &mut chunk[..lane.format.buffer_bytes(Direction::Output, frames)];
            unweave_from(wide_out, outputs, lane.output_offset, region, channels, size, frames);
            if !lane.output.push(region) {
                self.xrun(index);
            }
        }
    }
}

fn silence(format: &Format, buffer: &mut Buffer<'_>) {
    let frames = buffer.frames;
    buffer.silence_output(
        format.mix.sample,
        format.buffer_bytes(Direction::Output, frames),
        format.sample_size() * frames,
    );
}

/// Receives one member device's buffers.
struct MemberSink {
    index: usize,
    format: Format,
    /// Filled in once every member stream is open.
    core: Arc<OnceLock<Arc<AggregateCore>>>,
}

impl BufferSink for MemberSink {
    fn on_buffer(&self, buffer: &mut Buffer<'_>) {
        let Some(core) = self.core.get() else {
            silence(&self.format, buffer);
            return;
        };
        core.inside.fetch_add(1, Ordering::SeqCst);
        let _in_flight = InFlight(&core.inside);

        if !core.running.load(Ordering::SeqCst) {
            silence(&self.format, buffer);
            return;
        }
        core.exchange(self.index, buffer);
        if self.index == core.master {
            core.run_master(buffer);
        }
    }

    fn on_xrun(&self, _index: i32) {
        if let Some(core) = self.core.get() {
            core.xrun(self.index);
        }
    }
}

/// The aggregate as a native stream, so that [`Stream`] drives it like any
/// other.
struct AggregateBackend {
    core: Arc<AggregateCore>,
    members: Vec<Box<dyn StreamBackend>>,
}

impl AggregateBackend {
    /// Slaves first, master last.
    fn start_order(&self) -> Vec<usize> {
        let master = self.core.master;
        (0..self.members.len())
            .filter(|&i| i != master)
            .chain(std::iter::once(master))
            .collect()
    }
}

impl StreamBackend for AggregateBackend {
    fn frames(&self) -> usize {
        self.core.frames
    }

    /// Per direction, the largest member latency plus what its ring holds.
    fn latency(&self) -> Result<Latency, Fault> {
        let format = &self.core.format;
        let mut total = Latency::default();
        for (member, lane) in self.members.iter().zip(&self.core.lanes) {
            let local = member.latency()?;
            if let Some(input) = local.input {
                let queued = lane.input.queued_frames(lane.format.frame_bytes(Direction::Input));
                let latency = input + format.duration_for(queued);
                total.input = Some(total.input.map_or(latency, |t| t.max(latency)));
            }
            if let Some(output) = local.output {
                let queued = lane.output.queued_frames(lane.format.frame_bytes(Direction::Output));
                let latency = output + format.duration_for(queued);
                total.output = Some(total.output.map_or(latency, |t| t.max(latency)));
            }
        }
        Ok(total)
    }

    fn start(&mut self) -> Result<(), Fault> {
        self.core.reset_rings();
        let order = self.start_order();
        for (started, &index) in order.iter().enumerate() {
            if let Err(fault) = self.members[index].start() {
                log::error!("aggregate member {} failed to start: fault {}", index, fault);
                for &undo in order[..started].iter().rev() {
                    let _ = self.members[undo].stop();
                }
                return Err(fault);
            }
        }
        self.core.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Master first, then slaves. Every member is stopped even when one
    /// fails; the first fault is returned.
    fn stop(&mut self) -> Result<(), Fault> {
        self.core.running.store(false, Ordering::SeqCst);
        while self.core.inside.load(Ordering::SeqCst) != 0 {
            std::hint::spin_loop();
            std::thread::yield_now();
        }

        let mut result = Ok(());
        for index in self.start_order().into_iter().rev() {
            if let Err(fault) = self.members[index].stop() {
                log::warn!("aggregate member {} failed to stop: fault {}", index, fault);
                result = result.and(Err(fault));
            }
        }
        result
    }
}

/// Open the member streams and wrap them in one [`Stream`].
pub(crate) fn open<U: Send + Sync + 'static>(
    service: &Arc<dyn ServiceBackend>,
    params: AggregateStreamParams<'_, U>,
    user: U,
) -> Result<Stream, AudioError> {
    let AggregateStreamParams {
        stream,
        devices,
        mix,
        master,
    } = params;

    if devices.is_empty() {
        return Err(AudioError::ConfigurationFailed("an aggregate stream needs at least one device".into()));
    }
    if master >= devices.len() {
        return Err(AudioError::ConfigurationFailed(format!(
            "master index {master} is out of range for {} devices",
            devices.len()
        )));
    }
    let system = service.system();
    if let Some(member) = devices.iter().find(|m| m.device.system() != system) {
        return Err(AudioError::ConfigurationFailed(format!(
            "{} belongs to {}, not {}",
            member.device.id(),
            member.device.system(),
            system
        )));
    }

    let interleaved = stream.interleaved;
    let mut layouts = Vec::with_capacity(devices.len());
    let (mut inputs, mut outputs) = (0, 0);
    for member in &devices {
        let format = Format::new(mix, member.channels);
        member.device.check_stream(&format, interleaved)?;
        layouts.push((format, inputs, outputs));
        inputs += member.channels.inputs;
        outputs += member.channels.outputs;
    }
    let format = Format::new(mix, Channels::new(inputs, 0, outputs, 0));
    format.validate()?;

    let dispatcher = Arc::new(Dispatcher::new(format, stream, user));
    let cell = Arc::new(OnceLock::new());
    let mut members = Vec::with_capacity(devices.len());
    for (index, (member, (lane_format, _, _))) in devices.iter().zip(&layouts).enumerate() {
        let sink: Arc<dyn BufferSink> = Arc::new(MemberSink {
            index,
            format: *lane_format,
            core: Arc::clone(&cell),
        });
        members.push(member.device.open_backend(*lane_format, member.buffer_size, interleaved, sink)?);
    }

    let frames = members.iter().map(|m| m.frames()).max().unwrap_or(1);
    let lanes: Vec<Lane> = layouts
        .into_iter()
        .map(|(lane_format, input_offset, output_offset)| Lane::new(lane_format, input_offset, output_offset, frames))
        .collect();
    let core = Arc::new(AggregateCore {
        dispatcher: Arc::clone(&dispatcher),
        format,
        interleaved,
        frames,
        master,
        running: AtomicBool::new(false),
        inside: AtomicUsize::new(0),
        weave: Mutex::new(Weave::new(&format, interleaved, frames, &lanes)),
        lanes,
    });
    let _ = cell.set(Arc::clone(&core));

    log::debug!(
        "aggregate stream over {} devices, master {} ({}), {} frames",
        members.len(),
        master,
        devices[master].device.id(),
        frames
    );
    let backend = AggregateBackend { core, members };
    Ok(Stream::new(Arc::clone(service), dispatcher, Box::new(backend), format))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::simulated::{input_signal, SimulatedDeviceSpec, SimulatedProbe, SimulatedService};
    use crate::host::platform::Platform;
    use crate::host::service::Service;
    use crate::models::enums::System;
    use crate::models::sample::SampleType;
    use crate::models::state::StreamState;
    use crate::processing::interleave::interleaved_offset;
    use crate::processing::samples::{decode, encode};
    use crate::stream::StreamContext;
    use approx::assert_relative_eq;

    const FRAMES: usize = 480;
    const MIX: Mix = Mix::new(48000, SampleType::Float32);

    #[derive(Default)]
    struct Recorder {
        /// (position, aggregate input 0, aggregate input 1) at frame 3.
        inputs: parking_lot::Mutex<Vec<(u64, f64, f64)>>,
        xruns: parking_lot::Mutex<Vec<i32>>,
    }

    fn service() -> (Service, SimulatedProbe, SimulatedProbe) {
        let first = SimulatedDeviceSpec::new("first", "First");
        let second = SimulatedDeviceSpec::new("second", "Second");
        let monitors = (first.probe(), second.probe());
        let service = Platform::builder("aggregate-tests")
            .with_service(Arc::new(SimulatedService::new(vec![first, second])))
            .build()
            .service(System::Simulated)
            .unwrap();
        (service, monitors.0, monitors.1)
    }

    /// Reads the two aggregate inputs, writes 0.25 and -0.5 to the two
    /// aggregate outputs.
    fn constant_out(ctx: &mut StreamContext<'_>, buffer: &mut Buffer<'_>, rec: &Arc<Recorder>) -> Result<(), AudioError> {
        let sample = ctx.format().mix.sample;
        let size = sample.size();
        let frames = buffer.frames;
        let read = |c: usize| match &buffer.input {
            Some(InputData::Interleaved(data)) => {
                let at = interleaved_offset(3, c, 2, size);
                decode(sample, &data[at..at + size])
            }
            Some(InputData::NonInterleaved(channels)) => decode(sample, &channels[c][3 * size..4 * size]),
            None => f64::NAN,
        };
        let seen = (buffer.position, read(0), read(1));
        rec.inputs.lock().push(seen);

        for (c, value) in [(0, 0.25), (1, -0.5)] {
            for f in 0..frames {
                match buffer.output.as_mut() {
                    Some(OutputData::Interleaved(out)) => {
                        let at = interleaved_offset(f, c, 2, size);
                        encode(sample, value, &mut out[at..at + size]);
                    }
                    Some(OutputData::NonInterleaved(channels)) => {
                        encode(sample, value, &mut channels[c][f * size..(f + 1) * size]);
                    }
                    None => {}
                }
            }
        }
        Ok(())
    }

    fn params<'a>(
        devices: &'a [crate::host::device::Device],
        interleaved: bool,
        master: usize,
    ) -> AggregateStreamParams<'a, Arc<Recorder>> {
        let stream = StreamParams::new(interleaved, constant_out)
            .with_xrun(|index, rec: &Arc<Recorder>| rec.xruns.lock().push(index));
        let buffer = Duration::from_millis(10);
        AggregateStreamParams::new(
            stream,
            vec![
                // First device: hardware input 0, hardware output 0.
                AggregateDeviceParams::new(&devices[0], Channels::new(1, 0, 1, 0), buffer),
                // Second device: hardware input 1, hardware output 0.
                AggregateDeviceParams::new(&devices[1], Channels::new(1, 0b10, 1, 0), buffer),
            ],
            MIX,
            master,
        )
    }

    fn open_both(service: &Service) -> Vec<crate::host::device::Device> {
        vec![service.open_device("first").unwrap(), service.open_device("second").unwrap()]
    }

    #[test]
    fn master_buffer_weaves_members_in_device_order() {
        for interleaved in [true, false] {
            let (service, first, second) = service();
            let devices = open_both(&service);
            let rec = Arc::new(Recorder::default());
            let stream = service.aggregate_stream(params(&devices, interleaved, 0), Arc::clone(&rec)).unwrap();
            assert_eq!(stream.format().channels, Channels::new(2, 0, 2, 0));
            assert_eq!(stream.frames(), FRAMES);

            stream.start().unwrap();
            for _ in 0..3 {
                second.pump(1);
                first.pump(1);
            }
            stream.stop().unwrap();

            let inputs = rec.inputs.lock().clone();
            assert_eq!(inputs.len(), 3);
            for (position, from_first, from_second) in inputs {
                assert_relative_eq!(from_first, input_signal(0, position + 3, 48000), epsilon = 1e-6);
                assert_relative_eq!(from_second, input_signal(1, position + 3, 48000), epsilon = 1e-6);
            }

            // One prefilled buffer of silence, then the application's output.
            for (monitor, value) in [(&first, 0.25), (&second, -0.5)] {
                let out = monitor.output(0);
                assert_eq!(out.len(), 3 * FRAMES);
                assert!(out[..FRAMES].iter().all(|&s| s == 0.0));
                assert!(out[FRAMES..].iter().all(|&s| s == value), "interleaved={interleaved}");
            }
            assert!(rec.xruns.lock().is_empty());
        }
    }

    #[test]
    fn starved_member_reports_its_own_index() {
        let (service, first, second) = service();
        let devices = open_both(&service);
        let rec = Arc::new(Recorder::default());
        let stream = service.aggregate_stream(params(&devices, true, 0), Arc::clone(&rec)).unwrap();
        stream.start().unwrap();

        // The second device never delivers: its input ring stays empty.
        first.pump(2);
        assert_eq!(*rec.xruns.lock(), vec![1, 1]);
        assert!(rec.inputs.lock().iter().all(|&(_, _, second)| second == 0.0));

        rec.xruns.lock().clear();
        second.inject_xrun(0);
        first.inject_xrun(0);
        assert_eq!(*rec.xruns.lock(), vec![1, 0]);
        stream.stop().unwrap();
    }

    #[test]
    fn slave_can_drive_the_callback() {
        let (service, first, second) = service();
        let devices = open_both(&service);
        let rec = Arc::new(Recorder::default());
        let stream = service.aggregate_stream(params(&devices, true, 1), Arc::clone(&rec)).unwrap();
        stream.start().unwrap();
        first.pump(1);
        assert!(rec.inputs.lock().is_empty());
        second.pump(1);
        assert_eq!(rec.inputs.lock().len(), 1);
        stream.stop().unwrap();
    }

    #[test]
    fn stopped_aggregate_silences_members() {
        let (service, first, second) = service();
        let devices = open_both(&service);
        let rec = Arc::new(Recorder::default());
        let stream = service.aggregate_stream(params(&devices, true, 0), Arc::clone(&rec)).unwrap();

        second.pump(1);
        first.pump(1);
        stream.start().unwrap();
        second.pump(1);
        first.pump(1);
        stream.stop().unwrap();
        second.pump(1);
        first.pump(1);

        assert_eq!(rec.inputs.lock().len(), 1);
        assert!(first.output(0).iter().all(|&s| s == 0.0));
        assert!(second.output(0).iter().all(|&s| s == 0.0));
        assert_eq!(stream.state(), StreamState::Stopped);

        // Restart begins from empty rings again.
        stream.start().unwrap();
        second.pump(1);
        first.pump(1);
        stream.stop().unwrap();
        assert!(rec.xruns.lock().is_empty());
        assert_eq!(rec.inputs.lock().len(), 2);
    }

    #[test]
    fn latency_covers_members_and_queued_frames() {
        let (service, _first, second) = service();
        let devices = open_both(&service);
        let stream = service
            .aggregate_stream(params(&devices, true, 0), Arc::new(Recorder::default()))
            .unwrap();
        stream.start().unwrap();
        second.pump(1);

        let latency = stream.latency().unwrap();
        let period = Duration::from_millis(10);
        assert!(latency.input.unwrap() >= period * 2 - Duration::from_micros(1));
        assert!(latency.output.unwrap() >= period - Duration::from_micros(1));
        stream.stop().unwrap();
    }

    #[test]
    fn invalid_member_sets_are_rejected() {
        let (service, first, _second) = service();
        let devices = open_both(&service);

        let mut bad_master = params(&devices, true, 0);
        bad_master.master = 2;
        assert!(matches!(
            service.aggregate_stream(bad_master, Arc::new(Recorder::default())),
            Err(AudioError::ConfigurationFailed(_))
        ));

        let mut empty = params(&devices, true, 0);
        empty.devices.clear();
        empty.master = 0;
        assert!(matches!(
            service.aggregate_stream(empty, Arc::new(Recorder::default())),
            Err(AudioError::ConfigurationFailed(_))
        ));

        let mut too_wide = params(&devices, true, 0);
        too_wide.devices[0].channels = Channels::new(3, 0, 0, 0);
        assert!(matches!(
            service.aggregate_stream(too_wide, Arc::new(Recorder::default())),
            Err(AudioError::UnsupportedFormat(_))
        ));
        assert_eq!(first.streams_opened(), 0);
    }

    #[test]
    fn dropping_the_aggregate_releases_every_member() {
        let (service, first, second) = service();
        let devices = open_both(&service);
        let stream = service
            .aggregate_stream(params(&devices, true, 0), Arc::new(Recorder::default()))
            .unwrap();
        stream.start().unwrap();
        assert!(first.is_attached() && second.is_attached());
        drop(stream);
        assert!(!first.is_attached());
        assert!(!second.is_attached());
    }
}
