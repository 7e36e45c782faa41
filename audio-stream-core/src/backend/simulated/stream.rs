use std::f64::consts::TAU;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Instant;

use parking_lot::Mutex;

use super::device::{DeviceState, SimulatedClock};
use super::FAULT_THREAD;
use crate::models::buffer::{Buffer, InputData, OutputData};
use crate::models::error::Fault;
use crate::models::format::{Direction, Format, Latency};
use crate::processing::interleave::{deinterleave, interleave};
use crate::processing::routing::ChannelRouter;
use crate::processing::samples::{decode, encode};
use crate::traits::driver::{BufferSink, StreamBackend};

/// Byte pattern left in output buffers before the callback writes them, so
/// that missing writes are visible.
const STALE_OUTPUT: u8 = 0x55;

/// Deterministic input signal of a hardware input channel: a sine at
/// `220 × (channel + 1)` Hz with amplitude 0.5.
pub fn input_signal(hw_channel: usize, frame: u64, rate: u32) -> f64 {
    let freq = 220.0 * (hw_channel + 1) as f64;
    let n = (frame % rate as u64) as f64;
    0.5 * (TAU * freq * n / rate as f64).sin()
}

struct EngineState {
    position: u64,
    input: Vec<Vec<u8>>,
    output: Vec<Vec<u8>>,
    interleaved_input: Vec<u8>,
    interleaved_output: Vec<u8>,
    decoded: Vec<f64>,
}

/// Produces and consumes one stream's buffers.
pub(crate) struct Engine {
    sink: Arc<dyn BufferSink>,
    format: Format,
    interleaved: bool,
    frames: usize,
    inputs: ChannelRouter,
    outputs: ChannelRouter,
    probe: SimulatedProbe,
    xrun_pending: AtomicBool,
    state: Mutex<EngineState>,
}

impl Engine {
    pub(crate) fn new(
        sink: Arc<dyn BufferSink>,
        format: Format,
        interleaved: bool,
        frames: usize,
        inputs: ChannelRouter,
        outputs: ChannelRouter,
        probe: SimulatedProbe,
    ) -> Self {
        let size = format.sample_size();
        let channel_bytes = frames * size;
        let state = EngineState {
            position: 0,
            input: vec![vec![0; channel_bytes]; inputs.len()],
            output: vec![vec![0; channel_bytes]; outputs.len()],
            interleaved_input: vec![0; channel_bytes * inputs.len()],
            interleaved_output: vec![0; channel_bytes * outputs.len()],
            decoded: Vec::with_capacity(frames),
        };
        Self {
            sink,
            format,
            interleaved,
            frames,
            inputs,
            outputs,
            probe,
            xrun_pending: AtomicBool::new(false),
            state: Mutex::new(state),
        }
    }

    /// Deliver one buffer to the sink.
    pub(crate) fn cycle(&self) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let sample = self.format.mix.sample;
        let rate = self.format.mix.rate;
        let size = sample.size();
        let frames = self.frames;

        for (logical, hw) in self.inputs.iter() {
            let region = &mut state.input[logical];
            for f in 0..frames {
                let value = input_signal(hw, state.position + f as u64, rate);
                encode(sample, value, &mut region[f * size..(f + 1) * size]);
            }
        }
        state.output.iter_mut().for_each(|c| c.fill(STALE_OUTPUT));
        state.interleaved_output.fill(STALE_OUTPUT);

        let xrun = self.xrun_pending.swap(false, Ordering::AcqRel);
        {
            let input_refs: Vec<&[u8]> = state.input.iter().map(Vec::as_slice).collect();
            let mut output_refs: Vec<&mut [u8]> = state.output.iter_mut().map(Vec::as_mut_slice).collect();

            let input = match (self.inputs.is_empty(), self.interleaved) {
                (true, _) => None,
                (false, true) => {
                    interleave(&input_refs, size, frames, &mut state.interleaved_input);
                    Some(InputData::Interleaved(&state.interleaved_input))
                }
                (false, false) => Some(InputData::NonInterleaved(&input_refs)),
            };
            let output = match (self.outputs.is_empty(), self.interleaved) {
                (true, _) => None,
                (false, true) => Some(OutputData::Interleaved(&mut state.interleaved_output)),
                (false, false) => Some(OutputData::NonInterleaved(&mut output_refs)),
            };

            let mut buffer = Buffer::new(frames, input, output);
            buffer.position = state.position;
            buffer.time = state.position as f64 / rate as f64;
            buffer.time_valid = true;
            buffer.xrun = xrun;
            self.sink.on_buffer(&mut buffer);
        }

        if !self.outputs.is_empty() {
            if self.interleaved {
                let mut regions: Vec<&mut [u8]> = state.output.iter_mut().map(Vec::as_mut_slice).collect();
                deinterleave(&state.interleaved_output, size, frames, &mut regions);
            }
            for (logical, hw) in self.outputs.iter() {
                let region = &state.output[logical];
                state.decoded.clear();
                state
                    .decoded
                    .extend((0..frames).map(|f| decode(sample, &region[f * size..(f + 1) * size])));
                self.probe.record(hw, &state.decoded);
            }
        }

        state.position += frames as u64;
        self.probe.count_buffer();
    }

    pub(crate) fn xrun(&self, index: i32) {
        self.xrun_pending.store(true, Ordering::Release);
        self.sink.on_xrun(index);
    }
}

/// Instrumentation handle for a simulated device.
///
/// Records everything written to each hardware output channel, drives a
/// manually clocked stream, and injects xruns.
#[derive(Clone, Default)]
pub struct SimulatedProbe {
    inner: Arc<Mutex<ProbeState>>,
}

#[derive(Default)]
struct ProbeState {
    engine: Option<Weak<Engine>>,
    outputs: Vec<Vec<f64>>,
    buffers: u64,
    streams_opened: u64,
}

impl SimulatedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `cycles` buffers on the open stream from the calling thread.
    /// Returns how many were delivered: 0 when no stream is open.
    ///
    /// Delivery does not depend on the stream having been started, the same
    /// way a driver may prefill before start.
    pub fn pump(&self, cycles: usize) -> usize {
        let Some(engine) = self.engine() else {
            return 0;
        };
        for _ in 0..cycles {
            engine.cycle();
        }
        cycles
    }

    /// Report an xrun on the open stream. May be called from any thread.
    pub fn inject_xrun(&self, index: i32) -> bool {
        match self.engine() {
            Some(engine) => {
                engine.xrun(index);
                true
            }
            None => false,
        }
    }

    /// Normalized samples written to hardware output channel `hw` so far.
    pub fn output(&self, hw: usize) -> Vec<f64> {
        self.inner.lock().outputs.get(hw).cloned().unwrap_or_default()
    }

    pub fn clear_output(&self) {
        self.inner.lock().outputs.iter_mut().for_each(Vec::clear);
    }

    /// Buffers delivered since the probe was created.
    pub fn buffers_delivered(&self) -> u64 {
        self.inner.lock().buffers
    }

    pub fn streams_opened(&self) -> u64 {
        self.inner.lock().streams_opened
    }

    pub fn is_attached(&self) -> bool {
        self.engine().is_some()
    }

    fn engine(&self) -> Option<Arc<Engine>> {
        self.inner.lock().engine.as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn attach(&self, engine: &Arc<Engine>, hw_outputs: usize) {
        let mut inner = self.inner.lock();
        inner.engine = Some(Arc::downgrade(engine));
        if inner.outputs.len() < hw_outputs {
            inner.outputs.resize(hw_outputs, Vec::new());
        }
        inner.streams_opened += 1;
    }

    /// Forget `engine` unless a newer stream has attached since.
    pub(crate) fn detach(&self, engine: &Arc<Engine>) {
        let mut inner = self.inner.lock();
        let current = inner
            .engine
            .as_ref()
            .is_some_and(|weak| std::ptr::eq(weak.as_ptr(), Arc::as_ptr(engine)));
        if current {
            inner.engine = None;
        }
    }

    fn record(&self, hw: usize, samples: &[f64]) {
        let mut inner = self.inner.lock();
        if inner.outputs.len() <= hw {
            inner.outputs.resize(hw + 1, Vec::new());
        }
        inner.outputs[hw].extend_from_slice(samples);
    }

    fn count_buffer(&self) {
        self.inner.lock().buffers += 1;
    }
}

impl fmt::Debug for SimulatedProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("SimulatedProbe")
            .field("attached", &inner.engine.is_some())
            .field("buffers", &inner.buffers)
            .field("streams_opened", &inner.streams_opened)
            .finish()
    }
}

/// A simulated native stream.
pub(crate) struct SimulatedStream {
    engine: Arc<Engine>,
    device: Arc<DeviceState>,
    running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl SimulatedStream {
    pub(crate) fn new(engine: Arc<Engine>, device: Arc<DeviceState>) -> Self {
        Self {
            engine,
            device,
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    fn spawn_clock(&mut self) -> Result<(), Fault> {
        let engine = Arc::clone(&self.engine);
        let running = Arc::clone(&self.running);
        let period = self.engine.format.duration_for(self.engine.frames);

        let handle = thread::Builder::new()
            .name("sim-audio".into())
            .spawn(move || {
                let mut deadline = Instant::now();
                while running.load(Ordering::SeqCst) {
                    engine.cycle();
                    deadline += period;
                    let now = Instant::now();
                    if deadline > now {
                        thread::sleep(deadline - now);
                    } else if now - deadline > period {
                        engine.xrun(0);
                        deadline = now;
                    }
                }
            })
            .map_err(|e| {
                log::error!("failed to spawn simulated clock thread: {}", e);
                FAULT_THREAD
            })?;

        self.thread = Some(handle);
        Ok(())
    }
}

impl StreamBackend for SimulatedStream {
    fn frames(&self) -> usize {
        self.engine.frames
    }

    fn latency(&self) -> Result<Latency, Fault> {
        let period = self.engine.format.duration_for(self.engine.frames);
        let channels = self.engine.format.channels;
        Ok(Latency {
            input: (channels.count(Direction::Input) > 0).then_some(period),
            output: (channels.count(Direction::Output) > 0).then_some(period),
        })
    }

    fn start(&mut self) -> Result<(), Fault> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        match self.device.spec.clock {
            SimulatedClock::Manual => Ok(()),
            SimulatedClock::RealTime => self.spawn_clock().inspect_err(|_| {
                self.running.store(false, Ordering::SeqCst);
            }),
        }
    }

    fn stop(&mut self) -> Result<(), Fault> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                log::warn!("simulated clock thread panicked");
            }
        }
        Ok(())
    }
}

impl Drop for SimulatedStream {
    fn drop(&mut self) {
        let _ = self.stop();
        self.engine.probe.detach(&self.engine);
        self.device.release();
    }
}
