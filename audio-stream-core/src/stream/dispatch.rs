use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::safe_buffer::SafeSlot;
use super::StreamContext;
use crate::models::buffer::Buffer;
use crate::models::diagnostics::StreamDiagnostics;
use crate::models::error::{AudioError, ProtocolViolation};
use crate::models::format::{Direction, Format};
use crate::traits::callbacks::StreamParams;
use crate::traits::driver::BufferSink;

type BufferHandler =
    Box<dyn Fn(&mut StreamContext<'_>, &mut Buffer<'_>) -> Result<(), AudioError> + Send + Sync>;
type XRunHandler = Box<dyn Fn(i32) + Send + Sync>;
type RunningHandler = Box<dyn Fn(bool, Option<&AudioError>) + Send + Sync>;

/// Decrements an in-flight counter when a delivery leaves the sink.
pub(crate) struct InFlight<'a>(pub(crate) &'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The stream's [`BufferSink`]: sits between the driver thread and the
/// application callbacks.
///
/// `running` is the gate. Buffers delivered while it is closed get silent
/// output and never reach the application. `inside` counts deliveries in
/// progress so that `Stream::stop` can wait for them. Both use `SeqCst`:
/// the driver thread increments `inside` before reading `running`, the
/// application thread clears `running` before reading `inside`, so at
/// least one side sees the other.
pub(crate) struct Dispatcher {
    format: Format,
    interleaved: bool,
    frames: AtomicUsize,
    running: AtomicBool,
    inside: AtomicUsize,
    safe: SafeSlot,
    on_buffer: BufferHandler,
    on_xrun: Option<XRunHandler>,
    on_running: Option<RunningHandler>,
    callbacks: AtomicU64,
    silenced: AtomicU64,
    /// Xrun flag of a gated-off buffer, handed to the next delivered one.
    xrun_carried: AtomicBool,
    xruns: AtomicU64,
    callback_errors: AtomicU64,
    violations: AtomicU64,
    last_violation: AtomicU8,
}

impl Dispatcher {
    pub(crate) fn new<U: Send + Sync + 'static>(format: Format, params: StreamParams<U>, user: U) -> Self {
        let user = Arc::new(user);
        let StreamParams {
            interleaved,
            on_buffer,
            on_xrun,
            on_running,
        } = params;

        let buffer_user = Arc::clone(&user);
        let on_buffer: BufferHandler =
            Box::new(move |ctx: &mut StreamContext<'_>, buffer: &mut Buffer<'_>| on_buffer(ctx, buffer, &*buffer_user));

        let on_xrun = on_xrun.map(|handler| {
            let user = Arc::clone(&user);
            Box::new(move |index: i32| handler(index, &*user)) as XRunHandler
        });

        let on_running = on_running.map(|handler| {
            let user = Arc::clone(&user);
            Box::new(move |running: bool, error: Option<&AudioError>| handler(running, error, &*user)) as RunningHandler
        });

        Self {
            format,
            interleaved,
            frames: AtomicUsize::new(0),
            running: AtomicBool::new(false),
            inside: AtomicUsize::new(0),
            safe: Arc::new(Mutex::new(None)),
            on_buffer,
            on_xrun,
            on_running,
            callbacks: AtomicU64::new(0),
            silenced: AtomicU64::new(0),
            xrun_carried: AtomicBool::new(false),
            xruns: AtomicU64::new(0),
            callback_errors: AtomicU64::new(0),
            violations: AtomicU64::new(0),
            last_violation: AtomicU8::new(0),
        }
    }

    pub(crate) fn interleaved(&self) -> bool {
        self.interleaved
    }

    pub(crate) fn set_frames(&self, frames: usize) {
        self.frames.store(frames, Ordering::Relaxed);
    }

    pub(crate) fn safe_slot(&self) -> &SafeSlot {
        &self.safe
    }

    pub(crate) fn has_safe_buffer(&self) -> bool {
        self.safe.lock().is_some()
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn open_gate(&self) {
        self.running.store(true, Ordering::SeqCst);
    }

    /// Close the gate and wait until no delivery is inside the dispatcher.
    /// After this returns the application callback will not run again until
    /// the gate reopens.
    pub(crate) fn close_gate(&self) {
        self.running.store(false, Ordering::SeqCst);
        while self.inside.load(Ordering::SeqCst) != 0 {
            std::hint::spin_loop();
            std::thread::yield_now();
        }
    }

    pub(crate) fn notify_running(&self, running: bool, error: Option<&AudioError>) {
        if let Some(handler) = &self.on_running {
            handler(running, error);
        }
    }

    pub(crate) fn record_violation(&self, violation: ProtocolViolation) {
        self.violations.fetch_add(1, Ordering::Relaxed);
        self.last_violation.store(violation.code(), Ordering::Relaxed);
        log::error!("stream buffer protocol violation: {}", violation);
    }

    pub(crate) fn diagnostics(&self) -> StreamDiagnostics {
        StreamDiagnostics {
            callbacks: self.callbacks.load(Ordering::Relaxed),
            silenced: self.silenced.load(Ordering::Relaxed),
            xruns: self.xruns.load(Ordering::Relaxed),
            callback_errors: self.callback_errors.load(Ordering::Relaxed),
            protocol_violations: self.violations.load(Ordering::Relaxed),
            last_violation: ProtocolViolation::from_code(self.last_violation.load(Ordering::Relaxed)),
        }
    }

    fn silence(&self, buffer: &mut Buffer<'_>) {
        let frames = buffer.frames;
        buffer.silence_output(
            self.format.mix.sample,
            self.format.buffer_bytes(Direction::Output, frames),
            self.format.sample_size() * frames,
        );
    }

    fn fail(&self, buffer: &mut Buffer<'_>, error: AudioError) {
        self.running.store(false, Ordering::SeqCst);
        self.callback_errors.fetch_add(1, Ordering::Relaxed);
        if let AudioError::ProtocolViolation(violation) = &error {
            self.record_violation(*violation);
        }
        log::error!("stream callback failed, silencing stream: {}", error);
        self.silence(buffer);
        self.notify_running(false, Some(&error));
    }
}

impl BufferSink for Dispatcher {
    fn on_buffer(&self, buffer: &mut Buffer<'_>) {
        self.inside.fetch_add(1, Ordering::SeqCst);
        let _in_flight = InFlight(&self.inside);

        if !self.running.load(Ordering::SeqCst) {
            if buffer.xrun {
                self.xrun_carried.store(true, Ordering::Relaxed);
            }
            self.silence(buffer);
            self.silenced.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.callbacks.fetch_add(1, Ordering::Relaxed);
        if self.xrun_carried.swap(false, Ordering::Relaxed) {
            buffer.xrun = true;
        }

        // Only contended while a registration is being dropped.
        let mut slot = self.safe.try_lock();
        let result = {
            let mut ctx = StreamContext {
                format: &self.format,
                max_frames: self.frames.load(Ordering::Relaxed),
                interleaved: self.interleaved,
                safe: slot.as_deref_mut().and_then(Option::as_mut),
            };
            (self.on_buffer)(&mut ctx, buffer)
        };

        if let Some(safe) = slot.as_deref_mut().and_then(Option::as_mut) {
            if safe.is_locked() {
                safe.abandon();
                self.record_violation(ProtocolViolation::MissingUnlock);
                self.silence(buffer);
            }
        }
        drop(slot);

        if let Err(error) = result {
            self.fail(buffer, error);
        }
    }

    fn on_xrun(&self, index: i32) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        self.xruns.fetch_add(1, Ordering::Relaxed);
        if let Some(handler) = &self.on_xrun {
            handler(index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::buffer::OutputData;
    use crate::models::format::{Channels, Mix};
    use crate::models::sample::SampleType;

    fn output_format() -> Format {
        Format::new(Mix::new(48000, SampleType::Int16), Channels::new(0, 0, 1, 0))
    }

    fn counting_dispatcher(result: Result<(), AudioError>) -> (Dispatcher, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let params = StreamParams::new(true, move |_ctx, buffer: &mut Buffer<'_>, calls: &Arc<AtomicUsize>| {
            calls.fetch_add(1, Ordering::SeqCst);
            if let Some(OutputData::Interleaved(out)) = buffer.output.as_mut() {
                out.fill(0x11);
            }
            result.clone()
        });
        let dispatcher = Dispatcher::new(output_format(), params, Arc::clone(&calls));
        (dispatcher, calls)
    }

    fn deliver(dispatcher: &Dispatcher, out: &mut [u8]) {
        let frames = out.len() / 2;
        let mut buffer = Buffer::new(frames, None, Some(OutputData::Interleaved(out)));
        dispatcher.on_buffer(&mut buffer);
    }

    #[test]
    fn closed_gate_silences_without_calling() {
        let (dispatcher, calls) = counting_dispatcher(Ok(()));
        let mut out = vec![0xffu8; 8];
        deliver(&dispatcher, &mut out);

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(out.iter().all(|&b| b == 0));
        assert_eq!(dispatcher.diagnostics().silenced, 1);
    }

    #[test]
    fn open_gate_reaches_callback() {
        let (dispatcher, calls) = counting_dispatcher(Ok(()));
        dispatcher.open_gate();
        let mut out = vec![0u8; 8];
        deliver(&dispatcher, &mut out);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(out.iter().all(|&b| b == 0x11));
        dispatcher.close_gate();
        deliver(&dispatcher, &mut out);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callback_error_closes_gate() {
        let (dispatcher, calls) = counting_dispatcher(Err(AudioError::Callback("boom".into())));
        dispatcher.open_gate();
        let mut out = vec![0u8; 8];
        deliver(&dispatcher, &mut out);
        deliver(&dispatcher, &mut out);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!dispatcher.is_running());
        assert!(out.iter().all(|&b| b == 0));
        let diagnostics = dispatcher.diagnostics();
        assert_eq!(diagnostics.callback_errors, 1);
        assert_eq!(diagnostics.silenced, 1);
    }

    #[test]
    fn unsigned_output_is_silenced_at_midpoint() {
        let format = Format::new(Mix::new(48000, SampleType::UInt8), Channels::new(0, 0, 2, 0));
        let params = StreamParams::new(true, |_ctx, _buffer: &mut Buffer<'_>, _user: &()| Ok(()));
        let dispatcher = Dispatcher::new(format, params, ());
        let mut out = vec![0u8; 8];
        let mut buffer = Buffer::new(4, None, Some(OutputData::Interleaved(&mut out)));
        dispatcher.on_buffer(&mut buffer);
        drop(buffer);
        assert!(out.iter().all(|&b| b == 0x80));
    }

    #[test]
    fn gated_xrun_flag_reaches_first_delivered_buffer() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let params = StreamParams::new(true, |_ctx, buffer: &mut Buffer<'_>, seen: &Arc<Mutex<Vec<bool>>>| {
            seen.lock().push(buffer.xrun);
            Ok(())
        });
        let dispatcher = Dispatcher::new(output_format(), params, Arc::clone(&seen));
        let mut out = vec![0u8; 8];
        {
            let mut flagged = Buffer::new(4, None, Some(OutputData::Interleaved(&mut out)));
            flagged.xrun = true;
            dispatcher.on_buffer(&mut flagged);
        }
        deliver(&dispatcher, &mut out);
        dispatcher.open_gate();
        deliver(&dispatcher, &mut out);
        deliver(&dispatcher, &mut out);
        assert_eq!(*seen.lock(), vec![true, false]);
    }

    #[test]
    fn xruns_only_counted_while_running() {
        let (dispatcher, _) = counting_dispatcher(Ok(()));
        dispatcher.on_xrun(0);
        dispatcher.open_gate();
        dispatcher.on_xrun(0);
        assert_eq!(dispatcher.diagnostics().xruns, 1);
    }
}
