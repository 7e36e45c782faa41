//! Run one stream across the simulated microphone and speakers: every
//! buffer mixes the microphone channels down and plays the mix on all
//! speaker channels.

use std::process::ExitCode;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use clap::Parser;

use audio_stream_core::processing::samples::{decode, encode};
use audio_stream_core::{
    AggregateDeviceParams, AggregateStreamParams, AudioError, Buffer, Channels, Format, InputData, Mix, OutputData,
    SampleType, StreamContext, StreamParams, System,
};
use audio_stream_samples::{peak, simulated_devices, simulated_platform};

#[derive(Parser)]
#[command(name = "aggregate")]
#[command(about = "Loop the simulated microphone into the simulated speakers through one stream", long_about = None)]
struct Cli {
    /// Seconds to run
    #[arg(short, long, default_value_t = 1.0)]
    duration: f64,

    /// Let the speakers' clock drive the callback instead of the microphone's
    #[arg(long)]
    speaker_master: bool,
}

#[derive(Default)]
struct Counters {
    xruns: [AtomicU64; 2],
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("aggregate failed: {}", e);
            match e.native_code() {
                Some(code) => eprintln!("error: {} (code {:#x})", e, code),
                None => eprintln!("error: {}", e),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), AudioError> {
    let devices = simulated_devices();
    let speaker_monitor = devices
        .iter()
        .find(|spec| spec.id == "sim-speakers")
        .map(|spec| spec.probe())
        .unwrap_or_default();
    let platform = simulated_platform(devices);
    let service = platform
        .service(System::Simulated)
        .ok_or_else(|| AudioError::DeviceNotFound("no simulated service".into()))?;

    let mic = service.open_device("sim-mic")?;
    let speakers = service.open_device("sim-speakers")?;
    let mix = Mix::new(48000, SampleType::Float32);
    let buffer_size = speakers
        .buffer_size_range(&Format::new(mix, Channels::new(0, 0, 4, 0)))?
        .current;

    let params = AggregateStreamParams::new(
        StreamParams::new(true, mix_down).with_xrun(|index, counters: &Counters| {
            if let Some(count) = counters.xruns.get(index as usize) {
                count.fetch_add(1, Ordering::Relaxed);
            }
        }),
        vec![
            AggregateDeviceParams::new(&mic, Channels::new(2, 0, 0, 0), buffer_size),
            AggregateDeviceParams::new(&speakers, Channels::new(0, 0, 4, 0), buffer_size),
        ],
        mix,
        usize::from(cli.speaker_master),
    );
    let stream = service.aggregate_stream(params, Counters::default())?;
    println!(
        "Aggregate of {} and {}: {} ({} frames, master {})",
        mic.name()?,
        speakers.name()?,
        stream.format(),
        stream.frames(),
        if cli.speaker_master { "speakers" } else { "microphone" }
    );

    speaker_monitor.clear_output();
    stream.start()?;
    thread::sleep(Duration::from_secs_f64(cli.duration));
    let latency = stream.latency()?;
    stream.stop()?;
    let diagnostics = stream.diagnostics();
    stream.close()?;

    let peaks: Vec<String> = (0..4)
        .map(|hw| format!("{:.2}", peak(&speaker_monitor.output(hw))))
        .collect();
    println!(
        "{} buffers, {} xruns, latency in {:?} out {:?}, speaker peaks [{}]",
        diagnostics.callbacks,
        diagnostics.xruns,
        latency.input,
        latency.output,
        peaks.join(", ")
    );
    Ok(())
}

/// Average the two input channels and write the result to every output.
fn mix_down(ctx: &mut StreamContext<'_>, buffer: &mut Buffer<'_>, _counters: &Counters) -> Result<(), AudioError> {
    let sample = ctx.format().mix.sample;
    let size = sample.size();
    let inputs = ctx.format().channels.inputs;
    let outputs = ctx.format().channels.outputs;

    let (Some(InputData::Interleaved(input)), Some(OutputData::Interleaved(output))) =
        (buffer.input.as_ref(), buffer.output.as_mut())
    else {
        return Err(AudioError::Callback("expected interleaved input and output".into()));
    };
    for (frame_in, frame_out) in input
        .chunks_exact(size * inputs)
        .zip(output.chunks_exact_mut(size * outputs))
        .take(buffer.frames)
    {
        let sum: f64 = frame_in.chunks_exact(size).map(|s| decode(sample, s)).sum();
        let value = sum / inputs as f64;
        for slot in frame_out.chunks_exact_mut(size) {
            encode(sample, value, slot);
        }
    }
    Ok(())
}
