//! Play a sine through the default output in every buffer variant, then
//! through one masked channel at a time.

use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use clap::Parser;

use audio_stream_core::processing::samples::encode;
use audio_stream_core::{
    AudioError, Buffer, Channels, Device, DeviceStreamParams, Format, Mix, OutputData, SampleType, Setup,
    SimulatedProbe, StreamContext, StreamParams,
};
use audio_stream_samples::{peak, simulated_devices, simulated_platform, SineOscillator};

const RATE: u32 = 44100;

#[derive(Parser)]
#[command(name = "render")]
#[command(about = "Render a sine wave through the simulated speakers", long_about = None)]
struct Cli {
    /// Seconds to play per variant
    #[arg(short, long, default_value_t = 0.5)]
    duration: f64,

    /// Sine frequency in Hz
    #[arg(short, long, default_value_t = 440.0)]
    frequency: f64,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("render failed: {}", e);
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
    let probe = devices
        .iter()
        .find(|spec| spec.default_output)
        .map(|spec| spec.probe())
        .unwrap_or_default();
    let platform = simulated_platform(devices);

    let system = platform.setup_to_system(Setup::ConsumerAudio);
    let service = platform
        .service(system)
        .ok_or_else(|| AudioError::DeviceNotFound(format!("no {} service", system)))?;
    let device = service
        .open_default_device(true)?
        .ok_or_else(|| AudioError::DeviceNotFound("no default output device".into()))?;
    println!("Rendering to {} ({})", device.name()?, system);

    let stereo = Format::new(Mix::new(RATE, SampleType::Float32), Channels::new(0, 0, 2, 0));
    for safe in [false, true] {
        for interleaved in [true, false] {
            let label = format!(
                "{} {}",
                if safe { "safe" } else { "raw" },
                if interleaved { "interleaved" } else { "non-interleaved" }
            );
            play(cli, &device, &probe, stereo, interleaved, safe, &label)?;
        }
    }

    for hw in 0..2 {
        let masked = Format::new(Mix::new(RATE, SampleType::Float32), Channels::new(0, 0, 1, 1 << hw));
        play(cli, &device, &probe, masked, true, false, &format!("masked to channel {}", hw))?;
    }
    Ok(())
}

fn play(
    cli: &Cli,
    device: &Device,
    probe: &SimulatedProbe,
    format: Format,
    interleaved: bool,
    safe: bool,
    label: &str,
) -> Result<(), AudioError> {
    let params = if safe {
        StreamParams::new(interleaved, render_safe)
    } else {
        StreamParams::new(interleaved, render_raw)
    }
    .with_xrun(|_index, osc: &SineOscillator| osc.record_xrun());

    let buffer_size = device.buffer_size_range(&format)?.current;
    let oscillator = SineOscillator::new(cli.frequency, RATE, 0.5);
    let stream = device.open_stream(DeviceStreamParams::new(params, format, buffer_size), oscillator)?;
    // Present the safe buffer in the other layout to exercise reshaping.
    let registration = if safe {
        Some(stream.register_safe_buffer(!interleaved)?)
    } else {
        None
    };

    probe.clear_output();
    stream.start()?;
    thread::sleep(Duration::from_secs_f64(cli.duration));
    stream.stop()?;
    drop(registration);
    let diagnostics = stream.diagnostics();
    stream.close()?;

    let peaks: Vec<String> = (0..device.channel_count(true)?)
        .map(|hw| format!("{:.2}", peak(&probe.output(hw))))
        .collect();
    println!(
        "{:<28} {} buffers, {} xruns, peaks per hardware channel [{}]",
        label,
        diagnostics.callbacks,
        diagnostics.xruns,
        peaks.join(", ")
    );
    Ok(())
}

fn render_raw(ctx: &mut StreamContext<'_>, buffer: &mut Buffer<'_>, osc: &SineOscillator) -> Result<(), AudioError> {
    let sample = ctx.format().mix.sample;
    let size = sample.size();
    let channels = ctx.format().channels.outputs;
    let frames = buffer.frames;

    match buffer.output.as_mut() {
        Some(OutputData::Interleaved(out)) => {
            for frame in out.chunks_exact_mut(size * channels).take(frames) {
                let value = osc.next_sample();
                for slot in frame.chunks_exact_mut(size) {
                    encode(sample, value, slot);
                }
            }
        }
        Some(OutputData::NonInterleaved(out)) => {
            for f in 0..frames {
                let value = osc.next_sample();
                for channel in out.iter_mut() {
                    encode(sample, value, &mut channel[f * size..(f + 1) * size]);
                }
            }
        }
        None => {}
    }
    Ok(())
}

fn render_safe(ctx: &mut StreamContext<'_>, buffer: &mut Buffer<'_>, osc: &SineOscillator) -> Result<(), AudioError> {
    let channels = ctx.format().channels.outputs;
    let safe = ctx
        .safe_buffer()
        .ok_or_else(|| AudioError::Callback("safe buffer is not registered".into()))?;
    safe.lock(buffer)?;
    if let Some(mut output) = safe.output()? {
        for f in 0..buffer.frames {
            let value = osc.next_sample();
            for c in 0..channels {
                output.set(f, c, channels, value);
            }
        }
    }
    safe.unlock(buffer)
}
