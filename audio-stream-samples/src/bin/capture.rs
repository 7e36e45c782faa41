//! Record the default input through the four raw/safe × layout variants.

use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use clap::Parser;

use audio_stream_core::{
    AudioError, BufferAccess, CaptureConfiguration, CaptureSession, Channels, Format, Mix, SampleType, Setup,
};
use audio_stream_samples::{simulated_devices, simulated_platform};

#[derive(Parser)]
#[command(name = "capture")]
#[command(about = "Capture 44.1 kHz int24 stereo input to raw PCM files", long_about = None)]
struct Cli {
    /// Seconds to record per variant
    #[arg(short, long, default_value_t = 2.0)]
    duration: f64,

    /// Directory for the recordings
    #[arg(short, long, default_value = "captures")]
    output: PathBuf,

    /// JSON capture configuration; replaces the built-in format
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Buffer size in frames (device default when omitted)
    #[arg(short, long)]
    frames: Option<usize>,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("capture failed: {}", e);
            match e.native_code() {
                Some(code) => eprintln!("error: {} (code {:#x})", e, code),
                None => eprintln!("error: {}", e),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), AudioError> {
    let base = match &cli.config {
        Some(path) => CaptureConfiguration::load(path)?,
        None => CaptureConfiguration {
            format: Format::new(Mix::new(44100, SampleType::Int24), Channels::new(2, 0, 0, 0)),
            ..Default::default()
        },
    };

    let platform = simulated_platform(simulated_devices());
    let system = platform.setup_to_system(Setup::SystemAudio);
    let service = platform
        .service(system)
        .ok_or_else(|| AudioError::DeviceNotFound(format!("no {} service", system)))?;
    let device = service
        .open_default_device(false)?
        .ok_or_else(|| AudioError::DeviceNotFound("no default input device".into()))?;
    println!("Recording from {} ({})", device.name()?, system);

    for access in [BufferAccess::Raw, BufferAccess::Safe] {
        for interleaved in [true, false] {
            let config = CaptureConfiguration {
                buffer_size_ms: cli
                    .frames
                    .map(|frames| base.format.duration_for(frames).as_secs_f64() * 1000.0)
                    .or(base.buffer_size_ms),
                interleaved,
                access,
                output_directory: cli.output.clone(),
                file_prefix: format!(
                    "{}_{}_{}",
                    base.file_prefix,
                    if access == BufferAccess::Raw { "raw" } else { "safe" },
                    if interleaved { "interleaved" } else { "planar" }
                ),
                max_duration_secs: Some(cli.duration),
                ..base.clone()
            };

            let mut session = CaptureSession::new(config)?;
            session.open(&device)?;
            session.start()?;
            thread::sleep(Duration::from_secs_f64(cli.duration));
            let result = session.stop()?;

            println!(
                "{:?} {}: {} bytes, {} frames, {:.3} s, {} xruns",
                access,
                if interleaved { "interleaved" } else { "non-interleaved" },
                result.bytes_written,
                result.frames,
                result.duration_secs,
                result.metadata.xruns
            );
            println!("  {}", result.file_path.display());
            println!("  sha256 {}", result.checksum);
        }
    }
    Ok(())
}
