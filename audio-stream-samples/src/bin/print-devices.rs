//! Print every service and device the platform knows about.

use clap::Parser;

use audio_stream_core::{AudioError, Device, EnumFlags, Service, Setup};
use audio_stream_samples::{simulated_devices, simulated_platform};

#[derive(Parser)]
#[command(name = "print-devices")]
#[command(about = "List audio services and devices", long_about = None)]
struct Cli {
    /// Only list devices with inputs
    #[arg(long, conflicts_with = "outputs")]
    inputs: bool,

    /// Only list devices with outputs
    #[arg(long)]
    outputs: bool,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let flags = match (cli.inputs, cli.outputs) {
        (true, _) => EnumFlags::INPUT,
        (_, true) => EnumFlags::OUTPUT,
        _ => EnumFlags::ALL,
    };

    let platform = simulated_platform(simulated_devices());
    println!("Platform: {}", platform.id());
    for setup in Setup::ALL {
        println!("  {:?} -> {}", setup, platform.setup_to_system(setup));
    }

    for system in platform.systems() {
        let Some(service) = platform.service(system) else {
            continue;
        };
        if let Err(e) = print_service(&service, flags) {
            eprintln!("{}: {}", system, e);
        }
    }
}

fn print_service(service: &Service, flags: EnumFlags) -> Result<(), AudioError> {
    println!();
    println!("{}", service.system());
    println!("  capabilities: {}", service.capabilities());
    println!(
        "  default input: {}",
        service.default_device_id(false)?.unwrap_or_else(|| "-".into())
    );
    println!(
        "  default output: {}",
        service.default_device_id(true)?.unwrap_or_else(|| "-".into())
    );

    let list = service.open_device_list(flags)?;
    for id in list.ids()? {
        println!();
        println!("  [{}] {}", id, list.name(&id)?);
        println!("    capabilities: {}", list.capabilities(&id)?);
        match service.open_device(&id) {
            Ok(device) => print_device(&device)?,
            Err(e) => println!("    cannot open: {}", e),
        }
    }
    Ok(())
}

fn print_device(device: &Device) -> Result<(), AudioError> {
    for output in [false, true] {
        let count = device.channel_count(output)?;
        let names = (0..count)
            .map(|i| device.channel_name(output, i))
            .collect::<Result<Vec<_>, _>>()?;
        println!(
            "    {} channels: {} {:?}",
            if output { "output" } else { "input" },
            count,
            names
        );
    }
    println!(
        "    access: interleaved={} non-interleaved={}",
        device.supports_access(true)?,
        device.supports_access(false)?
    );
    match device.mix()? {
        Some(mix) => println!("    mix: {}", mix),
        None => println!("    mix: -"),
    }
    Ok(())
}
