use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use log::{info, warn};
use simple_error::SimpleError;

use n3dscap::audio::DEFAULT_QUEUE_DEPTH;
use n3dscap::{AudioDispatcher, Capture, CaptureConstants, FrameAcquisitionLoop, N3dsDevice};
use n3dscap_app::config::{Args, Command};
use n3dscap_app::{audio, HeadlessDisplay};

/// Config registers shown by `info`, starting at register 0.
const CONFIG_DUMP_LEN: usize = 16;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let constants = CaptureConstants::default();
    let device = N3dsDevice::new(constants, args.profiles());

    match args.command() {
        Command::Info => print_info(device),
        Command::Run { snapshot } => run(device, &args, snapshot, false),
        Command::Snapshot { path } => run(device, &args, Some(path), true),
    }
}

fn print_info(mut device: N3dsDevice) -> Result<(), Box<dyn Error>> {
    let layout = device.open()?;

    match device.firmware_version() {
        Some(version) => println!("Bitstream version: {}", version),
        None => println!("Bitstream version: unavailable"),
    }
    println!(
        "Frame: {}x{} RGB24 + {} audio bytes, {} byte transfers",
        layout.width,
        layout.height,
        layout.aux_bytes,
        layout.transfer_size()
    );
    match device.read_config_register(0, CONFIG_DUMP_LEN) {
        Some(registers) => println!("Config registers: {}", hex::encode(registers)),
        None => println!("Config registers: unavailable"),
    }

    device.close();
    Ok(())
}

fn run(
    device: N3dsDevice,
    args: &Args,
    snapshot: Option<PathBuf>,
    exit_after_snapshot: bool,
) -> Result<(), Box<dyn Error>> {
    let layout = device.constants().layout;
    let mut capture =
        FrameAcquisitionLoop::new(device, layout).with_reconnect_delay(args.reconnect_delay());

    let stop = capture.stop_handle();
    let interrupt = stop.clone();
    ctrlc::set_handler(move || interrupt.stop())?;

    let mut display = HeadlessDisplay::new();
    if let Some(path) = snapshot {
        display.snapshot_mut().request(path);
        if exit_after_snapshot {
            display.stop_after_snapshot(stop);
        }
    }

    let output = if args.no_audio {
        None
    } else {
        match audio::open_output() {
            Ok(output) => Some(output),
            Err(err) => {
                warn!("Audio disabled: {}", err);
                None
            }
        }
    };

    // the stream has to stay on this thread and outlive the worker
    let (_stream, mut dispatcher) = match output {
        Some((stream, ring)) => (
            Some(stream),
            Some(AudioDispatcher::spawn(ring, DEFAULT_QUEUE_DEPTH)?),
        ),
        None => (None, None),
    };

    info!("Waiting for capture board, press Ctrl-C to stop");
    capture.run(&mut display, &mut dispatcher);

    // drain and join the audio worker while the session is still held
    if let Some(dispatcher) = dispatcher {
        if dispatcher.dropped() > 0 {
            info!("{} audio chunks dropped", dispatcher.dropped());
        }
        dispatcher.shutdown();
    }
    capture.close();

    if exit_after_snapshot && display.snapshot_mut().saved().is_none() {
        return Err(SimpleError::new("stopped before a frame was captured").into());
    }

    Ok(())
}
