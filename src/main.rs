use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use midi_router::config::RouterConfig;
use midi_router::error::MidiDeviceError;
use midi_router::midi_io::{find_device, MidiInputDriver, MidiOutSender};
use midi_router::{CustomEventSink, CustomId, Event, MidiDevice, RoutedEventSink, Router};

/// A rule-driven MIDI event router.
#[derive(Parser, Debug)]
#[command(name = "the-router")]
#[command(about = "Rule-driven MIDI event router", long_about = None)]
struct Args {
    /// Configuration file (YAML)
    #[arg(short = 'c', long = "config", required_unless_present = "list_devices")]
    config: Option<PathBuf>,

    /// List available MIDI devices and exit
    #[arg(short = 'l', long = "list")]
    list_devices: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let midi_in_devices = MidiInputDriver::list_devices().context("failed to enumerate MIDI input devices")?;
    let midi_out_devices = MidiOutSender::list_devices().context("failed to enumerate MIDI output devices")?;

    if args.list_devices {
        println!("Available MIDI input devices:");
        for (i, name) in midi_in_devices.iter().enumerate() {
            println!("  {i}: {name}");
        }
        println!("\nAvailable MIDI output devices:");
        for (i, name) in midi_out_devices.iter().enumerate() {
            println!("  {i}: {name}");
        }
        return Ok(());
    }

    let config_path = args.config.expect("--config is required");
    run(config_path, midi_in_devices, midi_out_devices)
}

/// A sink that logs every routed/custom event at `debug` level, for
/// smoke-testing the router without a real synth or custom handler
/// attached (the synth and custom handler remain out-of-scope external
/// collaborators, spec.md §1).
struct LoggingSink;

impl RoutedEventSink for LoggingSink {
    fn on_routed_event(&mut self, event: &Event) {
        tracing::debug!(?event, "routed event");
    }
}

impl CustomEventSink for LoggingSink {
    fn on_custom_event(&mut self, event: &Event, custom_id: CustomId) {
        tracing::debug!(?event, ?custom_id, "custom event");
    }
}

fn run(config_path: PathBuf, midi_in_devices: Vec<String>, midi_out_devices: Vec<String>) -> Result<()> {
    let config = RouterConfig::load(&config_path)?;

    if midi_in_devices.is_empty() {
        return Err(MidiDeviceError::NoInputDevices.into());
    }
    let midi_in_index =
        find_device(&midi_in_devices, &config.devices.midi_in).context("failed to resolve MIDI input device")?;

    let mut router = Router::new(LoggingSink, LoggingSink);
    router.set_midi_device(Some(MidiDevice::with_channels(config.devices.channels)));

    router.clear_rules();
    for rule in config.build_rules() {
        router.add_rule(rule);
    }
    if config.rules.is_empty() {
        // No rules configured: fall back to unity passthrough rather than
        // silently dropping every event (spec.md §4.1 "a cleared router
        // drops all voice events until a rule is added").
        router.default_rules();
    }

    if let Some(midi_out_name) = &config.devices.midi_out {
        if midi_out_devices.is_empty() {
            return Err(MidiDeviceError::NoOutputDevices.into());
        }
        let midi_out_index = find_device(&midi_out_devices, midi_out_name).context("failed to resolve MIDI output device")?;
        let sender = MidiOutSender::connect(midi_out_index)?;
        router.set_midi_device(Some(MidiDevice {
            channels: config.devices.channels,
            sink: Some(Box::new(sender)),
        }));
        router.set_midi_out_fanout(true);
        tracing::info!(device = %midi_out_name, "MIDI-out fan-out enabled");
    }

    let (event_tx, event_rx) = crossbeam_channel::unbounded();
    let _driver = MidiInputDriver::connect(midi_in_index, 0, event_tx)?;
    tracing::info!(device = %config.devices.midi_in, "connected to MIDI input");

    let quit = Arc::new(AtomicBool::new(false));
    {
        let quit = quit.clone();
        ctrlc::set_handler(move || quit.store(true, Ordering::SeqCst)).context("failed to install Ctrl-C handler")?;
    }

    // Poll with a short timeout purely to check the quit flag, matching
    // spec.md §5: there is no per-event timeout and no cancellation of
    // in-flight events, only a cooperative shutdown check between events.
    while !quit.load(Ordering::SeqCst) {
        match event_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => router.handle_event(event),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }

    Ok(())
}
