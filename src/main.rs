use anyhow::{anyhow, Context, Result};
use clap::Parser;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{unbounded, RecvTimeoutError};
use midir::{MidiInput, MidiInputConnection};
use sova_player::config::{ConfigLoader, PlayerConfig};
use sova_player::logger::get_logger;
use sova_player::midi::MidiMessage;
use sova_player::ring::{ring_channel, RingConsumer, RingProducer};
use sova_player::{
    log_eprintln, log_error, log_info, log_println, log_warn, BlockRenderer, PatchResult,
    PlayerProcessor, GREETER_LOGO,
};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use thread_priority::{set_current_thread_priority, ThreadPriority};

const MIDI_RING_CAPACITY: usize = 1024;
const MAX_CALLBACK_FRAMES: usize = 8192;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Sova player: a scriptable sample player.",
    long_about = "Plays samples from a Rhai patch script. MIDI input is delivered\n\
    to the script's onMidiMessage handler on a worker thread."
)]
struct Cli {
    /// Patch script to load
    #[arg(long, value_name = "FILE")]
    script: Option<PathBuf>,

    /// Folder sample paths are resolved against (defaults to the script's folder)
    #[arg(long, value_name = "DIR")]
    content: Option<PathBuf>,

    /// Audio sample rate in Hz
    #[arg(short, long)]
    sample_rate: Option<u32>,

    /// Audio callback block size in frames
    #[arg(short, long)]
    block_size: Option<u32>,

    /// Audio output device (substring of its name)
    #[arg(short, long)]
    output_device: Option<String>,

    /// MIDI input port (substring of its name)
    #[arg(short, long)]
    midi_input: Option<String>,

    /// List audio output devices and MIDI input ports, then exit
    #[arg(long)]
    list_devices: bool,

    /// Configuration file (defaults to <config dir>/sova/player.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

fn load_config(cli: &Cli) -> PlayerConfig {
    let loader = match &cli.config {
        Some(path) => Ok(ConfigLoader::at(path)),
        None => ConfigLoader::new(),
    };
    let mut config = match loader.and_then(|l| l.load_or_create()) {
        Ok(config) => config,
        Err(e) => {
            log_warn!("Could not load configuration: {:#}. Using defaults.", e);
            PlayerConfig::default()
        }
    };

    if let Some(rate) = cli.sample_rate {
        config.audio.sample_rate = rate;
    }
    if let Some(size) = cli.block_size {
        config.audio.block_size = size;
    }
    if cli.output_device.is_some() {
        config.audio.output_device = cli.output_device.clone();
    }
    if cli.midi_input.is_some() {
        config.midi.input_port = cli.midi_input.clone();
    }
    if cli.script.is_some() {
        config.script.path = cli.script.clone();
    }
    if cli.content.is_some() {
        config.script.content_dir = cli.content.clone();
    }
    config
}

fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    let default_name = host
        .default_output_device()
        .and_then(|d| d.name().ok())
        .unwrap_or_default();

    log_println!("Audio output devices:");
    for device in host
        .output_devices()
        .context("Failed to enumerate audio devices")?
    {
        let Ok(name) = device.name() else { continue };
        let mark = if name == default_name { " [DEFAULT]" } else { "" };
        log_println!("  {}{}", name, mark);
    }

    log_println!("MIDI input ports:");
    let midi_in = MidiInput::new("Sova Player").context("Failed to open MIDI input")?;
    let ports = midi_in.ports();
    if ports.is_empty() {
        log_println!("  (none)");
    }
    for port in &ports {
        let name = midi_in
            .port_name(port)
            .unwrap_or_else(|_| "Unknown Port".to_string());
        log_println!("  {}", name);
    }
    Ok(())
}

fn read_script(config: &PlayerConfig) -> Result<(String, PathBuf)> {
    let script = match &config.script.path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script {}", path.display()))?,
        None => String::new(),
    };
    let content_dir = config
        .script
        .content_dir
        .clone()
        .or_else(|| {
            config
                .script
                .path
                .as_deref()
                .and_then(Path::parent)
                .map(Path::to_path_buf)
        })
        .unwrap_or_default();
    Ok((script, content_dir))
}

fn apply_patch(processor: &mut PlayerProcessor, script: &str, content_dir: &Path) -> Result<()> {
    loop {
        match processor.set_patch_script(script, content_dir)? {
            PatchResult::Applied => return Ok(()),
            PatchResult::Deferred => thread::sleep(Duration::from_millis(1)),
        }
    }
}

fn connect_midi(
    port_name: &str,
    mut events: RingProducer<MidiMessage>,
) -> Result<MidiInputConnection<()>> {
    let midi_in = MidiInput::new("Sova Player").context("Failed to open MIDI input")?;
    let port = midi_in
        .ports()
        .into_iter()
        .find(|p| {
            midi_in
                .port_name(p)
                .map(|name| name.contains(port_name))
                .unwrap_or(false)
        })
        .ok_or_else(|| anyhow!("No MIDI input port matching '{}'", port_name))?;
    let name = midi_in.port_name(&port).unwrap_or_default();

    let connection = midi_in
        .connect(
            &port,
            "sova-player-in",
            move |stamp_us, bytes, _| {
                if let Some(message) = MidiMessage::from_bytes(bytes, stamp_us as f64 / 1e6) {
                    events.send(message);
                }
            },
            (),
        )
        .map_err(|e| anyhow!("Failed to connect MIDI input '{}': {}", name, e.kind()))?;
    log_info!("[+] MIDI input: {}", name);
    Ok(connection)
}

fn open_output(
    config: &PlayerConfig,
    mut renderer: BlockRenderer,
    mut midi: RingConsumer<MidiMessage>,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = match &config.audio.output_device {
        Some(wanted) => host
            .output_devices()
            .context("Failed to enumerate audio devices")?
            .find(|d| d.name().map(|n| n.contains(wanted.as_str())).unwrap_or(false))
            .or_else(|| {
                log_warn!("No output device matching '{}', using default", wanted);
                host.default_output_device()
            }),
        None => host.default_output_device(),
    }
    .context("No audio output device available")?;
    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

    let stream_config = cpal::StreamConfig {
        channels: 2,
        sample_rate: cpal::SampleRate(config.audio.sample_rate),
        buffer_size: cpal::BufferSize::Fixed(config.audio.block_size),
    };

    let mut left = vec![0.0f32; MAX_CALLBACK_FRAMES];
    let mut right = vec![0.0f32; MAX_CALLBACK_FRAMES];
    let mut pending = Vec::with_capacity(MIDI_RING_CAPACITY);
    let mut promoted = false;

    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                if !promoted {
                    let _ = set_current_thread_priority(ThreadPriority::Max);
                    promoted = true;
                }

                pending.clear();
                while let Some(message) = midi.receive() {
                    pending.push(message);
                }

                for chunk in data.chunks_mut(MAX_CALLBACK_FRAMES * 2) {
                    let frames = chunk.len() / 2;
                    let out_left = &mut left[..frames];
                    let out_right = &mut right[..frames];
                    out_left.fill(0.0);
                    out_right.fill(0.0);
                    renderer.process_block(&[], &mut [out_left, out_right], &pending, None);
                    pending.clear();

                    for (i, frame) in chunk.chunks_exact_mut(2).enumerate() {
                        frame[0] = left[i];
                        frame[1] = right[i];
                    }
                }
            },
            |err| log_eprintln!("Audio stream error: {}", err),
            None,
        )
        .context("Failed to build output stream")?;
    stream.play().context("Failed to start audio stream")?;
    log_info!(
        "[+] Audio output: {} @ {} Hz, {} frames",
        device_name,
        config.audio.sample_rate,
        config.audio.block_size
    );
    Ok(stream)
}

enum Command {
    Reload,
    Stats,
    Quit,
    Eval(String),
}

fn spawn_stdin_reader() -> crossbeam_channel::Receiver<Command> {
    let (tx, rx) = unbounded();
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let command = match line.trim() {
                "r" | "reload" => Command::Reload,
                "s" | "stats" => Command::Stats,
                "q" | "quit" => Command::Quit,
                "" => continue,
                other => Command::Eval(other.to_string()),
            };
            if tx.send(command).is_err() {
                break;
            }
        }
    });
    rx
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli);
    let logger = get_logger();
    logger.set_mode(config.log.target.mode());
    logger.set_min_level(config.log.level);

    if cli.list_devices {
        return list_devices();
    }

    log_println!("{}", GREETER_LOGO);
    log_println!("Version: {}\n", env!("CARGO_PKG_VERSION"));

    let (script, content_dir) = read_script(&config)?;
    let mut processor = PlayerProcessor::from_config(&config);
    processor
        .console()
        .add_listener(Box::new(|text: &str| log_println!("{}", text)));
    processor.prepare_to_play(
        config.audio.sample_rate as f32,
        config.audio.block_size as usize,
    );
    apply_patch(&mut processor, &script, &content_dir)?;

    let renderer = processor
        .take_renderer()
        .context("Renderer already taken")?;
    let (midi_tx, midi_rx) = ring_channel(MIDI_RING_CAPACITY);
    let _midi_connection = match config.midi.input_port.as_deref() {
        Some(port) => match connect_midi(port, midi_tx) {
            Ok(connection) => Some(connection),
            Err(e) => {
                log_error!("{:#}", e);
                None
            }
        },
        None => None,
    };
    let _stream = open_output(&config, renderer, midi_rx)?;

    let commands = spawn_stdin_reader();
    loop {
        match commands.recv_timeout(Duration::from_millis(20)) {
            Ok(Command::Reload) => match read_script(&config) {
                Ok((script, content_dir)) => {
                    if let Err(e) = apply_patch(&mut processor, &script, &content_dir) {
                        log_error!("{:#}", e);
                    }
                }
                Err(e) => log_error!("{:#}", e),
            },
            Ok(Command::Stats) => log_println!(
                "load {:.1}%, {} voice(s), {} dropped MIDI event(s)",
                processor.process_load() * 100.0,
                processor.active_voice_count(),
                processor.dropped_events()
            ),
            Ok(Command::Eval(expression)) => {
                if !processor.evaluate(expression) {
                    log_warn!("Script is not running");
                }
            }
            Ok(Command::Quit) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
        processor.console().dispatch();
    }

    log_println!("[-] Exiting...");
    Ok(())
}

fn main() {
    if let Err(e) = run(Cli::parse()) {
        log_eprintln!("{:#}", e);
        std::process::exit(1);
    }
}
