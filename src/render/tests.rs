use super::*;
use crate::bridge::{BridgeConfig, ControlBridge};
use crate::console::Console;
use player_engine::{create_engine, EngineConfig, EngineHandle, EnvelopeOverride, Trigger};
use std::path::Path;
use std::thread;
use std::time::Duration;

const SAMPLE_RATE: f32 = 1000.0;

struct Rig {
    renderer: BlockRenderer,
    bridge: ControlBridge,
    handle: EngineHandle,
    console: Console,
}

fn rig(num_buses: usize) -> Rig {
    let (engine, handle) = create_engine(EngineConfig {
        num_buses,
        max_voices: 8,
        sample_rate: SAMPLE_RATE,
    });
    let console = Console::new();
    let (bridge, sender) =
        ControlBridge::new(handle.clone(), console.clone(), BridgeConfig::default());
    let state = Arc::new(RenderState::default());
    state.set_processing(true);
    let mut renderer = BlockRenderer::new(engine, sender, state);
    renderer.prepare(SAMPLE_RATE);
    Rig {
        renderer,
        bridge,
        handle,
        console,
    }
}

fn write_tone(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("tone.wav");
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE as u32,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for _ in 0..2000 {
        writer.write_sample(16384i16).unwrap();
    }
    writer.finalize().unwrap();
    path
}

fn start_voice(rig: &Rig, dir: &Path, bus: usize) {
    let sample = rig.handle.add_sample(&write_tone(dir)).unwrap();
    let mut trigger = Trigger::new(sample);
    trigger.bus = bus;
    trigger.envelope = EnvelopeOverride {
        attack: Some(0.0),
        decay: Some(0.0),
        sustain: Some(1.0),
        release: Some(0.0),
    };
    rig.handle.trigger(&trigger).unwrap();
}

fn render(
    renderer: &mut BlockRenderer,
    inputs: &[Vec<f32>],
    outputs: &mut [Vec<f32>],
    midi: &[MidiMessage],
) {
    let inputs: Vec<&[f32]> = inputs.iter().map(|c| c.as_slice()).collect();
    let mut outputs: Vec<&mut [f32]> = outputs.iter_mut().map(|c| c.as_mut_slice()).collect();
    renderer.process_block(&inputs, &mut outputs, midi, None);
}

fn channels(count: usize, frames: usize, value: f32) -> Vec<Vec<f32>> {
    vec![vec![value; frames]; count]
}

#[test]
fn silent_input_gives_silent_outputs_and_advances_every_bus() {
    let mut rig = rig(2);
    let inputs = channels(2, 64, 0.0);
    let mut outputs = channels(4, 64, 1.0);
    render(&mut rig.renderer, &inputs, &mut outputs, &[]);

    assert!(outputs.iter().flatten().all(|s| *s == 0.0));
    let engine = rig.renderer.engine();
    assert_eq!(engine.bus(0).unwrap().frames_processed(), 64);
    assert_eq!(engine.bus(1).unwrap().frames_processed(), 64);
    assert_eq!(rig.renderer.state().blocks_rendered(), 1);
}

#[test]
fn unconnected_bus_is_processed_through_the_dummy_pair() {
    let dir = tempfile::tempdir().unwrap();
    let mut rig = rig(3);
    start_voice(&rig, dir.path(), 2);

    let inputs = channels(4, 64, 0.0);
    let mut outputs = channels(4, 64, 0.0);
    render(&mut rig.renderer, &inputs, &mut outputs, &[]);

    assert!(outputs.iter().flatten().all(|s| *s == 0.0));
    let bus = rig.renderer.engine().bus(2).unwrap();
    assert_eq!(bus.frames_processed(), 64);
    assert!(bus.level() > 0.0);
    assert_eq!(rig.renderer.engine().active_voices(), 1);
}

#[test]
fn connected_voice_is_audible() {
    let dir = tempfile::tempdir().unwrap();
    let mut rig = rig(2);
    start_voice(&rig, dir.path(), 1);

    let mut outputs = channels(4, 32, 0.0);
    render(&mut rig.renderer, &[], &mut outputs, &[]);
    assert!(outputs[0].iter().all(|s| *s == 0.0));
    assert!(outputs[2].iter().any(|s| *s > 0.1));
    assert!(outputs[3].iter().any(|s| *s > 0.1));
}

#[test]
fn input_passes_through_in_chunks() {
    let mut rig = rig(1);
    let frames = MIX_BUFFER_NUM_FRAMES * 2 + 37;
    let inputs = channels(2, frames, 0.25);
    let mut outputs = channels(2, frames, 0.0);
    render(&mut rig.renderer, &inputs, &mut outputs, &[]);

    assert!(outputs[0].iter().all(|s| (*s - 0.25).abs() < 1e-6));
    assert!(outputs[1].iter().all(|s| (*s - 0.25).abs() < 1e-6));
    assert_eq!(
        rig.renderer.engine().bus(0).unwrap().frames_processed(),
        frames as u64
    );
}

#[test]
fn channels_past_the_last_bus_are_cleared() {
    let mut rig = rig(1);
    let mut outputs = channels(4, 16, 1.0);
    render(&mut rig.renderer, &[], &mut outputs, &[]);
    assert!(outputs.iter().flatten().all(|s| *s == 0.0));
}

#[test]
fn odd_channel_counts_are_skipped() {
    let mut rig = rig(2);
    let inputs = channels(3, 16, 0.5);
    let mut outputs = channels(4, 16, 1.0);
    render(&mut rig.renderer, &inputs, &mut outputs, &[]);
    assert!(outputs.iter().flatten().all(|s| *s == 1.0));

    let mut outputs = channels(3, 16, 1.0);
    render(&mut rig.renderer, &[], &mut outputs, &[]);
    assert!(outputs.iter().flatten().all(|s| *s == 1.0));
    assert_eq!(rig.renderer.state().blocks_rendered(), 0);
    assert!(!rig.renderer.state().is_rendering());
}

#[test]
fn unequal_channel_lengths_are_skipped() {
    let mut rig = rig(2);
    let mut outputs = vec![vec![1.0; 16], vec![1.0; 16], vec![1.0; 24], vec![1.0; 24]];
    render(&mut rig.renderer, &[], &mut outputs, &[]);
    assert!(outputs.iter().flatten().all(|s| *s == 1.0));

    let inputs = vec![vec![0.5; 8], vec![0.5; 8]];
    let mut outputs = channels(2, 16, 1.0);
    render(&mut rig.renderer, &inputs, &mut outputs, &[]);
    assert!(outputs.iter().flatten().all(|s| *s == 1.0));
    assert_eq!(rig.renderer.state().blocks_rendered(), 0);
    assert!(!rig.renderer.state().is_rendering());

    let mut outputs = channels(4, 24, 1.0);
    render(&mut rig.renderer, &[], &mut outputs, &[]);
    assert!(outputs.iter().flatten().all(|s| *s == 0.0));
    assert_eq!(rig.renderer.state().blocks_rendered(), 1);
}

#[test]
fn disabled_processing_skips_the_block() {
    let mut rig = rig(1);
    rig.renderer.state().set_processing(false);
    let mut outputs = channels(2, 16, 1.0);
    render(&mut rig.renderer, &[], &mut outputs, &[]);
    assert!(outputs.iter().flatten().all(|s| *s == 1.0));
    assert_eq!(rig.renderer.state().blocks_rendered(), 0);
}

#[test]
fn playhead_is_published() {
    let mut rig = rig(1);
    let playhead = TransportInfo {
        bpm: 140.0,
        time_in_seconds: 2.0,
        ppq_position: 4.5,
        is_playing: true,
    };
    let mut outputs = channels(2, 8, 0.0);
    let mut refs: Vec<&mut [f32]> = outputs.iter_mut().map(|c| c.as_mut_slice()).collect();
    rig.renderer
        .process_block(&[], &mut refs, &[], Some(&playhead));
    assert_eq!(rig.handle.transport(), playhead);
}

#[test]
fn process_load_stays_in_range() {
    assert_eq!(smoothed_load(0.5, 1e12, 1.0), 1.0);
    assert_eq!(smoothed_load(0.0, -10.0, 1.0), 0.0);
    assert!((smoothed_load(0.0, 5.0, 0.0) - 0.01).abs() < 1e-6);
    assert!((smoothed_load(f32::NAN, 50.0, 100.0) - 0.005).abs() < 1e-6);
    assert!((smoothed_load(0.5, 50.0, 100.0) - 0.5).abs() < 1e-6);

    let mut rig = rig(1);
    let mut outputs = channels(2, 64, 0.0);
    for _ in 0..10 {
        render(&mut rig.renderer, &[], &mut outputs, &[]);
    }
    let load = rig.renderer.state().process_load();
    assert!((0.0..=1.0).contains(&load));
}

const NOTE_LOGGER: &str = r#"
fn onMidiMessage(msg) {
    if msg.noteOn { console.log("note:" + msg.noteNumber); }
}
"#;

#[test]
fn realtime_midi_goes_through_the_ring() {
    let mut rig = rig(1);
    rig.bridge.start(NOTE_LOGGER).unwrap();
    let mut outputs = channels(2, 16, 0.0);
    render(
        &mut rig.renderer,
        &[],
        &mut outputs,
        &[MidiMessage::note_on(1, 60, 100)],
    );
    assert_eq!(
        rig.console.recv_timeout(Duration::from_secs(2)).as_deref(),
        Some("note:60")
    );
    rig.bridge.stop().unwrap();
}

#[test]
fn offline_midi_is_handled_before_the_block_returns() {
    let mut rig = rig(1);
    rig.renderer.state().set_realtime(false);
    rig.bridge.start(NOTE_LOGGER).unwrap();
    let mut outputs = channels(2, 16, 0.0);
    render(
        &mut rig.renderer,
        &[],
        &mut outputs,
        &[MidiMessage::note_on(1, 60, 100), MidiMessage::note_on(1, 62, 100)],
    );
    assert_eq!(rig.console.drain(), vec!["note:60", "note:62"]);
    rig.bridge.stop().unwrap();
}

#[test]
fn offline_delivery_gives_up_after_first_timeout() {
    let mut rig = rig(1);
    rig.renderer.state().set_realtime(false);
    rig.bridge.start(NOTE_LOGGER).unwrap();
    rig.bridge
        .post_message(|_| thread::sleep(Duration::from_millis(300)))
        .unwrap();

    let started = Instant::now();
    let mut outputs = channels(2, 16, 0.0);
    render(
        &mut rig.renderer,
        &[],
        &mut outputs,
        &[
            MidiMessage::note_on(1, 60, 100),
            MidiMessage::note_on(1, 62, 100),
            MidiMessage::note_on(1, 64, 100),
        ],
    );
    assert!(started.elapsed() < Duration::from_millis(250));

    assert_eq!(
        rig.console.recv_timeout(Duration::from_secs(2)).as_deref(),
        Some("note:60")
    );
    assert!(rig.console.recv_timeout(Duration::from_millis(150)).is_none());
    rig.bridge.stop().unwrap();
}
