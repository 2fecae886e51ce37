use super::*;
use crate::queue::{task_queue, RunState, TaskRunner};
use player_engine::{create_engine, Engine, EngineConfig};
use std::path::Path;

struct Fixture {
    host: ScriptHost,
    console: Console,
    handle: EngineHandle,
    runner: TaskRunner<WorkerTask>,
    _engine: Engine,
}

fn fixture(content_dir: &Path) -> Fixture {
    let (engine, handle) = create_engine(EngineConfig {
        num_buses: 2,
        ..EngineConfig::default()
    });
    let console = Console::new();
    let (tasks, runner) = task_queue();
    let host = ScriptHost::new(
        handle.clone(),
        console.clone(),
        tasks,
        content_dir.to_path_buf(),
    );
    Fixture {
        host,
        console,
        handle,
        runner,
        _engine: engine,
    }
}

fn write_wav(path: &Path) {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: 44100,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for _ in 0..64 {
        writer.write_sample(1000i16).unwrap();
        writer.write_sample(-1000i16).unwrap();
    }
    writer.finalize().unwrap();
}

#[test]
fn midi_handler_logs_note_number() {
    let mut f = fixture(Path::new("."));
    assert!(f.host.load(
        r#"
        fn onMidiMessage(msg) {
            if msg.noteOn {
                console.log("note:" + msg.noteNumber);
            }
        }
        "#
    ));
    assert!(f.host.has_midi_handler());
    f.host.handle_midi(&MidiMessage::note_on(1, 60, 100));
    f.host.handle_midi(&MidiMessage::note_off(1, 60, 0));
    assert_eq!(f.console.drain(), vec!["note:60"]);
}

#[test]
fn snake_case_handler_is_accepted() {
    let mut f = fixture(Path::new("."));
    f.host.load(
        r#"
        fn on_midi_message(msg) {
            if msg.controller {
                console.log(msg.controllerNumber, msg.controllerValue);
            }
        }
        "#,
    );
    f.host.handle_midi(&MidiMessage::controller(1, 7, 127));
    assert_eq!(f.console.drain(), vec!["7 1.0"]);
}

#[test]
fn parse_errors_are_reported() {
    let mut f = fixture(Path::new("."));
    assert!(!f.host.load("let x = ;"));
    let lines = f.console.drain();
    assert_eq!(lines[0], "*** Error ***");
    assert!(lines.len() >= 2);
    assert!(!f.host.has_midi_handler());
}

#[test]
fn handler_failure_does_not_stop_later_events() {
    let mut f = fixture(Path::new("."));
    f.host.load(
        r#"
        fn onMidiMessage(msg) {
            if msg.noteNumber == 1 {
                throw "boom";
            }
            console.log("ok " + msg.noteNumber);
        }
        "#,
    );
    f.host.handle_midi(&MidiMessage::note_on(1, 1, 100));
    f.host.handle_midi(&MidiMessage::note_on(1, 2, 100));
    let lines = f.console.drain();
    assert_eq!(lines[0], "*** onMidiMessage Exception ***");
    assert!(lines[1].contains("boom"));
    assert_eq!(lines.last().map(String::as_str), Some("ok 2"));
}

#[test]
fn top_level_runs_once_on_load() {
    let mut f = fixture(Path::new("."));
    f.host.load(r#"console.log("loaded"); print("printed");"#);
    assert_eq!(f.console.drain(), vec!["loaded", "printed"]);
}

#[test]
fn bus_and_effect_handles_drive_the_engine() {
    let mut f = fixture(Path::new("."));
    assert!(f.host.load(
        r#"
        let bus = engine.bus(1);
        bus.set_gain(0.5);
        bus.set_pan(-0.25);
        let lp = bus.add_effect("lowpass");
        lp.set_parameter("cutoff", 800);
        console.log(engine.buses().len(), bus.effects().len(), lp.tag());
        console.log(lp.get_parameter("freq"));
        "#
    ));
    assert_eq!(f.handle.bus_gain(1).unwrap(), 0.5);
    assert_eq!(f.handle.bus_pan(1).unwrap(), -0.25);
    assert_eq!(f.handle.effect_parameter(1, 0, "cutoff").unwrap(), 800.0);
    assert_eq!(f.console.drain(), vec!["2 1 lowpass", "800.0"]);
}

#[test]
fn out_of_range_bus_is_a_script_error() {
    let mut f = fixture(Path::new("."));
    assert!(!f.host.load("engine.bus(5);"));
    let lines = f.console.drain();
    assert_eq!(lines[0], "*** Error ***");
    assert!(lines[1].contains("out of range"));
}

#[test]
fn controllers_round_trip_through_the_script() {
    let mut f = fixture(Path::new("."));
    f.handle.controllers().set(3, 0.75);
    f.host.load(
        r#"
        console.log(engine.get_cc(3));
        engine.set_cc(4, 0.5);
        "#,
    );
    assert_eq!(f.console.drain(), vec!["0.75"]);
    assert_eq!(f.handle.controllers().get(4), 0.5);
}

#[test]
fn samples_load_from_the_content_folder() {
    let dir = tempfile::tempdir().unwrap();
    write_wav(&dir.path().join("hit.wav"));
    let mut f = fixture(dir.path());
    assert!(f.host.load(
        r#"
        let id = engine.add_sample("hit.wav");
        let voice = engine.trigger(#{ sample: id, bus: 1, gain: 0.5 });
        console.log(voice > 0, content_dir.len() > 0);
        "#
    ));
    assert_eq!(f.console.drain(), vec!["true true"]);
    assert_eq!(f.handle.samples().len(), 1);
}

#[test]
fn bad_modulation_is_reported_but_voice_starts() {
    let dir = tempfile::tempdir().unwrap();
    write_wav(&dir.path().join("hit.wav"));
    let mut f = fixture(dir.path());
    f.host.load(
        r#"
        let id = engine.add_sample("hit.wav");
        let voice = engine.trigger(#{ sample: id, modulate: #{ expr: "gain = nope;" } });
        console.log("voice", voice);
        "#,
    );
    let lines = f.console.drain();
    assert_eq!(lines[0], "*** Modulation Error ***");
    assert!(lines[1].contains("nope"));
    assert!(lines[2].starts_with("voice "));
}

#[test]
fn set_timeout_schedules_a_worker_task() {
    let mut f = fixture(Path::new("."));
    f.host.load(
        r#"
        let n = 41;
        set_timeout(|| console.log("fired", n + 1), 0);
        "#,
    );
    assert!(f.console.drain().is_empty());
    assert_eq!(f.runner.pending(), 1);

    let host = &mut f.host;
    let state = f.runner.run_once(|task| match task {
        WorkerTask::Script(callback) => host.run_callback(&callback),
        _ => panic!("unexpected task"),
    });
    assert_eq!(state, RunState::Continue);
    assert_eq!(f.console.drain(), vec!["fired 42"]);
}

#[test]
fn locals_shadow_globals() {
    let mut f = fixture(Path::new("."));
    f.host.load(r#"let console = "mine"; print(console);"#);
    assert_eq!(f.console.drain(), vec!["mine"]);
}
