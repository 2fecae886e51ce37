use super::*;
use player_engine::{create_engine, Engine, EngineConfig};
use std::thread;
use std::time::Instant;

const NOTE_LOGGER: &str = r#"
fn onMidiMessage(msg) {
    if msg.noteOn {
        console.log("note:" + msg.noteNumber);
    }
}
"#;

fn setup(ring_capacity: usize) -> (ControlBridge, BridgeSender, Console, Engine) {
    let (engine, handle) = create_engine(EngineConfig::default());
    let console = Console::new();
    let (bridge, sender) = ControlBridge::new(
        handle,
        console.clone(),
        BridgeConfig {
            ring_capacity,
            ..BridgeConfig::default()
        },
    );
    (bridge, sender, console, engine)
}

fn wait_for_line(console: &Console) -> Option<String> {
    console.recv_timeout(Duration::from_secs(2))
}

#[test]
fn async_note_reaches_the_handler() {
    let (mut bridge, mut sender, console, _engine) = setup(DEFAULT_RING_CAPACITY);
    bridge.start(NOTE_LOGGER).unwrap();
    assert_eq!(bridge.state(), BridgeState::Running);

    assert!(sender.post_midi(MidiMessage::note_on(1, 60, 100), true));
    assert_eq!(wait_for_line(&console).as_deref(), Some("note:60"));
    assert!(console.recv_timeout(Duration::from_millis(50)).is_none());
    bridge.stop().unwrap();
}

#[test]
fn batched_events_need_one_notify() {
    let (mut bridge, mut sender, console, _engine) = setup(DEFAULT_RING_CAPACITY);
    bridge.start(NOTE_LOGGER).unwrap();
    for note in [60, 62, 64] {
        assert!(sender.post_midi(MidiMessage::note_on(1, note, 100), false));
    }
    sender.notify();
    let lines: Vec<_> = (0..3).filter_map(|_| wait_for_line(&console)).collect();
    assert_eq!(lines, vec!["note:60", "note:62", "note:64"]);
    bridge.stop().unwrap();
}

#[test]
fn sync_delivery_waits_for_the_handler() {
    let (mut bridge, sender, console, _engine) = setup(DEFAULT_RING_CAPACITY);
    bridge.start(NOTE_LOGGER).unwrap();
    assert!(sender.send_midi(MidiMessage::note_on(1, 61, 90)));
    assert_eq!(console.drain(), vec!["note:61"]);
    bridge.stop().unwrap();
}

#[test]
fn sync_delivery_times_out_on_a_stalled_worker() {
    let (mut bridge, sender, console, _engine) = setup(DEFAULT_RING_CAPACITY);
    bridge.start(NOTE_LOGGER).unwrap();
    bridge
        .post_message(|_| thread::sleep(Duration::from_millis(400)))
        .unwrap();

    let start = Instant::now();
    assert!(!sender.send_midi(MidiMessage::note_on(1, 60, 100)));
    let waited = start.elapsed();
    assert!(waited >= Duration::from_millis(100));
    assert!(waited < Duration::from_millis(350), "waited {:?}", waited);

    // The event is still handled once the worker catches up.
    assert_eq!(wait_for_line(&console).as_deref(), Some("note:60"));
    bridge.stop().unwrap();
}

#[test]
fn sync_delivery_fails_fast_when_stopped() {
    let (bridge, sender, _console, _engine) = setup(DEFAULT_RING_CAPACITY);
    assert_eq!(bridge.state(), BridgeState::Stopped);
    let start = Instant::now();
    assert!(!sender.send_midi(MidiMessage::note_on(1, 60, 100)));
    assert!(start.elapsed() < Duration::from_millis(50));
}

#[test]
fn stop_is_idempotent() {
    let (mut bridge, _sender, _console, _engine) = setup(DEFAULT_RING_CAPACITY);
    bridge.stop().unwrap();
    bridge.start("").unwrap();
    bridge.stop().unwrap();
    bridge.stop().unwrap();
    assert_eq!(bridge.state(), BridgeState::Stopped);
    assert!(bridge.post_message(|_| {}).is_none());
}

#[test]
fn posted_message_runs_on_the_worker_thread() {
    let (mut bridge, _sender, _console, _engine) = setup(DEFAULT_RING_CAPACITY);
    bridge.start("").unwrap();
    let (tx, rx) = bounded(1);
    let caller = thread::current().id();
    let id = bridge.post_message_delayed(
        move |_| {
            let _ = tx.send(thread::current().id());
        },
        Duration::ZERO,
    );
    assert!(id.is_some());
    let ran_on = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_ne!(ran_on, caller);
    bridge.stop().unwrap();
}

#[test]
fn panicking_message_is_reported_and_worker_survives() {
    let (mut bridge, sender, console, _engine) = setup(DEFAULT_RING_CAPACITY);
    bridge.start(NOTE_LOGGER).unwrap();
    bridge.post_message(|_| panic!("task exploded")).unwrap();
    assert_eq!(wait_for_line(&console).as_deref(), Some("*** Error ***"));
    assert_eq!(wait_for_line(&console).as_deref(), Some("task exploded"));

    assert!(sender.send_midi(MidiMessage::note_on(1, 70, 100)));
    assert_eq!(console.drain(), vec!["note:70"]);
    bridge.stop().unwrap();
}

#[test]
fn script_errors_do_not_prevent_start() {
    let (mut bridge, _sender, console, _engine) = setup(DEFAULT_RING_CAPACITY);
    bridge.start("this is not rhai (").unwrap();
    assert!(bridge.is_running());
    assert_eq!(console.drain().first().map(String::as_str), Some("*** Error ***"));
    bridge.stop().unwrap();
}

#[test]
fn full_ring_drops_newest_and_counts() {
    let (bridge, mut sender, _console, _engine) = setup(4);
    for note in 0..6 {
        sender.post_midi(MidiMessage::note_on(1, note, 100), false);
    }
    assert_eq!(bridge.dropped_events(), 2);
}

#[test]
fn stale_events_are_discarded_on_start() {
    let (mut bridge, mut sender, console, _engine) = setup(DEFAULT_RING_CAPACITY);
    sender.post_midi(MidiMessage::note_on(1, 50, 100), false);
    bridge.start(NOTE_LOGGER).unwrap();
    sender.notify();
    assert!(console.recv_timeout(Duration::from_millis(100)).is_none());
    bridge.stop().unwrap();
}

#[test]
fn restart_loads_the_new_script() {
    let (mut bridge, mut sender, console, _engine) = setup(DEFAULT_RING_CAPACITY);
    bridge.start(NOTE_LOGGER).unwrap();
    bridge
        .start(r#"fn onMidiMessage(msg) { console.log("second " + msg.noteNumber); }"#)
        .unwrap();
    sender.post_midi(MidiMessage::note_on(1, 48, 100), true);
    assert_eq!(wait_for_line(&console).as_deref(), Some("second 48"));
    bridge.stop().unwrap();
}

#[test]
fn script_timeout_runs_later_on_the_worker() {
    let (mut bridge, _sender, console, _engine) = setup(DEFAULT_RING_CAPACITY);
    let start = Instant::now();
    bridge
        .start(r#"setTimeout(|| console.log("later"), 30);"#)
        .unwrap();
    assert_eq!(wait_for_line(&console).as_deref(), Some("later"));
    assert!(start.elapsed() >= Duration::from_millis(30));
    bridge.stop().unwrap();
}

#[test]
fn stop_drains_due_tasks_and_discards_the_rest() {
    let (mut bridge, _sender, console, _engine) = setup(DEFAULT_RING_CAPACITY);
    bridge.start("").unwrap();
    bridge
        .post_message(|_| thread::sleep(Duration::from_millis(50)))
        .unwrap();
    bridge
        .post_message(|host| host.console().post_message("due"))
        .unwrap();
    bridge
        .post_message_delayed(
            |host| host.console().post_message("not due"),
            Duration::from_secs(10),
        )
        .unwrap();
    bridge.stop().unwrap();
    assert_eq!(console.drain(), vec!["due"]);
}

const FRAGILE_HANDLER: &str = r#"
fn onMidiMessage(msg) {
    if msg.noteNumber == 1 {
        throw "bad note";
    }
    if msg.noteNumber == 13 {
        explode(msg.noteNumber);
    }
    console.log("note:" + msg.noteNumber);
}
"#;

fn start_fragile(bridge: &mut ControlBridge) {
    bridge.start(FRAGILE_HANDLER).unwrap();
    bridge
        .post_message(|host| {
            host.engine_mut()
                .register_fn("explode", |note: rhai::INT| -> rhai::INT {
                    panic!("native failure on {}", note)
                });
        })
        .unwrap();
}

fn assert_still_delivers(bridge: &mut ControlBridge, sender: &mut BridgeSender, console: &Console) {
    assert!(sender.send_midi(MidiMessage::note_on(1, 61, 100)));
    assert_eq!(console.drain(), vec!["note:61"]);
    assert!(sender.post_midi(MidiMessage::note_on(1, 62, 100), true));
    assert_eq!(wait_for_line(console).as_deref(), Some("note:62"));

    bridge.stop().unwrap();
    bridge.start(NOTE_LOGGER).unwrap();
    assert!(sender.send_midi(MidiMessage::note_on(1, 63, 100)));
    assert_eq!(console.drain(), vec!["note:63"]);
    bridge.stop().unwrap();
}

#[test]
fn script_error_in_handler_keeps_both_paths_alive() {
    let (mut bridge, mut sender, console, _engine) = setup(DEFAULT_RING_CAPACITY);
    start_fragile(&mut bridge);

    assert!(sender.send_midi(MidiMessage::note_on(1, 1, 100)));
    let lines = console.drain();
    assert_eq!(lines[0], "*** onMidiMessage Exception ***");
    assert!(lines[1].contains("bad note"));

    assert!(sender.post_midi(MidiMessage::note_on(1, 1, 100), true));
    assert_eq!(
        wait_for_line(&console).as_deref(),
        Some("*** onMidiMessage Exception ***")
    );
    thread::sleep(Duration::from_millis(50));
    console.drain();

    assert_still_delivers(&mut bridge, &mut sender, &console);
}

#[test]
fn native_panic_in_handler_is_reported_on_both_paths() {
    let (mut bridge, mut sender, console, _engine) = setup(DEFAULT_RING_CAPACITY);
    start_fragile(&mut bridge);

    // The sync path is still signalled when the handler panics.
    assert!(sender.send_midi(MidiMessage::note_on(1, 13, 100)));
    let lines = console.drain();
    assert_eq!(lines[0], "*** Error ***");
    assert!(lines[1].contains("native failure on 13"));

    assert!(sender.post_midi(MidiMessage::note_on(1, 13, 100), true));
    assert_eq!(wait_for_line(&console).as_deref(), Some("*** Error ***"));
    assert!(wait_for_line(&console).unwrap().contains("native failure"));

    assert_eq!(bridge.state(), BridgeState::Running);
    assert_still_delivers(&mut bridge, &mut sender, &console);
}

#[test]
fn out_of_range_trigger_key_is_a_script_error() {
    let (mut bridge, sender, console, _engine) = setup(DEFAULT_RING_CAPACITY);
    bridge
        .start(
            r#"
            fn onMidiMessage(msg) {
                engine.trigger(#{ sample: 0, key: 2147483647, rootKey: -1 });
            }
            "#,
        )
        .unwrap();
    assert!(sender.send_midi(MidiMessage::note_on(1, 60, 100)));
    assert!(sender.send_midi(MidiMessage::note_on(1, 61, 100)));
    let lines = console.drain();
    assert_eq!(lines[0], "*** onMidiMessage Exception ***");
    assert!(lines[1].contains("MIDI note"));
    assert_eq!(lines.iter().filter(|l| l.contains("Exception")).count(), 2);

    bridge.stop().unwrap();
    bridge.start("").unwrap();
    assert!(bridge.is_running());
    bridge.stop().unwrap();
}
