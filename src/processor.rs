//! Plugin-shell facade tying the engine, the control bridge and the block
//! renderer together.
//!
//! Hosts that render on their own thread call [`PlayerProcessor::take_renderer`]
//! once prepared and drive the returned [`BlockRenderer`] directly; the
//! processor keeps the control side.

use crate::bridge::{BridgeConfig, BridgeState, ControlBridge};
use crate::config::PlayerConfig;
use crate::console::Console;
use crate::error::PlayerError;
use crate::midi::MidiMessage;
use crate::render::{BlockRenderer, RenderState};
use crate::state::PlayerState;
use crate::{log_debug, log_info};
use player_engine::{create_engine, EngineConfig, EngineHandle, TransportInfo};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Outcome of [`PlayerProcessor::set_patch_script`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchResult {
    Applied,
    /// A block was in flight; call again once it has finished.
    Deferred,
}

/// Channel counts of the host's input and output buses. Zero means the bus
/// is disabled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BusesLayout {
    pub inputs: Vec<usize>,
    pub outputs: Vec<usize>,
}

impl BusesLayout {
    pub fn stereo(inputs: usize, outputs: usize) -> Self {
        Self {
            inputs: vec![2; inputs],
            outputs: vec![2; outputs],
        }
    }
}

pub trait ProcessorListener: Send {
    fn state_restored(&mut self);
}

pub struct PlayerProcessor {
    console: Console,
    handle: EngineHandle,
    bridge: ControlBridge,
    renderer: Option<BlockRenderer>,
    render_state: Arc<RenderState>,
    script: String,
    content_dir: PathBuf,
    max_block_size: usize,
    listeners: Vec<Box<dyn ProcessorListener>>,
}

impl PlayerProcessor {
    pub fn new(engine_config: EngineConfig, bridge_config: BridgeConfig) -> Self {
        let console = Console::new();
        let (engine, handle) = create_engine(engine_config);
        let content_dir = bridge_config.content_dir.clone();
        let (bridge, sender) = ControlBridge::new(handle.clone(), console.clone(), bridge_config);
        let render_state = Arc::new(RenderState::default());
        let renderer = BlockRenderer::new(engine, sender, Arc::clone(&render_state));
        Self {
            console,
            handle,
            bridge,
            renderer: Some(renderer),
            render_state,
            script: String::new(),
            content_dir,
            max_block_size: 0,
            listeners: Vec::new(),
        }
    }

    pub fn from_config(config: &PlayerConfig) -> Self {
        Self::new(
            EngineConfig {
                num_buses: config.engine.num_buses,
                max_voices: config.engine.max_voices,
                sample_rate: config.audio.sample_rate as f32,
            },
            BridgeConfig {
                ring_capacity: config.bridge.ring_capacity,
                sync_timeout: Duration::from_millis(config.bridge.sync_timeout_ms),
                content_dir: config.script.content_dir.clone().unwrap_or_default(),
            },
        )
    }

    /// Prepares the renderer, if still owned, and enables processing.
    pub fn prepare_to_play(&mut self, sample_rate: f32, max_block_size: usize) {
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.prepare(sample_rate);
        }
        self.max_block_size = max_block_size;
        self.render_state.set_processing(true);
        log_debug!(
            "Prepared to play at {} Hz, blocks up to {} frames",
            sample_rate,
            max_block_size
        );
    }

    pub fn release_resources(&mut self) {
        self.render_state.set_processing(false);
    }

    /// Renders one block. Does nothing once the renderer has been taken.
    pub fn process_block(
        &mut self,
        inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
        midi: &[MidiMessage],
        playhead: Option<&TransportInfo>,
    ) {
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.process_block(inputs, outputs, midi, playhead);
        }
    }

    pub fn take_renderer(&mut self) -> Option<BlockRenderer> {
        self.renderer.take()
    }

    pub fn render_state(&self) -> &Arc<RenderState> {
        &self.render_state
    }

    /// Replaces the running script. Processing stays disabled while the
    /// bridge restarts; a block still in flight defers the change. Processing
    /// resumes even when the restart fails.
    pub fn set_patch_script(
        &mut self,
        script: &str,
        content_dir: impl AsRef<Path>,
    ) -> Result<PatchResult, PlayerError> {
        self.render_state.set_processing(false);
        if self.render_state.is_rendering() {
            return Ok(PatchResult::Deferred);
        }

        self.script = script.to_string();
        self.content_dir = content_dir.as_ref().to_path_buf();
        let restarted = self.restart_bridge(script);

        self.render_state.set_processing(true);
        restarted?;
        log_info!("Patch script loaded ({} bytes)", script.len());
        Ok(PatchResult::Applied)
    }

    fn restart_bridge(&mut self, script: &str) -> Result<(), PlayerError> {
        self.bridge.stop()?;
        let discarded = self.handle.reset();
        if discarded > 0 {
            log_debug!("Reset discarded {} queued engine commands", discarded);
        }
        self.bridge.set_content_folder(self.content_dir.clone());
        self.bridge.start(script)
    }

    /// Evaluates `expression` on the worker against the script's globals
    /// and prints the result on the console. False when the bridge is not
    /// running.
    pub fn evaluate(&self, expression: impl Into<String>) -> bool {
        let expression = expression.into();
        self.bridge
            .post_message(move |host| {
                if let Some(value) = host.eval(&expression) {
                    if !value.is_unit() {
                        host.console().post_message(value.to_string());
                    }
                }
            })
            .is_some()
    }

    pub fn script(&self) -> &str {
        &self.script
    }

    pub fn content_folder(&self) -> &Path {
        &self.content_dir
    }

    pub fn state(&self) -> Vec<u8> {
        PlayerState::new(self.script.clone(), self.content_dir.clone()).encode()
    }

    /// Restores state saved with [`state`](Self::state), then notifies the
    /// listeners.
    pub fn restore_state(&mut self, bytes: &[u8]) -> Result<PatchResult, PlayerError> {
        let state = PlayerState::decode(bytes)?;
        let result = self.set_patch_script(&state.script, &state.content_dir)?;
        if result == PatchResult::Applied {
            for listener in self.listeners.iter_mut() {
                listener.state_restored();
            }
        }
        Ok(result)
    }

    pub fn add_listener(&mut self, listener: Box<dyn ProcessorListener>) {
        self.listeners.push(listener);
    }

    pub fn process_load(&self) -> f32 {
        self.render_state.process_load()
    }

    pub fn active_voice_count(&self) -> usize {
        self.handle.active_voices()
    }

    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.handle
    }

    pub fn bridge_state(&self) -> BridgeState {
        self.bridge.state()
    }

    pub fn dropped_events(&self) -> u64 {
        self.bridge.dropped_events()
    }

    /// Every bus has to be stereo or disabled.
    pub fn is_buses_layout_supported(layout: &BusesLayout) -> bool {
        layout
            .inputs
            .iter()
            .chain(&layout.outputs)
            .all(|&channels| channels == 0 || channels == 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{unbounded, Sender};

    fn processor() -> PlayerProcessor {
        let mut processor = PlayerProcessor::new(
            EngineConfig {
                num_buses: 2,
                max_voices: 8,
                sample_rate: 1000.0,
            },
            BridgeConfig::default(),
        );
        processor.prepare_to_play(1000.0, 64);
        processor
    }

    fn render(processor: &mut PlayerProcessor, midi: &[MidiMessage]) -> Vec<Vec<f32>> {
        let mut outputs = vec![vec![0.0f32; 32]; 4];
        let mut refs: Vec<&mut [f32]> = outputs.iter_mut().map(|c| c.as_mut_slice()).collect();
        processor.process_block(&[], &mut refs, midi, None);
        outputs
    }

    #[test]
    fn layout_accepts_stereo_and_disabled_buses() {
        assert!(PlayerProcessor::is_buses_layout_supported(&BusesLayout::stereo(1, 4)));
        assert!(PlayerProcessor::is_buses_layout_supported(&BusesLayout {
            inputs: vec![],
            outputs: vec![2, 0, 2],
        }));
        assert!(!PlayerProcessor::is_buses_layout_supported(&BusesLayout {
            inputs: vec![1],
            outputs: vec![2],
        }));
        assert!(!PlayerProcessor::is_buses_layout_supported(&BusesLayout {
            inputs: vec![2],
            outputs: vec![6],
        }));
    }

    #[test]
    fn patch_script_starts_the_bridge() {
        let mut p = processor();
        assert_eq!(p.bridge_state(), BridgeState::Stopped);
        let result = p
            .set_patch_script(r#"console.log("hello");"#, "/tmp")
            .unwrap();
        assert_eq!(result, PatchResult::Applied);
        assert_eq!(p.bridge_state(), BridgeState::Running);
        assert!(p.render_state().is_processing());
        assert_eq!(p.console().drain(), vec!["hello"]);
        assert_eq!(p.content_folder(), Path::new("/tmp"));
    }

    #[test]
    fn in_flight_block_defers_the_patch() {
        let mut p = processor();
        p.render_state().in_block_for_test(true);
        let result = p.set_patch_script("", "").unwrap();
        assert_eq!(result, PatchResult::Deferred);
        assert!(!p.render_state().is_processing());
        assert_eq!(p.bridge_state(), BridgeState::Stopped);

        p.render_state().in_block_for_test(false);
        assert_eq!(p.set_patch_script("", "").unwrap(), PatchResult::Applied);
        assert!(p.render_state().is_processing());
    }

    #[test]
    fn patch_after_a_flooded_command_queue_still_applies() {
        let mut p = processor();
        p.set_patch_script(
            r#"for i in 0..1100 { try { engine.bus(0).set_gain(0.5); } catch {} }"#,
            "",
        )
        .unwrap();
        assert!(p.engine().set_bus_gain(0, 0.5).is_err());

        let result = p.set_patch_script(r#"console.log("fresh");"#, "").unwrap();
        assert_eq!(result, PatchResult::Applied);
        assert!(p.render_state().is_processing());
        assert_eq!(p.bridge_state(), BridgeState::Running);
        assert_eq!(p.engine().bus_gain(0).unwrap(), 1.0);
        assert_eq!(p.console().drain(), vec!["fresh"]);

        let before = p.render_state().blocks_rendered();
        render(&mut p, &[]);
        assert_eq!(p.render_state().blocks_rendered(), before + 1);
        assert!(p.engine().set_bus_gain(0, 0.25).is_ok());
    }

    #[test]
    fn state_round_trips_and_notifies_listeners() {
        struct Notify(Sender<()>);
        impl ProcessorListener for Notify {
            fn state_restored(&mut self) {
                let _ = self.0.send(());
            }
        }

        let mut p = processor();
        p.set_patch_script(r#"console.log("first");"#, "/samples")
            .unwrap();
        let saved = p.state();

        let mut restored = processor();
        let (tx, rx) = unbounded();
        restored.add_listener(Box::new(Notify(tx)));
        assert_eq!(restored.restore_state(&saved).unwrap(), PatchResult::Applied);
        assert_eq!(restored.script(), r#"console.log("first");"#);
        assert_eq!(restored.content_folder(), Path::new("/samples"));
        assert_eq!(restored.console().drain(), vec!["first"]);
        assert_eq!(rx.try_iter().count(), 1);
    }

    #[test]
    fn corrupt_state_is_rejected_without_touching_the_bridge() {
        let mut p = processor();
        assert!(matches!(
            p.restore_state(&[9, 0, 0, 0, b'x']),
            Err(PlayerError::State(_))
        ));
        assert_eq!(p.bridge_state(), BridgeState::Stopped);
    }

    #[test]
    fn midi_in_blocks_reaches_the_script() {
        let mut p = processor();
        p.set_patch_script(
            r#"fn onMidiMessage(msg) { if msg.noteOn { console.log("on " + msg.noteNumber); } }"#,
            "",
        )
        .unwrap();
        render(&mut p, &[MidiMessage::note_on(1, 64, 100)]);
        assert_eq!(
            p.console().recv_timeout(Duration::from_secs(2)).as_deref(),
            Some("on 64")
        );
        assert!((0.0..=1.0).contains(&p.process_load()));
        assert_eq!(p.active_voice_count(), 0);
    }

    #[test]
    fn evaluate_sees_script_globals() {
        let mut p = processor();
        assert!(!p.evaluate("1 + 1"));
        p.set_patch_script("let base = 40;", "").unwrap();
        assert!(p.evaluate("base + 2"));
        assert!(p.evaluate("let unused = 0;"));
        assert_eq!(
            p.console().recv_timeout(Duration::from_secs(2)).as_deref(),
            Some("42")
        );
        assert!(p.console().recv_timeout(Duration::from_millis(100)).is_none());
    }

    #[test]
    fn taken_renderer_keeps_sharing_the_state() {
        let mut p = processor();
        let mut renderer = p.take_renderer().unwrap();
        assert!(p.take_renderer().is_none());

        let mut outputs = vec![vec![1.0f32; 16]; 4];
        let mut refs: Vec<&mut [f32]> = outputs.iter_mut().map(|c| c.as_mut_slice()).collect();
        renderer.process_block(&[], &mut refs, &[], None);
        assert_eq!(p.render_state().blocks_rendered(), 1);

        // Rendering through the processor is now a no-op.
        render(&mut p, &[]);
        assert_eq!(p.render_state().blocks_rendered(), 1);
    }
}
