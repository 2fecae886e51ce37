//! Sova player: drives a sample-playback engine from a script running on a
//! worker thread, fed by MIDI and timers coming from a real-time render
//! thread.

pub mod bridge;
pub mod config;
pub mod console;
pub mod error;
pub mod log;
pub mod logger;
pub mod midi;
pub mod processor;
pub mod queue;
pub mod render;
pub mod ring;
pub mod script;
pub mod state;

pub use bridge::{BridgeConfig, BridgeSender, BridgeState, ControlBridge};
pub use console::Console;
pub use error::PlayerError;
pub use log::{LogMessage, Severity};
pub use midi::MidiMessage;
pub use processor::{BusesLayout, PatchResult, PlayerProcessor};
pub use render::{BlockRenderer, RenderState};

pub const GREETER_LOGO: &str = "
 ▗▄▄▖ ▄▄▄  ▄   ▄ ▗▞▀▜▌
▐▌   █   █ █   █ ▝▚▄▟▌
 ▝▀▚▖▀▄▄▄▀  ▀▄▀       
▗▄▄▞▘          player 
";
