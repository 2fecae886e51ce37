//! Player configuration, stored as TOML next to the other Sova settings.

mod loader;
mod types;
mod validation;

pub use loader::ConfigLoader;
pub use types::{
    AudioConfig, BridgeSettings, EngineSettings, LogConfig, LogTarget, MidiConfig, PlayerConfig,
    ScriptConfig,
};
pub use validation::Validate;
