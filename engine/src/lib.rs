//! Sample-playback engine driven by the player's control bridge.
//!
//! The engine is split in two halves created together by [`create_engine`]:
//! the render-side [`Engine`], owned by the audio thread, and the
//! control-side [`EngineHandle`], cloned freely by scripts and hosts. They
//! share atomics for the transport and the controller array and talk
//! through lock-free queues only.

#[macro_use]
mod macros;

pub mod bus;
pub mod command;
pub mod constants;
pub mod controllers;
pub mod dsp;
pub mod effects;
pub mod engine;
pub mod frame;
pub mod handle;
pub mod modulation;
pub mod sample;
pub mod types;
pub mod voice;

pub use bus::AudioBus;
pub use engine::{create_engine, Engine, EngineConfig};
pub use frame::Frame;
pub use handle::{EngineHandle, Triggered};
pub use types::{
    EffectDescriptor, EngineError, EnvelopeOverride, LoopRegion, ModulationSource, SampleId,
    TransportInfo, Trigger, VoiceId,
};
