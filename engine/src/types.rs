//! Core type definitions shared by the control side and the render side.

use std::fmt;

/// Identifier of a playing voice, allocated by [`crate::EngineHandle`].
///
/// Identifiers start at 1 and are never reused during the lifetime of an
/// engine, so a stale id simply addresses no voice.
pub type VoiceId = u32;

/// Index into the sample pool.
pub type SampleId = u32;

/// Host transport snapshot, published by the render thread every block and
/// read by the control side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportInfo {
    pub bpm: f64,
    pub time_in_seconds: f64,
    /// Musical position in quarter notes.
    pub ppq_position: f64,
    pub is_playing: bool,
}

impl Default for TransportInfo {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            time_in_seconds: 0.0,
            ppq_position: 0.0,
            is_playing: false,
        }
    }
}

/// Loop points of a voice, in sample frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopRegion {
    pub begin: usize,
    pub end: usize,
    /// Length of the crossfade applied before `end`.
    pub crossfade: usize,
}

impl LoopRegion {
    pub fn is_valid(&self) -> bool {
        self.end > self.begin
    }
}

/// Per-trigger envelope values. Missing fields keep the engine defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnvelopeOverride {
    pub attack: Option<f32>,
    pub decay: Option<f32>,
    pub sustain: Option<f32>,
    pub release: Option<f32>,
}

/// Request for one effect in a voice effect chain.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectDescriptor {
    pub tag: String,
    /// Name used by modulation targets (`id.param`).
    pub id: Option<String>,
    pub parameters: Vec<(String, f32)>,
}

impl EffectDescriptor {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            id: None,
            parameters: Vec::new(),
        }
    }
}

/// Modulation expression plus the user variables it may read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModulationSource {
    pub expression: String,
    pub variables: Vec<(String, f32)>,
}

/// Everything needed to start a voice.
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub sample: SampleId,
    pub bus: usize,
    pub key: i32,
    pub root_key: i32,
    /// Start position in sample frames.
    pub offset: usize,
    pub gain: f32,
    /// Fine tuning in semitones.
    pub tune: f32,
    pub loop_region: Option<LoopRegion>,
    pub envelope: EnvelopeOverride,
    pub effects: Vec<EffectDescriptor>,
    pub modulation: Option<ModulationSource>,
}

impl Trigger {
    pub fn new(sample: SampleId) -> Self {
        Self {
            sample,
            bus: 0,
            key: 60,
            root_key: 60,
            offset: 0,
            gain: 1.0,
            tune: 0.0,
            loop_region: None,
            envelope: EnvelopeOverride::default(),
            effects: Vec::new(),
            modulation: None,
        }
    }
}

/// Errors reported by the control side of the engine.
///
/// The render side never fails: a command it cannot honor is dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    UnknownSample {
        id: SampleId,
    },
    BusOutOfRange {
        index: usize,
        available: usize,
    },
    SampleLoadFailed {
        path: String,
        reason: String,
    },
    UnknownEffect {
        tag: String,
        available: Vec<String>,
    },
    UnknownParameter {
        effect: String,
        param: String,
        valid: Vec<String>,
    },
    EffectChainFull {
        capacity: usize,
    },
    Modulation {
        reason: String,
    },
    /// The render thread has not drained its command queue.
    CommandQueueFull,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::UnknownSample { id } => write!(f, "No sample with id {}", id),
            EngineError::BusOutOfRange { index, available } => {
                write!(f, "Bus {} out of range (engine has {} buses)", index, available)
            }
            EngineError::SampleLoadFailed { path, reason } => {
                write!(f, "Failed to load sample '{}': {}", path, reason)
            }
            EngineError::UnknownEffect { tag, available } => {
                write!(
                    f,
                    "Unknown effect '{}'. Available effects: [{}]",
                    tag,
                    available.join(", ")
                )
            }
            EngineError::UnknownParameter {
                effect,
                param,
                valid,
            } => {
                write!(
                    f,
                    "Effect '{}' has no parameter '{}'. Valid parameters: [{}]",
                    effect,
                    param,
                    valid.join(", ")
                )
            }
            EngineError::EffectChainFull { capacity } => {
                write!(f, "Effect chain is full ({} effects)", capacity)
            }
            EngineError::Modulation { reason } => write!(f, "Modulation error: {}", reason),
            EngineError::CommandQueueFull => write!(f, "Engine command queue is full"),
        }
    }
}

impl std::error::Error for EngineError {}
