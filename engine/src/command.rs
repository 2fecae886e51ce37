//! Messages between the control side and the render side.
//!
//! Commands travel control → render through a bounded lock-free queue.
//! Anything the render thread would otherwise have to free travels back
//! render → control as a [`Retired`] item, and is dropped by
//! [`crate::EngineHandle::collect_garbage`].

use crate::dsp::adsr::EnvelopeParams;
use crate::effects::{EffectChain, EffectSlot};
use crate::modulation::Modulator;
use crate::sample::Sample;
use crate::types::{LoopRegion, VoiceId};
use std::sync::Arc;

/// A fully built voice, ready to be started without allocation.
pub struct VoiceStart {
    pub id: VoiceId,
    pub sample: Arc<Sample>,
    pub bus: usize,
    /// `key - root_key`, in semitones.
    pub transpose: f32,
    pub tune: f32,
    pub gain: f32,
    pub offset: usize,
    pub loop_region: Option<LoopRegion>,
    pub envelope: EnvelopeParams,
    pub effects: EffectChain,
    pub modulator: Option<Modulator>,
}

pub enum EngineCommand {
    StartVoice(VoiceStart),
    ReleaseVoice {
        id: VoiceId,
        release_time: Option<f32>,
    },
    SetBusGain {
        bus: usize,
        gain: f32,
    },
    SetBusPan {
        bus: usize,
        pan: f32,
    },
    AddBusEffect {
        bus: usize,
        slot: EffectSlot,
    },
    SetBusEffectParameter {
        bus: usize,
        slot: usize,
        param: usize,
        value: f32,
    },
    /// Stops every voice and swaps in empty bus effect chains.
    Reset {
        chains: Box<[EffectChain]>,
    },
}

/// Resources handed back by the render thread for deallocation.
pub enum Retired {
    Voice {
        sample: Arc<Sample>,
        effects: EffectChain,
        modulator: Option<Modulator>,
    },
    Chains(Box<[EffectChain]>),
    Command(EngineCommand),
}
