//! Control-side half of the engine.

use crate::command::{EngineCommand, VoiceStart};
use crate::constants::MAX_BUS_EFFECTS;
use crate::controllers::Controllers;
use crate::dsp::adsr::EnvelopeParams;
use crate::effects::{build_effect, parameter_index, EffectChain, EffectKind};
use crate::engine::Shared;
use crate::modulation::{ModulationError, Modulator};
use crate::sample::SamplePool;
use crate::types::{EffectDescriptor, EngineError, SampleId, TransportInfo, Trigger, VoiceId};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard};

/// What the control side believes a bus looks like. Updated when commands
/// are queued, so reads reflect every change made so far even before the
/// render thread has applied it.
#[derive(Debug, Clone)]
struct BusMirror {
    gain: f32,
    pan: f32,
    effects: Vec<EffectMirror>,
}

impl Default for BusMirror {
    fn default() -> Self {
        Self {
            gain: 1.0,
            pan: 0.0,
            effects: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct EffectMirror {
    kind: EffectKind,
    values: Vec<f32>,
}

/// Result of a successful trigger.
#[derive(Debug, Clone, PartialEq)]
pub struct Triggered {
    pub id: VoiceId,
    /// Set when the modulation expression failed to compile. The voice
    /// plays unmodulated.
    pub modulation_error: Option<ModulationError>,
}

/// Cheap, cloneable handle used by scripts and hosts to drive the engine.
///
/// All methods may allocate and lock; none may be called from the render
/// thread.
#[derive(Clone)]
pub struct EngineHandle {
    shared: Arc<Shared>,
    samples: Arc<SamplePool>,
    mirror: Arc<Mutex<Vec<BusMirror>>>,
}

impl EngineHandle {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        let mirror = vec![BusMirror::default(); shared.num_buses];
        Self {
            shared,
            samples: Arc::new(SamplePool::new()),
            mirror: Arc::new(Mutex::new(mirror)),
        }
    }

    fn mirror(&self) -> MutexGuard<'_, Vec<BusMirror>> {
        self.mirror.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn send(&self, command: EngineCommand) -> Result<(), EngineError> {
        self.shared
            .commands
            .push(command)
            .map_err(|_| EngineError::CommandQueueFull)
    }

    fn check_bus(&self, bus: usize) -> Result<(), EngineError> {
        if bus < self.shared.num_buses {
            Ok(())
        } else {
            Err(EngineError::BusOutOfRange {
                index: bus,
                available: self.shared.num_buses,
            })
        }
    }

    pub fn samples(&self) -> &SamplePool {
        &self.samples
    }

    pub fn add_sample(&self, path: &Path) -> Result<SampleId, EngineError> {
        self.samples.load(path)
    }

    pub fn add_sample_with_range(
        &self,
        path: &Path,
        start: usize,
        stop: usize,
    ) -> Result<SampleId, EngineError> {
        self.samples.load_range(path, start, stop)
    }

    pub fn transport(&self) -> TransportInfo {
        self.shared.transport.load()
    }

    pub fn sample_rate(&self) -> f32 {
        f32::from_bits(self.shared.sample_rate.load(Ordering::Relaxed))
    }

    pub fn num_buses(&self) -> usize {
        self.shared.num_buses
    }

    pub fn controllers(&self) -> &Controllers {
        &self.shared.controllers
    }

    /// Voices that were playing at the end of the last rendered block.
    pub fn active_voices(&self) -> usize {
        self.shared.active_voices.load(Ordering::Relaxed)
    }

    /// Builds the voice (effects, modulation) here and queues it.
    pub fn trigger(&self, trigger: &Trigger) -> Result<Triggered, EngineError> {
        self.check_bus(trigger.bus)?;
        let sample = self
            .samples
            .get(trigger.sample)
            .ok_or(EngineError::UnknownSample {
                id: trigger.sample,
            })?;
        let effects = EffectChain::from_descriptors(&trigger.effects)?;

        let (modulator, modulation_error) = match &trigger.modulation {
            Some(source) => match Modulator::compile(source, &effects) {
                Ok(m) => (Some(m), None),
                Err(e) => (None, Some(e)),
            },
            None => (None, None),
        };

        let id = self.shared.next_voice_id.fetch_add(1, Ordering::Relaxed);
        self.send(EngineCommand::StartVoice(VoiceStart {
            id,
            sample,
            bus: trigger.bus,
            transpose: (trigger.key as f64 - trigger.root_key as f64) as f32,
            tune: trigger.tune,
            gain: trigger.gain.max(0.0),
            offset: trigger.offset,
            loop_region: trigger.loop_region,
            envelope: EnvelopeParams::with_override(&trigger.envelope),
            effects,
            modulator,
        }))?;
        Ok(Triggered {
            id,
            modulation_error,
        })
    }

    /// Releases a voice, optionally overriding its release time (seconds).
    /// Unknown or finished voices are ignored.
    pub fn release(&self, id: VoiceId, release_time: Option<f32>) -> Result<(), EngineError> {
        self.send(EngineCommand::ReleaseVoice { id, release_time })
    }

    pub fn bus_gain(&self, bus: usize) -> Result<f32, EngineError> {
        self.check_bus(bus)?;
        Ok(self.mirror()[bus].gain)
    }

    pub fn set_bus_gain(&self, bus: usize, gain: f32) -> Result<(), EngineError> {
        self.check_bus(bus)?;
        let gain = gain.max(0.0);
        self.send(EngineCommand::SetBusGain { bus, gain })?;
        self.mirror()[bus].gain = gain;
        Ok(())
    }

    pub fn bus_pan(&self, bus: usize) -> Result<f32, EngineError> {
        self.check_bus(bus)?;
        Ok(self.mirror()[bus].pan)
    }

    pub fn set_bus_pan(&self, bus: usize, pan: f32) -> Result<(), EngineError> {
        self.check_bus(bus)?;
        let pan = pan.clamp(-1.0, 1.0);
        self.send(EngineCommand::SetBusPan { bus, pan })?;
        self.mirror()[bus].pan = pan;
        Ok(())
    }

    /// Appends an effect to a bus and returns its slot.
    pub fn add_bus_effect(&self, bus: usize, tag: &str) -> Result<usize, EngineError> {
        self.check_bus(bus)?;
        let mut mirror = self.mirror();
        let slots = &mut mirror[bus].effects;
        if slots.len() >= MAX_BUS_EFFECTS {
            return Err(EngineError::EffectChainFull {
                capacity: MAX_BUS_EFFECTS,
            });
        }
        let slot = build_effect(&EffectDescriptor::new(tag))?;
        let kind = slot.effect.kind();
        let values = (0..kind.descriptors().len())
            .map(|i| slot.effect.parameter(i))
            .collect();
        self.send(EngineCommand::AddBusEffect { bus, slot })?;
        slots.push(EffectMirror { kind, values });
        Ok(slots.len() - 1)
    }

    /// Tags of the effects on a bus, in processing order.
    pub fn bus_effects(&self, bus: usize) -> Result<Vec<&'static str>, EngineError> {
        self.check_bus(bus)?;
        Ok(self.mirror()[bus].effects.iter().map(|e| e.kind.tag()).collect())
    }

    fn with_effect<T>(
        &self,
        bus: usize,
        slot: usize,
        f: impl FnOnce(&mut EffectMirror) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        self.check_bus(bus)?;
        let mut mirror = self.mirror();
        let effect = mirror[bus]
            .effects
            .get_mut(slot)
            .ok_or_else(|| EngineError::UnknownEffect {
                tag: format!("bus {} slot {}", bus, slot),
                available: Vec::new(),
            })?;
        f(effect)
    }

    fn unknown_parameter(effect: &EffectMirror, name: &str) -> EngineError {
        EngineError::UnknownParameter {
            effect: effect.kind.tag().to_string(),
            param: name.to_string(),
            valid: effect
                .kind
                .descriptors()
                .iter()
                .map(|d| d.name.to_string())
                .collect(),
        }
    }

    pub fn effect_tag(&self, bus: usize, slot: usize) -> Result<&'static str, EngineError> {
        self.with_effect(bus, slot, |effect| Ok(effect.kind.tag()))
    }

    /// Last value set for a bus effect parameter.
    pub fn effect_parameter(&self, bus: usize, slot: usize, name: &str) -> Result<f32, EngineError> {
        self.with_effect(bus, slot, |effect| {
            let index = parameter_index(effect.kind.descriptors(), name)
                .ok_or_else(|| Self::unknown_parameter(effect, name))?;
            Ok(effect.values[index])
        })
    }

    pub fn set_effect_parameter(
        &self,
        bus: usize,
        slot: usize,
        name: &str,
        value: f32,
    ) -> Result<(), EngineError> {
        self.with_effect(bus, slot, |effect| {
            let index = parameter_index(effect.kind.descriptors(), name)
                .ok_or_else(|| Self::unknown_parameter(effect, name))?;
            let value = effect.kind.descriptors()[index].clamp(value);
            self.send(EngineCommand::SetBusEffectParameter {
                bus,
                slot,
                param: index,
                value,
            })?;
            effect.values[index] = value;
            Ok(())
        })
    }

    /// Every parameter of a bus effect with its last set value.
    pub fn effect_parameters(
        &self,
        bus: usize,
        slot: usize,
    ) -> Result<Vec<(&'static str, f32)>, EngineError> {
        self.with_effect(bus, slot, |effect| {
            Ok(effect
                .kind
                .descriptors()
                .iter()
                .zip(&effect.values)
                .map(|(d, v)| (d.name, *v))
                .collect())
        })
    }

    /// Stops every voice and restores every bus to its initial state.
    ///
    /// Commands still waiting in the queue are discarded, so the reset goes
    /// through even when the queue was full. Call it while the render side
    /// is not processing events.
    pub fn reset(&self) -> usize {
        let chains: Box<[EffectChain]> = (0..self.shared.num_buses)
            .map(|_| EffectChain::with_capacity(MAX_BUS_EFFECTS))
            .collect();
        let mut discarded = 0;
        while self.shared.commands.pop().is_some() {
            discarded += 1;
        }
        if self
            .shared
            .commands
            .force_push(EngineCommand::Reset { chains })
            .is_some()
        {
            discarded += 1;
        }
        self.mirror()
            .iter_mut()
            .for_each(|bus| *bus = BusMirror::default());
        discarded
    }

    /// Drops resources retired by the render thread. Returns how many items
    /// were collected.
    pub fn collect_garbage(&self) -> usize {
        let mut collected = 0;
        while let Some(item) = self.shared.retired.pop() {
            drop(item);
            collected += 1;
        }
        collected
    }
}
