//! Effect registry and effect chains.
//!
//! Effects are addressed by a lowercase tag (`"lowpass"`, `"delay"`, ...).
//! They are always constructed on the control side, where allocation is
//! allowed, and handed to the render thread fully built.

pub mod delay;
pub mod filter;
pub mod gain;

use crate::frame::Frame;
use crate::types::{EffectDescriptor, EngineError};
use strum::{EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

#[derive(Debug, Clone)]
pub struct ParameterDescriptor {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub min_value: f32,
    pub max_value: f32,
    pub default_value: f32,
    pub unit: &'static str,
    pub description: &'static str,
}

impl ParameterDescriptor {
    #[inline]
    pub fn matches_name(&self, param: &str) -> bool {
        self.name == param || self.aliases.iter().any(|&alias| alias == param)
    }

    #[inline]
    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min_value, self.max_value)
    }
}

/// Looks a parameter up by name or alias.
pub fn parameter_index(descriptors: &[ParameterDescriptor], name: &str) -> Option<usize> {
    descriptors.iter().position(|d| d.matches_name(name))
}

/// A stereo in-place processor with indexed parameters.
///
/// Parameter indices follow the order of [`AudioEffect::descriptors`].
/// `set_parameter` clamps to the descriptor range and must not allocate.
pub trait AudioEffect: Send {
    fn kind(&self) -> EffectKind;
    fn descriptors(&self) -> &'static [ParameterDescriptor];
    fn parameter(&self, index: usize) -> f32;
    fn set_parameter(&mut self, index: usize, value: f32);
    fn process(&mut self, buffer: &mut [Frame], sample_rate: f32);
    fn reset(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, IntoStaticStr, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum EffectKind {
    Gain,
    Lowpass,
    Highpass,
    Bandpass,
    Delay,
}

impl EffectKind {
    pub fn tag(self) -> &'static str {
        self.into()
    }

    pub fn available() -> Vec<String> {
        EffectKind::iter().map(|k| k.tag().to_string()).collect()
    }

    pub fn descriptors(self) -> &'static [ParameterDescriptor] {
        match self {
            EffectKind::Gain => gain::PARAMETER_DESCRIPTORS,
            EffectKind::Lowpass | EffectKind::Highpass | EffectKind::Bandpass => {
                filter::PARAMETER_DESCRIPTORS
            }
            EffectKind::Delay => delay::PARAMETER_DESCRIPTORS,
        }
    }

    pub fn create(self) -> Box<dyn AudioEffect> {
        match self {
            EffectKind::Gain => Box::new(gain::Gain::new()),
            EffectKind::Lowpass => Box::new(filter::Filter::new(EffectKind::Lowpass)),
            EffectKind::Highpass => Box::new(filter::Filter::new(EffectKind::Highpass)),
            EffectKind::Bandpass => Box::new(filter::Filter::new(EffectKind::Bandpass)),
            EffectKind::Delay => Box::new(delay::Delay::new()),
        }
    }
}

/// Resolves a tag to an effect kind.
pub fn effect_kind(tag: &str) -> Result<EffectKind, EngineError> {
    tag.parse::<EffectKind>()
        .map_err(|_| EngineError::UnknownEffect {
            tag: tag.to_string(),
            available: EffectKind::available(),
        })
}

/// Builds an effect from a descriptor, applying its parameters.
///
/// Unknown parameter names are reported as an error so scripts can surface
/// typos; out-of-range values are clamped.
pub fn build_effect(descriptor: &EffectDescriptor) -> Result<EffectSlot, EngineError> {
    let kind = effect_kind(&descriptor.tag)?;
    let mut effect = kind.create();
    for (name, value) in &descriptor.parameters {
        let index = parameter_index(kind.descriptors(), name).ok_or_else(|| {
            EngineError::UnknownParameter {
                effect: descriptor.tag.clone(),
                param: name.clone(),
                valid: kind.descriptors().iter().map(|d| d.name.to_string()).collect(),
            }
        })?;
        effect.set_parameter(index, *value);
    }
    Ok(EffectSlot {
        id: descriptor.id.clone(),
        effect,
    })
}

pub struct EffectSlot {
    pub id: Option<String>,
    pub effect: Box<dyn AudioEffect>,
}

/// Ordered chain of effects with a fixed capacity.
///
/// The capacity is reserved up front so that pushing on the render thread
/// never reallocates.
pub struct EffectChain {
    slots: Vec<EffectSlot>,
}

impl Default for EffectChain {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl EffectChain {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
        }
    }

    pub fn from_descriptors(descriptors: &[EffectDescriptor]) -> Result<Self, EngineError> {
        let mut chain = Self::with_capacity(descriptors.len());
        for descriptor in descriptors {
            chain.slots.push(build_effect(descriptor)?);
        }
        Ok(chain)
    }

    /// Appends without growing. Hands the slot back when the chain is full.
    pub fn try_push(&mut self, slot: EffectSlot) -> Result<usize, EffectSlot> {
        if self.slots.len() == self.slots.capacity() {
            return Err(slot);
        }
        self.slots.push(slot);
        Ok(self.slots.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    pub fn get(&self, slot: usize) -> Option<&dyn AudioEffect> {
        self.slots.get(slot).map(|s| s.effect.as_ref())
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut (dyn AudioEffect + 'static)> {
        self.slots.get_mut(slot).map(|s| s.effect.as_mut())
    }

    /// Finds `(slot, parameter)` for `id.param`, or for a bare `param` on
    /// the first effect that has it.
    pub fn resolve_parameter(&self, target: &str) -> Option<(usize, usize)> {
        match target.split_once('.') {
            Some((id, param)) => {
                let slot = self
                    .slots
                    .iter()
                    .position(|s| s.id.as_deref() == Some(id))?;
                let index = parameter_index(self.slots[slot].effect.descriptors(), param)?;
                Some((slot, index))
            }
            None => self.slots.iter().enumerate().find_map(|(slot, s)| {
                parameter_index(s.effect.descriptors(), target).map(|index| (slot, index))
            }),
        }
    }

    /// Every `(target, current value)` pair addressable in this chain.
    pub fn parameter_names(&self) -> Vec<(String, f32)> {
        let mut names = Vec::new();
        for slot in &self.slots {
            for (index, d) in slot.effect.descriptors().iter().enumerate() {
                let value = slot.effect.parameter(index);
                if let Some(id) = &slot.id {
                    names.push((format!("{}.{}", id, d.name), value));
                }
                names.push((d.name.to_string(), value));
            }
        }
        names
    }

    #[inline]
    pub fn process(&mut self, buffer: &mut [Frame], sample_rate: f32) {
        for slot in self.slots.iter_mut() {
            slot.effect.process(buffer, sample_rate);
        }
    }

    pub fn reset(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.effect.reset();
        }
    }
}
