use crate::constants::{DEFAULT_ATTACK, DEFAULT_CURVE, DEFAULT_DECAY, DEFAULT_RELEASE, DEFAULT_SUSTAIN};
use crate::types::EnvelopeOverride;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EnvelopePhase {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// Envelope times in seconds, sustain as a level in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeParams {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
    pub attack_curve: f32,
    pub decay_curve: f32,
    pub release_curve: f32,
}

impl Default for EnvelopeParams {
    fn default() -> Self {
        Self {
            attack: DEFAULT_ATTACK,
            decay: DEFAULT_DECAY,
            sustain: DEFAULT_SUSTAIN,
            release: DEFAULT_RELEASE,
            attack_curve: DEFAULT_CURVE,
            decay_curve: DEFAULT_CURVE,
            release_curve: DEFAULT_CURVE,
        }
    }
}

impl EnvelopeParams {
    pub fn with_override(overrides: &EnvelopeOverride) -> Self {
        let defaults = Self::default();
        Self {
            attack: overrides.attack.unwrap_or(defaults.attack).max(0.0),
            decay: overrides.decay.unwrap_or(defaults.decay).max(0.0),
            sustain: overrides.sustain.unwrap_or(defaults.sustain).clamp(0.0, 1.0),
            release: overrides.release.unwrap_or(defaults.release).max(0.0),
            ..defaults
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeState {
    pub phase: EnvelopePhase,
    pub current_level: f32,
    pub phase_time: f32,
    pub release_start_level: f32,
}

impl Default for EnvelopeState {
    fn default() -> Self {
        Self {
            phase: EnvelopePhase::Idle,
            current_level: 0.0,
            phase_time: 0.0,
            release_start_level: 0.0,
        }
    }
}

impl EnvelopeState {
    #[inline]
    pub fn trigger(&mut self) {
        self.phase = EnvelopePhase::Attack;
        self.phase_time = 0.0;
        self.current_level = 0.0;
        self.release_start_level = 0.0;
    }

    #[inline]
    pub fn release(&mut self) {
        if matches!(
            self.phase,
            EnvelopePhase::Attack | EnvelopePhase::Decay | EnvelopePhase::Sustain
        ) {
            self.release_start_level = self.current_level;
            self.phase = EnvelopePhase::Release;
            self.phase_time = 0.0;
        }
    }

    #[inline]
    pub fn set_idle(&mut self) {
        *self = Self::default();
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        matches!(self.phase, EnvelopePhase::Idle)
    }

    #[inline]
    pub fn is_releasing(&self) -> bool {
        matches!(self.phase, EnvelopePhase::Release)
    }
}

pub struct Envelope;

impl Envelope {
    #[inline]
    fn curve_transform(t: f32, curve: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        let curve = curve.clamp(0.001, 0.999);

        if curve < 0.5 {
            let factor = curve * 2.0;
            t * (1.0 + factor * (1.0 - t))
        } else {
            let factor = (curve - 0.5) * 2.0;
            let inv = 1.0 - t;
            1.0 - inv * (1.0 + factor * t)
        }
    }

    #[inline]
    fn flush_denormals(x: f32) -> f32 {
        const DENORMAL_THRESHOLD: f32 = 1e-15;
        if x.abs() < DENORMAL_THRESHOLD {
            0.0
        } else {
            x
        }
    }

    #[inline]
    fn advance(params: &EnvelopeParams, state: &mut EnvelopeState, dt: f32) {
        state.phase_time += dt;

        match state.phase {
            EnvelopePhase::Idle => {
                state.current_level = 0.0;
            }
            EnvelopePhase::Attack => {
                let progress = if params.attack <= 0.0 {
                    1.0
                } else {
                    state.phase_time / params.attack
                };
                if progress >= 1.0 {
                    state.current_level = 1.0;
                    state.phase = EnvelopePhase::Decay;
                    state.phase_time = 0.0;
                } else {
                    state.current_level = Self::curve_transform(progress, params.attack_curve);
                }
            }
            EnvelopePhase::Decay => {
                let progress = if params.decay <= 0.0 {
                    1.0
                } else {
                    state.phase_time / params.decay
                };
                if progress >= 1.0 {
                    state.current_level = params.sustain;
                    state.phase = EnvelopePhase::Sustain;
                    state.phase_time = 0.0;
                } else {
                    let curve_val = Self::curve_transform(progress, params.decay_curve);
                    state.current_level = 1.0 - curve_val * (1.0 - params.sustain);
                }
            }
            EnvelopePhase::Sustain => {
                state.current_level = params.sustain;
            }
            EnvelopePhase::Release => {
                let progress = if params.release <= 0.0 {
                    1.0
                } else {
                    state.phase_time / params.release
                };
                if progress >= 1.0 {
                    state.set_idle();
                } else {
                    let curve_val = Self::curve_transform(progress, params.release_curve);
                    state.current_level = state.release_start_level * (1.0 - curve_val);
                }
            }
        }
    }

    /// Advances the envelope by one sample and returns its amplitude.
    #[inline]
    pub fn next(params: &EnvelopeParams, state: &mut EnvelopeState, dt: f32) -> f32 {
        if state.is_finished() {
            return 0.0;
        }
        Self::advance(params, state, dt);
        Self::flush_denormals(state.current_level.clamp(0.0, 1.0))
    }
}
