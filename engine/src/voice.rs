use crate::command::{Retired, VoiceStart};
use crate::constants::MIX_BUFFER_NUM_FRAMES;
use crate::dsp::adsr::{Envelope, EnvelopeParams, EnvelopeState};
use crate::effects::EffectChain;
use crate::frame::Frame;
use crate::modulation::{ModContext, ModTarget, Modulator};
use crate::sample::Sample;
use crate::types::{LoopRegion, VoiceId};
use std::sync::Arc;

/// One playing sample.
///
/// Voices live in a pool allocated when the engine is created. Starting a
/// voice moves pre-built resources in; finishing it moves them out again
/// through [`Voice::take_resources`], so the render thread never allocates
/// or frees.
///
/// Per block a voice:
/// - evaluates its modulation program (control rate),
/// - reads the sample with linear interpolation, looping with a crossfade,
/// - applies the ADSR envelope, gain and balance,
/// - runs its effect chain and adds the result to its bus send buffer.
pub struct Voice {
    pub id: VoiceId,
    pub bus: usize,
    sample: Option<Arc<Sample>>,
    position: f64,
    transpose: f32,
    tune: f32,
    gain: f32,
    pan: f32,
    loop_region: Option<LoopRegion>,
    envelope_params: EnvelopeParams,
    envelope_state: EnvelopeState,
    effects: EffectChain,
    modulator: Option<Modulator>,
    elapsed: f32,
    /// Start sequence number, used to pick a voice to steal.
    pub order: u64,
    buffer: Vec<Frame>,
}

impl Default for Voice {
    fn default() -> Self {
        Self::new()
    }
}

impl Voice {
    pub fn new() -> Self {
        Self {
            id: 0,
            bus: 0,
            sample: None,
            position: 0.0,
            transpose: 0.0,
            tune: 0.0,
            gain: 1.0,
            pan: 0.0,
            loop_region: None,
            envelope_params: EnvelopeParams::default(),
            envelope_state: EnvelopeState::default(),
            effects: EffectChain::default(),
            modulator: None,
            elapsed: 0.0,
            order: 0,
            buffer: vec![Frame::ZERO; MIX_BUFFER_NUM_FRAMES],
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.sample.is_some() && !self.envelope_state.is_finished()
    }

    #[inline]
    pub fn is_releasing(&self) -> bool {
        self.envelope_state.is_releasing()
    }

    /// Starts playback. The previous resources must have been taken first.
    pub fn start(&mut self, start: VoiceStart, order: u64) {
        self.id = start.id;
        self.bus = start.bus;
        self.position = start.offset as f64;
        self.transpose = start.transpose;
        self.tune = start.tune;
        self.gain = start.gain;
        self.pan = 0.0;
        self.loop_region = start
            .loop_region
            .filter(|r| r.is_valid() && r.end <= start.sample.len());
        self.envelope_params = start.envelope;
        self.envelope_state.trigger();
        self.effects = start.effects;
        self.effects.reset();
        self.modulator = start.modulator;
        self.sample = Some(start.sample);
        self.elapsed = 0.0;
        self.order = order;
    }

    pub fn release(&mut self, release_time: Option<f32>) {
        if let Some(time) = release_time {
            self.envelope_params.release = time.max(0.0);
        }
        self.envelope_state.release();
    }

    /// Moves the voice's shared and heap resources out, leaving it idle.
    pub fn take_resources(&mut self) -> Option<Retired> {
        self.envelope_state.set_idle();
        let sample = self.sample.take()?;
        Some(Retired::Voice {
            sample,
            effects: std::mem::take(&mut self.effects),
            modulator: self.modulator.take(),
        })
    }

    fn apply_modulation(&mut self, ctx: &ModContext<'_>) {
        let Some(modulator) = &self.modulator else {
            return;
        };
        let (gain, tune, pan, effects) = (
            &mut self.gain,
            &mut self.tune,
            &mut self.pan,
            &mut self.effects,
        );
        modulator.evaluate(ctx, |target, value| match target {
            ModTarget::Gain => *gain = value.max(0.0),
            ModTarget::Tune => *tune = value,
            ModTarget::Pan => *pan = value.clamp(-1.0, 1.0),
            ModTarget::Effect { slot, param } => {
                if let Some(effect) = effects.get_mut(slot) {
                    effect.set_parameter(param, value);
                }
            }
        });
    }

    #[inline]
    fn read_frame(&self, sample: &Sample) -> Frame {
        let Some(region) = self.loop_region else {
            return sample.frame_at(self.position);
        };
        let xfade = region.crossfade.min(region.begin).min(region.end - region.begin);
        let fade_start = (region.end - xfade) as f64;
        if xfade == 0 || self.position < fade_start {
            return sample.frame_at(self.position);
        }
        let weight = ((self.position - fade_start) / xfade as f64) as f32;
        let tail = sample.frame_at(self.position);
        let head = sample.frame_at(self.position - (region.end - region.begin) as f64);
        Frame::new(
            tail.left * (1.0 - weight) + head.left * weight,
            tail.right * (1.0 - weight) + head.right * weight,
        )
    }

    /// Renders up to `out.len()` frames, adding them to `out`.
    pub fn render(&mut self, out: &mut [Frame], ctx: &ModContext<'_>) {
        let Some(sample) = self.sample.clone() else {
            return;
        };
        let frames = out.len().min(self.buffer.len());
        let dt = 1.0 / ctx.sample_rate;

        let local = ModContext {
            time: self.elapsed,
            ..*ctx
        };
        self.apply_modulation(&local);

        let pitch = 2.0f64.powf(((self.transpose + self.tune) / 12.0) as f64);
        let step = pitch * sample.sample_rate as f64 / ctx.sample_rate as f64;
        let left_gain = self.gain * (1.0 - self.pan).min(1.0);
        let right_gain = self.gain * (1.0 + self.pan).min(1.0);
        let end = sample.len() as f64;

        let mut rendered = frames;
        for i in 0..frames {
            if self.position >= end || self.envelope_state.is_finished() {
                self.envelope_state.set_idle();
                rendered = i;
                break;
            }
            let level = Envelope::next(&self.envelope_params, &mut self.envelope_state, dt);
            let frame = self.read_frame(&sample);
            self.buffer[i] = Frame::new(frame.left * level * left_gain, frame.right * level * right_gain);

            self.position += step;
            if let Some(region) = self.loop_region {
                let loop_end = region.end as f64;
                if self.position >= loop_end {
                    self.position -= (region.end - region.begin) as f64;
                }
            }
        }
        Frame::process_block_zero(&mut self.buffer[rendered..frames]);

        self.effects.process(&mut self.buffer[..frames], ctx.sample_rate);
        Frame::process_block_add(&mut out[..frames], &self.buffer[..frames]);
        self.elapsed += frames as f32 * dt;
    }
}
