use crate::constants::{MAX_BUS_EFFECTS, MIX_BUFFER_NUM_FRAMES, PARAMETER_SMOOTHING};
use crate::dsp::follower::EnvelopeFollower;
use crate::dsp::smoother::ParameterSmoother;
use crate::effects::{AudioEffect, EffectChain, EffectSlot};
use crate::frame::Frame;

const FOLLOWER_ATTACK: f32 = 0.005;
const FOLLOWER_RELEASE: f32 = 0.3;

/// An `AudioBus` collects the voices routed to it, together with any host
/// input assigned to it, runs its effect chain and mixes the result into a
/// stereo output pair.
///
/// # Signal Flow
///
/// ```text
/// voices ─┐
///         ├─> send buffer ─> effect chain ─> gain/balance ─> output pair
/// input ──┘                                      └─> level follower
/// ```
///
/// # Performance Characteristics
///
/// - The send buffer and the effect chain capacity are allocated once, in
///   [`AudioBus::new`]. Processing never allocates.
/// - Gain and balance are smoothed per sample, so script changes never click.
///
/// # Dummy Outputs
///
/// A bus whose output pair the host does not provide is still processed,
/// into a scratch pair the caller discards. Its effects, follower and
/// counters keep running, so a bus behaves the same whether or not it is
/// audible.
pub struct AudioBus {
    /// Position of this bus in the engine
    pub index: usize,
    /// Voices and input accumulate here until the next `process_and_mix`
    send_buffer: Vec<Frame>,
    /// Effects applied to the send buffer, in order
    effects: EffectChain,
    gain: ParameterSmoother,
    pan: ParameterSmoother,
    follower: EnvelopeFollower,
    frames_processed: u64,
    sample_rate: f32,
}

impl AudioBus {
    /// Creates a silent bus with unity gain and centred balance.
    ///
    /// # Arguments
    ///
    /// * `index` - Position of the bus in the engine
    /// * `sample_rate` - Initial sample rate, updated by [`AudioBus::prepare`]
    pub fn new(index: usize, sample_rate: f32) -> Self {
        let mut bus = Self {
            index,
            send_buffer: vec![Frame::ZERO; MIX_BUFFER_NUM_FRAMES],
            effects: EffectChain::with_capacity(MAX_BUS_EFFECTS),
            gain: ParameterSmoother::new(1.0),
            pan: ParameterSmoother::new(0.0),
            follower: EnvelopeFollower::new(FOLLOWER_ATTACK, FOLLOWER_RELEASE, sample_rate),
            frames_processed: 0,
            sample_rate,
        };
        bus.prepare(sample_rate);
        bus
    }

    /// Updates sample-rate dependent state and clears the signal path.
    pub fn prepare(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.gain.set_time(PARAMETER_SMOOTHING, sample_rate);
        self.pan.set_time(PARAMETER_SMOOTHING, sample_rate);
        self.follower
            .configure(FOLLOWER_ATTACK, FOLLOWER_RELEASE, sample_rate);
        self.follower.reset();
        self.effects.reset();
        Frame::process_block_zero(&mut self.send_buffer);
    }

    /// Mutable view of the first `frames` frames of the send buffer.
    ///
    /// # Performance Notes
    ///
    /// `frames` is clamped to the mix buffer size; callers chunk host
    /// blocks accordingly.
    #[inline]
    pub fn send_buffer_mut(&mut self, frames: usize) -> &mut [Frame] {
        let frames = frames.min(self.send_buffer.len());
        &mut self.send_buffer[..frames]
    }

    #[inline]
    pub fn send_buffer(&self) -> &[Frame] {
        &self.send_buffer
    }

    /// Adds a host input pair to the send buffer.
    pub fn add_input(&mut self, left: &[f32], right: &[f32]) {
        for ((frame, l), r) in self.send_buffer.iter_mut().zip(left).zip(right) {
            frame.left += *l;
            frame.right += *r;
        }
    }

    /// Processes the send buffer and adds it to `out_left`/`out_right`.
    ///
    /// The number of frames is the shortest of the two output slices and the
    /// mix buffer. The send buffer is cleared afterwards, ready for the next
    /// chunk.
    pub fn process_and_mix(&mut self, out_left: &mut [f32], out_right: &mut [f32]) {
        let frames = out_left
            .len()
            .min(out_right.len())
            .min(self.send_buffer.len());
        let buffer = &mut self.send_buffer[..frames];

        self.effects.process(buffer, self.sample_rate);

        for (i, frame) in buffer.iter_mut().enumerate() {
            let gain = self.gain.next();
            let pan = self.pan.next();
            let left = frame.left * gain * (1.0 - pan).min(1.0);
            let right = frame.right * gain * (1.0 + pan).min(1.0);
            out_left[i] += left;
            out_right[i] += right;
            self.follower.process(left.abs().max(right.abs()));
            *frame = Frame::ZERO;
        }
        self.frames_processed += frames as u64;
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain.set_target(gain.max(0.0));
    }

    pub fn set_pan(&mut self, pan: f32) {
        self.pan.set_target(pan.clamp(-1.0, 1.0));
    }

    pub fn gain(&self) -> f32 {
        self.gain.target()
    }

    pub fn pan(&self) -> f32 {
        self.pan.target()
    }

    /// Output peak level after gain and balance.
    pub fn level(&self) -> f32 {
        self.follower.level()
    }

    /// Total frames this bus has processed, audible or not.
    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn effect_count(&self) -> usize {
        self.effects.len()
    }

    pub fn effect_mut(&mut self, slot: usize) -> Option<&mut (dyn AudioEffect + 'static)> {
        self.effects.get_mut(slot)
    }

    /// Appends an effect without growing the chain.
    pub fn push_effect(&mut self, slot: EffectSlot) -> Result<usize, EffectSlot> {
        self.effects.try_push(slot)
    }

    /// Swaps in `chain` and restores unity gain and centred balance.
    pub(crate) fn reset(&mut self, chain: &mut EffectChain) {
        std::mem::swap(&mut self.effects, chain);
        self.gain.set_immediate(1.0);
        self.pan.set_immediate(0.0);
        self.follower.reset();
        Frame::process_block_zero(&mut self.send_buffer);
    }
}
