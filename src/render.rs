//! Per-block render loop, run on the host's audio thread.
//!
//! Nothing here blocks, allocates or logs. The only state shared with the
//! control side is [`RenderState`], a handful of independent atomics.

use crate::bridge::BridgeSender;
use crate::midi::MidiMessage;
use player_engine::constants::MIX_BUFFER_NUM_FRAMES;
use player_engine::{Engine, TransportInfo};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Weight of the previous estimate in the process load average.
const LOAD_SMOOTHING: f32 = 0.99;

/// One step of the process load average, clamped to `[0, 1]`.
pub fn smoothed_load(previous: f32, measured_us: f64, available_us: f64) -> f32 {
    let ratio = if available_us > 0.0 {
        (measured_us / available_us) as f32
    } else {
        1.0
    };
    let ratio = if ratio.is_finite() { ratio } else { 1.0 };
    let previous = if previous.is_finite() { previous } else { 0.0 };
    (LOAD_SMOOTHING * previous + (1.0 - LOAD_SMOOTHING) * ratio).clamp(0.0, 1.0)
}

/// Common length of every channel, or `None` when they disagree.
fn block_length(inputs: &[&[f32]], outputs: &[&mut [f32]]) -> Option<usize> {
    let mut lengths = inputs
        .iter()
        .map(|c| c.len())
        .chain(outputs.iter().map(|c| c.len()));
    let first = lengths.next().unwrap_or(0);
    lengths.all(|len| len == first).then_some(first)
}

/// Flags and counters shared between the renderer and the control side.
#[derive(Debug)]
pub struct RenderState {
    processing: AtomicBool,
    in_block: AtomicBool,
    realtime: AtomicBool,
    load: AtomicU32,
    blocks_rendered: AtomicU64,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            processing: AtomicBool::new(false),
            in_block: AtomicBool::new(false),
            realtime: AtomicBool::new(true),
            load: AtomicU32::new(0.0f32.to_bits()),
            blocks_rendered: AtomicU64::new(0),
        }
    }
}

impl RenderState {
    pub fn set_processing(&self, enabled: bool) {
        self.processing.store(enabled, Ordering::SeqCst);
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    /// True while the renderer is inside a block that passed the
    /// processing check.
    pub fn is_rendering(&self) -> bool {
        self.in_block.load(Ordering::SeqCst)
    }

    /// Offline hosts deliver MIDI synchronously.
    pub fn set_realtime(&self, realtime: bool) {
        self.realtime.store(realtime, Ordering::Relaxed);
    }

    pub fn is_realtime(&self) -> bool {
        self.realtime.load(Ordering::Relaxed)
    }

    pub fn process_load(&self) -> f32 {
        f32::from_bits(self.load.load(Ordering::Relaxed))
    }

    pub fn blocks_rendered(&self) -> u64 {
        self.blocks_rendered.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    pub(crate) fn in_block_for_test(&self, in_block: bool) {
        self.in_block.store(in_block, Ordering::SeqCst);
    }
}

pub struct BlockRenderer {
    engine: Engine,
    events: BridgeSender,
    state: Arc<RenderState>,
    dummy_left: Vec<f32>,
    dummy_right: Vec<f32>,
}

impl BlockRenderer {
    pub fn new(engine: Engine, events: BridgeSender, state: Arc<RenderState>) -> Self {
        Self {
            engine,
            events,
            state,
            dummy_left: vec![0.0; MIX_BUFFER_NUM_FRAMES],
            dummy_right: vec![0.0; MIX_BUFFER_NUM_FRAMES],
        }
    }

    pub fn prepare(&mut self, sample_rate: f32) {
        self.engine.prepare_to_play(sample_rate);
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    pub fn state(&self) -> &Arc<RenderState> {
        &self.state
    }

    /// Renders one host block.
    ///
    /// `inputs` and `outputs` are de-interleaved channels, paired into
    /// stereo buses: channels `2i` and `2i + 1` belong to bus `i`. Blocks
    /// with an odd channel count on either side, or with channels of
    /// different lengths, are skipped untouched, as are blocks arriving while
    /// processing is disabled.
    pub fn process_block(
        &mut self,
        inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
        midi: &[MidiMessage],
        playhead: Option<&TransportInfo>,
    ) {
        if inputs.len() % 2 != 0 || outputs.len() % 2 != 0 {
            return;
        }
        let Some(frames) = block_length(inputs, outputs) else {
            return;
        };
        self.state.in_block.store(true, Ordering::SeqCst);
        if !self.state.processing.load(Ordering::SeqCst) {
            self.state.in_block.store(false, Ordering::SeqCst);
            return;
        }
        let started = Instant::now();

        if let Some(playhead) = playhead {
            self.engine.set_transport(*playhead);
        }
        self.deliver_midi(midi);

        let num_buses = self.engine.num_buses();
        let input_buses = inputs.len() / 2;
        let output_buses = outputs.len().min(num_buses * 2) / 2;

        let mut start = 0;
        while start < frames {
            let len = (frames - start).min(MIX_BUFFER_NUM_FRAMES);
            let end = start + len;
            self.engine.process_audio_events(len);

            for index in 0..num_buses {
                let Some(bus) = self.engine.bus_mut(index) else {
                    continue;
                };
                if index < input_buses {
                    bus.add_input(
                        &inputs[2 * index][start..end],
                        &inputs[2 * index + 1][start..end],
                    );
                }
                if index < output_buses {
                    let (left, right) = outputs.split_at_mut(2 * index + 1);
                    let out_left = &mut left[2 * index][start..end];
                    let out_right = &mut right[0][start..end];
                    out_left.fill(0.0);
                    out_right.fill(0.0);
                    bus.process_and_mix(out_left, out_right);
                } else {
                    let dummy_left = &mut self.dummy_left[..len];
                    let dummy_right = &mut self.dummy_right[..len];
                    dummy_left.fill(0.0);
                    dummy_right.fill(0.0);
                    bus.process_and_mix(dummy_left, dummy_right);
                }
            }
            start = end;
        }

        // Channels past the last bus carry nothing.
        for channel in outputs.iter_mut().skip(output_buses * 2) {
            channel[..frames].fill(0.0);
        }

        let sample_rate = self.engine.sample_rate() as f64;
        if frames > 0 && sample_rate > 0.0 {
            let available_us = frames as f64 / sample_rate * 1_000_000.0;
            let measured_us = started.elapsed().as_secs_f64() * 1_000_000.0;
            let load = smoothed_load(self.state.process_load(), measured_us, available_us);
            self.state.load.store(load.to_bits(), Ordering::Relaxed);
        }
        self.state.blocks_rendered.fetch_add(1, Ordering::Relaxed);
        self.state.in_block.store(false, Ordering::SeqCst);
    }

    fn deliver_midi(&mut self, midi: &[MidiMessage]) {
        if midi.is_empty() {
            return;
        }
        if self.state.is_realtime() {
            for message in midi {
                self.events.post_midi(*message, false);
            }
            self.events.notify();
        } else {
            for message in midi {
                // A stalled worker would stall every following event too.
                if !self.events.send_midi(*message) {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests;
