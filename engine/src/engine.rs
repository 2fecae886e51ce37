use crate::bus::AudioBus;
use crate::command::{EngineCommand, Retired};
use crate::constants::{
    COMMAND_QUEUE_CAPACITY, DEFAULT_MAX_VOICES, DEFAULT_NUM_BUSES, DEFAULT_SAMPLE_RATE,
    MAX_BUSES, MIX_BUFFER_NUM_FRAMES, RETIRE_QUEUE_CAPACITY,
};
use crate::controllers::Controllers;
use crate::handle::EngineHandle;
use crate::modulation::ModContext;
use crate::types::TransportInfo;
use crate::voice::Voice;
use crossbeam_queue::ArrayQueue;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    pub num_buses: usize,
    pub max_voices: usize,
    pub sample_rate: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            num_buses: DEFAULT_NUM_BUSES,
            max_voices: DEFAULT_MAX_VOICES,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

/// Transport snapshot stored as independent atomics. Readers may observe
/// fields from two consecutive blocks, which is harmless for display and
/// scripting.
#[derive(Default)]
pub(crate) struct TransportCell {
    bpm: AtomicU64,
    time_in_seconds: AtomicU64,
    ppq_position: AtomicU64,
    is_playing: AtomicBool,
}

impl TransportCell {
    fn new(info: TransportInfo) -> Self {
        let cell = Self::default();
        cell.store(&info);
        cell
    }

    pub(crate) fn store(&self, info: &TransportInfo) {
        self.bpm.store(info.bpm.to_bits(), Ordering::Relaxed);
        self.time_in_seconds
            .store(info.time_in_seconds.to_bits(), Ordering::Relaxed);
        self.ppq_position
            .store(info.ppq_position.to_bits(), Ordering::Relaxed);
        self.is_playing.store(info.is_playing, Ordering::Relaxed);
    }

    pub(crate) fn load(&self) -> TransportInfo {
        TransportInfo {
            bpm: f64::from_bits(self.bpm.load(Ordering::Relaxed)),
            time_in_seconds: f64::from_bits(self.time_in_seconds.load(Ordering::Relaxed)),
            ppq_position: f64::from_bits(self.ppq_position.load(Ordering::Relaxed)),
            is_playing: self.is_playing.load(Ordering::Relaxed),
        }
    }
}

/// State reachable from both halves of the engine.
pub(crate) struct Shared {
    pub(crate) commands: ArrayQueue<EngineCommand>,
    pub(crate) retired: ArrayQueue<Retired>,
    pub(crate) controllers: Controllers,
    pub(crate) transport: TransportCell,
    pub(crate) sample_rate: AtomicU32,
    pub(crate) active_voices: AtomicUsize,
    pub(crate) next_voice_id: AtomicU32,
    pub(crate) num_buses: usize,
}

impl Shared {
    /// Hands resources to the control side. If the retire queue is full the
    /// item is dropped here, which may free memory on the render thread.
    pub(crate) fn retire(&self, item: Retired) {
        if self.retired.push(item).is_err() {
            rt_eprintln!("[ENGINE WARNING] Retire queue full - freeing on render thread");
        }
    }
}

/// Creates the render-side engine and its control-side handle.
pub fn create_engine(config: EngineConfig) -> (Engine, EngineHandle) {
    let num_buses = config.num_buses.clamp(1, MAX_BUSES);
    let shared = Arc::new(Shared {
        commands: ArrayQueue::new(COMMAND_QUEUE_CAPACITY),
        retired: ArrayQueue::new(RETIRE_QUEUE_CAPACITY),
        controllers: Controllers::default(),
        transport: TransportCell::new(TransportInfo::default()),
        sample_rate: AtomicU32::new(config.sample_rate.to_bits()),
        active_voices: AtomicUsize::new(0),
        next_voice_id: AtomicU32::new(1),
        num_buses,
    });
    let engine = Engine {
        shared: Arc::clone(&shared),
        voices: (0..config.max_voices.max(1)).map(|_| Voice::new()).collect(),
        buses: (0..num_buses)
            .map(|i| AudioBus::new(i, config.sample_rate))
            .collect(),
        sample_rate: config.sample_rate,
        transport: TransportInfo::default(),
        start_counter: 0,
    };
    (engine, EngineHandle::new(shared))
}

/// Render-side half of the engine, owned by the audio thread.
///
/// # Block Processing
///
/// For every chunk of at most [`MIX_BUFFER_NUM_FRAMES`] frames the caller
/// runs [`Engine::process_audio_events`], which applies pending commands
/// and renders voices into their bus send buffers, then adds any host input
/// to the buses and calls [`AudioBus::process_and_mix`] on each of them.
///
/// # Real-time Safety
///
/// No method here allocates, frees, locks or blocks.
pub struct Engine {
    shared: Arc<Shared>,
    voices: Vec<Voice>,
    buses: Vec<AudioBus>,
    sample_rate: f32,
    transport: TransportInfo,
    start_counter: u64,
}

impl Engine {
    pub fn prepare_to_play(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.shared
            .sample_rate
            .store(sample_rate.to_bits(), Ordering::Relaxed);
        for bus in self.buses.iter_mut() {
            bus.prepare(sample_rate);
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Publishes the host transport for this block.
    pub fn set_transport(&mut self, info: TransportInfo) {
        self.transport = info;
        self.shared.transport.store(&info);
    }

    pub fn transport(&self) -> TransportInfo {
        self.transport
    }

    pub fn num_buses(&self) -> usize {
        self.buses.len()
    }

    pub fn bus(&self, index: usize) -> Option<&AudioBus> {
        self.buses.get(index)
    }

    pub fn bus_mut(&mut self, index: usize) -> Option<&mut AudioBus> {
        self.buses.get_mut(index)
    }

    pub fn controllers(&self) -> &Controllers {
        &self.shared.controllers
    }

    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|v| v.is_active()).count()
    }

    /// Applies pending commands, then renders `frames` frames of every
    /// active voice into its bus send buffer.
    pub fn process_audio_events(&mut self, frames: usize) {
        while let Some(command) = self.shared.commands.pop() {
            self.handle_command(command);
        }

        let frames = frames.min(MIX_BUFFER_NUM_FRAMES);
        let ctx = ModContext {
            time: 0.0,
            sample_rate: self.sample_rate,
            bpm: self.transport.bpm as f32,
            ppq: self.transport.ppq_position as f32,
            controllers: &self.shared.controllers,
        };

        let mut active = 0;
        for voice in self.voices.iter_mut() {
            if !voice.is_active() {
                continue;
            }
            if let Some(bus) = self.buses.get_mut(voice.bus) {
                voice.render(bus.send_buffer_mut(frames), &ctx);
            }
            if voice.is_active() {
                active += 1;
            } else if let Some(retired) = voice.take_resources() {
                self.shared.retire(retired);
            }
        }
        self.shared.active_voices.store(active, Ordering::Relaxed);
    }

    fn handle_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::StartVoice(start) => {
                if start.bus >= self.buses.len() {
                    self.shared
                        .retire(Retired::Command(EngineCommand::StartVoice(start)));
                    return;
                }
                let slot = self.allocate_voice();
                let voice = &mut self.voices[slot];
                if let Some(retired) = voice.take_resources() {
                    self.shared.retire(retired);
                }
                self.start_counter += 1;
                voice.start(start, self.start_counter);
            }
            EngineCommand::ReleaseVoice { id, release_time } => {
                if let Some(voice) = self
                    .voices
                    .iter_mut()
                    .find(|v| v.id == id && v.is_active())
                {
                    voice.release(release_time);
                }
            }
            EngineCommand::SetBusGain { bus, gain } => {
                if let Some(bus) = self.buses.get_mut(bus) {
                    bus.set_gain(gain);
                }
            }
            EngineCommand::SetBusPan { bus, pan } => {
                if let Some(bus) = self.buses.get_mut(bus) {
                    bus.set_pan(pan);
                }
            }
            EngineCommand::AddBusEffect { bus, slot } => match self.buses.get_mut(bus) {
                Some(target) => {
                    if let Err(slot) = target.push_effect(slot) {
                        rt_eprintln!("[ENGINE WARNING] Bus {} effect chain full", bus);
                        self.shared
                            .retire(Retired::Command(EngineCommand::AddBusEffect { bus, slot }));
                    }
                }
                None => self
                    .shared
                    .retire(Retired::Command(EngineCommand::AddBusEffect { bus, slot })),
            },
            EngineCommand::SetBusEffectParameter {
                bus,
                slot,
                param,
                value,
            } => {
                if let Some(effect) = self.buses.get_mut(bus).and_then(|b| b.effect_mut(slot)) {
                    effect.set_parameter(param, value);
                }
            }
            EngineCommand::Reset { mut chains } => {
                for voice in self.voices.iter_mut() {
                    if let Some(retired) = voice.take_resources() {
                        self.shared.retire(retired);
                    }
                }
                for (bus, chain) in self.buses.iter_mut().zip(chains.iter_mut()) {
                    bus.reset(chain);
                }
                self.shared.active_voices.store(0, Ordering::Relaxed);
                self.shared.retire(Retired::Chains(chains));
            }
        }
    }

    /// Returns a free voice slot, stealing the oldest voice when all are busy.
    fn allocate_voice(&self) -> usize {
        let mut oldest = 0;
        let mut oldest_order = u64::MAX;
        for (i, voice) in self.voices.iter().enumerate() {
            if !voice.is_active() {
                return i;
            }
            // Prefer stealing voices that are already fading out.
            let order = if voice.is_releasing() {
                voice.order
            } else {
                voice.order.saturating_add(u64::MAX / 2)
            };
            if order < oldest_order {
                oldest_order = order;
                oldest = i;
            }
        }
        rt_eprintln!("[ENGINE WARNING] Voice pool exhausted - stealing voice {}", oldest);
        oldest
    }
}
