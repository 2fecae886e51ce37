//! Centralized constants for the player engine.

// Rendering
pub const DEFAULT_SAMPLE_RATE: f32 = 44100.0;
pub const DEFAULT_MAX_BLOCK_SIZE: usize = 512;
/// Largest number of frames mixed in one pass. Host blocks larger than this
/// are processed in sub-chunks.
pub const MIX_BUFFER_NUM_FRAMES: usize = 256;
pub const MIX_BUFFER_NUM_CHANNELS: usize = 2;

// Voice and bus limits
pub const DEFAULT_NUM_BUSES: usize = 4;
pub const MAX_BUSES: usize = 16;
pub const DEFAULT_MAX_VOICES: usize = 128;
pub const MAX_BUS_EFFECTS: usize = 16;
pub const MAX_VOICE_EFFECTS: usize = 8;

// Lock-free queues between the control side and the render side
pub const COMMAND_QUEUE_CAPACITY: usize = 1024;
pub const RETIRE_QUEUE_CAPACITY: usize = 1024;

// MIDI controller array
pub const NUM_CONTROLLERS: usize = 128;

// Sample loading
pub const MAX_SAMPLE_SECONDS: f32 = 120.0;

// Default envelope
pub const DEFAULT_ATTACK: f32 = 0.002;
pub const DEFAULT_DECAY: f32 = 0.0;
pub const DEFAULT_SUSTAIN: f32 = 1.0;
pub const DEFAULT_RELEASE: f32 = 0.05;
pub const DEFAULT_CURVE: f32 = 0.3;

// Parameter smoothing time for bus gain and pan, in seconds
pub const PARAMETER_SMOOTHING: f32 = 0.01;

// Modulation programs
pub const MAX_MODULATION_OPS: usize = 256;
pub const MODULATION_STACK_SIZE: usize = 32;
pub const MAX_MODULATION_VARIABLES: usize = 32;
