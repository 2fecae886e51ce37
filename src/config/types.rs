use crate::log::Severity;
use crate::logger::LoggerMode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PlayerConfig {
    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub engine: EngineSettings,

    #[serde(default)]
    pub bridge: BridgeSettings,

    #[serde(default)]
    pub midi: MidiConfig,

    #[serde(default)]
    pub script: ScriptConfig,

    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AudioConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    #[serde(default = "default_block_size")]
    pub block_size: u32,

    /// Substring of the output device name; the default device when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_device: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EngineSettings {
    #[serde(default = "default_num_buses")]
    pub num_buses: usize,

    #[serde(default = "default_max_voices")]
    pub max_voices: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BridgeSettings {
    #[serde(default = "default_ring_capacity")]
    pub ring_capacity: usize,

    #[serde(default = "default_sync_timeout_ms")]
    pub sync_timeout_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MidiConfig {
    /// Substring of the MIDI input port name; no MIDI input when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_port: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ScriptConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogTarget {
    Terminal,
    File,
    Both,
}

impl LogTarget {
    pub fn mode(self) -> LoggerMode {
        match self {
            LogTarget::Terminal => LoggerMode::Standalone,
            LogTarget::File => LoggerMode::File,
            LogTarget::Both => LoggerMode::Full,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LogConfig {
    #[serde(default = "default_log_target")]
    pub target: LogTarget,

    #[serde(default = "default_log_level")]
    pub level: Severity,
}

fn default_sample_rate() -> u32 {
    44100
}

fn default_block_size() -> u32 {
    512
}

fn default_num_buses() -> usize {
    player_engine::constants::DEFAULT_NUM_BUSES
}

fn default_max_voices() -> usize {
    player_engine::constants::DEFAULT_MAX_VOICES
}

fn default_ring_capacity() -> usize {
    crate::bridge::DEFAULT_RING_CAPACITY
}

fn default_sync_timeout_ms() -> u64 {
    crate::bridge::SYNC_TIMEOUT.as_millis() as u64
}

fn default_log_target() -> LogTarget {
    LogTarget::Terminal
}

fn default_log_level() -> Severity {
    Severity::Info
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            block_size: default_block_size(),
            output_device: None,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            num_buses: default_num_buses(),
            max_voices: default_max_voices(),
        }
    }
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            ring_capacity: default_ring_capacity(),
            sync_timeout_ms: default_sync_timeout_ms(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            target: default_log_target(),
            level: default_log_level(),
        }
    }
}
