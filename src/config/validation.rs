use super::types::{AudioConfig, BridgeSettings, EngineSettings, PlayerConfig};
use crate::log_warn;
use player_engine::constants::MAX_BUSES;

pub trait Validate {
    fn validate(&mut self);
}

impl Validate for AudioConfig {
    fn validate(&mut self) {
        if !(8_000..=192_000).contains(&self.sample_rate) {
            log_warn!(
                "Invalid sample_rate: {}. Using default: 44100",
                self.sample_rate
            );
            self.sample_rate = 44100;
        }

        if !(16..=8192).contains(&self.block_size) {
            log_warn!("Invalid block_size: {}. Using default: 512", self.block_size);
            self.block_size = 512;
        }

        if self.output_device.as_deref().is_some_and(str::is_empty) {
            self.output_device = None;
        }
    }
}

impl Validate for EngineSettings {
    fn validate(&mut self) {
        if self.num_buses == 0 || self.num_buses > MAX_BUSES {
            log_warn!(
                "Invalid num_buses: {}. Clamping to 1..={}",
                self.num_buses,
                MAX_BUSES
            );
            self.num_buses = self.num_buses.clamp(1, MAX_BUSES);
        }

        if self.max_voices == 0 || self.max_voices > 1024 {
            log_warn!("Invalid max_voices: {}. Using default: 128", self.max_voices);
            self.max_voices = 128;
        }
    }
}

impl Validate for BridgeSettings {
    fn validate(&mut self) {
        if self.ring_capacity < 16 || self.ring_capacity > 65536 {
            log_warn!(
                "Invalid ring_capacity: {}. Using default: 1024",
                self.ring_capacity
            );
            self.ring_capacity = 1024;
        }

        if self.sync_timeout_ms == 0 || self.sync_timeout_ms > 10_000 {
            log_warn!(
                "Invalid sync_timeout_ms: {}. Using default: 100",
                self.sync_timeout_ms
            );
            self.sync_timeout_ms = 100;
        }
    }
}

impl Validate for PlayerConfig {
    fn validate(&mut self) {
        self.audio.validate();
        self.engine.validate();
        self.bridge.validate();
    }
}
