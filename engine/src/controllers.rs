use crate::constants::NUM_CONTROLLERS;
use std::sync::atomic::{AtomicU32, Ordering};

/// The 128 MIDI controller values, stored as `f32` bits so that the
/// control side can write them while voices read them on the render thread.
pub struct Controllers {
    values: [AtomicU32; NUM_CONTROLLERS],
}

impl Default for Controllers {
    fn default() -> Self {
        Self {
            values: std::array::from_fn(|_| AtomicU32::new(0.0f32.to_bits())),
        }
    }
}

impl Controllers {
    /// Out-of-range controller numbers read as 0.
    #[inline]
    pub fn get(&self, index: usize) -> f32 {
        self.values
            .get(index)
            .map(|v| f32::from_bits(v.load(Ordering::Relaxed)))
            .unwrap_or(0.0)
    }

    /// Returns false when `index` is not a controller number.
    #[inline]
    pub fn set(&self, index: usize, value: f32) -> bool {
        match self.values.get(index) {
            Some(slot) => {
                slot.store(value.to_bits(), Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        for v in &self.values {
            v.store(0.0f32.to_bits(), Ordering::Relaxed);
        }
    }
}
