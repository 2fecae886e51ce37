use crate::dsp::smoother::ParameterSmoother;
use crate::effects::{AudioEffect, EffectKind, ParameterDescriptor};
use crate::frame::Frame;

const PARAM_GAIN: usize = 0;
const PARAM_PAN: usize = 1;

pub static PARAMETER_DESCRIPTORS: &[ParameterDescriptor] = &[
    ParameterDescriptor {
        name: "gain",
        aliases: &["amp"],
        min_value: 0.0,
        max_value: 4.0,
        default_value: 1.0,
        unit: "",
        description: "Linear gain",
    },
    ParameterDescriptor {
        name: "pan",
        aliases: &[],
        min_value: -1.0,
        max_value: 1.0,
        default_value: 0.0,
        unit: "",
        description: "Stereo balance",
    },
];

pub struct Gain {
    gain: ParameterSmoother,
    pan: ParameterSmoother,
    sample_rate: f32,
}

impl Default for Gain {
    fn default() -> Self {
        Self::new()
    }
}

impl Gain {
    pub fn new() -> Self {
        Self {
            gain: ParameterSmoother::new(PARAMETER_DESCRIPTORS[PARAM_GAIN].default_value),
            pan: ParameterSmoother::new(PARAMETER_DESCRIPTORS[PARAM_PAN].default_value),
            sample_rate: 0.0,
        }
    }
}

impl AudioEffect for Gain {
    fn kind(&self) -> EffectKind {
        EffectKind::Gain
    }

    fn descriptors(&self) -> &'static [ParameterDescriptor] {
        PARAMETER_DESCRIPTORS
    }

    fn parameter(&self, index: usize) -> f32 {
        match index {
            PARAM_GAIN => self.gain.target(),
            PARAM_PAN => self.pan.target(),
            _ => 0.0,
        }
    }

    fn set_parameter(&mut self, index: usize, value: f32) {
        match index {
            PARAM_GAIN => self.gain.set_target(PARAMETER_DESCRIPTORS[PARAM_GAIN].clamp(value)),
            PARAM_PAN => self.pan.set_target(PARAMETER_DESCRIPTORS[PARAM_PAN].clamp(value)),
            _ => {}
        }
    }

    fn process(&mut self, buffer: &mut [Frame], sample_rate: f32) {
        if self.sample_rate != sample_rate {
            self.sample_rate = sample_rate;
            self.gain.set_time(crate::constants::PARAMETER_SMOOTHING, sample_rate);
            self.pan.set_time(crate::constants::PARAMETER_SMOOTHING, sample_rate);
        }
        for frame in buffer.iter_mut() {
            let gain = self.gain.next();
            let pan = self.pan.next();
            frame.left *= gain * (1.0 - pan).min(1.0);
            frame.right *= gain * (1.0 + pan).min(1.0);
        }
    }

    fn reset(&mut self) {
        let (gain, pan) = (self.gain.target(), self.pan.target());
        self.gain.set_immediate(gain);
        self.pan.set_immediate(pan);
    }
}
