use crate::effects::{AudioEffect, EffectKind, ParameterDescriptor};
use crate::frame::Frame;

const PARAM_TIME: usize = 0;
const PARAM_FEEDBACK: usize = 1;
const PARAM_MIX: usize = 2;

const MAX_DELAY_SECONDS: f32 = 2.0;
/// Highest sample rate the delay buffer is sized for. Longer times are
/// truncated at higher rates.
const MAX_DELAY_SAMPLE_RATE: f32 = 96000.0;

pub static PARAMETER_DESCRIPTORS: &[ParameterDescriptor] = &[
    ParameterDescriptor {
        name: "time",
        aliases: &["delay"],
        min_value: 0.001,
        max_value: MAX_DELAY_SECONDS,
        default_value: 0.25,
        unit: "s",
        description: "Delay time",
    },
    ParameterDescriptor {
        name: "feedback",
        aliases: &["fb"],
        min_value: 0.0,
        max_value: 0.95,
        default_value: 0.3,
        unit: "",
        description: "Amount of output fed back into the line",
    },
    ParameterDescriptor {
        name: "mix",
        aliases: &["wet"],
        min_value: 0.0,
        max_value: 1.0,
        default_value: 0.3,
        unit: "",
        description: "Dry/wet balance",
    },
];

/// Stereo feedback delay. The line is allocated once, at construction.
pub struct Delay {
    time: f32,
    feedback: f32,
    mix: f32,
    buffer: Vec<Frame>,
    write_pos: usize,
}

impl Default for Delay {
    fn default() -> Self {
        Self::new()
    }
}

impl Delay {
    pub fn new() -> Self {
        let len = (MAX_DELAY_SECONDS * MAX_DELAY_SAMPLE_RATE) as usize + 1;
        Self {
            time: PARAMETER_DESCRIPTORS[PARAM_TIME].default_value,
            feedback: PARAMETER_DESCRIPTORS[PARAM_FEEDBACK].default_value,
            mix: PARAMETER_DESCRIPTORS[PARAM_MIX].default_value,
            buffer: vec![Frame::ZERO; len],
            write_pos: 0,
        }
    }
}

impl AudioEffect for Delay {
    fn kind(&self) -> EffectKind {
        EffectKind::Delay
    }

    fn descriptors(&self) -> &'static [ParameterDescriptor] {
        PARAMETER_DESCRIPTORS
    }

    fn parameter(&self, index: usize) -> f32 {
        match index {
            PARAM_TIME => self.time,
            PARAM_FEEDBACK => self.feedback,
            PARAM_MIX => self.mix,
            _ => 0.0,
        }
    }

    fn set_parameter(&mut self, index: usize, value: f32) {
        match index {
            PARAM_TIME => self.time = PARAMETER_DESCRIPTORS[PARAM_TIME].clamp(value),
            PARAM_FEEDBACK => self.feedback = PARAMETER_DESCRIPTORS[PARAM_FEEDBACK].clamp(value),
            PARAM_MIX => self.mix = PARAMETER_DESCRIPTORS[PARAM_MIX].clamp(value),
            _ => {}
        }
    }

    fn process(&mut self, buffer: &mut [Frame], sample_rate: f32) {
        let len = self.buffer.len();
        let delay = ((self.time * sample_rate) as usize).clamp(1, len - 1);
        let dry = 1.0 - self.mix;
        for frame in buffer.iter_mut() {
            let read_pos = (self.write_pos + len - delay) % len;
            let delayed = self.buffer[read_pos];
            self.buffer[self.write_pos] = Frame::new(
                frame.left + delayed.left * self.feedback,
                frame.right + delayed.right * self.feedback,
            );
            self.write_pos = (self.write_pos + 1) % len;
            frame.left = frame.left * dry + delayed.left * self.mix;
            frame.right = frame.right * dry + delayed.right * self.mix;
        }
    }

    fn reset(&mut self) {
        self.buffer.fill(Frame::ZERO);
        self.write_pos = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn impulse_reappears_after_delay_time() {
        let mut delay = Delay::new();
        delay.set_parameter(PARAM_TIME, 0.01);
        delay.set_parameter(PARAM_MIX, 1.0);
        delay.set_parameter(PARAM_FEEDBACK, 0.0);

        let mut buffer = vec![Frame::ZERO; 32];
        buffer[0] = Frame::mono(1.0);
        delay.process(&mut buffer, 1000.0);

        assert_eq!(buffer[0], Frame::ZERO);
        assert_eq!(buffer[10], Frame::mono(1.0));
        assert_eq!(buffer[20], Frame::ZERO);
    }
}
