use crate::dsp::biquad::{FilterType, StereoBiquadFilter};
use crate::effects::{AudioEffect, EffectKind, ParameterDescriptor};
use crate::frame::Frame;

const PARAM_CUTOFF: usize = 0;
const PARAM_Q: usize = 1;

pub static PARAMETER_DESCRIPTORS: &[ParameterDescriptor] = &[
    ParameterDescriptor {
        name: "cutoff",
        aliases: &["freq", "frequency"],
        min_value: 20.0,
        max_value: 20000.0,
        default_value: 1000.0,
        unit: "Hz",
        description: "Filter cutoff or center frequency",
    },
    ParameterDescriptor {
        name: "q",
        aliases: &["resonance"],
        min_value: 0.1,
        max_value: 20.0,
        default_value: 0.707,
        unit: "",
        description: "Filter quality factor",
    },
];

/// Biquad low-pass, high-pass or band-pass. Coefficients are recomputed
/// lazily at the start of the next processed buffer.
pub struct Filter {
    kind: EffectKind,
    filter_type: FilterType,
    cutoff: f32,
    q: f32,
    filter: StereoBiquadFilter,
    sample_rate: f32,
    dirty: bool,
}

impl Filter {
    pub fn new(kind: EffectKind) -> Self {
        let filter_type = match kind {
            EffectKind::Highpass => FilterType::HighPass,
            EffectKind::Bandpass => FilterType::BandPass,
            _ => FilterType::LowPass,
        };
        Self {
            kind,
            filter_type,
            cutoff: PARAMETER_DESCRIPTORS[PARAM_CUTOFF].default_value,
            q: PARAMETER_DESCRIPTORS[PARAM_Q].default_value,
            filter: StereoBiquadFilter::default(),
            sample_rate: 0.0,
            dirty: true,
        }
    }
}

impl AudioEffect for Filter {
    fn kind(&self) -> EffectKind {
        self.kind
    }

    fn descriptors(&self) -> &'static [ParameterDescriptor] {
        PARAMETER_DESCRIPTORS
    }

    fn parameter(&self, index: usize) -> f32 {
        match index {
            PARAM_CUTOFF => self.cutoff,
            PARAM_Q => self.q,
            _ => 0.0,
        }
    }

    fn set_parameter(&mut self, index: usize, value: f32) {
        match index {
            PARAM_CUTOFF => self.cutoff = PARAMETER_DESCRIPTORS[PARAM_CUTOFF].clamp(value),
            PARAM_Q => self.q = PARAMETER_DESCRIPTORS[PARAM_Q].clamp(value),
            _ => return,
        }
        self.dirty = true;
    }

    fn process(&mut self, buffer: &mut [Frame], sample_rate: f32) {
        if self.dirty || self.sample_rate != sample_rate {
            self.sample_rate = sample_rate;
            self.filter
                .set(self.filter_type, self.cutoff, self.q, sample_rate);
            self.dirty = false;
        }
        for frame in buffer.iter_mut() {
            let (left, right) = self.filter.process(frame.left, frame.right);
            frame.left = left;
            frame.right = right;
        }
    }

    fn reset(&mut self) {
        self.filter.reset();
    }
}
