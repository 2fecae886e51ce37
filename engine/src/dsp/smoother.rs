/// One-pole smoother for control values that change while audio plays.
#[derive(Debug, Clone, Copy)]
pub struct ParameterSmoother {
    current: f32,
    target: f32,
    coefficient: f32,
}

impl ParameterSmoother {
    pub fn new(value: f32) -> Self {
        Self {
            current: value,
            target: value,
            coefficient: 0.0,
        }
    }

    /// Sets the time constant. A non-positive time makes changes immediate.
    pub fn set_time(&mut self, seconds: f32, sample_rate: f32) {
        self.coefficient = if seconds <= 0.0 {
            0.0
        } else {
            (-1.0 / (seconds * sample_rate)).exp()
        };
    }

    #[inline]
    pub fn set_target(&mut self, target: f32) {
        self.target = target;
    }

    #[inline]
    pub fn set_immediate(&mut self, value: f32) {
        self.current = value;
        self.target = value;
    }

    #[inline]
    pub fn target(&self) -> f32 {
        self.target
    }

    #[inline]
    pub fn next(&mut self) -> f32 {
        self.current = self.target + (self.current - self.target) * self.coefficient;
        if (self.current - self.target).abs() < 1e-6 {
            self.current = self.target;
        }
        self.current
    }
}
