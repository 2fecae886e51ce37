/// Peak envelope follower with separate attack and release times.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeFollower {
    level: f32,
    attack_coeff: f32,
    release_coeff: f32,
}

impl EnvelopeFollower {
    pub fn new(attack_seconds: f32, release_seconds: f32, sample_rate: f32) -> Self {
        let mut follower = Self {
            level: 0.0,
            attack_coeff: 0.0,
            release_coeff: 0.0,
        };
        follower.configure(attack_seconds, release_seconds, sample_rate);
        follower
    }

    pub fn configure(&mut self, attack_seconds: f32, release_seconds: f32, sample_rate: f32) {
        self.attack_coeff = (-1.0 / (attack_seconds.max(1e-5) * sample_rate)).exp();
        self.release_coeff = (-1.0 / (release_seconds.max(1e-5) * sample_rate)).exp();
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let x = input.abs();
        let coeff = if x > self.level {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.level = x + (self.level - x) * coeff;
        if self.level < 1e-9 {
            self.level = 0.0;
        }
        self.level
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn reset(&mut self) {
        self.level = 0.0;
    }
}
