/// One stereo sample frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Frame {
    pub left: f32,
    pub right: f32,
}

impl Frame {
    pub const ZERO: Frame = Frame {
        left: 0.0,
        right: 0.0,
    };

    pub fn new(left: f32, right: f32) -> Self {
        Self { left, right }
    }

    pub fn mono(value: f32) -> Self {
        Self {
            left: value,
            right: value,
        }
    }

    #[inline]
    pub fn add_assign(&mut self, other: &Frame) {
        self.left += other.left;
        self.right += other.right;
    }

    #[inline]
    pub fn mul_scalar(&self, scalar: f32) -> Frame {
        Frame {
            left: self.left * scalar,
            right: self.right * scalar,
        }
    }

    #[inline]
    pub fn peak(&self) -> f32 {
        self.left.abs().max(self.right.abs())
    }

    #[inline]
    pub fn process_block_add(dest: &mut [Frame], src: &[Frame]) {
        for (d, s) in dest.iter_mut().zip(src.iter()) {
            d.add_assign(s);
        }
    }

    #[inline]
    pub fn process_block_zero(dest: &mut [Frame]) {
        dest.fill(Frame::ZERO);
    }
}

impl From<[f32; 2]> for Frame {
    fn from(arr: [f32; 2]) -> Self {
        Self {
            left: arr[0],
            right: arr[1],
        }
    }
}
