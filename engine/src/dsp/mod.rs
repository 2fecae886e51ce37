pub mod adsr;
pub mod biquad;
pub mod follower;
pub mod smoother;
