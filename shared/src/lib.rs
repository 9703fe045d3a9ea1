pub mod constants;
pub mod shared_lucky_wheel;
