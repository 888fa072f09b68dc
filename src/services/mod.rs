pub mod live_positions;
pub mod saga;
pub mod session;
pub mod sync;
