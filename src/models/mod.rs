//! Data models shared across database access and sync services.

pub mod device;
pub mod position;
pub mod session;

pub use device::*;
pub use position::*;
pub use session::*;
