pub mod device;
pub mod position;
pub mod session;
pub mod transaction;
