pub mod hub;
pub mod ids;
pub mod metrics;
pub mod point;
pub mod retry;
pub mod timestamp;
