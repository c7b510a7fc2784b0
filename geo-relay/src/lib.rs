pub mod config;
pub mod dedup;
pub mod error;
pub mod forwarder;
pub mod pipeline;
pub mod sink;
pub mod source;
