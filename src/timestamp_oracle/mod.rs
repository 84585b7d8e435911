pub mod config;
pub mod low_water;
pub mod oracle;
pub mod pending_log;
pub mod request;
