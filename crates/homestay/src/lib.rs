pub mod config;
pub mod error;
pub mod payments;
pub mod telemetry;
pub mod workflows;
