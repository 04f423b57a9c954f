pub mod apps;
pub mod config;
pub mod errors;
pub mod seed;
pub mod server;
pub mod telemetry;
