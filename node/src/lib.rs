pub mod api;
pub mod config;
pub mod errors;
pub mod pipeline;
pub mod server;
pub mod telemetry;
pub mod validator_backend;
