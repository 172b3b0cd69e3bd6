#![deny(clippy::all)]

pub mod adb;
pub mod commands;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod presenter;
#[cfg(unix)]
pub mod signal;
pub mod telemetry;

pub use error::CliError;
pub use handlers::HandlerResult;
