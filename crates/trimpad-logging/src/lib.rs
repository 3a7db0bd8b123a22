#![deny(unsafe_op_in_unsafe_fn)]
pub mod config;
pub mod fs;
pub mod init;
pub mod retention;

pub use config::LoggingConfig;
pub use init::{apply, init, LoggingGuards};
pub use retention::run_retention;
