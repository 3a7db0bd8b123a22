#![deny(unsafe_op_in_unsafe_fn)]
// Library interface for trimpad-ui; keeps the modules testable without a panel attached

#[cfg(not(target_os = "linux"))]
compile_error!(
    "trimpad-ui drives Linux fbdev and evdev devices and only builds for Linux targets."
);

pub mod app;
pub mod config;
pub mod cue;
pub mod display;
pub mod error;
pub mod font;
pub mod input;
pub mod keymap;
pub mod screen;
pub mod session;
pub mod state;
pub mod surface;

pub use app::{run, App, ExitReason};
pub use config::UiConfig;
