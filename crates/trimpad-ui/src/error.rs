use std::io;

use thiserror::Error;

/// Failures while acquiring or wrapping the framebuffer.
///
/// Every variant is fatal: without a display there is nothing to show.
#[derive(Error, Debug)]
pub enum DisplayError {
    #[error("Failed to open display device {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("{request} failed on {path}: {source}")]
    Ioctl {
        path: String,
        request: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("Unsupported pixel depth on {path}: {bits_per_pixel} bpp")]
    UnsupportedFormat { path: String, bits_per_pixel: u32 },

    #[error("Pixel memory too small: {len} bytes for a visible area needing {needed}")]
    TooSmall { len: usize, needed: usize },

    #[error("Failed to map display memory of {path}: {source}")]
    Map {
        path: String,
        #[source]
        source: io::Error,
    },
}
