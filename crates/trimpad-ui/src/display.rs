use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use memmap2::{MmapMut, MmapOptions};

use crate::error::DisplayError;
use crate::surface::{Geometry, PixelFormat, Surface};

pub const DEFAULT_FB_DEVICE: &str = "/dev/fb0";

const FBIOGET_VSCREENINFO: u32 = 0x4600;
const FBIOGET_FSCREENINFO: u32 = 0x4602;

// Kernel ABI layouts; only a few fields are read back.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
#[allow(dead_code)]
struct FbBitfield {
    offset: u32,
    length: u32,
    msb_right: u32,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
#[allow(dead_code)]
struct FbVarScreeninfo {
    xres: u32,
    yres: u32,
    xres_virtual: u32,
    yres_virtual: u32,
    xoffset: u32,
    yoffset: u32,
    bits_per_pixel: u32,
    grayscale: u32,
    red: FbBitfield,
    green: FbBitfield,
    blue: FbBitfield,
    transp: FbBitfield,
    nonstd: u32,
    activate: u32,
    height: u32,
    width: u32,
    accel_flags: u32,
    pixclock: u32,
    left_margin: u32,
    right_margin: u32,
    upper_margin: u32,
    lower_margin: u32,
    hsync_len: u32,
    vsync_len: u32,
    sync: u32,
    vmode: u32,
    rotate: u32,
    colorspace: u32,
    reserved: [u32; 4],
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
#[allow(dead_code)]
struct FbFixScreeninfo {
    id: [u8; 16],
    smem_start: libc::c_ulong,
    smem_len: u32,
    type_: u32,
    type_aux: u32,
    visual: u32,
    xpanstep: u16,
    ypanstep: u16,
    ywrapstep: u16,
    line_length: u32,
    mmio_start: libc::c_ulong,
    mmio_len: u32,
    accel: u32,
    capabilities: u16,
    reserved: [u16; 2],
}

/// How the display ended up being held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// We hold the advisory exclusive lock on the device node
    Exclusive,
    /// Someone else holds a lock, or exclusivity was not requested
    Shared,
}

/// A mapped Linux framebuffer device.
///
/// Field order matters: the mapping is dropped (unmapped) before the file is closed.
pub struct Framebuffer {
    surface: Surface<MmapMut>,
    file: File,
    path: PathBuf,
    access: Access,
    id: String,
}

impl Framebuffer {
    /// Opens and maps `path`, preferring exclusive access when `exclusive` is set.
    ///
    /// Exclusivity is best-effort: if another process already holds the lock the device is
    /// still used, shared.
    pub fn acquire(path: &Path, exclusive: bool) -> Result<Self, DisplayError> {
        let device = path.display().to_string();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_CLOEXEC)
            .open(path)
            .map_err(|source| DisplayError::Open {
                path: device.clone(),
                source,
            })?;

        let access = if exclusive {
            match try_lock_exclusive(&file) {
                Ok(()) => Access::Exclusive,
                Err(err) => {
                    tracing::warn!("Display {} busy ({}); continuing shared", device, err);
                    Access::Shared
                }
            }
        } else {
            Access::Shared
        };

        let mut var = FbVarScreeninfo::default();
        // SAFETY: FBIOGET_VSCREENINFO fills exactly one fb_var_screeninfo.
        unsafe { ioctl(&file, FBIOGET_VSCREENINFO, &mut var) }.map_err(|source| {
            DisplayError::Ioctl {
                path: device.clone(),
                request: "FBIOGET_VSCREENINFO",
                source,
            }
        })?;
        let mut fix = FbFixScreeninfo::default();
        // SAFETY: FBIOGET_FSCREENINFO fills exactly one fb_fix_screeninfo.
        unsafe { ioctl(&file, FBIOGET_FSCREENINFO, &mut fix) }.map_err(|source| {
            DisplayError::Ioctl {
                path: device.clone(),
                request: "FBIOGET_FSCREENINFO",
                source,
            }
        })?;

        let format = PixelFormat::from_bits_per_pixel(var.bits_per_pixel).ok_or_else(|| {
            DisplayError::UnsupportedFormat {
                path: device.clone(),
                bits_per_pixel: var.bits_per_pixel,
            }
        })?;
        let stride = match fix.line_length as usize {
            0 => var.xres as usize * format.bytes_per_pixel(),
            n => n,
        };
        let geometry = Geometry {
            width: var.xres,
            height: var.yres,
            stride,
            format,
        };

        // SAFETY: the mapping is shared device memory; we are its only writer in this
        // process and it lives no longer than `file`.
        let map = unsafe { MmapOptions::new().len(fix.smem_len as usize).map_mut(&file) }
            .map_err(|source| DisplayError::Map {
                path: device.clone(),
                source,
            })?;
        let surface = Surface::new(geometry, map)?;
        let id = fb_id(&fix.id);

        tracing::info!(
            "Display {} ({}) {}x{} stride {} {:?} {:?}",
            device,
            id,
            geometry.width,
            geometry.height,
            geometry.stride,
            geometry.format,
            access
        );

        Ok(Self {
            surface,
            file,
            path: path.to_path_buf(),
            access,
            id,
        })
    }

    pub fn surface_mut(&mut self) -> &mut Surface<MmapMut> {
        &mut self.surface
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        tracing::debug!("Releasing display {}", self.path.display());
    }
}

fn try_lock_exclusive(file: &File) -> io::Result<()> {
    // SAFETY: flock only reads the descriptor, which `file` keeps open.
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// # Safety
/// `T` must be the exact type the kernel writes for `request`.
unsafe fn ioctl<T>(file: &File, request: u32, out: &mut T) -> io::Result<()> {
    // SAFETY: upheld by the caller.
    let rc = unsafe { libc::ioctl(file.as_raw_fd(), request as _, out as *mut T) };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

fn fb_id(raw: &[u8; 16]) -> String {
    let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}
