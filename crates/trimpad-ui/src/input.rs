//! Raw evdev ingestion from every `/dev/input/eventN` we can open.

use std::{
    fs::{File, OpenOptions},
    io::{self, Read},
    os::{
        fd::{AsRawFd, RawFd},
        unix::fs::OpenOptionsExt,
    },
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

pub const DEFAULT_DEVICE_PREFIX: &str = "/dev/input/event";
pub const DEFAULT_MAX_INDEX: u32 = 15;

/// Size of one kernel `struct input_event`.
pub const RECORD_SIZE: usize = std::mem::size_of::<libc::input_event>();
const HEADER_SIZE: usize = std::mem::size_of::<libc::timeval>();

const EV_SYN: u16 = 0x00;
const EV_KEY: u16 = 0x01;
const EV_REL: u16 = 0x02;
const EV_ABS: u16 = 0x03;

const NAME_LEN: usize = 256;
// _IOC(_IOC_READ, 'E', 0x06, NAME_LEN)
const EVIOCGNAME: u32 = (2 << 30) | ((NAME_LEN as u32) << 16) | ((b'E' as u32) << 8) | 0x06;

const RECORDS_PER_READ: usize = 64;
const MAX_READS_PER_DRAIN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Sync,
    Key,
    Relative,
    Absolute,
    Other(u16),
}

impl EventKind {
    pub fn from_raw(kind: u16) -> Self {
        match kind {
            EV_SYN => Self::Sync,
            EV_KEY => Self::Key,
            EV_REL => Self::Relative,
            EV_ABS => Self::Absolute,
            other => Self::Other(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    pub kind: EventKind,
    pub code: u16,
    pub value: i32,
}

impl InputEvent {
    pub fn key(code: u16, value: i32) -> Self {
        Self {
            kind: EventKind::Key,
            code,
            value,
        }
    }
}

/// Decodes one native-endian `struct input_event`. Short records yield `None`.
pub fn decode_record(raw: &[u8]) -> Option<InputEvent> {
    if raw.len() < RECORD_SIZE {
        return None;
    }
    let body = &raw[HEADER_SIZE..];
    let kind = u16::from_ne_bytes([body[0], body[1]]);
    let code = u16::from_ne_bytes([body[2], body[3]]);
    let value = i32::from_ne_bytes([body[4], body[5], body[6], body[7]]);
    Some(InputEvent {
        kind: EventKind::from_raw(kind),
        code,
        value,
    })
}

/// One non-blocking event stream.
pub struct InputSource {
    label: String,
    name: Option<String>,
    file: File,
}

impl InputSource {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK | libc::O_CLOEXEC)
            .open(path)?;
        let name = device_name(&file);
        Ok(Self {
            label: path.display().to_string(),
            name,
            file,
        })
    }

    /// Wraps an already-open descriptor. It must be in non-blocking mode.
    pub fn from_file(label: impl Into<String>, file: File) -> Self {
        Self {
            label: label.into(),
            name: None,
            file,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Reads every record currently available and appends the decoded events to `out`.
    ///
    /// Stops at `WouldBlock` or end of stream. Trailing bytes that do not make up a whole
    /// record are dropped.
    pub fn drain(&mut self, out: &mut Vec<InputEvent>) -> io::Result<usize> {
        let mut buf = [0u8; RECORD_SIZE * RECORDS_PER_READ];
        let mut decoded = 0;
        for _ in 0..MAX_READS_PER_DRAIN {
            let n = match self.file.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            };
            let chunks = buf[..n].chunks_exact(RECORD_SIZE);
            if !chunks.remainder().is_empty() {
                tracing::trace!(
                    "{}: dropping {} byte partial record",
                    self.label,
                    chunks.remainder().len()
                );
            }
            for record in chunks {
                if let Some(event) = decode_record(record) {
                    out.push(event);
                    decoded += 1;
                }
            }
        }
        Ok(decoded)
    }
}

impl AsRawFd for InputSource {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

fn device_name(file: &File) -> Option<String> {
    let mut buf = [0u8; NAME_LEN];
    // SAFETY: EVIOCGNAME writes at most NAME_LEN bytes into `buf`.
    let rc = unsafe { libc::ioctl(file.as_raw_fd(), EVIOCGNAME as _, buf.as_mut_ptr()) };
    if rc <= 0 {
        return None;
    }
    let end = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
    let name = String::from_utf8_lossy(&buf[..end]).trim().to_string();
    (!name.is_empty()).then_some(name)
}

/// Anything the event loop can pull key events from.
pub trait EventPump {
    /// Waits a bounded time for input and appends whatever arrived to `out`.
    fn pump(&mut self, out: &mut Vec<InputEvent>);

    fn source_count(&self) -> usize;
}

pub struct InputMultiplexer {
    sources: Vec<InputSource>,
    poll_timeout: Duration,
    idle_sleep: Duration,
}

impl InputMultiplexer {
    pub fn new(sources: Vec<InputSource>, poll_timeout: Duration, idle_sleep: Duration) -> Self {
        Self {
            sources,
            poll_timeout: poll_timeout.max(Duration::from_millis(1)),
            idle_sleep: idle_sleep.max(Duration::from_millis(1)),
        }
    }

    /// Opens `<prefix>0` through `<prefix><max_index>`, skipping any that fail.
    pub fn discover(
        prefix: &str,
        max_index: u32,
        poll_timeout: Duration,
        idle_sleep: Duration,
    ) -> Self {
        let mut sources = Vec::new();
        for index in 0..=max_index {
            let path = PathBuf::from(format!("{prefix}{index}"));
            match InputSource::open(&path) {
                Ok(source) => {
                    tracing::info!(
                        "Input {} ({})",
                        source.label(),
                        source.name().unwrap_or("unnamed")
                    );
                    sources.push(source);
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => tracing::debug!("Skipping {}: {}", path.display(), err),
            }
        }
        if sources.is_empty() {
            tracing::warn!("No input devices under {}0..={}", prefix, max_index);
        }
        Self::new(sources, poll_timeout, idle_sleep)
    }

    pub fn sources(&self) -> &[InputSource] {
        &self.sources
    }

    /// One bounded wait across every source. Returns the number of events appended.
    pub fn poll(&mut self, out: &mut Vec<InputEvent>) -> usize {
        if self.sources.is_empty() {
            thread::sleep(self.idle_sleep);
            return 0;
        }

        let mut fds: Vec<libc::pollfd> = self
            .sources
            .iter()
            .map(|source| libc::pollfd {
                fd: source.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            })
            .collect();
        let timeout = i32::try_from(self.poll_timeout.as_millis()).unwrap_or(i32::MAX);
        // SAFETY: `fds` is a live, correctly sized array of pollfd.
        let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                tracing::warn!("poll failed: {}", err);
                thread::sleep(self.poll_timeout);
            }
            return 0;
        }
        if rc == 0 {
            return 0;
        }

        let mut total = 0;
        for (source, fd) in self.sources.iter_mut().zip(&fds) {
            let revents = fd.revents;
            if revents == 0 {
                continue;
            }
            if revents & libc::POLLIN == 0 {
                tracing::trace!("{}: skipped (revents {:#x})", source.label(), revents);
                continue;
            }
            match source.drain(out) {
                Ok(n) => total += n,
                Err(err) => tracing::debug!("{}: read failed: {}", source.label(), err),
            }
        }
        if total == 0 {
            // only hangups or errors were ready; they stay ready, so don't spin on them
            thread::sleep(self.poll_timeout);
        }
        total
    }
}

impl EventPump for InputMultiplexer {
    fn pump(&mut self, out: &mut Vec<InputEvent>) {
        self.poll(out);
    }

    fn source_count(&self) -> usize {
        self.sources.len()
    }
}
