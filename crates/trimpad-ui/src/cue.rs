//! Press acknowledgment, handed to a worker thread so the render path never waits on it.

use std::{
    fs,
    path::PathBuf,
    sync::mpsc::{self, Receiver, SyncSender, TrySendError},
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{Context, Result};

use crate::config::{CueConfig, CueKind};
use crate::keymap::LogicalButton;

pub trait CueSink: Send + 'static {
    fn acknowledge(&mut self, button: LogicalButton) -> Result<()>;
}

/// Records the press in the log and nothing else.
pub struct LogCue;

impl CueSink for LogCue {
    fn acknowledge(&mut self, button: LogicalButton) -> Result<()> {
        tracing::trace!("cue {}", button.label());
        Ok(())
    }
}

/// Writes `on`, waits, writes `off`. Meant for a rumble motor or LED exposed through sysfs.
pub struct SysfsPulse {
    path: PathBuf,
    on: String,
    off: String,
    pulse: Duration,
}

impl SysfsPulse {
    pub fn new(path: impl Into<PathBuf>, on: &str, off: &str, pulse: Duration) -> Self {
        Self {
            path: path.into(),
            on: on.to_string(),
            off: off.to_string(),
            pulse,
        }
    }
}

impl CueSink for SysfsPulse {
    fn acknowledge(&mut self, _button: LogicalButton) -> Result<()> {
        fs::write(&self.path, &self.on)
            .with_context(|| format!("writing {}", self.path.display()))?;
        thread::sleep(self.pulse);
        fs::write(&self.path, &self.off)
            .with_context(|| format!("writing {}", self.path.display()))?;
        Ok(())
    }
}

pub struct CueDispatcher {
    tx: Option<SyncSender<LogicalButton>>,
    worker: Option<JoinHandle<()>>,
}

impl CueDispatcher {
    pub fn spawn<S: CueSink>(sink: S, queue: usize) -> Result<Self> {
        let (tx, rx) = mpsc::sync_channel(queue.max(1));
        let worker = thread::Builder::new()
            .name("trimpad-cue".to_string())
            .spawn(move || run_worker(sink, rx))
            .context("spawning cue worker thread")?;
        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
        })
    }

    pub fn from_config(cfg: &CueConfig) -> Result<Self> {
        match (cfg.kind, cfg.path.as_ref()) {
            (CueKind::Sysfs, Some(path)) => {
                tracing::info!("Press cue: pulse {} for {} ms", path.display(), cfg.pulse_ms);
                let sink = SysfsPulse::new(
                    path,
                    &cfg.on,
                    &cfg.off,
                    Duration::from_millis(cfg.pulse_ms),
                );
                Self::spawn(sink, cfg.queue)
            }
            (CueKind::Sysfs, None) => {
                tracing::warn!("sysfs cue configured without a path; logging presses instead");
                Self::spawn(LogCue, cfg.queue)
            }
            (CueKind::Log, _) => Self::spawn(LogCue, cfg.queue),
        }
    }

    /// A dispatcher that drops every cue.
    pub fn disabled() -> Self {
        Self {
            tx: None,
            worker: None,
        }
    }

    /// Queues a cue without blocking. Returns false if it was dropped.
    pub fn notify(&self, button: LogicalButton) -> bool {
        let Some(tx) = self.tx.as_ref() else {
            return false;
        };
        match tx.try_send(button) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::trace!("cue queue full; dropping {}", button.label());
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Closes the queue and waits for cues already queued to finish.
    pub fn shutdown(mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("cue worker panicked");
            }
        }
    }
}

impl Drop for CueDispatcher {
    fn drop(&mut self) {
        // closing the channel is enough; the worker exits once it drains
        self.tx.take();
    }
}

fn run_worker<S: CueSink>(mut sink: S, rx: Receiver<LogicalButton>) {
    for button in rx {
        if let Err(err) = sink.acknowledge(button) {
            tracing::debug!("cue failed: {:#}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recording(Arc<Mutex<Vec<LogicalButton>>>);

    impl CueSink for Recording {
        fn acknowledge(&mut self, button: LogicalButton) -> Result<()> {
            self.0.lock().unwrap().push(button);
            Ok(())
        }
    }

    struct Gated {
        started: mpsc::Sender<()>,
        gate: Receiver<()>,
    }

    impl CueSink for Gated {
        fn acknowledge(&mut self, _button: LogicalButton) -> Result<()> {
            let _ = self.started.send(());
            let _ = self.gate.recv();
            Ok(())
        }
    }

    #[test]
    fn delivers_in_order_and_flushes_on_shutdown() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let cue = CueDispatcher::spawn(Recording(seen.clone()), 8).unwrap();
        assert!(cue.notify(LogicalButton::Up));
        assert!(cue.notify(LogicalButton::A));
        cue.shutdown();
        assert_eq!(*seen.lock().unwrap(), vec![LogicalButton::Up, LogicalButton::A]);
    }

    #[test]
    fn full_queue_drops_instead_of_blocking() {
        let (started_tx, started_rx) = mpsc::channel();
        let (gate_tx, gate_rx) = mpsc::channel();
        let cue = CueDispatcher::spawn(
            Gated {
                started: started_tx,
                gate: gate_rx,
            },
            1,
        )
        .unwrap();

        assert!(cue.notify(LogicalButton::Up));
        // worker is now parked inside acknowledge
        started_rx.recv().unwrap();
        assert!(cue.notify(LogicalButton::Down));
        assert!(!cue.notify(LogicalButton::Left));

        gate_tx.send(()).unwrap();
        gate_tx.send(()).unwrap();
        cue.shutdown();
    }

    #[test]
    fn disabled_dispatcher_drops_everything() {
        let cue = CueDispatcher::disabled();
        assert!(!cue.notify(LogicalButton::Start));
        cue.shutdown();
    }

    #[test]
    fn sysfs_pulse_ends_in_the_off_state() {
        let dir = tempfile::TempDir::new().unwrap();
        let node = dir.path().join("rumble");
        let mut pulse = SysfsPulse::new(&node, "1", "0", Duration::from_millis(1));
        pulse.acknowledge(LogicalButton::B).unwrap();
        assert_eq!(fs::read_to_string(&node).unwrap(), "0");

        let mut broken = SysfsPulse::new(dir.path().join("missing/node"), "1", "0", Duration::ZERO);
        assert!(broken.acknowledge(LogicalButton::B).is_err());
    }

    #[test]
    fn sysfs_without_path_still_spawns() {
        let cfg = CueConfig {
            kind: CueKind::Sysfs,
            path: None,
            ..CueConfig::default()
        };
        let cue = CueDispatcher::from_config(&cfg).unwrap();
        assert!(cue.notify(LogicalButton::X));
        cue.shutdown();
    }
}
