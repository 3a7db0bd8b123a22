//! Ownership of the screen for the lifetime of the tester.
//!
//! A [`Session`] pauses whatever normally draws on the panel, optionally ignores the usual
//! termination signals, and puts everything back when it is dropped: launchers resumed,
//! signal dispositions restored, then the display released. Drop runs on every exit path
//! including unwinding, so there is no separate teardown call to forget.

use trimpad_process::ProcessControl;

pub const SUPPRESSED_SIGNALS: [libc::c_int; 5] = [
    libc::SIGINT,
    libc::SIGTERM,
    libc::SIGHUP,
    libc::SIGQUIT,
    libc::SIGTSTP,
];

pub struct Session<D, P: ProcessControl> {
    processes: P,
    targets: Vec<String>,
    // dropped in this order after Drop::drop has resumed the targets
    signals: Option<SignalGuard>,
    display: D,
}

impl<D, P: ProcessControl> Session<D, P> {
    /// Takes over from `targets`. `display` must already be acquired.
    ///
    /// Signals are ignored before anything is paused, so a stray SIGTERM can no longer
    /// leave a launcher stopped with nobody left to resume it.
    pub fn begin(display: D, processes: P, targets: Vec<String>, suppress_signals: bool) -> Self {
        let signals = suppress_signals.then(|| SignalGuard::ignore(&SUPPRESSED_SIGNALS));
        for name in &targets {
            match processes.pause(name) {
                Ok(0) => tracing::debug!("No running {} to pause", name),
                Ok(count) => tracing::info!("Paused {} ({} process(es))", name, count),
                Err(err) => tracing::warn!("Failed to pause {}: {}", name, err),
            }
        }
        Self {
            processes,
            targets,
            signals,
            display,
        }
    }

    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }

    pub fn signals_suppressed(&self) -> bool {
        self.signals.is_some()
    }
}

impl<D, P: ProcessControl> Drop for Session<D, P> {
    fn drop(&mut self) {
        for name in &self.targets {
            match self.processes.resume(name) {
                Ok(0) => {}
                Ok(count) => tracing::info!("Resumed {} ({} process(es))", name, count),
                Err(err) => tracing::warn!("Failed to resume {}: {}", name, err),
            }
        }
    }
}

/// Ignores a set of signals until dropped, then restores what was there before.
pub struct SignalGuard {
    previous: Vec<(libc::c_int, libc::sighandler_t)>,
}

impl SignalGuard {
    pub fn ignore(signals: &[libc::c_int]) -> Self {
        let mut previous = Vec::with_capacity(signals.len());
        for &signal in signals {
            // SAFETY: SIG_IGN installs no handler code.
            let old = unsafe { libc::signal(signal, libc::SIG_IGN) };
            if old == libc::SIG_ERR {
                tracing::warn!("Could not ignore signal {}", signal);
                continue;
            }
            previous.push((signal, old));
        }
        Self { previous }
    }
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        for &(signal, handler) in self.previous.iter().rev() {
            // SAFETY: `handler` is the disposition the kernel reported for this signal.
            unsafe {
                libc::signal(signal, handler);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::{Mutex, MutexGuard};
    use trimpad_process::ProcessError;

    // signal dispositions are process-wide; tests that touch them take this first
    static SIGNALS: Mutex<()> = Mutex::new(());

    fn lock_signals() -> MutexGuard<'static, ()> {
        SIGNALS.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    type Log = Rc<RefCell<Vec<String>>>;

    struct FakeDisplay(Log);

    impl Drop for FakeDisplay {
        fn drop(&mut self) {
            self.0.borrow_mut().push("release display".into());
        }
    }

    struct FakeProcesses {
        log: Log,
        broken: &'static str,
    }

    impl ProcessControl for FakeProcesses {
        fn pause(&self, name: &str) -> trimpad_process::Result<usize> {
            self.log.borrow_mut().push(format!("pause {name}"));
            if name == self.broken {
                return Err(ProcessError::InvalidName(name.into()));
            }
            Ok(1)
        }

        fn resume(&self, name: &str) -> trimpad_process::Result<usize> {
            self.log.borrow_mut().push(format!("resume {name}"));
            if name == self.broken {
                return Err(ProcessError::InvalidName(name.into()));
            }
            Ok(1)
        }
    }

    fn session(log: &Log, broken: &'static str) -> Session<FakeDisplay, FakeProcesses> {
        Session::begin(
            FakeDisplay(log.clone()),
            FakeProcesses {
                log: log.clone(),
                broken,
            },
            vec!["MainUI".into(), "launcher".into()],
            false,
        )
    }

    #[test]
    fn resumes_before_releasing_the_display() {
        let log: Log = Rc::default();
        let session = session(&log, "");
        assert_eq!(*log.borrow(), vec!["pause MainUI", "pause launcher"]);
        drop(session);
        assert_eq!(
            *log.borrow(),
            vec![
                "pause MainUI",
                "pause launcher",
                "resume MainUI",
                "resume launcher",
                "release display",
            ]
        );
    }

    #[test]
    fn failures_never_stop_teardown() {
        let log: Log = Rc::default();
        let session = session(&log, "MainUI");
        drop(session);
        let log = log.borrow();
        assert!(log.contains(&"resume launcher".to_string()));
        assert_eq!(log.last().map(String::as_str), Some("release display"));
    }

    #[test]
    fn unwinding_still_tears_down() {
        let log: Log = Rc::default();
        let inner = log.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _session = session(&inner, "");
            panic!("render failed");
        }));
        assert!(result.is_err());
        assert_eq!(log.borrow().last().map(String::as_str), Some("release display"));
        assert_eq!(log.borrow().iter().filter(|e| e.starts_with("resume")).count(), 2);
    }

    fn disposition(signal: libc::c_int) -> libc::sighandler_t {
        // SAFETY: a null `act` only queries; `old` is a valid out-pointer.
        unsafe {
            let mut old: libc::sigaction = std::mem::zeroed();
            libc::sigaction(signal, std::ptr::null(), &mut old);
            old.sa_sigaction
        }
    }

    #[test]
    fn signal_guard_restores_previous_dispositions() {
        let _signals = lock_signals();
        let before = disposition(libc::SIGHUP);
        {
            let _guard = SignalGuard::ignore(&[libc::SIGHUP]);
            assert_eq!(disposition(libc::SIGHUP), libc::SIG_IGN);
        }
        assert_eq!(disposition(libc::SIGHUP), before);
    }

    /// Records whether SIGTERM was ignored at the moment each call arrived.
    struct WatchingProcesses(Log);

    impl ProcessControl for WatchingProcesses {
        fn pause(&self, name: &str) -> trimpad_process::Result<usize> {
            let ignored = disposition(libc::SIGTERM) == libc::SIG_IGN;
            self.0.borrow_mut().push(format!("pause {name} ignored={ignored}"));
            Ok(1)
        }

        fn resume(&self, name: &str) -> trimpad_process::Result<usize> {
            let ignored = disposition(libc::SIGTERM) == libc::SIG_IGN;
            self.0.borrow_mut().push(format!("resume {name} ignored={ignored}"));
            Ok(1)
        }
    }

    #[test]
    fn launchers_are_only_stopped_while_signals_are_ignored() {
        let _signals = lock_signals();
        let before = disposition(libc::SIGTERM);
        let log: Log = Rc::default();
        let session = Session::begin(
            FakeDisplay(log.clone()),
            WatchingProcesses(log.clone()),
            vec!["MainUI".into()],
            true,
        );
        assert!(session.signals_suppressed());
        assert_eq!(disposition(libc::SIGTERM), libc::SIG_IGN);
        drop(session);

        assert_eq!(
            *log.borrow(),
            vec![
                "pause MainUI ignored=true",
                "resume MainUI ignored=true",
                "release display",
            ]
        );
        assert_eq!(disposition(libc::SIGTERM), before);
    }
}
