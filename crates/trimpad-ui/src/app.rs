use std::{
    ops::{Deref, DerefMut},
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use trimpad_process::ProcessManager;

use crate::config::UiConfig;
use crate::cue::CueDispatcher;
use crate::display::{Access, Framebuffer};
use crate::input::{EventKind, EventPump, InputEvent, InputMultiplexer};
use crate::keymap::{Keymap, LogicalButton};
use crate::screen::{Palette, Screen};
use crate::session::Session;
use crate::state::{ButtonState, Transition};
use crate::surface::Surface;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    MenuPressed,
    /// No input device was found and the configured wait ran out
    IdleTimeout,
}

pub struct App {
    keymap: Keymap,
    screen: Screen,
    cue: CueDispatcher,
    idle_timeout: Option<Duration>,
    state: ButtonState,
}

impl App {
    pub fn new(
        keymap: Keymap,
        screen: Screen,
        cue: CueDispatcher,
        idle_timeout: Option<Duration>,
    ) -> Self {
        Self {
            keymap,
            screen,
            cue,
            idle_timeout,
            state: ButtonState::new(),
        }
    }

    pub fn state(&self) -> &ButtonState {
        &self.state
    }

    pub fn into_cue(self) -> CueDispatcher {
        self.cue
    }

    /// Draws the first frame, then polls and redraws until MENU or the idle timeout.
    pub fn run<B, E>(&mut self, surface: &mut Surface<B>, events: &mut E) -> ExitReason
    where
        B: Deref<Target = [u8]> + DerefMut,
        E: EventPump,
    {
        self.screen.draw_full(surface, &self.state.status_text());
        self.state.take_dirty();

        let started = Instant::now();
        let mut batch = Vec::new();
        loop {
            if events.source_count() == 0 {
                if let Some(limit) = self.idle_timeout {
                    if started.elapsed() >= limit {
                        tracing::info!("No input devices after {:?}; exiting", limit);
                        return ExitReason::IdleTimeout;
                    }
                }
            }

            events.pump(&mut batch);
            for event in batch.drain(..) {
                if self.handle(event) {
                    return ExitReason::MenuPressed;
                }
            }

            if self.state.take_dirty() {
                self.screen.draw_status(surface, &self.state.status_text());
            }
        }
    }

    /// Feeds one event through the keymap and tracker. Returns true on MENU press.
    fn handle(&mut self, event: InputEvent) -> bool {
        match event.kind {
            EventKind::Key => {
                let button = self.keymap.lookup(event.code);
                let transition = self.state.apply(button, event.code, event.value);
                if button == LogicalButton::Menu && event.value == 1 {
                    tracing::info!("MENU pressed; exiting");
                    return true;
                }
                if transition == Transition::Changed {
                    tracing::debug!(
                        "{} {} (code:{})",
                        button.label(),
                        if event.value == 1 { "down" } else { "up" },
                        event.code
                    );
                    if event.value == 1 {
                        self.cue.notify(button);
                    }
                }
            }
            EventKind::Absolute | EventKind::Relative => {
                tracing::trace!(
                    "{:?} code {} value {}",
                    event.kind,
                    event.code,
                    event.value
                );
            }
            EventKind::Sync | EventKind::Other(_) => {}
        }
        false
    }
}

/// Takes over the display, runs the tester and hands everything back.
pub fn run(config: &UiConfig) -> Result<ExitReason> {
    let keymap = match Keymap::builtin(&config.keymap.platform) {
        Some(keymap) => keymap,
        None => {
            tracing::warn!(
                "Unknown platform {:?} (known: {}); using {}",
                config.keymap.platform,
                Keymap::platforms().join(", "),
                Keymap::default().platform()
            );
            Keymap::default()
        }
    }
    .with_overrides(&config.keymap.overrides);
    tracing::info!("Keymap {} with {} codes", keymap.platform(), keymap.len());

    let screen = Screen::new(Palette::from_scheme(&config.colors));
    let cue = CueDispatcher::from_config(&config.cue).unwrap_or_else(|err| {
        tracing::warn!("Press cue disabled: {:#}", err);
        CueDispatcher::disabled()
    });

    let framebuffer = Framebuffer::acquire(&config.display.device, config.display.exclusive)
        .with_context(|| format!("acquiring display {}", config.display.device.display()))?;
    if framebuffer.access() == Access::Shared && config.display.exclusive {
        tracing::warn!("{} is shared with another process; expect flicker", framebuffer.id());
    }
    let mut session = Session::begin(
        framebuffer,
        ProcessManager::new(),
        config.session.suspend.clone(),
        config.session.suppress_signals,
    );
    let mut input = InputMultiplexer::discover(
        &config.input.device_prefix,
        config.input.max_index,
        config.input.poll_timeout(),
        config.input.idle_sleep(),
    );

    let mut app = App::new(keymap, screen, cue, config.input.idle_timeout());
    let reason = app.run(session.display_mut().surface_mut(), &mut input);

    drop(input);
    drop(session);
    app.into_cue().shutdown();
    tracing::info!("Exited: {:?}", reason);
    Ok(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cue::CueSink;
    use crate::surface::{Geometry, PixelFormat};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::thread;

    struct ScriptedPump {
        batches: VecDeque<Vec<InputEvent>>,
        sources: usize,
        pumps: usize,
    }

    impl ScriptedPump {
        fn new(sources: usize, batches: Vec<Vec<InputEvent>>) -> Self {
            Self {
                batches: batches.into(),
                sources,
                pumps: 0,
            }
        }
    }

    impl EventPump for ScriptedPump {
        fn pump(&mut self, out: &mut Vec<InputEvent>) {
            self.pumps += 1;
            assert!(self.pumps < 10_000, "loop never exited");
            match self.batches.pop_front() {
                Some(batch) => out.extend(batch),
                None => thread::sleep(Duration::from_millis(5)),
            }
        }

        fn source_count(&self) -> usize {
            self.sources
        }
    }

    struct Recording(Arc<Mutex<Vec<LogicalButton>>>);

    impl CueSink for Recording {
        fn acknowledge(&mut self, button: LogicalButton) -> Result<()> {
            self.0.lock().unwrap().push(button);
            Ok(())
        }
    }

    fn key(code: u16, value: i32) -> InputEvent {
        InputEvent::key(code, value)
    }

    fn surface() -> Surface<Vec<u8>> {
        let geometry = Geometry::packed(320, 240, PixelFormat::Rgb565);
        Surface::new(geometry, vec![0; geometry.visible_len()]).unwrap()
    }

    fn app(idle_timeout: Option<Duration>) -> App {
        App::new(
            Keymap::default(),
            Screen::new(Palette::default()),
            CueDispatcher::disabled(),
            idle_timeout,
        )
    }

    #[test]
    fn press_release_then_menu_leaves_the_idle_text_on_screen() {
        let mut app = app(None);
        let mut s = surface();
        let mut pump = ScriptedPump::new(
            1,
            vec![vec![key(103, 1)], vec![key(103, 0)], vec![key(1, 1), key(57, 1)]],
        );
        assert_eq!(app.run(&mut s, &mut pump), ExitReason::MenuPressed);
        assert_eq!(pump.pumps, 3);

        let mut expected = surface();
        Screen::new(Palette::default()).draw_full(&mut expected, "No button pressed");
        assert_eq!(s.bytes(), expected.bytes());

        // MENU was applied, the A behind it never was
        assert_eq!(app.state().displayed(), Some((LogicalButton::Menu, 1)));
        assert_eq!(app.state().held(), &[(LogicalButton::Menu, 1)]);
    }

    #[test]
    fn held_press_is_what_the_screen_shows() {
        let mut app = app(None);
        let mut s = surface();
        let mut pump = ScriptedPump::new(1, vec![vec![key(103, 1)], vec![key(1, 1)]]);
        app.run(&mut s, &mut pump);

        let mut expected = surface();
        Screen::new(Palette::default()).draw_full(&mut expected, "UP (code:103)");
        assert_eq!(s.bytes(), expected.bytes());
    }

    #[test]
    fn menu_ends_the_loop_exactly_once() {
        let mut app = app(None);
        let mut s = surface();
        let mut pump = ScriptedPump::new(
            2,
            vec![
                vec![key(1, 1), key(29, 1), key(1, 0), key(1, 1)],
                vec![key(1, 1)],
            ],
        );
        assert_eq!(app.run(&mut s, &mut pump), ExitReason::MenuPressed);
        assert_eq!(pump.pumps, 1);
        assert_eq!(pump.batches.len(), 1);
    }

    #[test]
    fn telemetry_and_unknown_keys_do_not_touch_state() {
        let mut app = app(None);
        let mut s = surface();
        let abs = InputEvent {
            kind: EventKind::Absolute,
            code: 0,
            value: 512,
        };
        let rel = InputEvent {
            kind: EventKind::Relative,
            code: 1,
            value: -3,
        };
        let mut pump = ScriptedPump::new(1, vec![vec![abs, rel, key(9999, 1)], vec![key(1, 1)]]);
        app.run(&mut s, &mut pump);
        assert_eq!(app.state().held(), &[(LogicalButton::Menu, 1)]);
    }

    #[test]
    fn idle_timeout_only_applies_without_sources() {
        let mut app = app(Some(Duration::from_millis(30)));
        let mut s = surface();
        let mut pump = ScriptedPump::new(0, Vec::new());
        let started = Instant::now();
        assert_eq!(app.run(&mut s, &mut pump), ExitReason::IdleTimeout);
        assert!(started.elapsed() >= Duration::from_millis(30));
        // each empty pump waited, so the loop could not spin
        assert!(pump.pumps <= 8, "pumped {} times", pump.pumps);

        let mut app = self::app(Some(Duration::ZERO));
        let mut batches = vec![Vec::new(); 5];
        batches.push(vec![key(1, 1)]);
        let mut pump = ScriptedPump::new(1, batches);
        assert_eq!(app.run(&mut s, &mut pump), ExitReason::MenuPressed);
    }

    #[test]
    fn cues_fire_on_state_changing_presses_only() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let cue = CueDispatcher::spawn(Recording(seen.clone()), 16).unwrap();
        let mut app = App::new(Keymap::default(), Screen::new(Palette::default()), cue, None);
        let mut s = surface();
        let mut pump = ScriptedPump::new(
            1,
            vec![
                vec![key(103, 1), key(103, 1), key(103, 2)],
                vec![key(108, 1), key(103, 0), key(108, 0)],
                vec![key(1, 1)],
            ],
        );
        app.run(&mut s, &mut pump);
        app.into_cue().shutdown();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![LogicalButton::Up, LogicalButton::Down]
        );
    }
}
