use crate::keymap::LogicalButton;

pub const IDLE_TEXT: &str = "No button pressed";

/// What a single key event did to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Unknown button, autorepeat or an unexpected value
    Ignored,
    /// Well-formed but redundant
    Unchanged,
    Changed,
}

/// Which button the screen shows, plus every press still waiting for its release.
#[derive(Debug, Clone)]
pub struct ButtonState {
    button: Option<LogicalButton>,
    code: u16,
    pressed: bool,
    dirty: bool,
    held: Vec<(LogicalButton, u16)>,
}

impl Default for ButtonState {
    fn default() -> Self {
        Self::new()
    }
}

impl ButtonState {
    /// Starts dirty so the first frame gets drawn.
    pub fn new() -> Self {
        Self {
            button: None,
            code: 0,
            pressed: false,
            dirty: true,
            held: Vec::new(),
        }
    }

    pub fn apply(&mut self, button: LogicalButton, code: u16, value: i32) -> Transition {
        if button == LogicalButton::Unknown {
            return Transition::Ignored;
        }
        match value {
            1 => self.press(button, code),
            0 => self.release(button),
            _ => Transition::Ignored,
        }
    }

    fn press(&mut self, button: LogicalButton, code: u16) -> Transition {
        if self.displayed() == Some((button, code)) {
            return Transition::Unchanged;
        }
        // aliased sources report the same button under more than one code
        self.held.retain(|(held, _)| *held != button);
        self.held.push((button, code));
        self.show(button, code, true);
        Transition::Changed
    }

    fn release(&mut self, button: LogicalButton) -> Transition {
        let displayed = self.pressed && self.button == Some(button);
        self.held.retain(|(held, _)| *held != button);
        if !displayed {
            return Transition::Unchanged;
        }
        match self.held.last().copied() {
            Some((older, code)) => self.show(older, code, true),
            None => self.show(button, self.code, false),
        }
        Transition::Changed
    }

    fn show(&mut self, button: LogicalButton, code: u16, pressed: bool) {
        self.button = Some(button);
        self.code = code;
        self.pressed = pressed;
        self.dirty = true;
    }

    /// The button on screen and its raw code, if one is held.
    pub fn displayed(&self) -> Option<(LogicalButton, u16)> {
        match self.button {
            Some(button) if self.pressed => Some((button, self.code)),
            _ => None,
        }
    }

    /// Last button seen, pressed or not.
    pub fn last_button(&self) -> Option<LogicalButton> {
        self.button
    }

    pub fn held(&self) -> &[(LogicalButton, u16)] {
        &self.held
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Clears the dirty flag, returning whether it was set.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }

    pub fn status_text(&self) -> String {
        match self.displayed() {
            Some((button, code)) => format!("{} (code:{})", button.label(), code),
            None => IDLE_TEXT.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LogicalButton::*;

    fn settled() -> ButtonState {
        let mut state = ButtonState::new();
        assert!(state.take_dirty());
        state
    }

    #[test]
    fn press_then_release_round_trips_the_text() {
        let mut state = settled();
        assert_eq!(state.status_text(), IDLE_TEXT);
        assert_eq!(state.apply(Up, 103, 1), Transition::Changed);
        assert_eq!(state.status_text(), "UP (code:103)");
        assert_eq!(state.apply(Up, 103, 0), Transition::Changed);
        assert_eq!(state.status_text(), IDLE_TEXT);
        assert_eq!(state.last_button(), Some(Up));
    }

    #[test]
    fn replayed_press_sets_dirty_once() {
        let mut state = settled();
        state.apply(A, 57, 1);
        assert!(state.take_dirty());
        assert_eq!(state.apply(A, 57, 1), Transition::Unchanged);
        assert!(!state.is_dirty());
    }

    #[test]
    fn releasing_another_button_keeps_the_display() {
        let mut state = settled();
        state.apply(B, 29, 1);
        state.take_dirty();
        assert_eq!(state.apply(X, 42, 0), Transition::Unchanged);
        assert_eq!(state.displayed(), Some((B, 29)));
        assert!(!state.is_dirty());
    }

    #[test]
    fn releasing_the_newest_press_falls_back_to_an_older_one() {
        let mut state = settled();
        state.apply(L, 18, 1);
        state.apply(R, 20, 1);
        assert_eq!(state.displayed(), Some((R, 20)));
        state.apply(R, 20, 0);
        assert_eq!(state.displayed(), Some((L, 18)));

        // an older press released underneath does not disturb the display
        state.apply(Start, 28, 1);
        assert_eq!(state.apply(L, 18, 0), Transition::Unchanged);
        assert_eq!(state.displayed(), Some((Start, 28)));
        state.apply(Start, 28, 0);
        assert_eq!(state.displayed(), None);
    }

    #[test]
    fn autorepeat_unknown_and_odd_values_are_ignored() {
        let mut state = settled();
        state.apply(Up, 103, 1);
        state.take_dirty();
        assert_eq!(state.apply(Up, 103, 2), Transition::Ignored);
        assert_eq!(state.apply(Unknown, 999, 1), Transition::Ignored);
        assert_eq!(state.apply(Down, 108, -1), Transition::Ignored);
        assert_eq!(state.displayed(), Some((Up, 103)));
        assert!(!state.is_dirty());
    }

    #[test]
    fn aliased_codes_for_one_button_share_a_slot() {
        let mut state = settled();
        state.apply(A, 57, 1);
        assert_eq!(state.apply(A, 304, 1), Transition::Changed);
        assert_eq!(state.held(), &[(A, 304)]);
        // the release from either source lets go of the button
        state.apply(A, 57, 0);
        assert_eq!(state.displayed(), None);
        assert!(state.held().is_empty());
    }

    #[test]
    fn displayed_button_is_always_the_newest_unreleased_press() {
        let script = [
            (Up, 103, 1),
            (Down, 108, 1),
            (Left, 105, 1),
            (Down, 108, 0),
            (Left, 105, 2),
            (Left, 105, 0),
            (Right, 106, 1),
            (Up, 103, 0),
            (Right, 106, 0),
        ];
        let mut state = ButtonState::new();
        let mut model: Vec<(LogicalButton, u16)> = Vec::new();
        for (button, code, value) in script {
            state.apply(button, code, value);
            match value {
                1 => {
                    model.retain(|(b, _)| *b != button);
                    model.push((button, code));
                }
                0 => model.retain(|(b, _)| *b != button),
                _ => {}
            }
            assert_eq!(state.displayed(), model.last().copied());
        }
    }
}
