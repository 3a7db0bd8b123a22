use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PLATFORM: &str = "trimui";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalButton {
    Up,
    Down,
    Left,
    Right,
    A,
    B,
    X,
    Y,
    L,
    R,
    Start,
    Select,
    Menu,
    Unknown,
}

impl LogicalButton {
    pub const ALL: [LogicalButton; 14] = [
        Self::Up,
        Self::Down,
        Self::Left,
        Self::Right,
        Self::A,
        Self::B,
        Self::X,
        Self::Y,
        Self::L,
        Self::R,
        Self::Start,
        Self::Select,
        Self::Menu,
        Self::Unknown,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Up => "UP",
            Self::Down => "DOWN",
            Self::Left => "LEFT",
            Self::Right => "RIGHT",
            Self::A => "A",
            Self::B => "B",
            Self::X => "X",
            Self::Y => "Y",
            Self::L => "L",
            Self::R => "R",
            Self::Start => "START",
            Self::Select => "SELECT",
            Self::Menu => "MENU",
            Self::Unknown => "UNKNOWN",
        }
    }
}

// TrimUI keypad driver reports keyboard codes
const TRIMUI: &[(u16, LogicalButton)] = &[
    (103, LogicalButton::Up),
    (108, LogicalButton::Down),
    (105, LogicalButton::Left),
    (106, LogicalButton::Right),
    (57, LogicalButton::A),
    (29, LogicalButton::B),
    (42, LogicalButton::X),
    (56, LogicalButton::Y),
    (18, LogicalButton::L),
    (20, LogicalButton::R),
    (28, LogicalButton::Start),
    (97, LogicalButton::Select),
    (1, LogicalButton::Menu),
];

// BTN_* gamepad codes with BTN_DPAD_* for the cross
const GAMEPAD: &[(u16, LogicalButton)] = &[
    (304, LogicalButton::A),
    (305, LogicalButton::B),
    (307, LogicalButton::X),
    (308, LogicalButton::Y),
    (310, LogicalButton::L),
    (311, LogicalButton::R),
    (314, LogicalButton::Select),
    (315, LogicalButton::Start),
    (316, LogicalButton::Menu),
    (544, LogicalButton::Up),
    (545, LogicalButton::Down),
    (546, LogicalButton::Left),
    (547, LogicalButton::Right),
];

/// Raw key code to logical button, fixed once the loop starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keymap {
    platform: String,
    codes: BTreeMap<u16, LogicalButton>,
}

impl Keymap {
    pub fn platforms() -> &'static [&'static str] {
        &["trimui", "gamepad"]
    }

    /// Built-in table for `platform`, or `None` if we don't know it.
    pub fn builtin(platform: &str) -> Option<Self> {
        let table = match platform.trim().to_ascii_lowercase().as_str() {
            "trimui" => TRIMUI,
            "gamepad" => GAMEPAD,
            _ => return None,
        };
        Some(Self::from_entries(platform.trim(), table.iter().copied()))
    }

    pub fn from_entries(
        platform: impl Into<String>,
        entries: impl IntoIterator<Item = (u16, LogicalButton)>,
    ) -> Self {
        Self {
            platform: platform.into(),
            codes: entries.into_iter().collect(),
        }
    }

    /// Per-code overrides win over the built-in entries.
    pub fn with_overrides(mut self, overrides: &BTreeMap<u16, LogicalButton>) -> Self {
        for (code, button) in overrides {
            self.codes.insert(*code, *button);
        }
        self
    }

    pub fn lookup(&self, code: u16) -> LogicalButton {
        self.codes
            .get(&code)
            .copied()
            .unwrap_or(LogicalButton::Unknown)
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

impl Default for Keymap {
    fn default() -> Self {
        Self::from_entries(DEFAULT_PLATFORM, TRIMUI.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trimui_table_covers_every_button_once() {
        let map = Keymap::builtin("trimui").unwrap();
        assert_eq!(map.lookup(103), LogicalButton::Up);
        assert_eq!(map.lookup(1), LogicalButton::Menu);
        assert_eq!(map.lookup(9999), LogicalButton::Unknown);

        let mut seen: Vec<_> = TRIMUI.iter().map(|(_, b)| *b).collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), LogicalButton::ALL.len() - 1);
    }

    #[test]
    fn platform_names_are_case_insensitive() {
        let map = Keymap::builtin(" GamePad ").unwrap();
        assert_eq!(map.lookup(316), LogicalButton::Menu);
        assert_eq!(map.lookup(544), LogicalButton::Up);
        assert!(Keymap::builtin("nintendo").is_none());
    }

    #[test]
    fn overrides_replace_and_extend() {
        let mut overrides = BTreeMap::new();
        overrides.insert(103, LogicalButton::Down);
        overrides.insert(400, LogicalButton::Start);
        let map = Keymap::default().with_overrides(&overrides);
        assert_eq!(map.lookup(103), LogicalButton::Down);
        assert_eq!(map.lookup(400), LogicalButton::Start);
        assert_eq!(map.lookup(108), LogicalButton::Down);
    }

    #[test]
    fn labels_match_serde_names() {
        for button in LogicalButton::ALL {
            let json = serde_json::to_string(&button).unwrap();
            assert_eq!(json, format!("\"{}\"", button.label()));
        }
    }
}
