use std::{
    collections::BTreeMap,
    env, fs,
    io::Write,
    path::{Path, PathBuf},
    process,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::display::DEFAULT_FB_DEVICE;
use crate::input::{DEFAULT_DEVICE_PREFIX, DEFAULT_MAX_INDEX};
use crate::keymap::{LogicalButton, DEFAULT_PLATFORM};

pub const DEFAULT_ROOT_PATH: &str = "/mnt/SDCARD/.trimpad";
pub const CONFIG_FILENAME: &str = "trimpad.json";
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 1;
pub const DEFAULT_IDLE_SLEEP_MS: u64 = 100;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_CUE_PULSE_MS: u64 = 40;
pub const DEFAULT_CUE_QUEUE: usize = 8;

/// Root directory holding `config/` and `logs/`.
pub fn root_from_env() -> PathBuf {
    env::var("TRIMPAD_ROOT")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ROOT_PATH))
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join("config").join(CONFIG_FILENAME)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UiConfig {
    #[serde(default)]
    pub display: DisplaySettings,
    #[serde(default)]
    pub input: InputSettings,
    #[serde(default)]
    pub keymap: KeymapSettings,
    #[serde(default)]
    pub colors: ColorScheme,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub cue: CueConfig,
}

impl UiConfig {
    /// Reads `<root>/config/trimpad.json`, writing the defaults there first if it is missing.
    pub fn load(root: &Path) -> Result<Self> {
        let path = config_path(root);
        if !path.exists() {
            let default = UiConfig::default();
            default.save(&path)?;
            return Ok(default);
        }
        let contents =
            fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating config directory {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(CONFIG_FILENAME);
        let now_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|dur| dur.as_nanos())
            .unwrap_or(0);
        let mut tmp = path.to_path_buf();
        tmp.set_file_name(format!(".{filename}.tmp.{}.{}", process::id(), now_ns));

        let mut file = fs::File::create(&tmp)
            .with_context(|| format!("creating temp config {}", tmp.display()))?;
        file.write_all(json.as_bytes())
            .and_then(|_| file.write_all(b"\n"))
            .with_context(|| format!("writing temp config {}", tmp.display()))?;
        file.sync_all()
            .with_context(|| format!("syncing temp config {}", tmp.display()))?;
        drop(file);

        fs::rename(&tmp, path).with_context(|| {
            format!(
                "renaming temp config {} -> {}",
                tmp.display(),
                path.display()
            )
        })?;
        Ok(())
    }

    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| env::var(name).ok());
    }

    /// `TRIMPAD_*` overrides, looked up through `lookup`.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(device) = lookup("TRIMPAD_FB_DEVICE").filter(|v| !v.trim().is_empty()) {
            self.display.device = PathBuf::from(device.trim());
        }
        if let Some(platform) = lookup("TRIMPAD_PLATFORM").filter(|v| !v.trim().is_empty()) {
            self.keymap.platform = platform.trim().to_string();
        }
        if let Some(raw) = lookup("TRIMPAD_IDLE_TIMEOUT_SECS") {
            match raw.trim().parse::<u64>() {
                Ok(0) => self.input.idle_timeout_secs = None,
                Ok(secs) => self.input.idle_timeout_secs = Some(secs),
                Err(_) => tracing::warn!("Ignoring TRIMPAD_IDLE_TIMEOUT_SECS={:?}", raw),
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DisplaySettings {
    pub device: PathBuf,
    pub exclusive: bool,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            device: PathBuf::from(DEFAULT_FB_DEVICE),
            exclusive: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InputSettings {
    pub device_prefix: String,
    pub max_index: u32,
    pub poll_timeout_ms: u64,
    pub idle_sleep_ms: u64,
    /// Only consulted when no input device could be opened. `null` waits forever.
    pub idle_timeout_secs: Option<u64>,
}

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            device_prefix: DEFAULT_DEVICE_PREFIX.to_string(),
            max_index: DEFAULT_MAX_INDEX,
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
            idle_sleep_ms: DEFAULT_IDLE_SLEEP_MS,
            idle_timeout_secs: Some(DEFAULT_IDLE_TIMEOUT_SECS),
        }
    }
}

impl InputSettings {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn idle_sleep(&self) -> Duration {
        Duration::from_millis(self.idle_sleep_ms)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct KeymapSettings {
    pub platform: String,
    pub overrides: BTreeMap<u16, LogicalButton>,
}

impl Default for KeymapSettings {
    fn default() -> Self {
        Self {
            platform: DEFAULT_PLATFORM.to_string(),
            overrides: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColorScheme {
    #[serde(default = "ColorScheme::default_background")]
    pub background: String,
    #[serde(default = "ColorScheme::default_text")]
    pub text: String,
    #[serde(default = "ColorScheme::default_accent")]
    pub accent: String,
    #[serde(default = "ColorScheme::default_border")]
    pub border: String,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self {
            background: Self::DEFAULT_BACKGROUND.into(),
            text: Self::DEFAULT_TEXT.into(),
            accent: Self::DEFAULT_ACCENT.into(),
            border: Self::DEFAULT_BORDER.into(),
        }
    }
}

impl ColorScheme {
    pub const DEFAULT_BACKGROUND: &'static str = "#0000FF";
    pub const DEFAULT_TEXT: &'static str = "#FFFFFF";
    pub const DEFAULT_ACCENT: &'static str = "#FFFF00";
    pub const DEFAULT_BORDER: &'static str = "#FFFFFF";

    fn default_background() -> String {
        Self::DEFAULT_BACKGROUND.to_string()
    }
    fn default_text() -> String {
        Self::DEFAULT_TEXT.to_string()
    }
    fn default_accent() -> String {
        Self::DEFAULT_ACCENT.to_string()
    }
    fn default_border() -> String {
        Self::DEFAULT_BORDER.to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionSettings {
    /// Process names (as in `/proc/<pid>/comm`) stopped while we own the screen
    pub suspend: Vec<String>,
    pub suppress_signals: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            suspend: vec!["MainUI".to_string(), "launcher".to_string()],
            suppress_signals: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CueKind {
    #[default]
    Log,
    Sysfs,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CueConfig {
    pub kind: CueKind,
    pub path: Option<PathBuf>,
    pub on: String,
    pub off: String,
    pub pulse_ms: u64,
    pub queue: usize,
}

impl Default for CueConfig {
    fn default() -> Self {
        Self {
            kind: CueKind::Log,
            path: None,
            on: "1".to_string(),
            off: "0".to_string(),
            pulse_ms: DEFAULT_CUE_PULSE_MS,
            queue: DEFAULT_CUE_QUEUE,
        }
    }
}
