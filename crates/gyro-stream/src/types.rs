use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

/// Longest text a display line accepts (16x2 character LCD).
pub const MAX_DISPLAY_TEXT: usize = 16;

/// One complete reading of all six sensor channels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    /// Linear acceleration (m/s^2).
    pub ax: f64,
    pub ay: f64,
    pub az: f64,
    /// Angular velocity (rad/s).
    pub gx: f64,
    pub gy: f64,
    pub gz: f64,
}

/// Connection state as shown to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
    Error,
}

impl ConnectionStatus {
    pub fn label(self) -> &'static str {
        match self {
            ConnectionStatus::Connecting => "Connecting...",
            ConnectionStatus::Connected => "Connected",
            ConnectionStatus::Disconnected => "Disconnected",
            ConnectionStatus::Error => "Connection error",
        }
    }

    /// Disconnected and error share a single indicator.
    pub fn is_faulted(self) -> bool {
        matches!(self, ConnectionStatus::Disconnected | ConnectionStatus::Error)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Screen must be 1 or 2, got {0}")]
    InvalidScreen(u8),
    #[error("Line must be 0 or 1, got {0}")]
    InvalidLine(u8),
}

/// Addressable LCD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "u8")]
pub enum Screen {
    One,
    Two,
}

impl From<Screen> for u8 {
    fn from(screen: Screen) -> u8 {
        match screen {
            Screen::One => 1,
            Screen::Two => 2,
        }
    }
}

impl TryFrom<u8> for Screen {
    type Error = CommandError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Screen::One),
            2 => Ok(Screen::Two),
            other => Err(CommandError::InvalidScreen(other)),
        }
    }
}

/// Writable line on an LCD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "u8")]
pub enum Line {
    First,
    Second,
}

impl From<Line> for u8 {
    fn from(line: Line) -> u8 {
        match line {
            Line::First => 0,
            Line::Second => 1,
        }
    }
}

impl TryFrom<u8> for Line {
    type Error = CommandError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Line::First),
            1 => Ok(Line::Second),
            other => Err(CommandError::InvalidLine(other)),
        }
    }
}

/// Write `text` to one line of one LCD.
///
/// Text longer than [`MAX_DISPLAY_TEXT`] characters is truncated on
/// construction, so every value of this type is sendable as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayCommand {
    screen: Screen,
    line: Line,
    text: String,
}

impl DisplayCommand {
    pub fn new(screen: Screen, line: Line, text: &str) -> Self {
        Self {
            screen,
            line,
            text: text.chars().take(MAX_DISPLAY_TEXT).collect(),
        }
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    pub fn line(&self) -> Line {
        self.line
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Blank every LCD. Serializes as `{"screen": "all"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClearCommand;

impl Serialize for ClearCommand {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry("screen", "all")?;
        map.end()
    }
}

/// Event names used on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventNames {
    pub sensor_update: String,
    pub update_display: String,
    pub clear_displays: String,
}

impl Default for EventNames {
    fn default() -> Self {
        Self {
            sensor_update: "sensor_update".into(),
            update_display: "update_display".into(),
            clear_displays: "clear_displays".into(),
        }
    }
}
