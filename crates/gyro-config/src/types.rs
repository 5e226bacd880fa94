use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Sensor stream connection.
    pub stream: StreamConfig,
    /// Orientation cube rendering.
    pub renderer: RendererConfig,
    /// Defaults for the LCD command shortcuts.
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Socket.IO server address, e.g. `http://192.168.1.50:5000`.
    /// `None` leaves the dashboard in the error state.
    pub endpoint: Option<String>,
    /// Inbound event carrying a full sensor snapshot.
    pub sensor_event: String,
    /// Outbound event writing text to one LCD line.
    pub update_display_event: String,
    /// Outbound event blanking every LCD.
    pub clear_displays_event: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            sensor_event: "sensor_update".into(),
            update_display_event: "update_display".into(),
            clear_displays_event: "clear_displays".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Wireframe colour as `#rrggbb`.
    pub line_color: String,
    /// Vertical field of view in degrees.
    pub fov_y_degrees: f32,
    /// Half the cube edge length in scene units.
    pub cube_half_extent: f32,
    /// Sensor channel driving each screen axis: `gx`, `gy` or `gz`,
    /// optionally prefixed with `-` to invert it.
    pub axis_map: AxisMapConfig,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            line_color: "#22d3ee".into(),
            fov_y_degrees: 75.0,
            cube_half_extent: 1.5,
            axis_map: AxisMapConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisMapConfig {
    pub x: String,
    pub y: String,
    pub z: String,
}

impl Default for AxisMapConfig {
    fn default() -> Self {
        // Screen X follows the sensor's Y rate and vice versa; matches the
        // board's mounting on the reference device.
        Self {
            x: "gy".into(),
            y: "gx".into(),
            z: "gz".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Text sent by the Enter shortcut.
    pub default_text: String,
    /// Target LCD (1 or 2).
    pub default_screen: u8,
    /// Target line (0 or 1).
    pub default_line: u8,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            default_text: "Proyecto OK!".into(),
            default_screen: 1,
            default_line: 0,
        }
    }
}
