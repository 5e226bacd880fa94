//! Window-title status line: connection state plus the six readouts.

use gyro_stream::{ConnectionStatus, SensorSnapshot};
use std::time::{Duration, Instant};

/// Longest the title may lag behind the data.
const REFRESH_INTERVAL: Duration = Duration::from_millis(100);

pub fn title(status: ConnectionStatus, snapshot: &SensorSnapshot) -> String {
    format!(
        "Gyro Dashboard | {} | Accel X {:.2} Y {:.2} Z {:.2} m/s² | Gyro X {:.2} Y {:.2} Z {:.2} rad/s",
        status.label(),
        snapshot.ax,
        snapshot.ay,
        snapshot.az,
        snapshot.gx,
        snapshot.gy,
        snapshot.gz,
    )
}

/// Rate-limits title updates and skips unchanged text.
#[derive(Default)]
pub struct TitleThrottle {
    last_refresh: Option<Instant>,
    last_title: String,
}

impl TitleThrottle {
    /// Returns the new title when it is due and differs from the current one.
    pub fn update(&mut self, now: Instant, title: String) -> Option<String> {
        if let Some(last) = self.last_refresh {
            if now.duration_since(last) < REFRESH_INTERVAL {
                return None;
            }
        }
        self.last_refresh = Some(now);
        if title == self.last_title {
            return None;
        }
        self.last_title = title.clone();
        Some(title)
    }
}
