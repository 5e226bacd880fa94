use gyro_config::AxisMapConfig;
use std::str::FromStr;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Angular velocity input for one tick (rad/s), in sensor axes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AngularVelocity {
    pub gx: f64,
    pub gy: f64,
    pub gz: f64,
}

impl AngularVelocity {
    pub fn new(gx: f64, gy: f64, gz: f64) -> Self {
        Self { gx, gy, gz }
    }
}

/// Accumulated rotation angles (radians) about the screen X, Y and Z axes.
///
/// Plain accumulators: never wrapped or clamped.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OrientationState {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorAxis {
    Gx,
    Gy,
    Gz,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid axis source {0:?}, expected gx, gy or gz with an optional '-'")]
pub struct AxisSourceError(pub String);

/// Sensor channel (and sign) feeding one screen axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisSource {
    pub axis: SensorAxis,
    pub inverted: bool,
}

impl AxisSource {
    pub const fn new(axis: SensorAxis) -> Self {
        Self {
            axis,
            inverted: false,
        }
    }

    pub const fn inverted(axis: SensorAxis) -> Self {
        Self {
            axis,
            inverted: true,
        }
    }

    fn rate(self, velocity: AngularVelocity) -> f64 {
        let rate = match self.axis {
            SensorAxis::Gx => velocity.gx,
            SensorAxis::Gy => velocity.gy,
            SensorAxis::Gz => velocity.gz,
        };
        if self.inverted {
            -rate
        } else {
            rate
        }
    }
}

impl FromStr for AxisSource {
    type Err = AxisSourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (inverted, name) = match trimmed.strip_prefix('-') {
            Some(name) => (true, name),
            None => (false, trimmed),
        };
        let axis = match name.to_ascii_lowercase().as_str() {
            "gx" => SensorAxis::Gx,
            "gy" => SensorAxis::Gy,
            "gz" => SensorAxis::Gz,
            _ => return Err(AxisSourceError(s.to_string())),
        };
        Ok(Self { axis, inverted })
    }
}

/// Which sensor channel drives each screen axis.
///
/// Fixed for the life of an integrator so every tick uses the same mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisMapping {
    pub x: AxisSource,
    pub y: AxisSource,
    pub z: AxisSource,
}

impl Default for AxisMapping {
    fn default() -> Self {
        Self {
            x: AxisSource::new(SensorAxis::Gy),
            y: AxisSource::new(SensorAxis::Gx),
            z: AxisSource::new(SensorAxis::Gz),
        }
    }
}

impl AxisMapping {
    pub fn from_config(config: &AxisMapConfig) -> Result<Self, AxisSourceError> {
        Ok(Self {
            x: config.x.parse()?,
            y: config.y.parse()?,
            z: config.z.parse()?,
        })
    }
}

/// Advance `state` by one rectangular integration step.
///
/// A `delta` that is negative or not finite counts as zero.
pub fn tick(
    state: OrientationState,
    velocity: AngularVelocity,
    delta: f64,
    mapping: &AxisMapping,
) -> OrientationState {
    if !delta.is_finite() || delta <= 0.0 {
        return state;
    }
    OrientationState {
        x: state.x + mapping.x.rate(velocity) * delta,
        y: state.y + mapping.y.rate(velocity) * delta,
        z: state.z + mapping.z.rate(velocity) * delta,
    }
}

/// Owns the persistent orientation and advances it once per frame.
pub struct OrientationIntegrator {
    state: OrientationState,
    mapping: AxisMapping,
    ticks: u64,
}

impl OrientationIntegrator {
    pub fn new(mapping: AxisMapping) -> Self {
        Self {
            state: OrientationState::default(),
            mapping,
            ticks: 0,
        }
    }

    pub fn advance(&mut self, velocity: AngularVelocity, delta: f64) -> OrientationState {
        self.state = tick(self.state, velocity, delta, &self.mapping);
        self.ticks += 1;
        self.state
    }

    pub fn state(&self) -> OrientationState {
        self.state
    }

    pub fn mapping(&self) -> &AxisMapping {
        &self.mapping
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

/// Measures the time between redraws. The first frame has a delta of zero.
#[derive(Debug, Default)]
pub struct FrameClock {
    last: Option<Instant>,
}

impl FrameClock {
    /// Seconds since the previous call. A clock that went backwards gives zero.
    pub fn tick(&mut self, now: Instant) -> f64 {
        let delta = self
            .last
            .map(|prev| now.saturating_duration_since(prev))
            .unwrap_or(Duration::ZERO);
        self.last = Some(now);
        delta.as_secs_f64()
    }
}
