use glam::{Quat, Vec3};
use thiserror::Error;

/// Nominal lens focal length (mm) used when the platform cannot report intrinsics.
const DEFAULT_FOCAL_LENGTH_MM: f64 = 3.5;
/// Nominal color sensor width (mm).
const DEFAULT_SENSOR_WIDTH_MM: f64 = 5.376;
/// Nominal color sensor height (mm).
const DEFAULT_SENSOR_HEIGHT_MM: f64 = 3.04;
/// Placeholder image size. Any non-zero value works: the projection only
/// depends on the ratio of image size to focal length.
const DEFAULT_WIDTH: u32 = 1;
const DEFAULT_HEIGHT: u32 = 1;

/// Number of leading values a 6-DoF pose event must carry: quaternion then translation.
pub const SIX_DOF_VALUE_COUNT: usize = 7;

#[derive(Debug, Error, PartialEq)]
pub enum SampleError {
    #[error("6-DoF event has {0} values, expected at least {}", SIX_DOF_VALUE_COUNT)]
    TooFewValues(usize),
}

#[derive(Debug, Error, PartialEq)]
pub enum IntrinsicsError {
    #[error("image size must be non-zero (got {width}x{height})")]
    EmptyImage { width: u32, height: u32 },
    #[error("focal lengths must be finite and positive (got fx={fx}, fy={fy})")]
    InvalidFocalLength { fx: f64, fy: f64 },
}

/// Pose of the device relative to the start-of-tracking frame.
///
/// A sample is a value: the next reading supersedes it rather than mutating it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseSample {
    translation: [f32; 3],
    /// Quaternion as (x, y, z, w), where
    /// `(x, y, z) = axis * sin(angle / 2)` and `w = cos(angle / 2)`.
    rotation: [f32; 4],
    timestamp: f64,
}

impl Default for PoseSample {
    fn default() -> Self {
        Self {
            translation: [0.0, 0.0, 0.0],
            rotation: [0.0, 0.0, 0.0, 1.0],
            timestamp: 0.0,
        }
    }
}

impl PoseSample {
    pub fn new(translation: [f32; 3], rotation: [f32; 4], timestamp: f64) -> Self {
        Self {
            translation,
            rotation,
            timestamp,
        }
    }

    /// Decode a 6-DoF pose sensor event laid out as
    /// `[qx, qy, qz, qw, tx, ty, tz, ...]`. Trailing values (deltas,
    /// sequence numbers) are ignored.
    pub fn from_six_dof(values: &[f32], timestamp: f64) -> Result<Self, SampleError> {
        if values.len() < SIX_DOF_VALUE_COUNT {
            return Err(SampleError::TooFewValues(values.len()));
        }
        Ok(Self {
            rotation: [values[0], values[1], values[2], values[3]],
            translation: [values[4], values[5], values[6]],
            timestamp,
        })
    }

    pub fn translation(&self) -> [f32; 3] {
        self.translation
    }

    pub fn rotation(&self) -> [f32; 4] {
        self.rotation
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.translation)
    }

    pub fn orientation(&self) -> Quat {
        let [x, y, z, w] = self.rotation;
        Quat::from_xyzw(x, y, z, w)
    }
}

/// Color camera calibration needed to build a matching projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intrinsics {
    width: u32,
    height: u32,
    focal_length_x: f64,
    focal_length_y: f64,
}

impl Default for Intrinsics {
    /// Spoofed intrinsics for platforms that cannot report them: a nominal
    /// lens over a nominal sensor, each axis scaled by its own sensor dimension.
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            focal_length_x: DEFAULT_FOCAL_LENGTH_MM * DEFAULT_WIDTH as f64
                / DEFAULT_SENSOR_WIDTH_MM,
            focal_length_y: DEFAULT_FOCAL_LENGTH_MM * DEFAULT_HEIGHT as f64
                / DEFAULT_SENSOR_HEIGHT_MM,
        }
    }
}

impl Intrinsics {
    pub fn new(
        width: u32,
        height: u32,
        focal_length_x: f64,
        focal_length_y: f64,
    ) -> Result<Self, IntrinsicsError> {
        if width == 0 || height == 0 {
            return Err(IntrinsicsError::EmptyImage { width, height });
        }
        let valid = |f: f64| f.is_finite() && f > 0.0;
        if !valid(focal_length_x) || !valid(focal_length_y) {
            return Err(IntrinsicsError::InvalidFocalLength {
                fx: focal_length_x,
                fy: focal_length_y,
            });
        }
        Ok(Self {
            width,
            height,
            focal_length_x,
            focal_length_y,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Focal length in pixels along x.
    pub fn focal_length_x(&self) -> f64 {
        self.focal_length_x
    }

    /// Focal length in pixels along y.
    pub fn focal_length_y(&self) -> f64 {
        self.focal_length_y
    }
}

/// Raw sensor reading from a phone IMU.
#[derive(Debug, Clone, Copy)]
pub struct RawImuSample {
    /// Gyroscope angular velocity (rad/s).
    pub gyro: Vec3,
    /// Accelerometer linear acceleration (m/s^2).
    pub accel: Vec3,
    /// Sensor timestamp in nanoseconds.
    pub timestamp_ns: i64,
}
