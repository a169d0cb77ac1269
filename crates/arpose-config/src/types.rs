use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Which pose source backs the session.
    pub pose_source: PoseSourceKind,
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Color camera parameters.
    pub camera: CameraConfig,
    /// Display orientation.
    pub display: DisplayConfig,
    /// Device-sensor pose source settings.
    pub sensor: SensorConfig,
    /// IMU fusion settings (used when `sensor.device = "imu_fusion"`).
    pub imu: ImuConfig,
    /// Tracking-service pose source settings.
    pub tracking: TrackingConfig,
    /// Frame loop settings.
    pub render: RenderConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            pose_source: PoseSourceKind::Sensor,
            log_filter: "arpose=info,arpose_pose=info,arpose_camera=info".into(),
            camera: CameraConfig::default(),
            display: DisplayConfig::default(),
            sensor: SensorConfig::default(),
            imu: ImuConfig::default(),
            tracking: TrackingConfig::default(),
            render: RenderConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoseSourceKind {
    /// Phone motion sensors.
    Sensor,
    /// Dedicated motion-tracking service.
    TrackingService,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Mounting angle of the color camera sensor relative to the device's
    /// natural orientation, in degrees (0, 90, 180 or 270).
    pub sensor_orientation_degrees: i32,
    /// Whether the user granted access to the color camera.
    pub permission_granted: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            sensor_orientation_degrees: 90,
            permission_granted: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Display rotation at startup, in degrees.
    pub initial_rotation_degrees: i32,
    /// Simulate a quarter-turn of the display every N seconds.
    pub rotate_every_secs: Option<u64>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            initial_rotation_degrees: 0,
            rotate_every_secs: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorDeviceKind {
    /// A 6-DoF pose sensor reporting quaternion + translation.
    Pose6Dof,
    /// Raw gyro + accelerometer fused into an orientation.
    ImuFusion,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub device: SensorDeviceKind,
    /// Rate of the synthetic sensor feed.
    pub rate_hz: u32,
    /// Replaces the spoofed default intrinsics when set.
    pub intrinsics: Option<IntrinsicsConfig>,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            device: SensorDeviceKind::Pose6Dof,
            rate_hz: 200,
            intrinsics: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IntrinsicsConfig {
    pub width: u32,
    pub height: u32,
    /// Focal length in pixels along x.
    pub fx: f64,
    /// Focal length in pixels along y.
    pub fy: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImuConfig {
    /// Madgwick filter beta parameter (convergence speed). Higher = more responsive, less smooth.
    pub madgwick_beta: f32,
    /// Number of stationary samples for gyro bias calibration.
    pub calibration_samples: u32,
}

impl Default for ImuConfig {
    fn default() -> Self {
        Self {
            madgwick_beta: 0.1,
            calibration_samples: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Pose rate of the simulated service.
    pub rate_hz: u32,
    /// Color camera intrinsics reported by the simulated service.
    pub intrinsics: IntrinsicsConfig,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            rate_hz: 100,
            intrinsics: IntrinsicsConfig {
                width: 1920,
                height: 1080,
                fx: 1042.0,
                fy: 1042.0,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub frame_rate_hz: u32,
    /// Stop after this many frames. `None` runs until ctrl-c.
    pub max_frames: Option<u64>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            frame_rate_hz: 60,
            max_frames: None,
        }
    }
}
