pub mod fusion;
pub mod hub;
pub mod imu;
pub mod mock;
pub mod sensor;
pub mod tracking;
pub mod types;
mod worker;

pub use hub::{PoseHub, PoseReader};
pub use imu::{ImuFeed, ImuFusionSensor};
pub use mock::{MockTrackingService, ServiceFeed, SyntheticMotion};
pub use sensor::{ChannelSensor, SensorDevice, SensorEvent, SensorFeed, SensorPoseSource};
pub use tracking::{
    FramePair, PoseStatus, ServiceError, ServicePose, TrackingPoseSource, TrackingService,
    TrackingSettings,
};
pub use types::{Intrinsics, IntrinsicsError, PoseSample, RawImuSample, SampleError};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("sensor {0} is not available")]
    SensorUnavailable(String),
    #[error("pose source has not completed setup")]
    NotSetUp,
    #[error("pose source is already providing")]
    AlreadyProviding,
    #[error("tracking service: {0}")]
    Service(#[from] ServiceError),
    #[error("failed to spawn pose thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Receives notifications from a [`PoseSource`].
///
/// Called from the source's background threads, never from the render thread.
pub trait PoseListener: Send + Sync {
    /// The source finished setup and may now be started.
    fn on_setup_complete(&self);

    /// A new sample was stored as the latest pose.
    fn on_new_pose_data(&self, pose: &PoseSample);
}

/// A stream of device poses plus the color camera intrinsics.
///
/// Implemented by [`SensorPoseSource`] (phone sensors) and
/// [`TrackingPoseSource`] (dedicated motion-tracking service).
pub trait PoseSource: Send {
    /// Prepare the source. Completion is reported through
    /// [`PoseListener::on_setup_complete`], possibly from another thread.
    fn setup(&mut self);

    /// Begin delivering samples. Failures are logged and leave the source idle.
    fn start_providing(&mut self) -> Result<(), SourceError>;

    /// Stop delivering samples.
    ///
    /// Safe to call when idle. Returns only after any in-flight callback has
    /// finished; no notification is delivered afterwards.
    fn stop_providing(&mut self);

    /// Most recent sample, or the identity pose if none arrived yet.
    fn latest_pose(&self) -> PoseSample;

    /// Last known intrinsics (spoofed defaults until real ones are known).
    fn intrinsics(&self) -> Intrinsics;

    /// Whether samples are being delivered. Turns `false` when stopped or when
    /// the underlying stream ends.
    fn is_providing(&self) -> bool;

    /// Handle for reading the latest pose and intrinsics without going
    /// through the source.
    fn reader(&self) -> PoseReader;
}
