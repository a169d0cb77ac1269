use crate::tracking::{FramePair, ServiceError, ServicePose, TrackingService, TrackingSettings};
use crate::types::{Intrinsics, PoseSample};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use glam::{Quat, Vec3};
use std::time::Duration;
use tracing::info;

const SERVICE_QUEUE_DEPTH: usize = 64;

/// In-process stand-in for a motion-tracking service.
///
/// Poses pushed through the paired [`ServiceFeed`] are delivered to whoever
/// called `connect_listener`.
pub struct MockTrackingService {
    intrinsics: Intrinsics,
    poses: Receiver<ServicePose>,
    ready_delay: Duration,
    connected: bool,
    fail_connect: bool,
    fail_disconnect: bool,
}

/// Producer side of a [`MockTrackingService`].
#[derive(Clone)]
pub struct ServiceFeed {
    tx: Sender<ServicePose>,
}

impl ServiceFeed {
    /// Push a pose. Returns `false` if the service is gone.
    pub fn push(&self, pose: ServicePose) -> bool {
        !matches!(self.tx.try_send(pose), Err(TrySendError::Disconnected(_)))
    }
}

impl MockTrackingService {
    pub fn new(intrinsics: Intrinsics) -> (Self, ServiceFeed) {
        let (tx, poses) = bounded(SERVICE_QUEUE_DEPTH);
        (
            Self {
                intrinsics,
                poses,
                ready_delay: Duration::ZERO,
                connected: false,
                fail_connect: false,
                fail_disconnect: false,
            },
            ServiceFeed { tx },
        )
    }

    /// Simulate the time the service takes to bind.
    pub fn with_ready_delay(mut self, delay: Duration) -> Self {
        self.ready_delay = delay;
        self
    }

    pub fn failing_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    pub fn failing_disconnect(mut self) -> Self {
        self.fail_disconnect = true;
        self
    }
}

impl TrackingService for MockTrackingService {
    fn wait_until_ready(&mut self) -> Result<(), ServiceError> {
        std::thread::sleep(self.ready_delay);
        info!("Mock tracking service ready");
        Ok(())
    }

    fn color_camera_intrinsics(&self) -> Result<Intrinsics, ServiceError> {
        Ok(self.intrinsics)
    }

    fn connect(&mut self, settings: &TrackingSettings) -> Result<(), ServiceError> {
        if self.fail_connect {
            return Err(ServiceError::Internal("connection refused".into()));
        }
        info!(?settings, "Mock tracking service connected");
        self.connected = true;
        Ok(())
    }

    fn connect_listener(
        &mut self,
        frames: &[FramePair],
    ) -> Result<Receiver<ServicePose>, ServiceError> {
        if !self.connected {
            return Err(ServiceError::NotConnected);
        }
        if let Some(&unsupported) = frames
            .iter()
            .find(|&&f| f != FramePair::START_OF_SERVICE_TO_DEVICE)
        {
            return Err(ServiceError::UnsupportedFrames(unsupported));
        }
        Ok(self.poses.clone())
    }

    fn disconnect(&mut self) -> Result<(), ServiceError> {
        if self.fail_disconnect {
            return Err(ServiceError::Internal("service still busy".into()));
        }
        self.connected = false;
        Ok(())
    }
}

/// A smooth, repeating device motion for demos without hardware.
///
/// The device sways side to side while yawing gently toward the center.
#[derive(Debug, Clone, Copy)]
pub struct SyntheticMotion {
    /// Peak sideways displacement (meters).
    pub amplitude: f32,
    /// Peak yaw (radians).
    pub max_yaw: f32,
    /// Seconds per full sway.
    pub period_secs: f64,
}

impl Default for SyntheticMotion {
    fn default() -> Self {
        Self {
            amplitude: 0.25,
            max_yaw: 15.0_f32.to_radians(),
            period_secs: 8.0,
        }
    }
}

impl SyntheticMotion {
    /// Pose at `t` seconds.
    pub fn sample_at(&self, t: f64) -> PoseSample {
        let phase = (t / self.period_secs * std::f64::consts::TAU) as f32;
        let position = Vec3::new(self.amplitude * phase.sin(), 0.0, 0.0);
        let rotation = Quat::from_rotation_y(-self.max_yaw * phase.sin());
        PoseSample::new(position.to_array(), rotation.to_array(), t)
    }

    /// Same pose as a tracking-service report.
    pub fn service_pose_at(&self, t: f64) -> ServicePose {
        let sample = self.sample_at(t);
        let [tx, ty, tz] = sample.translation();
        let [qx, qy, qz, qw] = sample.rotation();
        ServicePose {
            translation: [tx as f64, ty as f64, tz as f64],
            rotation: [qx as f64, qy as f64, qz as f64, qw as f64],
            timestamp: t,
            status: crate::tracking::PoseStatus::Valid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_motion_starts_at_rest() {
        let pose = SyntheticMotion::default().sample_at(0.0);
        assert!(pose.position().length() < 1e-6);
        assert!(pose.orientation().angle_between(Quat::IDENTITY) < 1e-6);
    }

    #[test]
    fn synthetic_motion_stays_bounded() {
        let motion = SyntheticMotion::default();
        for i in 0..100 {
            let pose = motion.sample_at(i as f64 * 0.37);
            assert!(pose.position().x.abs() <= motion.amplitude + 1e-6);
            assert!(pose.orientation().is_normalized());
        }
    }

    #[test]
    fn listener_requires_connection() {
        let (mut service, _feed) = MockTrackingService::new(Intrinsics::default());
        assert!(matches!(
            service.connect_listener(&[FramePair::START_OF_SERVICE_TO_DEVICE]),
            Err(ServiceError::NotConnected)
        ));
        service.connect(&TrackingSettings::default()).unwrap();
        assert!(service
            .connect_listener(&[FramePair::START_OF_SERVICE_TO_DEVICE])
            .is_ok());
    }
}
