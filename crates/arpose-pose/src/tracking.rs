use crate::hub::{PoseHub, PoseReader};
use crate::types::{Intrinsics, PoseSample};
use crate::worker::Worker;
use crate::{PoseListener, PoseSource, SourceError};
use crossbeam_channel::{select, Receiver};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("tracking service is not ready")]
    NotReady,
    #[error("tracking service is not connected")]
    NotConnected,
    #[error("tracking service does not support frame pair {0:?}")]
    UnsupportedFrames(FramePair),
    #[error("tracking service error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateFrame {
    /// Where the device was when the service started.
    StartOfService,
    Device,
}

/// Base and target frames of a requested pose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramePair {
    pub base: CoordinateFrame,
    pub target: CoordinateFrame,
}

impl FramePair {
    /// Device pose relative to the start of service.
    pub const START_OF_SERVICE_TO_DEVICE: FramePair = FramePair {
        base: CoordinateFrame::StartOfService,
        target: CoordinateFrame::Device,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoseStatus {
    Initializing,
    Valid,
    Invalid,
    Unknown,
}

/// A pose as reported by a tracking service.
#[derive(Debug, Clone, Copy)]
pub struct ServicePose {
    pub translation: [f64; 3],
    /// Quaternion as (x, y, z, w).
    pub rotation: [f64; 4],
    /// Seconds since service start.
    pub timestamp: f64,
    pub status: PoseStatus,
}

impl ServicePose {
    pub fn to_sample(&self) -> PoseSample {
        let [tx, ty, tz] = self.translation;
        let [qx, qy, qz, qw] = self.rotation;
        PoseSample::new(
            [tx as f32, ty as f32, tz as f32],
            [qx as f32, qy as f32, qz as f32, qw as f32],
            self.timestamp,
        )
    }
}

/// Service configuration applied on connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackingSettings {
    pub motion_tracking: bool,
    /// Needed for virtual content to line up precisely with the camera image.
    pub low_latency_imu_integration: bool,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            motion_tracking: true,
            low_latency_imu_integration: true,
        }
    }
}

/// Client side of a dedicated motion-tracking service.
pub trait TrackingService: Send {
    /// Bind to the service, blocking until it is ready.
    fn wait_until_ready(&mut self) -> Result<(), ServiceError>;

    fn color_camera_intrinsics(&self) -> Result<Intrinsics, ServiceError>;

    fn connect(&mut self, settings: &TrackingSettings) -> Result<(), ServiceError>;

    /// Subscribe to poses for `frames`.
    fn connect_listener(
        &mut self,
        frames: &[FramePair],
    ) -> Result<Receiver<ServicePose>, ServiceError>;

    /// Disconnect. Returns once the service delivers no more callbacks.
    fn disconnect(&mut self) -> Result<(), ServiceError>;
}

/// Pose source backed by a [`TrackingService`].
///
/// Setup binds to the service on a background thread and reads the real
/// color camera intrinsics before reporting completion.
pub struct TrackingPoseSource {
    service: Arc<Mutex<Box<dyn TrackingService>>>,
    hub: Arc<PoseHub>,
    settings: Arc<Mutex<Option<TrackingSettings>>>,
    setup_thread: Option<JoinHandle<()>>,
    worker: Option<Worker>,
}

impl TrackingPoseSource {
    pub fn new(service: Box<dyn TrackingService>, listener: Arc<dyn PoseListener>) -> Self {
        Self {
            service: Arc::new(Mutex::new(service)),
            hub: Arc::new(PoseHub::new(listener, Intrinsics::default())),
            settings: Arc::new(Mutex::new(None)),
            setup_thread: None,
            worker: None,
        }
    }

    pub fn is_set_up(&self) -> bool {
        self.settings.lock().is_some()
    }
}

impl PoseSource for TrackingPoseSource {
    fn setup(&mut self) {
        let service = self.service.clone();
        let hub = self.hub.clone();
        let settings = self.settings.clone();
        let spawned = thread::Builder::new()
            .name("tracking-setup".into())
            .spawn(move || {
                let mut service = service.lock();
                if let Err(e) = service.wait_until_ready() {
                    error!(%e, "Tracking service never became ready");
                    return;
                }
                match service.color_camera_intrinsics() {
                    Ok(intrinsics) => {
                        info!(
                            width = intrinsics.width(),
                            height = intrinsics.height(),
                            fx = intrinsics.focal_length_x(),
                            fy = intrinsics.focal_length_y(),
                            "Color camera intrinsics received"
                        );
                        hub.set_intrinsics(intrinsics);
                    }
                    Err(e) => warn!(%e, "No color camera intrinsics, keeping defaults"),
                }
                drop(service);
                *settings.lock() = Some(TrackingSettings::default());
                hub.notify_setup_complete();
            });

        match spawned {
            Ok(handle) => self.setup_thread = Some(handle),
            Err(e) => error!(?e, "Failed to spawn tracking setup thread"),
        }
    }

    fn start_providing(&mut self) -> Result<(), SourceError> {
        if let Some(worker) = self.worker.take() {
            if self.hub.is_delivering() {
                self.worker = Some(worker);
                return Err(SourceError::AlreadyProviding);
            }
            // The previous pose stream ended on its own.
            worker.stop();
        }
        let Some(settings) = *self.settings.lock() else {
            error!("Tracking service started before setup completed");
            return Err(SourceError::NotSetUp);
        };

        let poses = {
            let mut service = self.service.lock();
            match service.connect(&settings) {
                Ok(()) => debug!("Tracking service connected"),
                Err(e) => error!(%e, "Couldn't connect to tracking service"),
            }
            match service.connect_listener(&[FramePair::START_OF_SERVICE_TO_DEVICE]) {
                Ok(poses) => poses,
                Err(e) => {
                    error!(%e, "Couldn't set tracking service listener");
                    return Err(e.into());
                }
            }
        };

        self.hub.open_delivery();
        let hub = self.hub.clone();
        match Worker::spawn("pose-tracking", move |shutdown| {
            tracking_loop(poses, shutdown, hub)
        }) {
            Ok(worker) => {
                self.worker = Some(worker);
                info!("Tracking service pose listener registered");
                Ok(())
            }
            Err(e) => {
                self.hub.close_delivery();
                error!(?e, "Failed to spawn tracking pose thread");
                Err(e.into())
            }
        }
    }

    fn stop_providing(&mut self) {
        self.hub.close_delivery();
        let Some(worker) = self.worker.take() else {
            return;
        };
        if let Err(e) = self.service.lock().disconnect() {
            // A failed disconnect means teardown ran out of order.
            panic!("Cannot disconnect from tracking service: {e}");
        }
        worker.stop();
        debug!("Tracking service disconnected");
    }

    fn latest_pose(&self) -> PoseSample {
        self.hub.latest()
    }

    fn intrinsics(&self) -> Intrinsics {
        self.hub.intrinsics()
    }

    fn is_providing(&self) -> bool {
        self.hub.is_delivering()
    }

    fn reader(&self) -> PoseReader {
        PoseReader::new(self.hub.clone())
    }
}

impl Drop for TrackingPoseSource {
    fn drop(&mut self) {
        if !thread::panicking() {
            self.stop_providing();
        }
        if let Some(handle) = self.setup_thread.take() {
            let _ = handle.join();
        }
    }
}

/// Background thread: publish every pose the service reports.
fn tracking_loop(poses: Receiver<ServicePose>, shutdown: Receiver<()>, hub: Arc<PoseHub>) {
    loop {
        select! {
            recv(poses) -> pose => match pose {
                Ok(pose) => {
                    if pose.status == PoseStatus::Invalid {
                        warn!(timestamp = pose.timestamp, "Pose data invalid");
                    }
                    hub.publish(pose.to_sample());
                }
                Err(_) => {
                    warn!("Tracking pose stream closed");
                    hub.close_delivery();
                    break;
                }
            },
            recv(shutdown) -> _ => break,
        }
    }
}
