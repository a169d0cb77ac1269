use crate::hub::{PoseHub, PoseReader};
use crate::types::{Intrinsics, PoseSample};
use crate::worker::Worker;
use crate::{PoseListener, PoseSource, SourceError};
use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// Events buffered between the sensor and the pose thread. Older readings
/// are dropped rather than queued when the consumer falls behind.
const SENSOR_QUEUE_DEPTH: usize = 64;

const NANOS_PER_SECOND: f64 = 1e9;

/// One reading from a pose sensor.
#[derive(Debug, Clone)]
pub struct SensorEvent {
    /// 6-DoF layout: `[qx, qy, qz, qw, tx, ty, tz, ...]`.
    pub values: Vec<f32>,
    /// Sensor timestamp in nanoseconds.
    pub timestamp_ns: i64,
}

/// Platform-specific source of pose sensor events.
pub trait SensorDevice: Send {
    fn name(&self) -> &str;

    /// Register for events. Each call returns a receiver for the live stream.
    fn open(&mut self) -> Result<Receiver<SensorEvent>, SourceError>;

    /// Unregister. Default is a no-op for devices without registration state.
    fn close(&mut self) {}
}

/// A [`SensorDevice`] fed through a [`SensorFeed`] handle.
pub struct ChannelSensor {
    name: String,
    events: Option<Receiver<SensorEvent>>,
}

/// Producer side of a [`ChannelSensor`].
#[derive(Clone)]
pub struct SensorFeed {
    tx: Sender<SensorEvent>,
}

impl ChannelSensor {
    pub fn new(name: impl Into<String>) -> (Self, SensorFeed) {
        let (tx, rx) = bounded(SENSOR_QUEUE_DEPTH);
        (
            Self {
                name: name.into(),
                events: Some(rx),
            },
            SensorFeed { tx },
        )
    }

    /// A sensor the platform does not have. Opening it fails.
    pub fn unavailable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            events: None,
        }
    }
}

impl SensorDevice for ChannelSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self) -> Result<Receiver<SensorEvent>, SourceError> {
        self.events
            .clone()
            .ok_or_else(|| SourceError::SensorUnavailable(self.name.clone()))
    }
}

impl SensorFeed {
    /// Push a raw event. Returns `false` if the sensor is gone.
    pub fn push(&self, values: Vec<f32>, timestamp_ns: i64) -> bool {
        match self.tx.try_send(SensorEvent {
            values,
            timestamp_ns,
        }) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                trace!("Sensor queue full, dropping event");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Push `pose` encoded as a 6-DoF event.
    pub fn push_pose(&self, pose: &PoseSample) -> bool {
        let [qx, qy, qz, qw] = pose.rotation();
        let [tx, ty, tz] = pose.translation();
        let timestamp_ns = (pose.timestamp() * NANOS_PER_SECOND) as i64;
        self.push(vec![qx, qy, qz, qw, tx, ty, tz], timestamp_ns)
    }
}

/// Pose source backed by the device's own motion sensors.
///
/// The platform cannot report camera intrinsics, so this source uses
/// spoofed defaults unless given real ones.
pub struct SensorPoseSource {
    device: Box<dyn SensorDevice>,
    hub: Arc<PoseHub>,
    worker: Option<Worker>,
}

impl SensorPoseSource {
    pub fn new(device: Box<dyn SensorDevice>, listener: Arc<dyn PoseListener>) -> Self {
        Self {
            device,
            hub: Arc::new(PoseHub::new(listener, Intrinsics::default())),
            worker: None,
        }
    }

    /// Use known intrinsics instead of the spoofed defaults.
    pub fn with_intrinsics(self, intrinsics: Intrinsics) -> Self {
        self.hub.set_intrinsics(intrinsics);
        self
    }
}

impl PoseSource for SensorPoseSource {
    fn setup(&mut self) {
        debug!(device = self.device.name(), "Sensor pose source ready");
        self.hub.notify_setup_complete();
    }

    fn start_providing(&mut self) -> Result<(), SourceError> {
        if let Some(worker) = self.worker.take() {
            if self.hub.is_delivering() {
                self.worker = Some(worker);
                return Err(SourceError::AlreadyProviding);
            }
            // The previous stream ended on its own.
            worker.stop();
            self.device.close();
        }

        let events = match self.device.open() {
            Ok(events) => events,
            Err(e) => {
                error!(device = self.device.name(), %e, "Failed to register pose sensor");
                return Err(e);
            }
        };

        self.hub.open_delivery();
        let hub = self.hub.clone();
        match Worker::spawn("pose-sensor", move |shutdown| {
            sensor_loop(events, shutdown, hub)
        }) {
            Ok(worker) => {
                info!(device = self.device.name(), "Pose sensor registered");
                self.worker = Some(worker);
                Ok(())
            }
            Err(e) => {
                self.hub.close_delivery();
                self.device.close();
                error!(?e, "Failed to spawn pose sensor thread");
                Err(e.into())
            }
        }
    }

    fn stop_providing(&mut self) {
        self.hub.close_delivery();
        if let Some(worker) = self.worker.take() {
            worker.stop();
            self.device.close();
            info!(device = self.device.name(), "Pose sensor unregistered");
        }
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

impl Drop for SensorPoseSource {
    fn drop(&mut self) {
        self.stop_providing();
    }
}

/// Background thread: decode sensor events and publish them.
fn sensor_loop(events: Receiver<SensorEvent>, shutdown: Receiver<()>, hub: Arc<PoseHub>) {
    let mut sample_count: u64 = 0;
    loop {
        select! {
            recv(events) -> event => match event {
                Ok(event) => {
                    let timestamp = event.timestamp_ns as f64 / NANOS_PER_SECOND;
                    match PoseSample::from_six_dof(&event.values, timestamp) {
                        Ok(sample) => {
                            hub.publish(sample);
                            sample_count += 1;
                            if sample_count % 1000 == 0 {
                                debug!(sample_count, "Pose samples processed");
                            }
                        }
                        Err(e) => trace!(%e, "Skipping malformed sensor event"),
                    }
                }
                Err(_) => {
                    warn!("Pose sensor stream closed");
                    hub.close_delivery();
                    break;
                }
            },
            recv(shutdown) -> _ => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct Recorder {
        setups: AtomicUsize,
        poses: Mutex<Vec<PoseSample>>,
    }

    impl PoseListener for Recorder {
        fn on_setup_complete(&self) {
            self.setups.fetch_add(1, Ordering::SeqCst);
        }

        fn on_new_pose_data(&self, pose: &PoseSample) {
            self.poses.lock().push(*pose);
        }
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn setup_completes_immediately() {
        let recorder = Arc::new(Recorder::default());
        let (device, _feed) = ChannelSensor::new("pose6dof");
        let mut source = SensorPoseSource::new(Box::new(device), recorder.clone());
        source.setup();
        assert_eq!(recorder.setups.load(Ordering::SeqCst), 1);
        assert_eq!(source.intrinsics(), Intrinsics::default());
    }

    #[test]
    fn events_reach_cache_and_listener() {
        let recorder = Arc::new(Recorder::default());
        let (device, feed) = ChannelSensor::new("pose6dof");
        let mut source = SensorPoseSource::new(Box::new(device), recorder.clone());
        source.setup();
        source.start_providing().unwrap();
        assert!(source.is_providing());

        assert!(feed.push(vec![0.0, 0.0, 0.0, 1.0, 1.0, 2.0, 3.0], 2_000_000_000));
        assert!(wait_for(|| !recorder.poses.lock().is_empty()));

        let pose = source.latest_pose();
        assert_eq!(pose.translation(), [1.0, 2.0, 3.0]);
        assert_eq!(pose.rotation(), [0.0, 0.0, 0.0, 1.0]);
        assert!((pose.timestamp() - 2.0).abs() < 1e-9);
        assert_eq!(recorder.poses.lock()[0], pose);

        source.stop_providing();
        assert!(!source.is_providing());
    }

    #[test]
    fn malformed_events_are_skipped() {
        let recorder = Arc::new(Recorder::default());
        let (device, feed) = ChannelSensor::new("pose6dof");
        let mut source = SensorPoseSource::new(Box::new(device), recorder.clone());
        source.start_providing().unwrap();

        feed.push(vec![1.0, 2.0], 1);
        feed.push(vec![0.0, 0.0, 0.0, 1.0, 5.0, 0.0, 0.0], 2);
        assert!(wait_for(|| !recorder.poses.lock().is_empty()));
        assert_eq!(recorder.poses.lock().len(), 1);
        assert_eq!(source.latest_pose().translation(), [5.0, 0.0, 0.0]);
        source.stop_providing();
    }

    #[test]
    fn unavailable_sensor_leaves_source_idle() {
        let recorder = Arc::new(Recorder::default());
        let mut source =
            SensorPoseSource::new(Box::new(ChannelSensor::unavailable("pose6dof")), recorder);
        source.setup();
        assert!(matches!(
            source.start_providing(),
            Err(SourceError::SensorUnavailable(_))
        ));
        assert!(!source.is_providing());
        assert_eq!(source.latest_pose(), PoseSample::default());
        // Stopping an idle source is fine.
        source.stop_providing();
    }

    #[test]
    fn no_notifications_after_stop() {
        let recorder = Arc::new(Recorder::default());
        let (device, feed) = ChannelSensor::new("pose6dof");
        let mut source = SensorPoseSource::new(Box::new(device), recorder.clone());
        source.start_providing().unwrap();

        let producer = {
            let feed = feed.clone();
            std::thread::spawn(move || {
                for i in 0..2_000 {
                    feed.push(vec![0.0, 0.0, 0.0, 1.0, i as f32, 0.0, 0.0], i);
                }
            })
        };
        assert!(wait_for(|| !recorder.poses.lock().is_empty()));
        source.stop_providing();
        let delivered = recorder.poses.lock().len();

        producer.join().unwrap();
        feed.push(vec![0.0, 0.0, 0.0, 1.0, 9.0, 9.0, 9.0], 10_000);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(recorder.poses.lock().len(), delivered);
    }

    /// A device whose stream can be ended from the test.
    struct ClosingSensor {
        events: Option<Receiver<SensorEvent>>,
    }

    impl SensorDevice for ClosingSensor {
        fn name(&self) -> &str {
            "closing"
        }

        fn open(&mut self) -> Result<Receiver<SensorEvent>, SourceError> {
            self.events
                .take()
                .ok_or_else(|| SourceError::SensorUnavailable("closing".into()))
        }
    }

    #[test]
    fn ended_stream_stops_providing() {
        let (tx, rx) = bounded(SENSOR_QUEUE_DEPTH);
        let device = ClosingSensor { events: Some(rx) };
        let mut source = SensorPoseSource::new(Box::new(device), Arc::new(Recorder::default()));
        source.start_providing().unwrap();
        assert!(source.is_providing());
        let reader = source.reader();
        assert!(reader.is_providing());

        drop(tx);
        assert!(wait_for(|| !source.is_providing()));
        assert!(!reader.is_providing());

        // The dead stream is reaped and the device opened again.
        assert!(matches!(
            source.start_providing(),
            Err(SourceError::SensorUnavailable(_))
        ));
    }

    #[test]
    fn double_start_is_rejected() {
        let (device, _feed) = ChannelSensor::new("pose6dof");
        let mut source = SensorPoseSource::new(Box::new(device), Arc::new(Recorder::default()));
        source.start_providing().unwrap();
        assert!(matches!(
            source.start_providing(),
            Err(SourceError::AlreadyProviding)
        ));
        source.stop_providing();
    }

    #[test]
    fn configured_intrinsics_replace_defaults() {
        let (device, _feed) = ChannelSensor::new("pose6dof");
        let real = Intrinsics::new(1280, 720, 900.0, 905.0).unwrap();
        let source = SensorPoseSource::new(Box::new(device), Arc::new(Recorder::default()))
            .with_intrinsics(real);
        assert_eq!(source.intrinsics(), real);
    }
}
