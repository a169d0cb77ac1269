mod feeds;
mod renderer;
mod session;

use anyhow::{ensure, Context, Result};
use arpose_camera::{DisplayRotation, OrientationSlot};
use arpose_config::{AppConfig, IntrinsicsConfig, PoseSourceKind, SensorDeviceKind};
use arpose_pose::{
    ChannelSensor, ImuFusionSensor, Intrinsics, MockTrackingService, PoseListener, PoseSource,
    SensorDevice, SensorPoseSource, SyntheticMotion, TrackingPoseSource,
};
use feeds::FeedHandle;
use renderer::HeadlessRenderer;
use session::{Session, SessionSettings};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Time the simulated tracking service takes to bind.
const SERVICE_READY_DELAY: Duration = Duration::from_millis(500);
const HEARTBEAT_FRAMES: u64 = 300;

#[tokio::main]
async fn main() -> Result<()> {
    let config = arpose_config::load_config().unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {e:#}");
        AppConfig::default()
    });

    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter)),
        )
        .init();

    info!(
        pose_source = ?config.pose_source,
        camera_degrees = config.camera.sensor_orientation_degrees,
        "AR pose pipeline starting"
    );

    let initial_rotation = DisplayRotation::from_degrees(config.display.initial_rotation_degrees)
        .unwrap_or_else(|e| {
            warn!(%e, "Invalid initial display rotation, using 0");
            DisplayRotation::Rotation0
        });
    let (slot, watcher) = OrientationSlot::new(initial_rotation);

    let settings = SessionSettings {
        camera_orientation_degrees: config.camera.sensor_orientation_degrees,
        camera_permission_granted: config.camera.permission_granted,
    };
    let mut feed = None;
    let session = Arc::new(Session::new(
        HeadlessRenderer::new(),
        settings,
        watcher,
        |listener| {
            let (source, handle) = build_source(&config, listener)?;
            feed = Some(handle);
            Ok(source)
        },
    )?);

    // Stand-in for the platform's display callbacks: a quarter turn also
    // resizes the render surface.
    let rotator = config.display.rotate_every_secs.map(|secs| {
        let slot = slot.clone();
        let session = session.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(secs.max(1)));
            interval.tick().await;
            loop {
                interval.tick().await;
                let rotation = slot.current().rotated();
                info!(degrees = rotation.degrees(), "Display rotated");
                slot.set(rotation);
                session.surface_changed();
            }
        })
    });

    session.start();
    run_frames(&session, &config).await;

    if let Some(task) = rotator {
        task.abort();
    }
    session.pause();
    session.with_renderer(|r| {
        info!(
            projection_set = r.projection().is_some(),
            camera_connected = r.is_camera_connected(),
            camera_connects = r.camera_connects(),
            uv = ?r.background_uv(),
            "Renderer state at pause"
        );
    });
    if let Some(feed) = feed {
        feed.stop();
    }

    info!(
        frames = session.frame_count(),
        poses = session.poses_received(),
        "Shutting down"
    );
    if let Err(e) = arpose_config::save_config(&config) {
        warn!(?e, "Failed to save config");
    }

    Ok(())
}

/// Drive the per-frame update until ctrl-c or the configured frame limit.
async fn run_frames(session: &Session<HeadlessRenderer>, config: &AppConfig) {
    let rate = config.render.frame_rate_hz.max(1);
    let mut interval = tokio::time::interval(Duration::from_secs_f64(1.0 / rate as f64));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Interrupted");
                break;
            }
            _ = interval.tick() => {
                session.pump_events();
                session.on_pre_frame();

                let frames = session.frame_count();
                if frames % HEARTBEAT_FRAMES == 0 {
                    let pose = session.latest_pose();
                    let (camera, camera_frames) =
                        session.with_renderer(|r| (r.camera(), r.frames_streamed()));
                    info!(
                        frames,
                        poses = session.poses_received(),
                        providing = session.is_providing(),
                        camera_frames,
                        position = ?camera.position,
                        timestamp = pose.timestamp(),
                        "Heartbeat"
                    );
                }
                if config.render.max_frames.is_some_and(|max| frames >= max) {
                    info!(frames, "Frame limit reached");
                    break;
                }
            }
        }
    }
}

fn build_source(
    config: &AppConfig,
    listener: Arc<dyn PoseListener>,
) -> Result<(Box<dyn PoseSource>, FeedHandle)> {
    let motion = SyntheticMotion::default();

    match config.pose_source {
        PoseSourceKind::Sensor => {
            let rate = config.sensor.rate_hz;
            ensure!(rate > 0, "sensor.rate_hz must be positive");
            let (device, feed): (Box<dyn SensorDevice>, FeedHandle) =
                match config.sensor.device {
                    SensorDeviceKind::Pose6Dof => {
                        let (device, feed) = ChannelSensor::new("pose6dof");
                        (Box::new(device), feeds::sensor_feed(feed, motion, rate)?)
                    }
                    SensorDeviceKind::ImuFusion => {
                        let (device, feed) = ImuFusionSensor::new(
                            rate as f64,
                            config.imu.madgwick_beta,
                            config.imu.calibration_samples,
                        );
                        // Hold still long enough for the gyro bias calibration.
                        let settle = config.imu.calibration_samples as f64 / rate as f64;
                        (Box::new(device), feeds::imu_feed(feed, motion, rate, settle)?)
                    }
                };

            let mut source = SensorPoseSource::new(device, listener);
            if let Some(intrinsics) = &config.sensor.intrinsics {
                source = source.with_intrinsics(
                    intrinsics_from(intrinsics).context("Invalid sensor intrinsics")?,
                );
            }
            info!(device = ?config.sensor.device, "Using device sensor pose source");
            Ok((Box::new(source), feed))
        }
        PoseSourceKind::TrackingService => {
            ensure!(config.tracking.rate_hz > 0, "tracking.rate_hz must be positive");
            let intrinsics = intrinsics_from(&config.tracking.intrinsics)
                .context("Invalid tracking intrinsics")?;
            let (service, feed) = MockTrackingService::new(intrinsics);
            let service = service.with_ready_delay(SERVICE_READY_DELAY);
            let feed = feeds::service_feed(feed, motion, config.tracking.rate_hz)?;
            info!("Using tracking service pose source");
            Ok((
                Box::new(TrackingPoseSource::new(Box::new(service), listener)),
                feed,
            ))
        }
    }
}

fn intrinsics_from(config: &IntrinsicsConfig) -> Result<Intrinsics> {
    Ok(Intrinsics::new(
        config.width,
        config.height,
        config.fx,
        config.fy,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arpose_pose::PoseSample;

    struct NullListener;

    impl PoseListener for NullListener {
        fn on_setup_complete(&self) {}
        fn on_new_pose_data(&self, _pose: &PoseSample) {}
    }

    fn build(config: &AppConfig) -> Result<(Box<dyn PoseSource>, FeedHandle)> {
        build_source(config, Arc::new(NullListener))
    }

    #[test]
    fn zero_sensor_rate_is_rejected() {
        for device in [SensorDeviceKind::Pose6Dof, SensorDeviceKind::ImuFusion] {
            let mut config = AppConfig::default();
            config.sensor.device = device;
            config.sensor.rate_hz = 0;
            let err = build(&config).err().unwrap();
            assert!(err.to_string().contains("sensor.rate_hz"), "{err:#}");
        }
    }

    #[test]
    fn zero_tracking_rate_is_rejected() {
        let mut config = AppConfig::default();
        config.pose_source = PoseSourceKind::TrackingService;
        config.tracking.rate_hz = 0;
        assert!(build(&config).is_err());
    }

    #[test]
    fn invalid_intrinsics_override_is_rejected() {
        let mut config = AppConfig::default();
        config.sensor.intrinsics = Some(IntrinsicsConfig {
            width: 0,
            height: 480,
            fx: 500.0,
            fy: 500.0,
        });
        let err = build(&config).err().unwrap();
        assert!(format!("{err:#}").contains("Invalid sensor intrinsics"));
    }

    #[test]
    fn default_config_builds_a_sensor_source() {
        let (source, feed) = build(&AppConfig::default()).unwrap();
        assert!(!source.is_providing());
        feed.stop();
    }
}
