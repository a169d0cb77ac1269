use arpose_pose::{ImuFeed, RawImuSample, SensorFeed, ServiceFeed, SyntheticMotion};
use glam::Vec3;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

const GRAVITY: f32 = 9.81;

/// A background thread driving synthetic input into a pose source.
pub struct FeedHandle {
    name: &'static str,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<u64>>,
}

impl FeedHandle {
    /// Stop the feed and wait for its thread.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(ticks) => info!(feed = self.name, ticks, "Feed stopped"),
                Err(_) => error!(feed = self.name, "Feed thread panicked"),
            }
        }
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Call `tick` with the elapsed seconds at `rate_hz` until it returns `false`
/// or the handle is stopped.
pub fn spawn_feed<F>(name: &'static str, rate_hz: u32, mut tick: F) -> io::Result<FeedHandle>
where
    F: FnMut(f64) -> bool + Send + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    let period = Duration::from_secs_f64(1.0 / rate_hz.max(1) as f64);
    let handle = {
        let stop = stop.clone();
        thread::Builder::new().name(name.into()).spawn(move || {
            let start = Instant::now();
            let mut ticks = 0u64;
            while !stop.load(Ordering::Relaxed) {
                if !tick(start.elapsed().as_secs_f64()) {
                    debug!(feed = name, "Feed finished");
                    break;
                }
                ticks += 1;
                thread::sleep(period);
            }
            ticks
        })?
    };
    info!(feed = name, rate_hz, "Feed started");

    Ok(FeedHandle {
        name,
        stop,
        handle: Some(handle),
    })
}

/// 6-DoF sensor events following `motion`.
pub fn sensor_feed(
    feed: SensorFeed,
    motion: SyntheticMotion,
    rate_hz: u32,
) -> io::Result<FeedHandle> {
    spawn_feed("feed-sensor", rate_hz, move |t| {
        feed.push_pose(&motion.sample_at(t))
    })
}

/// Tracking-service reports following `motion`.
pub fn service_feed(
    feed: ServiceFeed,
    motion: SyntheticMotion,
    rate_hz: u32,
) -> io::Result<FeedHandle> {
    spawn_feed("feed-tracking", rate_hz, move |t| {
        feed.push(motion.service_pose_at(t))
    })
}

/// Raw gyro and accelerometer readings for a device yawing like `motion`.
///
/// Stays still for the first `settle_secs` so gyro calibration sees no motion.
pub fn imu_feed(
    feed: ImuFeed,
    motion: SyntheticMotion,
    rate_hz: u32,
    settle_secs: f64,
) -> io::Result<FeedHandle> {
    spawn_feed("feed-imu", rate_hz, move |t| {
        let moving = (t - settle_secs).max(0.0);
        feed.push(RawImuSample {
            gyro: Vec3::new(0.0, 0.0, yaw_rate(&motion, moving)),
            accel: Vec3::new(0.0, 0.0, GRAVITY),
            timestamp_ns: (t * 1e9) as i64,
        })
    })
}

/// Angular velocity (rad/s) of the yaw in [`SyntheticMotion::sample_at`].
fn yaw_rate(motion: &SyntheticMotion, t: f64) -> f32 {
    let omega = std::f64::consts::TAU / motion.period_secs;
    (-(motion.max_yaw as f64) * omega * (t * omega).cos()) as f32
}
