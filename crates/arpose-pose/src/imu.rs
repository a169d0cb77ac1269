use crate::fusion::SensorFusion;
use crate::sensor::{SensorDevice, SensorEvent};
use crate::types::RawImuSample;
use crate::worker::Worker;
use crate::SourceError;
use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use tracing::{trace, warn};

const IMU_QUEUE_DEPTH: usize = 256;

/// A rotation-only pose sensor built from raw gyro + accelerometer readings.
///
/// Opening the device starts a fusion thread that turns each raw sample into
/// a 6-DoF event with zero translation.
pub struct ImuFusionSensor {
    raw: Receiver<RawImuSample>,
    sample_rate_hz: f64,
    madgwick_beta: f32,
    calibration_samples: u32,
    worker: Option<Worker>,
}

/// Producer side of an [`ImuFusionSensor`].
#[derive(Clone)]
pub struct ImuFeed {
    tx: Sender<RawImuSample>,
}

impl ImuFeed {
    /// Push a raw reading. Returns `false` if the sensor is gone.
    pub fn push(&self, sample: RawImuSample) -> bool {
        !matches!(self.tx.try_send(sample), Err(TrySendError::Disconnected(_)))
    }
}

impl ImuFusionSensor {
    pub fn new(
        sample_rate_hz: f64,
        madgwick_beta: f32,
        calibration_samples: u32,
    ) -> (Self, ImuFeed) {
        let (tx, raw) = bounded(IMU_QUEUE_DEPTH);
        (
            Self {
                raw,
                sample_rate_hz,
                madgwick_beta,
                calibration_samples,
                worker: None,
            },
            ImuFeed { tx },
        )
    }
}

impl SensorDevice for ImuFusionSensor {
    fn name(&self) -> &str {
        "imu_fusion"
    }

    fn open(&mut self) -> Result<Receiver<SensorEvent>, SourceError> {
        self.close();

        let (events_tx, events_rx) = bounded(IMU_QUEUE_DEPTH);
        let raw = self.raw.clone();
        let fusion = SensorFusion::new(
            self.sample_rate_hz,
            self.madgwick_beta,
            self.calibration_samples,
        );
        self.worker = Some(Worker::spawn("imu-fusion", move |shutdown| {
            fusion_loop(raw, events_tx, shutdown, fusion)
        })?);
        Ok(events_rx)
    }

    fn close(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop();
        }
    }
}

impl Drop for ImuFusionSensor {
    fn drop(&mut self) {
        self.close();
    }
}

/// Background thread: fuse raw samples and forward orientation events.
fn fusion_loop(
    raw: Receiver<RawImuSample>,
    events: Sender<SensorEvent>,
    shutdown: Receiver<()>,
    mut fusion: SensorFusion,
) {
    loop {
        select! {
            recv(raw) -> sample => match sample {
                Ok(sample) => {
                    let Some(q) = fusion.update(&sample) else { continue };
                    let event = SensorEvent {
                        values: vec![q.x, q.y, q.z, q.w, 0.0, 0.0, 0.0],
                        timestamp_ns: sample.timestamp_ns,
                    };
                    match events.try_send(event) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => trace!("Fused event queue full, dropping"),
                        Err(TrySendError::Disconnected(_)) => break,
                    }
                }
                Err(_) => {
                    warn!("IMU stream closed");
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
    use glam::Vec3;
    use std::time::Duration;

    #[test]
    fn fused_events_have_no_translation() {
        let (mut sensor, feed) = ImuFusionSensor::new(200.0, 0.1, 2);
        let events = sensor.open().unwrap();

        for i in 0..5 {
            assert!(feed.push(RawImuSample {
                gyro: Vec3::ZERO,
                accel: Vec3::new(0.0, 0.0, 9.81),
                timestamp_ns: i * 5_000_000,
            }));
        }

        // Two calibration samples produce nothing; the rest produce events.
        let first = events.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(first.values.len(), 7);
        assert_eq!(&first.values[4..], &[0.0, 0.0, 0.0]);
        assert_eq!(first.timestamp_ns, 10_000_000);

        sensor.close();
    }

    #[test]
    fn reopen_restarts_fusion() {
        let (mut sensor, _feed) = ImuFusionSensor::new(200.0, 0.1, 1);
        sensor.open().unwrap();
        sensor.open().unwrap();
        sensor.close();
        sensor.close();
    }
}
