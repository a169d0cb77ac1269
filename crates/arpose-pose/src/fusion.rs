use crate::types::RawImuSample;
use ahrs::{Ahrs, Madgwick};
use glam::{Quat, Vec3};
use nalgebra::Vector3;
use tracing::{info, warn};

/// Sample rate assumed when the configured one is unusable.
pub const DEFAULT_SAMPLE_RATE_HZ: f64 = 200.0;

/// Sensor fusion using the Madgwick AHRS filter.
///
/// Converts raw gyro + accelerometer readings into an orientation relative
/// to the first orientation seen after calibration.
pub struct SensorFusion {
    filter: Madgwick<f64>,
    /// Gyroscope bias (average of calibration samples).
    gyro_bias: Vec3,
    calibration: CalibrationState,
    /// Orientation that maps to identity. Captured on the first fused sample.
    zero_ref: Option<Quat>,
}

enum CalibrationState {
    Collecting { samples: Vec<Vec3>, target: usize },
    Calibrated,
}

impl SensorFusion {
    /// A non-positive `sample_rate_hz` falls back to [`DEFAULT_SAMPLE_RATE_HZ`].
    pub fn new(sample_rate_hz: f64, beta: f32, calibration_samples: u32) -> Self {
        let rate = if sample_rate_hz.is_finite() && sample_rate_hz > 0.0 {
            sample_rate_hz
        } else {
            warn!(sample_rate_hz, "Invalid IMU sample rate, using default");
            DEFAULT_SAMPLE_RATE_HZ
        };
        Self {
            filter: Madgwick::new(1.0 / rate, beta as f64),
            gyro_bias: Vec3::ZERO,
            calibration: CalibrationState::Collecting {
                samples: Vec::with_capacity(calibration_samples as usize),
                target: calibration_samples as usize,
            },
            zero_ref: None,
        }
    }

    /// Fuse one raw reading. `None` while calibrating or if the filter
    /// rejects the reading (zero acceleration).
    pub fn update(&mut self, sample: &RawImuSample) -> Option<Quat> {
        if let CalibrationState::Collecting { samples, target } = &mut self.calibration {
            samples.push(sample.gyro);
            if samples.len() >= *target {
                let sum: Vec3 = samples.iter().copied().sum();
                self.gyro_bias = sum / samples.len().max(1) as f32;
                self.calibration = CalibrationState::Calibrated;
                info!(bias = ?self.gyro_bias, "Gyro bias calibrated");
            }
            return None;
        }

        let gyro = to_vector(sample.gyro - self.gyro_bias);
        self.filter.update_imu(&gyro, &to_vector(sample.accel)).ok()?;

        let absolute = self.filter_orientation();
        let zero_ref = *self.zero_ref.get_or_insert(absolute);
        Some(zero_ref.conjugate() * absolute)
    }

    /// Restart gyro bias calibration and re-capture the zero reference.
    pub fn recalibrate(&mut self, samples: u32) {
        self.calibration = CalibrationState::Collecting {
            samples: Vec::with_capacity(samples as usize),
            target: samples as usize,
        };
        self.gyro_bias = Vec3::ZERO;
        self.zero_ref = None;
        info!(samples, "Gyro recalibration started");
    }

    pub fn is_calibrated(&self) -> bool {
        matches!(self.calibration, CalibrationState::Calibrated)
    }

    pub fn gyro_bias(&self) -> Vec3 {
        self.gyro_bias
    }

    fn filter_orientation(&self) -> Quat {
        // nalgebra stores quaternions as (i, j, k, w).
        let [x, y, z, w]: [f64; 4] = self.filter.quat.coords.into();
        Quat::from_xyzw(x as f32, y as f32, z as f32, w as f32)
    }
}

fn to_vector(v: Vec3) -> Vector3<f64> {
    Vector3::new(v.x as f64, v.y as f64, v.z as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stationary(gyro: Vec3) -> RawImuSample {
        RawImuSample {
            gyro,
            accel: Vec3::new(0.0, 0.0, 9.81),
            timestamp_ns: 0,
        }
    }

    #[test]
    fn no_output_until_calibrated() {
        let mut fusion = SensorFusion::new(200.0, 0.1, 3);
        assert!(fusion.update(&stationary(Vec3::ZERO)).is_none());
        assert!(fusion.update(&stationary(Vec3::ZERO)).is_none());
        assert!(!fusion.is_calibrated());
        assert!(fusion.update(&stationary(Vec3::ZERO)).is_none());
        assert!(fusion.is_calibrated());
        assert!(fusion.update(&stationary(Vec3::ZERO)).is_some());
    }

    #[test]
    fn bias_is_average_of_calibration_samples() {
        let mut fusion = SensorFusion::new(200.0, 0.1, 2);
        fusion.update(&stationary(Vec3::new(0.02, 0.0, -0.04)));
        fusion.update(&stationary(Vec3::new(0.04, 0.0, -0.02)));
        let bias = fusion.gyro_bias();
        assert!((bias.x - 0.03).abs() < 1e-6);
        assert!((bias.z + 0.03).abs() < 1e-6);
    }

    #[test]
    fn first_fused_orientation_is_identity() {
        let mut fusion = SensorFusion::new(200.0, 0.1, 1);
        fusion.update(&stationary(Vec3::ZERO));
        let q = fusion.update(&stationary(Vec3::ZERO)).unwrap();
        assert!(q.angle_between(Quat::IDENTITY) < 1e-4);
    }

    #[test]
    fn zero_sample_rate_still_fuses_finite_orientations() {
        let mut fusion = SensorFusion::new(0.0, 0.1, 1);
        fusion.update(&stationary(Vec3::ZERO));
        for _ in 0..10 {
            let q = fusion.update(&stationary(Vec3::new(0.0, 0.0, 0.5))).unwrap();
            assert!(q.is_finite(), "{q:?}");
        }
    }

    #[test]
    fn recalibrate_resets_state() {
        let mut fusion = SensorFusion::new(200.0, 0.1, 1);
        fusion.update(&stationary(Vec3::new(0.1, 0.1, 0.1)));
        assert!(fusion.is_calibrated());
        fusion.recalibrate(2);
        assert!(!fusion.is_calibrated());
        assert_eq!(fusion.gyro_bias(), Vec3::ZERO);
    }
}
