use arpose_pose::PoseSample;
use glam::{Mat4, Quat, Vec3};

/// Scene camera placement derived from a device pose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraTransform {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for CameraTransform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

impl CameraTransform {
    /// Place the scene camera at `pose`.
    ///
    /// The renderer composes rotations with the opposite handedness to the
    /// pose source, so the pose quaternion is always conjugated.
    pub fn from_pose(pose: &PoseSample) -> Self {
        Self {
            position: pose.position(),
            rotation: pose.orientation().conjugate(),
        }
    }

    /// View matrix (inverse of the camera world transform).
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position).inverse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_pose_round_trips() {
        let pose = PoseSample::new([1.0, 2.0, 3.0], [0.0, 0.0, 0.0, 1.0], 1000.0);
        let transform = CameraTransform::from_pose(&pose);
        assert_eq!(transform.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(transform.rotation, Quat::IDENTITY);
    }

    #[test]
    fn rotation_is_conjugated() {
        let q = Quat::from_rotation_y(0.5);
        let pose = PoseSample::new([0.0; 3], q.to_array(), 0.0);
        let transform = CameraTransform::from_pose(&pose);
        let expected = Quat::from_xyzw(-q.x, -q.y, -q.z, q.w);
        assert!(transform.rotation.abs_diff_eq(expected, 1e-6));
        assert!(transform
            .rotation
            .abs_diff_eq(Quat::from_rotation_y(-0.5), 1e-6));
    }

    #[test]
    fn view_matrix_moves_camera_to_origin() {
        let transform = CameraTransform {
            position: Vec3::new(0.0, 1.5, 2.0),
            rotation: Quat::from_rotation_x(0.3),
        };
        let eye = transform.view_matrix().transform_point3(transform.position);
        assert!(eye.length() < 1e-5);
    }
}
