use crate::orientation::RotationOffset;
use arpose_pose::Intrinsics;
use glam::{Mat4, Vec4};

/// Near clipping plane (meters).
pub const NEAR_PLANE: f32 = 0.1;
/// Far clipping plane (meters).
pub const FAR_PLANE: f32 = 100.0;

/// Clip-plane extents of an off-axis frustum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrustumBounds {
    pub left: f32,
    pub right: f32,
    pub bottom: f32,
    pub top: f32,
    pub near: f32,
    pub far: f32,
}

/// Frustum matching a pinhole camera with intrinsics `intrinsics`, seen
/// from a display rotated by `offset` relative to the camera sensor.
///
/// The principal point is taken to be the image center.
pub fn frustum_bounds(intrinsics: &Intrinsics, offset: RotationOffset) -> FrustumBounds {
    let mut width = intrinsics.width() as f32;
    let mut height = intrinsics.height() as f32;
    let mut fx = intrinsics.focal_length_x() as f32;
    let mut fy = intrinsics.focal_length_y() as f32;

    // Sensor axes turn with the device.
    if offset.swaps_axes() {
        std::mem::swap(&mut width, &mut height);
        std::mem::swap(&mut fx, &mut fy);
    }

    let x_scale = NEAR_PLANE / fx;
    let y_scale = NEAR_PLANE / fy;

    FrustumBounds {
        left: -x_scale * width / 2.0,
        right: x_scale * width / 2.0,
        bottom: -y_scale * height / 2.0,
        top: y_scale * height / 2.0,
        near: NEAR_PLANE,
        far: FAR_PLANE,
    }
}

/// Projection matrix for the scene camera so virtual content lines up with
/// the color camera image. Column-major, OpenGL clip conventions.
pub fn compute_projection(intrinsics: &Intrinsics, offset: RotationOffset) -> Mat4 {
    let b = frustum_bounds(intrinsics, offset);
    frustum(b.left, b.right, b.bottom, b.top, b.near, b.far)
}

/// Perspective matrix for an arbitrary frustum, as `glFrustum` builds it.
pub fn frustum(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4 {
    let width = right - left;
    let height = top - bottom;
    let depth = far - near;
    Mat4::from_cols(
        Vec4::new(2.0 * near / width, 0.0, 0.0, 0.0),
        Vec4::new(0.0, 2.0 * near / height, 0.0, 0.0),
        Vec4::new(
            (right + left) / width,
            (top + bottom) / height,
            -(far + near) / depth,
            -1.0,
        ),
        Vec4::new(0.0, 0.0, -2.0 * far * near / depth, 0.0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn camera() -> Intrinsics {
        Intrinsics::new(1920, 1080, 1500.0, 1400.0).unwrap()
    }

    /// Recover near/far from the depth terms of a projection matrix.
    fn clip_planes(m: &Mat4) -> (f32, f32) {
        let a = m.z_axis.z;
        let b = m.w_axis.z;
        (b / (a - 1.0), b / (a + 1.0))
    }

    #[test]
    fn entries_are_finite_for_all_offsets() {
        for intrinsics in [camera(), Intrinsics::default()] {
            for offset in RotationOffset::ALL {
                let m = compute_projection(&intrinsics, offset);
                assert!(m.to_cols_array().iter().all(|v| v.is_finite()));
                let (near, far) = clip_planes(&m);
                assert!((near - NEAR_PLANE).abs() < 1e-5);
                assert!((far - FAR_PLANE).abs() < 5e-2);
            }
        }
    }

    #[test]
    fn scale_terms_follow_focal_length_over_image_size() {
        let m = compute_projection(&camera(), RotationOffset::Rotation0);
        assert!((m.x_axis.x - 2.0 * 1500.0 / 1920.0).abs() < 1e-5);
        assert!((m.y_axis.y - 2.0 * 1400.0 / 1080.0).abs() < 1e-5);
        // Centered principal point.
        assert!(m.z_axis.x.abs() < 1e-6);
        assert!(m.z_axis.y.abs() < 1e-6);
    }

    #[test]
    fn quarter_turns_swap_axes() {
        let upright = frustum_bounds(&camera(), RotationOffset::Rotation0);
        for offset in [RotationOffset::Rotation90, RotationOffset::Rotation270] {
            let turned = frustum_bounds(&camera(), offset);
            assert!((turned.right - upright.top).abs() < 1e-7);
            assert!((turned.top - upright.right).abs() < 1e-7);

            let m = compute_projection(&camera(), offset);
            assert!((m.x_axis.x - 2.0 * 1400.0 / 1080.0).abs() < 1e-5);
            assert!((m.y_axis.y - 2.0 * 1500.0 / 1920.0).abs() < 1e-5);
        }
    }

    #[test]
    fn half_turn_matches_upright() {
        assert_eq!(
            compute_projection(&camera(), RotationOffset::Rotation0),
            compute_projection(&camera(), RotationOffset::Rotation180)
        );
    }

    #[test]
    fn frustum_matches_symmetric_perspective() {
        // A symmetric frustum is an ordinary right-handed GL perspective.
        let fov_y = 60.0_f32.to_radians();
        let aspect = 16.0 / 9.0;
        let top = NEAR_PLANE * (fov_y / 2.0).tan();
        let right = top * aspect;
        let m = frustum(-right, right, -top, top, NEAR_PLANE, FAR_PLANE);
        let expected = Mat4::perspective_rh_gl(fov_y, aspect, NEAR_PLANE, FAR_PLANE);
        assert!(m.abs_diff_eq(expected, 1e-5));
    }

    #[test]
    fn point_on_optical_axis_projects_to_center() {
        let m = compute_projection(&camera(), RotationOffset::Rotation0);
        let ndc = m.project_point3(Vec3::new(0.0, 0.0, -3.0));
        assert!(ndc.x.abs() < 1e-6);
        assert!(ndc.y.abs() < 1e-6);
    }
}
