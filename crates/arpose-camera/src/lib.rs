pub mod camera;
pub mod orientation;
pub mod projection;

pub use camera::CameraTransform;
pub use orientation::{
    resolve_offset, texture_coords, DisplayRotation, OrientationError, OrientationSlot,
    OrientationWatcher, RotationOffset,
};
pub use projection::{
    compute_projection, frustum, frustum_bounds, FrustumBounds, FAR_PLANE, NEAR_PLANE,
};
