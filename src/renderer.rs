use anyhow::{anyhow, Result};
use arpose_camera::CameraTransform;
use glam::Mat4;
use tracing::{debug, info};

/// The rendering collaborator the session drives.
///
/// All methods are called from the render thread with the camera lock held.
pub trait SceneRenderer: Send {
    /// Texture the camera image streams into, once the GL context created it.
    fn texture_id(&self) -> Option<u32>;

    fn set_projection_matrix(&mut self, projection: Mat4);

    fn set_camera_transform(&mut self, transform: &CameraTransform);

    /// UVs of the background quad corners.
    fn set_background_uv(&mut self, uv: [f32; 8]);

    /// Start streaming the color camera into the current texture.
    fn connect_camera(&mut self) -> Result<()>;

    fn disconnect_camera(&mut self);

    /// Copy the newest camera frame into the texture. Returns its timestamp.
    fn update_texture(&mut self) -> Option<f64>;
}

/// A renderer with no GPU behind it. Keeps what it was given so it can be
/// inspected and logged.
pub struct HeadlessRenderer {
    texture_id: Option<u32>,
    projection: Option<Mat4>,
    camera: CameraTransform,
    background_uv: [f32; 8],
    camera_connected: bool,
    camera_connects: u32,
    frames_streamed: u64,
    fail_connect: bool,
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self {
            texture_id: Some(1),
            projection: None,
            camera: CameraTransform::default(),
            background_uv: arpose_camera::texture_coords(Default::default()),
            camera_connected: false,
            camera_connects: 0,
            frames_streamed: 0,
            fail_connect: false,
        }
    }

    /// Simulate a recycled GL context that re-created the camera texture.
    #[cfg(test)]
    pub fn recycle_context(&mut self) {
        let next = self.texture_id.map_or(1, |id| id + 1);
        debug!(texture_id = next, "Camera texture re-created");
        self.texture_id = Some(next);
        self.camera_connected = false;
    }

    /// Make every `connect_camera` call fail.
    #[cfg(test)]
    pub fn with_failing_camera(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    pub fn projection(&self) -> Option<Mat4> {
        self.projection
    }

    pub fn camera(&self) -> CameraTransform {
        self.camera
    }

    pub fn background_uv(&self) -> [f32; 8] {
        self.background_uv
    }

    pub fn is_camera_connected(&self) -> bool {
        self.camera_connected
    }

    pub fn camera_connects(&self) -> u32 {
        self.camera_connects
    }

    pub fn frames_streamed(&self) -> u64 {
        self.frames_streamed
    }
}

impl Default for HeadlessRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneRenderer for HeadlessRenderer {
    fn texture_id(&self) -> Option<u32> {
        self.texture_id
    }

    fn set_projection_matrix(&mut self, projection: Mat4) {
        debug!(?projection, "Projection matrix set");
        self.projection = Some(projection);
    }

    fn set_camera_transform(&mut self, transform: &CameraTransform) {
        self.camera = *transform;
    }

    fn set_background_uv(&mut self, uv: [f32; 8]) {
        debug!(?uv, "Background UVs set");
        self.background_uv = uv;
    }

    fn connect_camera(&mut self) -> Result<()> {
        if self.fail_connect {
            return Err(anyhow!("color camera unavailable"));
        }
        self.camera_connected = true;
        self.camera_connects += 1;
        info!(texture_id = ?self.texture_id, "Camera stream connected");
        Ok(())
    }

    fn disconnect_camera(&mut self) {
        if self.camera_connected {
            info!("Camera stream disconnected");
        }
        self.camera_connected = false;
    }

    fn update_texture(&mut self) -> Option<f64> {
        if !self.camera_connected {
            return None;
        }
        self.frames_streamed += 1;
        Some(self.frames_streamed as f64)
    }
}
