use crate::renderer::SceneRenderer;
use anyhow::Result;
use arpose_camera::{
    compute_projection, resolve_offset, texture_coords, CameraTransform, OrientationWatcher,
    RotationOffset,
};
use arpose_pose::{Intrinsics, PoseListener, PoseReader, PoseSample, PoseSource};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// Notifications from the pose source, handled on the frame loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEvent {
    SetupComplete,
}

/// Listener handed to the pose source. Only forwards and counts; renderer
/// state is never touched from the pose threads.
pub struct SessionListener {
    events: Sender<SourceEvent>,
    poses_received: AtomicU64,
}

impl PoseListener for SessionListener {
    fn on_setup_complete(&self) {
        let _ = self.events.send(SourceEvent::SetupComplete);
    }

    fn on_new_pose_data(&self, pose: &PoseSample) {
        self.poses_received.fetch_add(1, Ordering::Relaxed);
        trace!(timestamp = pose.timestamp(), "New pose");
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    /// Mounting angle of the color camera sensor, in degrees.
    pub camera_orientation_degrees: i32,
    pub camera_permission_granted: bool,
}

/// Renderer plus the state guarded by the camera lock.
struct Stage<R> {
    renderer: R,
    connected_texture_id: Option<u32>,
    offset: RotationOffset,
    /// Inputs of the projection last given to the renderer.
    projected_with: Option<(Intrinsics, RotationOffset)>,
}

/// Ties a pose source to a renderer across the frame loop and lifecycle events.
///
/// The source lock is held only for setup, start and stop. The render thread
/// reads poses through a [`PoseReader`], which takes the cache lock just for
/// the copy, so teardown and connect never stall a frame. `pause` releases
/// the camera lock before stopping the source, since stopping waits for
/// in-flight callbacks.
pub struct Session<R: SceneRenderer> {
    source: Mutex<Box<dyn PoseSource>>,
    reader: PoseReader,
    stage: Mutex<Stage<R>>,
    orientation: Mutex<OrientationWatcher>,
    settings: SessionSettings,
    events: Receiver<SourceEvent>,
    listener: Arc<SessionListener>,
    frame_count: AtomicU64,
}

impl<R: SceneRenderer> Session<R> {
    /// `make_source` builds the pose source around the session's listener.
    pub fn new<F>(
        renderer: R,
        settings: SessionSettings,
        orientation: OrientationWatcher,
        make_source: F,
    ) -> Result<Self>
    where
        F: FnOnce(Arc<dyn PoseListener>) -> Result<Box<dyn PoseSource>>,
    {
        let (events_tx, events) = unbounded();
        let listener = Arc::new(SessionListener {
            events: events_tx,
            poses_received: AtomicU64::new(0),
        });
        let shared: Arc<dyn PoseListener> = listener.clone();
        let source = make_source(shared)?;
        if !settings.camera_permission_granted {
            warn!("Camera permission not granted, running without camera image");
        }

        Ok(Self {
            reader: source.reader(),
            source: Mutex::new(source),
            stage: Mutex::new(Stage {
                renderer,
                connected_texture_id: None,
                offset: RotationOffset::default(),
                projected_with: None,
            }),
            orientation: Mutex::new(orientation),
            settings,
            events,
            listener,
            frame_count: AtomicU64::new(0),
        })
    }

    /// Begin (or resume) the session: set up the pose source. Providing
    /// starts once the source reports setup complete.
    pub fn start(&self) {
        self.source.lock().setup();
    }

    /// Handle pending pose source notifications.
    pub fn pump_events(&self) {
        while let Ok(event) = self.events.try_recv() {
            match event {
                SourceEvent::SetupComplete => {
                    info!("Pose source ready, starting");
                    if let Err(e) = self.source.lock().start_providing() {
                        warn!(%e, "Pose source not providing");
                    }
                }
            }
        }
    }

    /// Per-frame update, run before the scene draws.
    ///
    /// Errors and panics are logged and contained so one bad frame does not
    /// end the session.
    pub fn on_pre_frame(&self) {
        self.frame_count.fetch_add(1, Ordering::Relaxed);
        match panic::catch_unwind(AssertUnwindSafe(|| self.update_frame())) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(?e, "Frame update failed"),
            Err(payload) => error!(
                message = panic_message(payload.as_ref()),
                "Panic on the render thread"
            ),
        }
    }

    fn update_frame(&self) -> Result<()> {
        let rotation_change = self.orientation.lock().take_change();
        let intrinsics = self.reader.intrinsics();
        let pose = self.reader.latest();

        let mut stage = self.stage.lock();

        if let Some(rotation) = rotation_change {
            let offset = resolve_offset(rotation, self.settings.camera_orientation_degrees);
            stage.renderer.set_background_uv(texture_coords(offset));
            stage.offset = offset;
            info!(
                display_degrees = rotation.degrees(),
                offset = offset.quarter_turns(),
                "Display orientation changed"
            );
        }

        let wanted = (intrinsics, stage.offset);
        if stage.projected_with != Some(wanted) {
            let projection = compute_projection(&intrinsics, stage.offset);
            stage.renderer.set_projection_matrix(projection);
            stage.projected_with = Some(wanted);
            debug!(
                width = intrinsics.width(),
                height = intrinsics.height(),
                offset = stage.offset.quarter_turns(),
                "Scene camera projection configured"
            );
        }

        if self.settings.camera_permission_granted {
            // A recycled GL context may hand out a new texture id.
            let texture_id = stage.renderer.texture_id();
            if texture_id.is_some() && stage.connected_texture_id != texture_id {
                stage.renderer.connect_camera()?;
                stage.connected_texture_id = texture_id;
                debug!(?texture_id, "Connected camera to texture");
            }
            stage.renderer.update_texture();
        }

        stage
            .renderer
            .set_camera_transform(&CameraTransform::from_pose(&pose));
        Ok(())
    }

    /// The render surface changed size; the renderer reset its projection.
    pub fn surface_changed(&self) {
        self.stage.lock().projected_with = None;
    }

    /// Disconnect the camera and stop the pose source.
    pub fn pause(&self) {
        {
            let mut stage = self.stage.lock();
            if self.settings.camera_permission_granted {
                stage.renderer.disconnect_camera();
                stage.connected_texture_id = None;
            }
        }
        self.source.lock().stop_providing();
        info!(
            frames = self.frame_count(),
            poses = self.poses_received(),
            "Session paused"
        );
    }

    pub fn is_providing(&self) -> bool {
        self.reader.is_providing()
    }

    pub fn latest_pose(&self) -> PoseSample {
        self.reader.latest()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count.load(Ordering::Relaxed)
    }

    pub fn poses_received(&self) -> u64 {
        self.listener.poses_received.load(Ordering::Relaxed)
    }

    /// Inspect the renderer under the camera lock.
    pub fn with_renderer<T>(&self, f: impl FnOnce(&mut R) -> T) -> T {
        f(&mut self.stage.lock().renderer)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
