use crate::types::{Intrinsics, PoseSample};
use crate::PoseListener;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// State shared between a pose source, its callback thread and the render thread.
///
/// Holds the latest-pose slot, the delivery gate that orders cache writes with
/// listener notifications, and the current intrinsics. Sources compose a hub
/// instead of inheriting mutable fields from a common base.
pub struct PoseHub {
    /// Latest pose slot. Locked only for the copy in or out.
    latest: Mutex<PoseSample>,
    /// Whether samples are currently accepted. Held for the whole
    /// write-then-notify sequence of each delivery.
    delivering: Mutex<bool>,
    intrinsics: RwLock<Intrinsics>,
    listener: Arc<dyn PoseListener>,
}

impl PoseHub {
    pub fn new(listener: Arc<dyn PoseListener>, intrinsics: Intrinsics) -> Self {
        Self {
            latest: Mutex::new(PoseSample::default()),
            delivering: Mutex::new(false),
            intrinsics: RwLock::new(intrinsics),
            listener,
        }
    }

    /// Copy of the most recent sample (identity pose before the first one).
    pub fn latest(&self) -> PoseSample {
        *self.latest.lock()
    }

    pub fn intrinsics(&self) -> Intrinsics {
        *self.intrinsics.read()
    }

    pub fn set_intrinsics(&self, intrinsics: Intrinsics) {
        *self.intrinsics.write() = intrinsics;
    }

    /// Start accepting samples.
    pub fn open_delivery(&self) {
        *self.delivering.lock() = true;
    }

    /// Stop accepting samples.
    ///
    /// Blocks until an in-flight [`publish`](Self::publish) has returned; once
    /// this returns the listener receives no further notifications.
    pub fn close_delivery(&self) {
        *self.delivering.lock() = false;
    }

    /// Whether samples are accepted. Cleared by `close_delivery`, including
    /// when a source's stream ends on its own.
    pub fn is_delivering(&self) -> bool {
        *self.delivering.lock()
    }

    /// Store `sample` as the latest pose and notify the listener.
    ///
    /// Returns `false` (and drops the sample) when delivery is closed. The
    /// listener runs inside the delivery section and must not call back into
    /// the owning source's `stop_providing`.
    pub fn publish(&self, sample: PoseSample) -> bool {
        let delivering = self.delivering.lock();
        if !*delivering {
            return false;
        }
        *self.latest.lock() = sample;
        self.listener.on_new_pose_data(&sample);
        true
    }

    pub fn notify_setup_complete(&self) {
        self.listener.on_setup_complete();
    }
}

/// Read side of a [`PoseHub`], for the render thread.
///
/// Reads take only the slot lock, never the source's start/stop path.
#[derive(Clone)]
pub struct PoseReader {
    hub: Arc<PoseHub>,
}

impl PoseReader {
    pub fn new(hub: Arc<PoseHub>) -> Self {
        Self { hub }
    }

    pub fn latest(&self) -> PoseSample {
        self.hub.latest()
    }

    pub fn intrinsics(&self) -> Intrinsics {
        self.hub.intrinsics()
    }

    pub fn is_providing(&self) -> bool {
        self.hub.is_delivering()
    }
}
