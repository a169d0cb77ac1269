use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrientationError {
    #[error("invalid display rotation {0}")]
    InvalidRotation(i32),
}

/// Quarter turns of the display from its natural orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayRotation {
    #[default]
    Rotation0,
    Rotation90,
    Rotation180,
    Rotation270,
}

impl DisplayRotation {
    /// From the display API's surface constant (0, 1, 2, 3).
    pub fn from_surface(value: i32) -> Result<Self, OrientationError> {
        if (0..4).contains(&value) {
            Ok(Self::from_quarter_turns(value))
        } else {
            Err(OrientationError::InvalidRotation(value))
        }
    }

    /// From degrees (0, 90, 180, 270).
    pub fn from_degrees(degrees: i32) -> Result<Self, OrientationError> {
        match degrees {
            0 => Ok(Self::Rotation0),
            90 => Ok(Self::Rotation90),
            180 => Ok(Self::Rotation180),
            270 => Ok(Self::Rotation270),
            other => Err(OrientationError::InvalidRotation(other)),
        }
    }

    pub fn quarter_turns(self) -> i32 {
        self as i32
    }

    pub fn degrees(self) -> i32 {
        self.quarter_turns() * 90
    }

    /// The next rotation clockwise.
    pub fn rotated(self) -> Self {
        Self::from_quarter_turns(self.quarter_turns() + 1)
    }

    fn from_quarter_turns(turns: i32) -> Self {
        Self::ALL[quarter_turn_index(turns)]
    }

    const ALL: [DisplayRotation; 4] = [
        DisplayRotation::Rotation0,
        DisplayRotation::Rotation90,
        DisplayRotation::Rotation180,
        DisplayRotation::Rotation270,
    ];
}

/// Quarter turns between the color camera sensor and the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationOffset {
    #[default]
    Rotation0,
    Rotation90,
    Rotation180,
    Rotation270,
}

impl RotationOffset {
    pub const ALL: [RotationOffset; 4] = [
        RotationOffset::Rotation0,
        RotationOffset::Rotation90,
        RotationOffset::Rotation180,
        RotationOffset::Rotation270,
    ];

    pub fn from_quarter_turns(turns: i32) -> Self {
        Self::ALL[quarter_turn_index(turns)]
    }

    pub fn quarter_turns(self) -> i32 {
        self as i32
    }

    /// Whether image width and height trade places.
    pub fn swaps_axes(self) -> bool {
        matches!(self, Self::Rotation90 | Self::Rotation270)
    }
}

/// `turns` reduced to 0..4, counting negative turns backwards.
fn quarter_turn_index(turns: i32) -> usize {
    turns.rem_euclid(4) as usize
}

/// Offset between the display and a camera sensor mounted at
/// `camera_orientation_degrees`. Unrecognized mounting angles count as 0.
pub fn resolve_offset(
    display: DisplayRotation,
    camera_orientation_degrees: i32,
) -> RotationOffset {
    let camera_turns = match camera_orientation_degrees {
        90 => 1,
        180 => 2,
        270 => 3,
        0 => 0,
        other => {
            debug!(degrees = other, "Unrecognized camera orientation, treating as 0");
            0
        }
    };
    RotationOffset::from_quarter_turns(display.quarter_turns() - camera_turns)
}

const TEXTURE_COORDS_0: [f32; 8] = [0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0];
const TEXTURE_COORDS_90: [f32; 8] = [1.0, 0.0, 1.0, 1.0, 0.0, 1.0, 0.0, 0.0];
const TEXTURE_COORDS_180: [f32; 8] = [1.0, 1.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0];
const TEXTURE_COORDS_270: [f32; 8] = [0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 1.0];

/// UVs of the four background-quad corners so the camera image appears upright.
pub fn texture_coords(offset: RotationOffset) -> [f32; 8] {
    match offset {
        RotationOffset::Rotation0 => TEXTURE_COORDS_0,
        RotationOffset::Rotation90 => TEXTURE_COORDS_90,
        RotationOffset::Rotation180 => TEXTURE_COORDS_180,
        RotationOffset::Rotation270 => TEXTURE_COORDS_270,
    }
}

/// Write side of the latest-display-rotation slot.
///
/// Platform display callbacks overwrite the slot; the frame loop picks up the
/// newest value through an [`OrientationWatcher`].
#[derive(Clone)]
pub struct OrientationSlot {
    tx: std::sync::Arc<watch::Sender<DisplayRotation>>,
}

/// Read side of the latest-display-rotation slot.
pub struct OrientationWatcher {
    rx: watch::Receiver<DisplayRotation>,
}

impl OrientationSlot {
    /// A slot holding `initial`. The watcher reports `initial` as a pending change.
    pub fn new(initial: DisplayRotation) -> (Self, OrientationWatcher) {
        let (tx, mut rx) = watch::channel(initial);
        rx.mark_changed();
        (
            Self {
                tx: std::sync::Arc::new(tx),
            },
            OrientationWatcher { rx },
        )
    }

    /// Record a display rotation. Repeating the current value is a no-op.
    pub fn set(&self, rotation: DisplayRotation) {
        self.tx.send_if_modified(|current| {
            if *current == rotation {
                false
            } else {
                *current = rotation;
                true
            }
        });
    }

    pub fn current(&self) -> DisplayRotation {
        *self.tx.borrow()
    }
}

impl OrientationWatcher {
    /// The newest rotation if it changed since the last call.
    pub fn take_change(&mut self) -> Option<DisplayRotation> {
        match self.rx.has_changed() {
            Ok(true) => Some(*self.rx.borrow_and_update()),
            _ => None,
        }
    }

    pub fn current(&self) -> DisplayRotation {
        *self.rx.borrow()
    }
}
