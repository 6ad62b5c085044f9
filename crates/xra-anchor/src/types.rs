use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use glam::Mat4;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::host::WorldNode;

/// Stable external key for one native anchor of the current session.
///
/// Hosts map their opaque native anchor objects to a `u64` that stays the same
/// for as long as the anchor exists. Equality of handles is identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AnchorHandle(pub u64);

impl fmt::Display for AnchorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "native#{}", self.0)
    }
}

/// Identifier assigned by the anchor system when a handle is first seen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AnchorId(pub u64);

/// Process-wide id source. Ids are never reused, even across anchor systems.
static NEXT_ANCHOR_ID: AtomicU64 = AtomicU64::new(0);

impl AnchorId {
    /// Allocate the next identifier.
    pub fn next() -> Self {
        AnchorId(NEXT_ANCHOR_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for AnchorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "anchor#{}", self.0)
    }
}

/// Host-defined coordinate frame poses are expressed against
/// (e.g. `"local-floor"`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferenceSpace(pub String);

impl ReferenceSpace {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Pose reported by the host for one frame: 16 matrix components in the
/// XR device layout (column-major, translation in 12..15).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub matrix: [f32; 16],
}

impl Pose {
    pub fn new(matrix: [f32; 16]) -> Self {
        Self { matrix }
    }

    pub fn identity() -> Self {
        Self::new(Mat4::IDENTITY.to_cols_array())
    }

    pub fn from_translation(x: f32, y: f32, z: f32) -> Self {
        Self::new(Mat4::from_translation(glam::Vec3::new(x, y, z)).to_cols_array())
    }
}

/// A rigid transform handed to an anchor creator.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RigidTransform(pub Mat4);

impl RigidTransform {
    pub fn from_hit(hit: &HitResult) -> Self {
        Self(Mat4::from_cols_array(&hit.hit_matrix))
    }

    pub fn matrix(&self) -> Mat4 {
        self.0
    }
}

/// One hit-test candidate. Result lists are ordered nearest-first.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HitResult {
    pub hit_matrix: [f32; 16],
}

impl HitResult {
    pub fn new(hit_matrix: [f32; 16]) -> Self {
        Self { hit_matrix }
    }

    pub fn at(x: f32, y: f32, z: f32) -> Self {
        Self::new(Pose::from_translation(x, y, z).matrix)
    }
}

/// A select-type input event (trigger pull, screen tap, pinch).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectEvent {
    /// Host identifier of the input source that fired.
    pub input_source_id: u32,
    /// Timestamp of the frame the event was delivered in.
    pub frame_timestamp_us: i64,
}

impl SelectEvent {
    pub fn new(input_source_id: u32, frame_timestamp_us: i64) -> Self {
        Self {
            input_source_id,
            frame_timestamp_us,
        }
    }
}

/// The set of native anchors the host tracked in one frame.
///
/// Maps each handle to the timestamp at which the host last changed it.
/// Iteration follows insertion order so reconciliation output is deterministic.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameAnchorSet {
    anchors: IndexMap<AnchorHandle, i64>,
}

impl FrameAnchorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or refresh) a handle with its last-changed timestamp.
    pub fn insert(&mut self, handle: AnchorHandle, last_changed_us: i64) {
        self.anchors.insert(handle, last_changed_us);
    }

    pub fn contains(&self, handle: AnchorHandle) -> bool {
        self.anchors.contains_key(&handle)
    }

    pub fn last_changed_us(&self, handle: AnchorHandle) -> Option<i64> {
        self.anchors.get(&handle).copied()
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// `(handle, last_changed_us)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (AnchorHandle, i64)> + '_ {
        self.anchors.iter().map(|(h, t)| (*h, *t))
    }

    pub fn handles(&self) -> impl Iterator<Item = AnchorHandle> + '_ {
        self.anchors.keys().copied()
    }
}

impl FromIterator<(AnchorHandle, i64)> for FrameAnchorSet {
    fn from_iter<I: IntoIterator<Item = (AnchorHandle, i64)>>(iter: I) -> Self {
        Self {
            anchors: iter.into_iter().collect(),
        }
    }
}

/// An anchor as seen by the engine: identity, native handle and the
/// world-space transform to apply to anything attached to it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackedAnchor {
    pub id: AnchorId,
    pub handle: AnchorHandle,
    /// `None` until the host has resolved a pose at least once.
    pub transformation_matrix: Option<Mat4>,
}

impl TrackedAnchor {
    pub fn new(id: AnchorId, handle: AnchorHandle) -> Self {
        Self {
            id,
            handle,
            transformation_matrix: None,
        }
    }
}

/// One notification produced by reconciliation, in emission order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnchorEvent {
    Added { anchor: TrackedAnchor },
    Updated { anchor: TrackedAnchor },
    Removed { anchor: TrackedAnchor },
}

impl AnchorEvent {
    pub fn anchor(&self) -> &TrackedAnchor {
        match self {
            AnchorEvent::Added { anchor }
            | AnchorEvent::Updated { anchor }
            | AnchorEvent::Removed { anchor } => anchor,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AnchorEvent::Added { .. } => "added",
            AnchorEvent::Updated { .. } => "updated",
            AnchorEvent::Removed { .. } => "removed",
        }
    }

    pub fn is_removal(&self) -> bool {
        matches!(self, AnchorEvent::Removed { .. })
    }
}

/// Construction-time options of the anchor system.
#[derive(Clone, Default)]
pub struct AnchorSystemOptions {
    /// Node used to convert session-local anchor poses into world space.
    pub world_parent_node: Option<Arc<dyn WorldNode>>,
    /// Create select-driven anchors on the plane detector when one is set.
    pub use_plane_detection: bool,
    /// Create a new anchor every time a select event fires.
    pub add_anchor_on_select: bool,
}

impl fmt::Debug for AnchorSystemOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnchorSystemOptions")
            .field("world_parent_node", &self.world_parent_node.is_some())
            .field("use_plane_detection", &self.use_plane_detection)
            .field("add_anchor_on_select", &self.add_anchor_on_select)
            .finish()
    }
}
