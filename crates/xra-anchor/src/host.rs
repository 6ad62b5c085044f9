//! Host boundary.
//!
//! Everything the anchor system consumes from the engine/device lives behind
//! these traits. No concrete device integration belongs in this crate; the
//! test host lives in `xra-testkit`.
//!
//! Asynchronous operations return boxed futures rather than being `async fn`:
//! the *call* is the request (a hit-test is issued, a creation is requested)
//! and the future only carries the eventual answer. Dropping the future must
//! not cancel the request on the host side.

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use glam::Mat4;

use crate::{
    AnchorHandle, FrameAnchorSet, HitResult, Pose, ReferenceSpace, RigidTransform, SelectEvent,
};

pub type HitTestFuture = BoxFuture<'static, Vec<HitResult>>;
pub type CreateAnchorFuture = BoxFuture<'static, Result<AnchorHandle, CreateAnchorError>>;

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// Read-only view of one rendered XR frame. Valid only for the duration of
/// the frame callback.
pub trait XrFrame {
    /// Per-frame unique timestamp.
    fn timestamp_us(&self) -> i64;

    /// Anchors the device tracked this frame. `None` when the device does not
    /// report anchors at all.
    fn tracked_anchors(&self) -> Option<&FrameAnchorSet>;

    /// Pose of an anchor relative to `space`, if the device can resolve it
    /// this frame.
    fn anchor_pose(&self, handle: AnchorHandle, space: &ReferenceSpace) -> Option<Pose>;
}

// ---------------------------------------------------------------------------
// Session host
// ---------------------------------------------------------------------------

/// Opaque registration returned by the host for a frame observer or a select
/// listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerToken(pub u64);

/// The XR session as seen by features: reference space, scene convention,
/// event registration and the session-level async operations.
pub trait XrHost: Send + Sync {
    /// Reference space poses and hit-tests are expressed against.
    fn reference_space(&self) -> ReferenceSpace;

    /// `true` when the consuming scene uses a right-handed coordinate system.
    fn scene_right_handed(&self) -> bool;

    /// Register `feature` for per-frame callbacks.
    fn add_frame_observer(&self, feature: &'static str) -> ListenerToken;

    /// Remove a frame observer. Unknown tokens are ignored.
    fn remove_frame_observer(&self, token: ListenerToken);

    /// Register `feature` for select events.
    fn add_select_listener(&self, feature: &'static str) -> ListenerToken;

    /// Remove a select listener. Unknown tokens are ignored.
    fn remove_select_listener(&self, token: ListenerToken);

    /// The active session in its role as anchor creator.
    fn session_creator(&self) -> Arc<dyn AnchorCreator>;

    /// Issue a fresh hit-test along the ray of the input source that fired
    /// `event`. Results are ordered nearest-first.
    fn hit_test_with_select_event(&self, event: &SelectEvent, space: &ReferenceSpace)
        -> HitTestFuture;
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// A scene-graph node whose world matrix places session space in the world.
pub trait WorldNode: Send + Sync {
    fn world_matrix(&self) -> Mat4;
}

/// Hit-test feature that keeps the results of its own continuous hit-testing.
pub trait HitTestModule: Send + Sync {
    /// When `true` the module only tests on pointer-down, so its cached
    /// results are not current enough to reuse on select.
    fn test_on_pointer_down_only(&self) -> bool;

    /// Results of the module's most recent hit-test, nearest-first.
    fn last_native_hit_results(&self) -> Vec<HitResult>;
}

/// Anything that can create a native anchor: the session itself or a
/// detected plane.
pub trait AnchorCreator: Send + Sync {
    fn create_anchor(&self, transform: &RigidTransform, space: &ReferenceSpace)
        -> CreateAnchorFuture;
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a creator refused to create an anchor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CreateAnchorError {
    /// The device rejected the request (e.g. pose not trackable).
    Rejected(String),
    /// The session ended before the request completed.
    SessionEnded,
    /// The creator does not support anchors in this session.
    Unsupported,
}

impl fmt::Display for CreateAnchorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreateAnchorError::Rejected(msg) => write!(f, "anchor creation rejected: {msg}"),
            CreateAnchorError::SessionEnded => write!(f, "session ended before anchor creation"),
            CreateAnchorError::Unsupported => {
                write!(f, "anchors are not supported by this creator")
            }
        }
    }
}

impl std::error::Error for CreateAnchorError {}
