//! Per-frame anchor reconciliation.
//!
//! Deterministic, no IO, no clock. The frame and the world parent are the
//! only inputs; the output is the ordered list of [`AnchorEvent`]s the frame
//! produced.
//!
//! # Invariants
//!
//! - **Removals first**: every `Removed` event of a frame precedes its
//!   `Added`/`Updated` events.
//! - **Unique handles**: the tracked list never holds a handle twice.
//! - **Stable ids**: an anchor keeps the id it got when first seen; ids are
//!   never reused.
//! - **Empty frame is a no-op**: a frame with no (or an empty) anchor set
//!   leaves all state untouched.
//! - **Quiet anchors stay quiet**: a handle whose last-changed timestamp is
//!   not the frame's timestamp produces no event and keeps its transform.

use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::{trace, warn};

use crate::host::{WorldNode, XrFrame};
use crate::matrix;
use crate::{AnchorEvent, AnchorHandle, AnchorId, ReferenceSpace, TrackedAnchor};

/// Everything pose resolution needs besides the frame itself.
pub struct PoseContext<'a> {
    pub space: &'a ReferenceSpace,
    /// `false` when the scene is left-handed and poses must be mirrored.
    pub right_handed: bool,
    pub world_parent: Option<&'a dyn WorldNode>,
}

/// Tracked anchors plus the handle set of the last reconciled frame.
#[derive(Debug, Default)]
pub struct AnchorTracker {
    /// Keyed by native handle, in order of first appearance.
    tracked: IndexMap<AnchorHandle, TrackedAnchor>,
    last_frame: HashSet<AnchorHandle>,
    warned_local_space: bool,
}

impl AnchorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracked anchors in order of first appearance.
    pub fn tracked(&self) -> impl Iterator<Item = &TrackedAnchor> + '_ {
        self.tracked.values()
    }

    pub fn get(&self, handle: AnchorHandle) -> Option<&TrackedAnchor> {
        self.tracked.get(&handle)
    }

    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }

    /// Reconcile one frame against the previous one.
    pub fn reconcile_frame(
        &mut self,
        frame: &dyn XrFrame,
        ctx: &PoseContext<'_>,
    ) -> Vec<AnchorEvent> {
        let current = match frame.tracked_anchors() {
            Some(set) if !set.is_empty() => set,
            _ => return Vec::new(),
        };

        let mut events = Vec::new();

        // 1) Anchors the device stopped tracking.
        let gone: Vec<AnchorHandle> = self
            .tracked
            .keys()
            .filter(|h| !current.contains(**h))
            .copied()
            .collect();
        for handle in gone {
            if let Some(anchor) = self.tracked.shift_remove(&handle) {
                events.push(AnchorEvent::Removed { anchor });
            }
        }

        // 2) New anchors, and known anchors the device changed this frame.
        let now_us = frame.timestamp_us();
        for (handle, last_changed_us) in current.iter() {
            if !self.last_frame.contains(&handle) {
                let mut anchor = TrackedAnchor::new(AnchorId::next(), handle);
                self.resolve_pose(frame, &mut anchor, ctx);
                self.tracked.insert(handle, anchor.clone());
                events.push(AnchorEvent::Added { anchor });
            } else if last_changed_us == now_us {
                let Some(mut anchor) = self.tracked.get(&handle).cloned() else {
                    continue;
                };
                self.resolve_pose(frame, &mut anchor, ctx);
                self.tracked.insert(handle, anchor.clone());
                events.push(AnchorEvent::Updated { anchor });
            }
        }

        // 3) Full replacement, not a merge.
        self.last_frame = current.handles().collect();

        events
    }

    fn resolve_pose(
        &mut self,
        frame: &dyn XrFrame,
        anchor: &mut TrackedAnchor,
        ctx: &PoseContext<'_>,
    ) {
        let Some(pose) = frame.anchor_pose(anchor.handle, ctx.space) else {
            trace!(handle = %anchor.handle, "no pose this frame; transform left as is");
            return;
        };

        let mut m = matrix::from_pose(&pose);
        if !ctx.right_handed {
            matrix::toggle_model_matrix_hand_in_place(&mut m);
        }

        match ctx.world_parent {
            Some(node) => m = matrix::apply_world_parent(m, node.world_matrix()),
            None => {
                if !self.warned_local_space {
                    warn!("no world parent node configured; anchors stay in session-local space");
                    self.warned_local_space = true;
                }
            }
        }

        anchor.transformation_matrix = Some(m);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FrameAnchorSet, Pose};
    use glam::{Mat4, Vec3};
    use std::collections::HashMap;

    struct Frame {
        ts: i64,
        set: Option<FrameAnchorSet>,
        poses: HashMap<AnchorHandle, Pose>,
    }

    impl Frame {
        fn new(ts: i64, anchors: &[(u64, i64)]) -> Self {
            Self {
                ts,
                set: Some(anchors.iter().map(|(h, t)| (AnchorHandle(*h), *t)).collect()),
                poses: HashMap::new(),
            }
        }

        fn with_pose(mut self, h: u64, pose: Pose) -> Self {
            self.poses.insert(AnchorHandle(h), pose);
            self
        }
    }

    impl XrFrame for Frame {
        fn timestamp_us(&self) -> i64 {
            self.ts
        }
        fn tracked_anchors(&self) -> Option<&FrameAnchorSet> {
            self.set.as_ref()
        }
        fn anchor_pose(&self, handle: AnchorHandle, _space: &ReferenceSpace) -> Option<Pose> {
            self.poses.get(&handle).copied()
        }
    }

    struct Parent(Mat4);

    impl WorldNode for Parent {
        fn world_matrix(&self) -> Mat4 {
            self.0
        }
    }

    fn space() -> ReferenceSpace {
        ReferenceSpace::new("local")
    }

    fn local_ctx(space: &ReferenceSpace) -> PoseContext<'_> {
        PoseContext {
            space,
            right_handed: true,
            world_parent: None,
        }
    }

    fn kinds(events: &[AnchorEvent]) -> Vec<(&'static str, u64)> {
        events.iter().map(|e| (e.kind(), e.anchor().handle.0)).collect()
    }

    #[test]
    fn three_frame_add_add_remove_sequence() {
        let s = space();
        let ctx = local_ctx(&s);
        let mut t = AnchorTracker::new();

        let ev = t.reconcile_frame(&Frame::new(100, &[(1, 100)]), &ctx);
        assert_eq!(kinds(&ev), [("added", 1)]);

        let ev = t.reconcile_frame(&Frame::new(200, &[(1, 100), (2, 200)]), &ctx);
        assert_eq!(kinds(&ev), [("added", 2)]);

        let ev = t.reconcile_frame(&Frame::new(300, &[(2, 200)]), &ctx);
        assert_eq!(kinds(&ev), [("removed", 1)]);

        let handles: Vec<u64> = t.tracked().map(|a| a.handle.0).collect();
        assert_eq!(handles, [2]);
    }

    #[test]
    fn removals_precede_additions_in_the_same_frame() {
        let s = space();
        let ctx = local_ctx(&s);
        let mut t = AnchorTracker::new();
        t.reconcile_frame(&Frame::new(1, &[(1, 1), (2, 1)]), &ctx);

        let ev = t.reconcile_frame(&Frame::new(2, &[(3, 2), (2, 2)]), &ctx);
        assert_eq!(kinds(&ev), [("removed", 1), ("added", 3), ("updated", 2)]);
    }

    #[test]
    fn empty_or_missing_set_leaves_state_untouched() {
        let s = space();
        let ctx = local_ctx(&s);
        let mut t = AnchorTracker::new();
        t.reconcile_frame(&Frame::new(1, &[(1, 1)]), &ctx);

        let empty = Frame::new(2, &[]);
        assert!(t.reconcile_frame(&empty, &ctx).is_empty());
        let absent = Frame { ts: 3, set: None, poses: HashMap::new() };
        assert!(t.reconcile_frame(&absent, &ctx).is_empty());
        assert_eq!(t.len(), 1);

        // The anchor is still "previous", so it is not re-added.
        let ev = t.reconcile_frame(&Frame::new(4, &[(1, 1)]), &ctx);
        assert!(ev.is_empty());
    }

    #[test]
    fn unchanged_anchor_keeps_transform_and_emits_nothing() {
        let s = space();
        let ctx = local_ctx(&s);
        let mut t = AnchorTracker::new();
        let first = Frame::new(10, &[(1, 10)]).with_pose(1, Pose::from_translation(1.0, 0.0, 0.0));
        t.reconcile_frame(&first, &ctx);

        // Device reports a new pose but did not mark the anchor as changed.
        let frame = Frame::new(20, &[(1, 10)]).with_pose(1, Pose::from_translation(9.0, 9.0, 9.0));
        assert!(t.reconcile_frame(&frame, &ctx).is_empty());

        let m = t.get(AnchorHandle(1)).unwrap().transformation_matrix.unwrap();
        assert_eq!(m.w_axis.truncate(), Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn changed_anchor_is_updated_in_place_with_same_id() {
        let s = space();
        let ctx = local_ctx(&s);
        let mut t = AnchorTracker::new();
        let first = Frame::new(10, &[(1, 10)]).with_pose(1, Pose::identity());
        let ev = t.reconcile_frame(&first, &ctx);
        let id = ev[0].anchor().id;

        let frame = Frame::new(20, &[(1, 20)]).with_pose(1, Pose::from_translation(0.0, 2.0, 0.0));
        let ev = t.reconcile_frame(&frame, &ctx);
        assert_eq!(kinds(&ev), [("updated", 1)]);
        assert_eq!(ev[0].anchor().id, id);
        assert_eq!(
            ev[0].anchor().transformation_matrix.unwrap().w_axis.truncate(),
            Vec3::new(0.0, 2.0, 0.0)
        );
    }

    #[test]
    fn missing_pose_leaves_transform_absent_then_keeps_prior() {
        let s = space();
        let ctx = local_ctx(&s);
        let mut t = AnchorTracker::new();

        let ev = t.reconcile_frame(&Frame::new(1, &[(1, 1)]), &ctx);
        assert!(ev[0].anchor().transformation_matrix.is_none());

        let resolved = Frame::new(2, &[(1, 2)]).with_pose(1, Pose::from_translation(0.0, 0.0, 1.0));
        t.reconcile_frame(&resolved, &ctx);
        // Changed again but unresolvable: keep the last good transform.
        let ev = t.reconcile_frame(&Frame::new(3, &[(1, 3)]), &ctx);
        assert_eq!(
            ev[0].anchor().transformation_matrix.unwrap().w_axis.truncate(),
            Vec3::new(0.0, 0.0, 1.0)
        );
    }

    #[test]
    fn left_handed_scene_mirrors_then_world_parent_applies() {
        let s = space();
        let parent = Parent(Mat4::from_translation(Vec3::new(0.0, 5.0, 0.0)));
        let ctx = PoseContext {
            space: &s,
            right_handed: false,
            world_parent: Some(&parent),
        };
        let mut t = AnchorTracker::new();

        let frame = Frame::new(1, &[(1, 1)]).with_pose(1, Pose::from_translation(1.0, 0.0, 3.0));
        let ev = t.reconcile_frame(&frame, &ctx);
        let m = ev[0].anchor().transformation_matrix.unwrap();
        assert_eq!(m.w_axis.truncate(), Vec3::new(1.0, 5.0, -3.0));
    }

    #[test]
    fn re_added_handle_gets_a_fresh_id() {
        let s = space();
        let ctx = local_ctx(&s);
        let mut t = AnchorTracker::new();

        let first = t.reconcile_frame(&Frame::new(1, &[(1, 1), (2, 1)]), &ctx);
        let first_id = first[0].anchor().id;
        t.reconcile_frame(&Frame::new(2, &[(2, 1)]), &ctx);
        let again = t.reconcile_frame(&Frame::new(3, &[(2, 1), (1, 3)]), &ctx);

        assert_eq!(kinds(&again), [("added", 1)]);
        assert!(again[0].anchor().id > first_id);
    }
}
