//! The anchor system feature.
//!
//! Lifecycle:
//!
//! | call          | effect                                                       |
//! |---------------|--------------------------------------------------------------|
//! | `attach`      | registers the frame observer (+ select listener if enabled)  |
//! | `set_enabled` | frames are only reconciled while attached **and** enabled    |
//! | `detach`      | unregisters both; idempotent, safe before `attach`           |
//! | `dispose`     | detach + clear all channels; terminal                        |
//!
//! Work already in flight when `detach` is called (a pending fresh hit-test)
//! still completes. After `dispose` it completes as a no-op.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::bridge::{SelectBridge, SelectDispatch};
use crate::feature::XrFeature;
use crate::host::{
    AnchorCreator, CreateAnchorFuture, HitTestModule, ListenerToken, XrFrame, XrHost,
};
use crate::observable::Observable;
use crate::reconciler::{AnchorTracker, PoseContext};
use crate::{
    AnchorEvent, AnchorHandle, AnchorSystemOptions, RigidTransform, SelectEvent, TrackedAnchor,
};

pub struct AnchorSystem {
    host: Arc<dyn XrHost>,
    options: AnchorSystemOptions,
    plane_detector: Option<Arc<dyn AnchorCreator>>,
    hit_test_module: Option<Arc<dyn HitTestModule>>,
    tracker: AnchorTracker,
    enabled: bool,
    attached: bool,
    /// Shared with detached select tasks so they can no-op after dispose.
    disposed: Arc<AtomicBool>,
    frame_observer: Option<ListenerToken>,
    select_listener: Option<ListenerToken>,

    /// Fires once per anchor the first time its handle shows up.
    pub on_anchor_added: Observable<TrackedAnchor>,
    /// Fires when the device reports a tracked anchor as changed this frame.
    /// Can fire N times per frame.
    pub on_anchor_updated: Observable<TrackedAnchor>,
    /// Fires with the last known state of an anchor the device dropped.
    pub on_anchor_removed: Observable<TrackedAnchor>,
}

impl AnchorSystem {
    pub const NAME: &'static str = "xr-anchor-system";
    /// Implementation version of this feature (not the device API version).
    pub const VERSION: u32 = 1;

    pub fn new(host: Arc<dyn XrHost>, options: AnchorSystemOptions) -> Self {
        Self {
            host,
            options,
            plane_detector: None,
            hit_test_module: None,
            tracker: AnchorTracker::new(),
            enabled: false,
            attached: false,
            disposed: Arc::new(AtomicBool::new(false)),
            frame_observer: None,
            select_listener: None,
            on_anchor_added: Observable::new(),
            on_anchor_updated: Observable::new(),
            on_anchor_removed: Observable::new(),
        }
    }

    pub fn options(&self) -> &AnchorSystemOptions {
        &self.options
    }

    /// Use `detector` (a detected surface) to create select-driven anchors.
    pub fn set_plane_detector(&mut self, detector: Arc<dyn AnchorCreator>, enable: bool) {
        self.plane_detector = Some(detector);
        self.options.use_plane_detection = enable;
    }

    /// Reuse the module's continuous hit-test results on select.
    pub fn set_hit_test_module(&mut self, module: Arc<dyn HitTestModule>) {
        self.hit_test_module = Some(module);
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Tracked anchors in order of first appearance.
    pub fn tracked_anchors(&self) -> Vec<TrackedAnchor> {
        self.tracker.tracked().cloned().collect()
    }

    pub fn tracked_anchor(&self, handle: AnchorHandle) -> Option<&TrackedAnchor> {
        self.tracker.get(handle)
    }

    /// Request a native anchor at `transform`.
    ///
    /// Uses `creator` when given, the session otherwise. The returned future
    /// is the creator's own; dropping it does not cancel the request.
    pub fn add_anchor_at_rigid_transformation(
        &self,
        transform: &RigidTransform,
        creator: Option<Arc<dyn AnchorCreator>>,
    ) -> CreateAnchorFuture {
        let creator = creator.unwrap_or_else(|| self.host.session_creator());
        creator.create_anchor(transform, &self.host.reference_space())
    }

    fn select_creator(&self) -> Arc<dyn AnchorCreator> {
        match (&self.plane_detector, self.options.use_plane_detection) {
            (Some(detector), true) => Arc::clone(detector),
            _ => self.host.session_creator(),
        }
    }

    fn dispatch(&mut self, event: AnchorEvent) {
        let anchor = event.anchor();
        debug!(kind = event.kind(), id = %anchor.id, handle = %anchor.handle, "anchor event");
        match &event {
            AnchorEvent::Added { anchor } => self.on_anchor_added.notify_observers(anchor),
            AnchorEvent::Updated { anchor } => self.on_anchor_updated.notify_observers(anchor),
            AnchorEvent::Removed { anchor } => self.on_anchor_removed.notify_observers(anchor),
        }
    }
}

impl XrFeature for AnchorSystem {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn version(&self) -> u32 {
        Self::VERSION
    }

    fn attach(&mut self) -> bool {
        if self.is_disposed() {
            return false;
        }
        if self.frame_observer.is_none() {
            self.frame_observer = Some(self.host.add_frame_observer(Self::NAME));
        }
        if self.options.add_anchor_on_select && self.select_listener.is_none() {
            self.select_listener = Some(self.host.add_select_listener(Self::NAME));
        }
        self.attached = true;
        info!(
            select = self.select_listener.is_some(),
            world_parent = self.options.world_parent_node.is_some(),
            "anchor system attached"
        );
        true
    }

    fn detach(&mut self) -> bool {
        self.attached = false;
        if let Some(token) = self.select_listener.take() {
            self.host.remove_select_listener(token);
        }
        if let Some(token) = self.frame_observer.take() {
            self.host.remove_frame_observer(token);
        }
        true
    }

    fn dispose(&mut self) {
        self.disposed.store(true, Ordering::Release);
        self.detach();
        self.on_anchor_added.clear();
        self.on_anchor_removed.clear();
        self.on_anchor_updated.clear();
    }

    fn is_attached(&self) -> bool {
        self.attached
    }

    fn on_xr_frame(&mut self, frame: &dyn XrFrame) {
        if !self.attached || !self.enabled || self.is_disposed() {
            return;
        }
        let space = self.host.reference_space();
        let ctx = PoseContext {
            space: &space,
            right_handed: self.host.scene_right_handed(),
            world_parent: self.options.world_parent_node.as_deref(),
        };
        let events = self.tracker.reconcile_frame(frame, &ctx);
        for event in events {
            self.dispatch(event);
        }
    }

    fn on_select(&mut self, event: &SelectEvent) -> SelectDispatch {
        if !self.options.add_anchor_on_select || self.is_disposed() {
            return SelectDispatch::default();
        }
        SelectBridge {
            host: &self.host,
            hit_test_module: self.hit_test_module.as_ref(),
            creator: self.select_creator(),
            disposed: &self.disposed,
        }
        .dispatch(event)
    }
}
