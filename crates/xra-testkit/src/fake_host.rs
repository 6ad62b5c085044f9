//! Deterministic in-memory XR host for tests and replays.
//!
//! No device, no rendering. Everything a real session would decide
//! (which anchors exist, what a hit-test returns, whether creation succeeds)
//! is scripted by the test.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::{self, FutureExt};
use glam::Mat4;
use tokio::sync::oneshot;
use xra_anchor::{
    AnchorCreator, AnchorHandle, CreateAnchorError, CreateAnchorFuture, FrameAnchorSet,
    HitResult, HitTestFuture, HitTestModule, ListenerToken, Pose, ReferenceSpace, RigidTransform,
    SelectEvent, WorldNode, XrFrame, XrHost,
};

/// First handle a [`FakeCreator`] hands out. Script handles stay below it.
pub const CREATED_HANDLE_BASE: u64 = 1_000_000;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// One scripted frame.
#[derive(Clone, Debug, Default)]
pub struct FakeFrame {
    timestamp_us: i64,
    anchors: Option<FrameAnchorSet>,
    poses: HashMap<AnchorHandle, Pose>,
}

impl FakeFrame {
    /// A frame that reports an (empty) anchor set.
    pub fn new(timestamp_us: i64) -> Self {
        Self {
            timestamp_us,
            anchors: Some(FrameAnchorSet::new()),
            poses: HashMap::new(),
        }
    }

    /// A frame whose device reports no anchor set at all.
    pub fn without_anchor_set(timestamp_us: i64) -> Self {
        Self {
            timestamp_us,
            anchors: None,
            poses: HashMap::new(),
        }
    }

    pub fn with_anchor(mut self, handle: u64, last_changed_us: i64, pose: Option<Pose>) -> Self {
        self.insert_anchor(AnchorHandle(handle), last_changed_us, pose);
        self
    }

    pub fn insert_anchor(
        &mut self,
        handle: AnchorHandle,
        last_changed_us: i64,
        pose: Option<Pose>,
    ) {
        self.anchors
            .get_or_insert_with(FrameAnchorSet::new)
            .insert(handle, last_changed_us);
        match pose {
            Some(p) => self.poses.insert(handle, p),
            None => self.poses.remove(&handle),
        };
    }
}

impl XrFrame for FakeFrame {
    fn timestamp_us(&self) -> i64 {
        self.timestamp_us
    }

    fn tracked_anchors(&self) -> Option<&FrameAnchorSet> {
        self.anchors.as_ref()
    }

    fn anchor_pose(&self, handle: AnchorHandle, _space: &ReferenceSpace) -> Option<Pose> {
        self.poses.get(&handle).copied()
    }
}

// ---------------------------------------------------------------------------
// Creator
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CreatorState {
    calls: Vec<RigidTransform>,
    reject_with: Option<CreateAnchorError>,
    created: Vec<(AnchorHandle, RigidTransform)>,
}

/// Anchor creator that answers immediately.
///
/// Accepted requests get a fresh handle and are queued in
/// [`FakeCreator::take_created`] so a frame pump can make the anchor show up
/// in later frames, the way a device would.
///
/// Creators that feed the same device must share one handle counter; see
/// [`FakeHost::creator`].
pub struct FakeCreator {
    label: &'static str,
    next_handle: Arc<AtomicU64>,
    state: Mutex<CreatorState>,
}

impl FakeCreator {
    /// A creator with its own handle counter starting at
    /// [`CREATED_HANDLE_BASE`].
    pub fn new(label: &'static str) -> Arc<Self> {
        Self::with_counter(label, Arc::new(AtomicU64::new(CREATED_HANDLE_BASE)))
    }

    fn with_counter(label: &'static str, next_handle: Arc<AtomicU64>) -> Arc<Self> {
        Arc::new(Self {
            label,
            next_handle,
            state: Mutex::new(CreatorState::default()),
        })
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Reject every following request with `err`. `None` accepts again.
    pub fn reject_with(&self, err: Option<CreateAnchorError>) {
        lock(&self.state).reject_with = err;
    }

    /// Every transform a creation was requested at, accepted or not.
    pub fn calls(&self) -> Vec<RigidTransform> {
        lock(&self.state).calls.clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.state).calls.len()
    }

    /// Drain accepted creations not yet taken.
    pub fn take_created(&self) -> Vec<(AnchorHandle, RigidTransform)> {
        std::mem::take(&mut lock(&self.state).created)
    }
}

impl AnchorCreator for FakeCreator {
    fn create_anchor(
        &self,
        transform: &RigidTransform,
        _space: &ReferenceSpace,
    ) -> CreateAnchorFuture {
        let mut st = lock(&self.state);
        st.calls.push(*transform);
        let result = match st.reject_with.clone() {
            Some(err) => Err(err),
            None => {
                let handle = AnchorHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
                st.created.push((handle, *transform));
                Ok(handle)
            }
        };
        future::ready(result).boxed()
    }
}

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

#[derive(Default)]
struct HostState {
    next_token: u64,
    frame_observers: Vec<ListenerToken>,
    select_listeners: Vec<ListenerToken>,
    /// Every remove call, including ones for unknown tokens.
    remove_calls: usize,
    hit_test_calls: Vec<SelectEvent>,
    queued_hits: VecDeque<Vec<HitResult>>,
    defer_hit_tests: bool,
    pending_hit_tests: VecDeque<oneshot::Sender<Vec<HitResult>>>,
}

impl HostState {
    fn token(&mut self) -> ListenerToken {
        self.next_token += 1;
        ListenerToken(self.next_token)
    }
}

/// Scripted session.
///
/// Hit-tests answer from a queue of prepared result lists; an empty queue
/// answers with no results. With [`FakeHost::set_defer_hit_tests`] they stay
/// pending until [`FakeHost::resolve_next_hit_test`] is called.
pub struct FakeHost {
    space: ReferenceSpace,
    right_handed: AtomicBool,
    session: Arc<FakeCreator>,
    state: Mutex<HostState>,
}

impl FakeHost {
    pub fn new() -> Arc<Self> {
        Self::with_space("local-floor")
    }

    pub fn with_space(space: &str) -> Arc<Self> {
        Arc::new(Self {
            space: ReferenceSpace::new(space),
            right_handed: AtomicBool::new(true),
            session: FakeCreator::new("session"),
            state: Mutex::new(HostState::default()),
        })
    }

    pub fn set_right_handed(&self, right_handed: bool) {
        self.right_handed.store(right_handed, Ordering::Relaxed);
    }

    /// The session's own creator, as returned by `session_creator()`.
    pub fn session(&self) -> Arc<FakeCreator> {
        Arc::clone(&self.session)
    }

    /// Another creator on this device (a detected plane, say). Its handles
    /// come from the session's counter, so no two anchors share one.
    pub fn creator(&self, label: &'static str) -> Arc<FakeCreator> {
        FakeCreator::with_counter(label, Arc::clone(&self.session.next_handle))
    }

    pub fn has_frame_observer(&self) -> bool {
        !lock(&self.state).frame_observers.is_empty()
    }

    pub fn has_select_listener(&self) -> bool {
        !lock(&self.state).select_listeners.is_empty()
    }

    pub fn frame_observer_count(&self) -> usize {
        lock(&self.state).frame_observers.len()
    }

    pub fn select_listener_count(&self) -> usize {
        lock(&self.state).select_listeners.len()
    }

    pub fn remove_calls(&self) -> usize {
        lock(&self.state).remove_calls
    }

    /// Answer the next immediate hit-test with `results`.
    pub fn push_hit_results(&self, results: Vec<HitResult>) {
        lock(&self.state).queued_hits.push_back(results);
    }

    /// Prepared answers not yet consumed by a hit-test.
    pub fn queued_hit_results(&self) -> usize {
        lock(&self.state).queued_hits.len()
    }

    pub fn set_defer_hit_tests(&self, defer: bool) {
        lock(&self.state).defer_hit_tests = defer;
    }

    /// Resolve the oldest pending hit-test. Returns `false` if none was
    /// pending or its receiver is gone.
    pub fn resolve_next_hit_test(&self, results: Vec<HitResult>) -> bool {
        let tx = lock(&self.state).pending_hit_tests.pop_front();
        tx.is_some_and(|tx| tx.send(results).is_ok())
    }

    pub fn pending_hit_tests(&self) -> usize {
        lock(&self.state).pending_hit_tests.len()
    }

    pub fn hit_test_calls(&self) -> Vec<SelectEvent> {
        lock(&self.state).hit_test_calls.clone()
    }
}

impl XrHost for FakeHost {
    fn reference_space(&self) -> ReferenceSpace {
        self.space.clone()
    }

    fn scene_right_handed(&self) -> bool {
        self.right_handed.load(Ordering::Relaxed)
    }

    fn add_frame_observer(&self, _feature: &'static str) -> ListenerToken {
        let mut st = lock(&self.state);
        let token = st.token();
        st.frame_observers.push(token);
        token
    }

    fn remove_frame_observer(&self, token: ListenerToken) {
        let mut st = lock(&self.state);
        st.remove_calls += 1;
        st.frame_observers.retain(|t| *t != token);
    }

    fn add_select_listener(&self, _feature: &'static str) -> ListenerToken {
        let mut st = lock(&self.state);
        let token = st.token();
        st.select_listeners.push(token);
        token
    }

    fn remove_select_listener(&self, token: ListenerToken) {
        let mut st = lock(&self.state);
        st.remove_calls += 1;
        st.select_listeners.retain(|t| *t != token);
    }

    fn session_creator(&self) -> Arc<dyn AnchorCreator> {
        self.session.clone()
    }

    fn hit_test_with_select_event(
        &self,
        event: &SelectEvent,
        _space: &ReferenceSpace,
    ) -> HitTestFuture {
        let mut st = lock(&self.state);
        st.hit_test_calls.push(event.clone());
        if let Some(results) = st.queued_hits.pop_front() {
            return future::ready(results).boxed();
        }
        if !st.defer_hit_tests {
            return future::ready(Vec::new()).boxed();
        }
        let (tx, rx) = oneshot::channel();
        st.pending_hit_tests.push_back(tx);
        // A dropped sender means the session went away: no results.
        rx.map(|r| r.unwrap_or_default()).boxed()
    }
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Hit-test module with settable cached results.
pub struct FakeHitTestModule {
    pointer_down_only: AtomicBool,
    results: Mutex<Vec<HitResult>>,
}

impl FakeHitTestModule {
    pub fn new(pointer_down_only: bool, results: Vec<HitResult>) -> Arc<Self> {
        Arc::new(Self {
            pointer_down_only: AtomicBool::new(pointer_down_only),
            results: Mutex::new(results),
        })
    }

    pub fn set_results(&self, results: Vec<HitResult>) {
        *lock(&self.results) = results;
    }
}

impl HitTestModule for FakeHitTestModule {
    fn test_on_pointer_down_only(&self) -> bool {
        self.pointer_down_only.load(Ordering::Relaxed)
    }

    fn last_native_hit_results(&self) -> Vec<HitResult> {
        lock(&self.results).clone()
    }
}

/// Scene node with a settable world matrix.
pub struct FakeWorldNode {
    world: Mutex<Mat4>,
}

impl FakeWorldNode {
    pub fn new(world: Mat4) -> Arc<Self> {
        Arc::new(Self {
            world: Mutex::new(world),
        })
    }

    pub fn set_world_matrix(&self, world: Mat4) {
        *lock(&self.world) = world;
    }
}

impl WorldNode for FakeWorldNode {
    fn world_matrix(&self) -> Mat4 {
        *lock(&self.world)
    }
}
