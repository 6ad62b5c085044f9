//! Select → hit-test → anchor creation.
//!
//! Two paths may fire for one select event:
//!
//! 1. **Cached**: when a hit-test module is set and tests continuously
//!    (not pointer-down only), its latest results are used right away.
//! 2. **Fresh**: a new hit-test along the select ray is always issued; its
//!    nearest result, if any, is used when it resolves.
//!
//! Creation is fire-and-forget. The creator's outcome is logged and dropped;
//! success becomes visible only as an `Added` event in a later frame. A fresh
//! hit-test that resolves after the anchor system was disposed does nothing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::host::{AnchorCreator, CreateAnchorFuture, HitTestModule, XrHost};
use crate::{RigidTransform, SelectEvent};

/// Detached tasks started for one select event.
///
/// Hosts never need to await these; they are exposed so a test host can
/// drive the runtime until the work has settled.
#[derive(Debug, Default)]
pub struct SelectDispatch {
    /// Creation from the hit-test module's cached results.
    pub cached_creation: Option<JoinHandle<()>>,
    /// Fresh hit-test followed by creation at its nearest result.
    pub fresh_hit_test: Option<JoinHandle<()>>,
}

impl SelectDispatch {
    pub fn is_empty(&self) -> bool {
        self.cached_creation.is_none() && self.fresh_hit_test.is_none()
    }

    /// Wait for both tasks. Task panics are logged, not propagated.
    pub async fn settle(self) {
        for task in [self.cached_creation, self.fresh_hit_test].into_iter().flatten() {
            if let Err(e) = task.await {
                warn!(error = %e, "select task did not complete");
            }
        }
    }
}

pub(crate) struct SelectBridge<'a> {
    pub host: &'a Arc<dyn XrHost>,
    pub hit_test_module: Option<&'a Arc<dyn HitTestModule>>,
    pub creator: Arc<dyn AnchorCreator>,
    pub disposed: &'a Arc<AtomicBool>,
}

impl SelectBridge<'_> {
    /// Both requests are made before returning. Awaiting their answers needs
    /// a tokio runtime; without one the outcomes are dropped and the fresh
    /// hit-test cannot lead to a creation.
    pub fn dispatch(self, event: &SelectEvent) -> SelectDispatch {
        let space = self.host.reference_space();

        let mut cached = None;
        if let Some(module) = self.hit_test_module {
            if !module.test_on_pointer_down_only() {
                if let Some(nearest) = module.last_native_hit_results().first() {
                    let transform = RigidTransform::from_hit(nearest);
                    cached = Some(self.creator.create_anchor(&transform, &space));
                }
            }
        }

        let hit_test = self.host.hit_test_with_select_event(event, &space);

        let Ok(rt) = Handle::try_current() else {
            warn!(
                input_source = event.input_source_id,
                cached = cached.is_some(),
                "no async runtime: select outcomes are not awaited"
            );
            return SelectDispatch::default();
        };

        let creator = self.creator;
        let disposed = Arc::clone(self.disposed);
        SelectDispatch {
            cached_creation: cached.map(|request| rt.spawn(report_creation(request, "cached"))),
            fresh_hit_test: Some(rt.spawn(async move {
                let results = hit_test.await;
                if disposed.load(Ordering::Acquire) {
                    trace!("hit-test resolved after dispose; ignored");
                    return;
                }
                let Some(nearest) = results.first() else {
                    trace!("hit-test returned no results; nothing to anchor");
                    return;
                };
                let transform = RigidTransform::from_hit(nearest);
                report_creation(creator.create_anchor(&transform, &space), "fresh").await;
            })),
        }
    }
}

/// Await a creation request and log its outcome. The anchor system never
/// inspects it beyond that.
pub(crate) async fn report_creation(request: CreateAnchorFuture, path: &'static str) {
    match request.await {
        Ok(handle) => debug!(%handle, path, "anchor creation accepted"),
        Err(e) => debug!(error = %e, path, "anchor creation failed"),
    }
}
