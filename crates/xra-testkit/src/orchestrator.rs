//! Frame-pump orchestrator.
//!
//! Plays the host's role around one [`AnchorSystem`]: delivers frames to the
//! registered frame observer, delivers select events to the registered select
//! listener, and makes anchors accepted by a creator appear in the frames
//! that follow (the way a device reports them once created).
//!
//! Every notification is recorded with the index and timestamp of the frame
//! that produced it.

use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use glam::Mat4;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;
use xra_anchor::{
    AnchorEvent, AnchorHandle, AnchorSystem, AnchorSystemOptions, HitResult, Pose,
    SelectDispatch, SelectEvent, TrackedAnchor, WorldNode, XrFeature, XrFrame,
};
use xra_config::{LoadedConfig, XraConfig};

use crate::fake_host::{FakeCreator, FakeFrame, FakeHitTestModule, FakeHost, FakeWorldNode};
use crate::script::{hit_results, ReplayScript};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Longer scripts are refused.
    pub max_frames: usize,
}

impl OrchestratorConfig {
    pub fn test_defaults() -> Self {
        Self { max_frames: 10_000 }
    }
}

/// One notification, stamped with the frame that produced it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordedEvent {
    pub frame: usize,
    pub timestamp_us: i64,
    #[serde(flatten)]
    pub event: AnchorEvent,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplayReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub config_hash: Option<String>,
    pub frames_pumped: usize,
    pub selects_delivered: usize,
    pub creations_requested: usize,
    pub events: Vec<RecordedEvent>,
    /// Tracked anchors after the last frame, in order of first appearance.
    pub tracked: Vec<TrackedAnchor>,
}

type Sink = Arc<Mutex<Vec<AnchorEvent>>>;

pub struct Orchestrator {
    cfg: OrchestratorConfig,
    run_id: Uuid,
    started_at: DateTime<Utc>,
    config_hash: Option<String>,
    host: Arc<FakeHost>,
    system: AnchorSystem,
    creators: Vec<Arc<FakeCreator>>,
    sink: Sink,
    events: Vec<RecordedEvent>,
    frames_pumped: usize,
    selects_delivered: usize,
    /// Anchors created during the run, with the timestamp they first showed
    /// up at (`None` until the next frame).
    created: IndexMap<AnchorHandle, (Pose, Option<i64>)>,
}

impl Orchestrator {
    /// Build, subscribe, attach and enable an anchor system on `host`.
    pub fn new(
        cfg: OrchestratorConfig,
        host: Arc<FakeHost>,
        options: AnchorSystemOptions,
    ) -> Self {
        let mut system = AnchorSystem::new(host.clone(), options);
        let sink: Sink = Arc::new(Mutex::new(Vec::new()));

        let s = Arc::clone(&sink);
        system.on_anchor_added.add(move |a: &TrackedAnchor| {
            push(&s, AnchorEvent::Added { anchor: a.clone() })
        });
        let s = Arc::clone(&sink);
        system.on_anchor_updated.add(move |a: &TrackedAnchor| {
            push(&s, AnchorEvent::Updated { anchor: a.clone() })
        });
        let s = Arc::clone(&sink);
        system.on_anchor_removed.add(move |a: &TrackedAnchor| {
            push(&s, AnchorEvent::Removed { anchor: a.clone() })
        });

        system.attach();
        system.set_enabled(true);

        Self {
            cfg,
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            config_hash: None,
            creators: vec![host.session()],
            host,
            system,
            sink,
            events: Vec::new(),
            frames_pumped: 0,
            selects_delivered: 0,
            created: IndexMap::new(),
        }
    }

    /// Set up host and options from a script and an optional loaded config.
    ///
    /// A config `world_parent_node` is resolved against the script's
    /// `nodes`; otherwise the script's `world_parent` matrix is used.
    pub fn from_script(
        cfg: OrchestratorConfig,
        script: &ReplayScript,
        config: Option<&LoadedConfig>,
    ) -> Result<Self> {
        let typed = match config {
            Some(loaded) => XraConfig::from_json(&loaded.config_json)?,
            None => XraConfig::default(),
        };
        let mut options = typed.anchor_options(|name| {
            script
                .node_matrix(name)
                .map(|m| FakeWorldNode::new(m) as Arc<dyn WorldNode>)
        })?;
        if options.world_parent_node.is_none() {
            options.world_parent_node = script
                .world_parent_matrix()
                .map(|m: Mat4| FakeWorldNode::new(m) as Arc<dyn WorldNode>);
        }

        let host = FakeHost::new();
        host.set_right_handed(script.right_handed.unwrap_or(true));

        let mut orch = Self::new(cfg, host, options);
        orch.config_hash = config.map(|c| c.config_hash.clone());
        if let Some(module) = &script.hit_test_module {
            orch.system.set_hit_test_module(FakeHitTestModule::new(
                module.pointer_down_only,
                hit_results(&module.results),
            ));
        }
        Ok(orch)
    }

    pub fn host(&self) -> &Arc<FakeHost> {
        &self.host
    }

    pub fn system(&self) -> &AnchorSystem {
        &self.system
    }

    pub fn system_mut(&mut self) -> &mut AnchorSystem {
        &mut self.system
    }

    /// Route select-driven creation through a plane detector on the same
    /// device. Its accepted anchors materialize like the session's.
    pub fn use_plane_detector(&mut self, label: &'static str) -> Arc<FakeCreator> {
        let detector = self.host.creator(label);
        self.creators.push(Arc::clone(&detector));
        self.system.set_plane_detector(detector.clone(), true);
        detector
    }

    /// Pump one frame. Anchors created since the previous frame are added to
    /// it. Returns the notifications this frame produced.
    pub fn pump(&mut self, mut frame: FakeFrame) -> Vec<RecordedEvent> {
        let ts = frame.timestamp_us();
        self.collect_created();
        if frame.tracked_anchors().is_some() {
            for (handle, (pose, first_seen)) in self.created.iter_mut() {
                let last_changed = *first_seen.get_or_insert(ts);
                frame.insert_anchor(*handle, last_changed, Some(*pose));
            }
        }

        if self.host.has_frame_observer() {
            self.system.on_xr_frame(&frame);
        }

        let index = self.frames_pumped;
        self.frames_pumped += 1;
        let drained: Vec<AnchorEvent> = std::mem::take(&mut *lock_sink(&self.sink));
        let recorded: Vec<RecordedEvent> = drained
            .into_iter()
            .map(|event| RecordedEvent {
                frame: index,
                timestamp_us: ts,
                event,
            })
            .collect();
        if !recorded.is_empty() {
            debug!(frame = index, events = recorded.len(), "frame pumped");
        }
        self.events.extend(recorded.iter().cloned());
        recorded
    }

    /// Deliver a select event to the registered listener, if any.
    pub fn select(&mut self, event: &SelectEvent) -> SelectDispatch {
        if !self.host.has_select_listener() {
            return SelectDispatch::default();
        }
        self.selects_delivered += 1;
        self.system.on_select(event)
    }

    /// Deliver a select event whose fresh hit-test answers with `hits`. The
    /// answer is queued only if the event is delivered.
    pub fn select_with_hits(
        &mut self,
        event: &SelectEvent,
        hits: Vec<HitResult>,
    ) -> SelectDispatch {
        if !self.host.has_select_listener() {
            return SelectDispatch::default();
        }
        self.host.push_hit_results(hits);
        self.select(event)
    }

    /// Drop an anchor that was created during the run, as if the device
    /// lost it. Returns `false` for unknown handles.
    pub fn forget_created(&mut self, handle: AnchorHandle) -> bool {
        self.collect_created();
        self.created.shift_remove(&handle).is_some()
    }

    pub fn events(&self) -> &[RecordedEvent] {
        &self.events
    }

    /// Play a whole script: each frame is pumped, then its selects are
    /// delivered and allowed to settle before the next frame.
    pub async fn run_script(&mut self, script: &ReplayScript) -> Result<ReplayReport> {
        script.validate()?;
        if script.frames.len() > self.cfg.max_frames {
            bail!(
                "script has {} frames; limit is {}",
                script.frames.len(),
                self.cfg.max_frames
            );
        }

        for sf in &script.frames {
            let mut frame = if sf.anchors_reported {
                FakeFrame::new(sf.timestamp_us)
            } else {
                FakeFrame::without_anchor_set(sf.timestamp_us)
            };
            if sf.anchors_reported {
                for a in &sf.anchors {
                    frame.insert_anchor(AnchorHandle(a.handle), a.last_changed_us, a.pose());
                }
            }
            self.pump(frame);

            for sel in &sf.select {
                let event = SelectEvent::new(sel.input_source, sf.timestamp_us);
                self.select_with_hits(&event, hit_results(&sel.hits))
                    .settle()
                    .await;
            }
        }

        let report = self.report();
        info!(
            run_id = %report.run_id,
            frames = report.frames_pumped,
            events = report.events.len(),
            tracked = report.tracked.len(),
            "replay finished"
        );
        Ok(report)
    }

    pub fn report(&self) -> ReplayReport {
        ReplayReport {
            run_id: self.run_id,
            started_at: self.started_at,
            config_hash: self.config_hash.clone(),
            frames_pumped: self.frames_pumped,
            selects_delivered: self.selects_delivered,
            creations_requested: self.creators.iter().map(|c| c.call_count()).sum(),
            events: self.events.clone(),
            tracked: self.system.tracked_anchors(),
        }
    }

    fn collect_created(&mut self) {
        for creator in &self.creators {
            for (handle, transform) in creator.take_created() {
                let pose = Pose::new(transform.matrix().to_cols_array());
                self.created.insert(handle, (pose, None));
            }
        }
    }
}

fn lock_sink(sink: &Sink) -> std::sync::MutexGuard<'_, Vec<AnchorEvent>> {
    sink.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn push(sink: &Sink, event: AnchorEvent) {
    lock_sink(sink).push(event);
}
