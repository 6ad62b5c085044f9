//! Test support for the anchor workspace: a scripted fake host, replay
//! scripts, and an orchestrator that pumps frames and records every
//! notification.

pub mod fake_host;
pub mod orchestrator;
pub mod script;

pub use fake_host::{
    FakeCreator, FakeFrame, FakeHitTestModule, FakeHost, FakeWorldNode, CREATED_HANDLE_BASE,
};
pub use orchestrator::{Orchestrator, OrchestratorConfig, RecordedEvent, ReplayReport};
pub use script::{
    hit_results, ReplayScript, ScriptAnchor, ScriptError, ScriptFrame, ScriptHitTestModule,
    ScriptSelect,
};
