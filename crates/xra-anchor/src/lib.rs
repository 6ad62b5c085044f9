//! xra-anchor
//!
//! Spatial-anchor tracking for an XR session.
//!
//! Architectural decisions:
//! - The host engine owns the session, the frame pump and the XR device APIs.
//!   This crate only reads what the host hands it (see [`host`]).
//! - Per-frame reconciliation is pure: previous anchor set vs. current anchor
//!   set produces an ordered list of [`AnchorEvent`]s (removals first).
//! - [`AnchorSystem`] wraps the reconciler as an attachable feature and fans
//!   the events out to three notification channels.
//! - Select-driven anchor creation is fire-and-forget: the outcome only ever
//!   shows up as an `Added` event in a later frame.

pub mod feature;
pub mod host;
pub mod matrix;
pub mod observable;

mod bridge;
mod reconciler;
mod system;
mod types;

pub use bridge::SelectDispatch;
pub use feature::{FeatureFactory, FeatureMeta, FeatureRegistry, RegistryError, XrFeature};
pub use host::{
    AnchorCreator, CreateAnchorError, CreateAnchorFuture, HitTestFuture, HitTestModule,
    ListenerToken, WorldNode, XrFrame, XrHost,
};
pub use observable::{Observable, ObserverId};
pub use reconciler::{AnchorTracker, PoseContext};
pub use system::AnchorSystem;
pub use types::*;
