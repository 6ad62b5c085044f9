//! scenario_feature_registry
//!
//! Invariants under test:
//! - The built-in registry instantiates a working anchor system by name.
//! - Instances are independent and start detached.
//! - Unknown names and versions are reported, not panicked on.
//! - Custom features register next to the built-in one.

use std::sync::Arc;

use xra_anchor::{
    AnchorSystem, AnchorSystemOptions, FeatureMeta, FeatureRegistry, RegistryError, XrFeature,
    XrFrame, XrHost,
};
use xra_testkit::{FakeFrame, FakeHost};

#[test]
fn builtin_anchor_system_instantiates_and_attaches() {
    let reg = FeatureRegistry::with_builtin();
    let host = FakeHost::new();
    let options = AnchorSystemOptions {
        add_anchor_on_select: true,
        ..AnchorSystemOptions::default()
    };

    let mut feature = reg
        .instantiate(AnchorSystem::NAME, None, host.clone(), options)
        .unwrap();
    assert_eq!(feature.name(), "xr-anchor-system");
    assert_eq!(feature.version(), 1);
    assert!(!feature.is_attached());
    assert!(!host.has_frame_observer());

    assert!(feature.attach());
    assert!(host.has_frame_observer());
    assert!(host.has_select_listener());

    feature.dispose();
    assert!(!host.has_frame_observer());
    assert!(!feature.attach());
}

#[test]
fn instances_do_not_share_state() {
    let reg = FeatureRegistry::with_builtin();
    let host = FakeHost::new();
    let mut a = reg
        .instantiate(AnchorSystem::NAME, Some(1), host.clone(), AnchorSystemOptions::default())
        .unwrap();
    let b = reg
        .instantiate(AnchorSystem::NAME, Some(1), host.clone(), AnchorSystemOptions::default())
        .unwrap();

    a.attach();
    assert!(a.is_attached());
    assert!(!b.is_attached());
    assert_eq!(host.frame_observer_count(), 1);
}

#[test]
fn unknown_name_and_version_are_errors() {
    let reg = FeatureRegistry::with_builtin();
    let host: Arc<dyn XrHost> = FakeHost::new();

    let err = reg
        .instantiate("xr-hit-test", None, host.clone(), AnchorSystemOptions::default())
        .err()
        .unwrap();
    assert_eq!(
        err,
        RegistryError::UnknownFeature {
            name: "xr-hit-test".to_string()
        }
    );

    let err = reg
        .instantiate(AnchorSystem::NAME, Some(9), host, AnchorSystemOptions::default())
        .err()
        .unwrap();
    assert!(matches!(err, RegistryError::UnknownVersion { version: 9, .. }));
}

/// Counts frames; nothing else.
struct FrameCounter {
    frames: usize,
    attached: bool,
}

impl XrFeature for FrameCounter {
    fn name(&self) -> &'static str {
        "frame-counter"
    }
    fn version(&self) -> u32 {
        1
    }
    fn attach(&mut self) -> bool {
        self.attached = true;
        true
    }
    fn detach(&mut self) -> bool {
        self.attached = false;
        true
    }
    fn dispose(&mut self) {
        self.detach();
    }
    fn is_attached(&self) -> bool {
        self.attached
    }
    fn on_xr_frame(&mut self, _frame: &dyn XrFrame) {
        self.frames += 1;
    }
}

fn counter(_host: Arc<dyn XrHost>, _opts: AnchorSystemOptions) -> Box<dyn XrFeature> {
    Box::new(FrameCounter {
        frames: 0,
        attached: false,
    })
}

#[test]
fn custom_feature_registers_next_to_builtin() {
    let mut reg = FeatureRegistry::with_builtin();
    reg.register(FeatureMeta::new("frame-counter", 1, "counts frames"), counter)
        .unwrap();

    let names: Vec<&str> = reg.list().iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, ["xr-anchor-system", "frame-counter"]);
    assert_eq!(reg.latest_version("frame-counter"), Some(1));

    let mut feature = reg
        .instantiate("frame-counter", None, FakeHost::new(), AnchorSystemOptions::default())
        .unwrap();
    feature.on_xr_frame(&FakeFrame::new(1));
    assert!(feature.on_select(&xra_anchor::SelectEvent::new(0, 1)).is_empty());

    let dup = reg.register(FeatureMeta::new("frame-counter", 1, ""), counter);
    assert!(matches!(dup, Err(RegistryError::DuplicateVersion { .. })));
}
