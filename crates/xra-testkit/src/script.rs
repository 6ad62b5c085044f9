//! Replay scripts: a recorded (or hand-written) session as data.
//!
//! ```yaml
//! right_handed: true
//! world_parent: [1,0,0,0, 0,1,0,0, 0,0,1,0, 0,2,0,1]   # optional
//! nodes:                                               # optional, by name
//!   xr-root: [1,0,0,0, 0,1,0,0, 0,0,1,0, 0,0,0,1]
//! hit_test_module:                                     # optional
//!   pointer_down_only: false
//!   results: [[...16 floats...]]
//! frames:
//!   - timestamp_us: 1000
//!     anchors:
//!       - { handle: 1, last_changed_us: 1000, pose: [...16 floats...] }
//!     select:
//!       - { input_source: 0, hits: [[...16 floats...]] }
//! ```
//!
//! Matrices are 16 floats, column-major (translation in 12..15).

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use glam::Mat4;
use serde::{Deserialize, Serialize};
use xra_anchor::{HitResult, Pose};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReplayScript {
    /// Scene handedness. Defaults to right-handed.
    pub right_handed: Option<bool>,
    /// World matrix of the parent node, used when the options carry none.
    pub world_parent: Option<Vec<f32>>,
    /// Named scene nodes a config `world_parent_node` can refer to.
    pub nodes: BTreeMap<String, Vec<f32>>,
    pub hit_test_module: Option<ScriptHitTestModule>,
    pub frames: Vec<ScriptFrame>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScriptHitTestModule {
    pub pointer_down_only: bool,
    pub results: Vec<Vec<f32>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptFrame {
    pub timestamp_us: i64,
    /// `false` models a device that reports no anchor set this frame.
    #[serde(default = "default_true")]
    pub anchors_reported: bool,
    #[serde(default)]
    pub anchors: Vec<ScriptAnchor>,
    /// Select events delivered after this frame was pumped.
    #[serde(default)]
    pub select: Vec<ScriptSelect>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptAnchor {
    pub handle: u64,
    pub last_changed_us: i64,
    /// Absent: the device cannot resolve a pose this frame.
    #[serde(default)]
    pub pose: Option<Vec<f32>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScriptSelect {
    pub input_source: u32,
    /// Results of the fresh hit-test, nearest first.
    pub hits: Vec<Vec<f32>>,
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScriptError {
    NoFrames,
    /// Frame timestamps must strictly increase.
    NonIncreasingTimestamp { frame: usize, prev_us: i64, timestamp_us: i64 },
    DuplicateHandle { frame: usize, handle: u64 },
    /// Script handles must stay below the range fake creators allocate from.
    ReservedHandle { frame: usize, handle: u64 },
    /// A matrix did not have 16 components.
    BadMatrix { at: String, len: usize },
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptError::NoFrames => write!(f, "script has no frames"),
            ScriptError::NonIncreasingTimestamp {
                frame,
                prev_us,
                timestamp_us,
            } => write!(
                f,
                "frame {frame}: timestamp {timestamp_us} is not after previous {prev_us}"
            ),
            ScriptError::DuplicateHandle { frame, handle } => {
                write!(f, "frame {frame}: anchor handle {handle} listed twice")
            }
            ScriptError::ReservedHandle { frame, handle } => write!(
                f,
                "frame {frame}: anchor handle {handle} is in the reserved range (>= {})",
                crate::CREATED_HANDLE_BASE
            ),
            ScriptError::BadMatrix { at, len } => {
                write!(f, "{at}: matrix needs 16 components, got {len}")
            }
        }
    }
}

impl std::error::Error for ScriptError {}

fn matrix(values: &[f32], at: impl FnOnce() -> String) -> Result<[f32; 16], ScriptError> {
    <[f32; 16]>::try_from(values).map_err(|_| ScriptError::BadMatrix {
        at: at(),
        len: values.len(),
    })
}

impl ReplayScript {
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let script: Self = serde_yaml::from_str(raw).context("parse replay script yaml")?;
        script.validate()?;
        Ok(script)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let script: Self = serde_json::from_str(raw).context("parse replay script json")?;
        script.validate()?;
        Ok(script)
    }

    /// `.json` files are read as JSON, everything else as YAML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read replay script: {}", path.display()))?;
        let is_json = path.extension().is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let script = if is_json {
            Self::from_json_str(&raw)
        } else {
            Self::from_yaml_str(&raw)
        };
        script.with_context(|| format!("load replay script: {}", path.display()))
    }

    pub fn validate(&self) -> Result<(), ScriptError> {
        if self.frames.is_empty() {
            return Err(ScriptError::NoFrames);
        }
        if let Some(m) = &self.world_parent {
            matrix(m, || "world_parent".to_string())?;
        }
        for (name, m) in &self.nodes {
            matrix(m, || format!("nodes.{name}"))?;
        }
        if let Some(module) = &self.hit_test_module {
            for (i, m) in module.results.iter().enumerate() {
                matrix(m, || format!("hit_test_module.results[{i}]"))?;
            }
        }

        let mut prev: Option<i64> = None;
        for (fi, frame) in self.frames.iter().enumerate() {
            if let Some(prev_us) = prev {
                if frame.timestamp_us <= prev_us {
                    return Err(ScriptError::NonIncreasingTimestamp {
                        frame: fi,
                        prev_us,
                        timestamp_us: frame.timestamp_us,
                    });
                }
            }
            prev = Some(frame.timestamp_us);

            let mut seen = HashSet::new();
            for a in &frame.anchors {
                if a.handle >= crate::CREATED_HANDLE_BASE {
                    return Err(ScriptError::ReservedHandle {
                        frame: fi,
                        handle: a.handle,
                    });
                }
                if !seen.insert(a.handle) {
                    return Err(ScriptError::DuplicateHandle {
                        frame: fi,
                        handle: a.handle,
                    });
                }
                if let Some(p) = &a.pose {
                    matrix(p, || format!("frames[{fi}].anchors[{}].pose", a.handle))?;
                }
            }
            for (si, sel) in frame.select.iter().enumerate() {
                for (hi, h) in sel.hits.iter().enumerate() {
                    matrix(h, || format!("frames[{fi}].select[{si}].hits[{hi}]"))?;
                }
            }
        }
        Ok(())
    }

    pub fn world_parent_matrix(&self) -> Option<Mat4> {
        let m = self.world_parent.as_deref()?;
        matrix(m, String::new).ok().map(|a| Mat4::from_cols_array(&a))
    }

    pub fn node_matrix(&self, name: &str) -> Option<Mat4> {
        let m = self.nodes.get(name)?;
        matrix(m, String::new).ok().map(|a| Mat4::from_cols_array(&a))
    }
}

impl ScriptAnchor {
    /// Validated scripts only; a malformed pose reads as absent.
    pub fn pose(&self) -> Option<Pose> {
        let m = self.pose.as_deref()?;
        matrix(m, String::new).ok().map(Pose::new)
    }
}

/// Validated scripts only; malformed matrices are skipped.
pub fn hit_results(matrices: &[Vec<f32>]) -> Vec<HitResult> {
    matrices
        .iter()
        .filter_map(|m| matrix(m, String::new).ok())
        .map(HitResult::new)
        .collect()
}
