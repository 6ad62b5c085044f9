//! Layered YAML configuration for the anchor tooling.
//!
//! Documents are merged in order (earlier is base, later overrides; objects
//! merge key by key, everything else is replaced), converted to JSON and
//! hashed. The hash is over the canonical JSON, so key order in the source
//! documents never changes it.

use std::fs;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use xra_anchor::{AnchorSystemOptions, WorldNode};

mod consumption;

pub use consumption::{report_unused_keys, UnusedKeyPolicy, UnusedKeyReport, CONSUMED_POINTERS};

// ---------------------------------------------------------------------------
// Loading + hashing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut docs: Vec<String> = Vec::new();
    for p in paths {
        let raw =
            fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?;
        docs.push(raw);
    }

    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = serde_json::json!({});
    for (i, raw) in yaml_docs.iter().enumerate() {
        let v_yaml: serde_yaml::Value =
            serde_yaml::from_str(raw).with_context(|| format!("invalid yaml in layer {i}"))?;
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        // An empty document parses as null; it contributes nothing.
        if v_json.is_null() {
            continue;
        }
        merged = deep_merge(merged, v_json);
    }

    let canonical_json = canonicalize_json(&merged)?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

/// `serde_json::Map` is ordered by key unless `preserve_order` is enabled,
/// which this workspace does not do. Compact output, no trailing newline.
fn canonicalize_json(v: &Value) -> Result<String> {
    serde_json::to_string(v).context("canonical json serialize failed")
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

// ---------------------------------------------------------------------------
// Typed view
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchorsConfig {
    pub add_anchor_on_select: bool,
    pub use_plane_detection: bool,
    /// Name of the scene node used as world parent. Resolved by the host.
    pub world_parent_node: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `"info,xra_anchor=debug"`.
    pub filter: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct XraConfig {
    pub anchors: AnchorsConfig,
    pub logging: LoggingConfig,
}

impl XraConfig {
    /// Missing sections and keys take their defaults. Unknown keys are not
    /// rejected here; see [`report_unused_keys`].
    pub fn from_json(config_json: &Value) -> Result<Self> {
        serde_json::from_value(config_json.clone()).context("config does not match schema")
    }

    /// Build anchor-system options. `resolve` maps a configured node name
    /// to the scene node; an unknown name is an error.
    pub fn anchor_options<F>(&self, resolve: F) -> Result<AnchorSystemOptions>
    where
        F: Fn(&str) -> Option<Arc<dyn WorldNode>>,
    {
        let world_parent_node = match self.anchors.world_parent_node.as_deref() {
            Some(name) => Some(
                resolve(name).ok_or_else(|| anyhow!("world parent node '{name}' not found"))?,
            ),
            None => None,
        };
        Ok(AnchorSystemOptions {
            world_parent_node,
            use_plane_detection: self.anchors.use_plane_detection,
            add_anchor_on_select: self.anchors.add_anchor_on_select,
        })
    }
}
