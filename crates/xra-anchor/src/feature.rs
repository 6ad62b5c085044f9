//! XR features and the registry that builds them.
//!
//! # Purpose
//! A session runs a handful of *features* (anchors, hit-testing, plane
//! detection, ...). Each one is attached to the session, receives frame and
//! select callbacks while attached, and is disposed with the session.
//!
//! [`FeatureRegistry`] is the catalogue of available features: static
//! [`FeatureMeta`] (name, implementation version, description) plus a
//! [`FeatureFactory`] producing a fresh, detached instance on demand. Several
//! versions of one feature may be registered side by side; asking for no
//! particular version yields the latest.
//!
//! # Usage
//! ```ignore
//! let reg = FeatureRegistry::with_builtin();
//! let mut anchors = reg.instantiate(AnchorSystem::NAME, None, host, options)?;
//! anchors.attach();
//! ```

use std::sync::Arc;

use crate::bridge::SelectDispatch;
use crate::host::{XrFrame, XrHost};
use crate::{AnchorSystem, AnchorSystemOptions, SelectEvent};

// ---------------------------------------------------------------------------
// Feature trait
// ---------------------------------------------------------------------------

/// An attachable session feature.
///
/// `detach` and `dispose` must be safe to call repeatedly and before
/// `attach`. Callbacks arriving while detached must be no-ops.
pub trait XrFeature: Send {
    fn name(&self) -> &'static str;

    fn version(&self) -> u32;

    /// Returns `false` if the feature can no longer be attached.
    fn attach(&mut self) -> bool;

    fn detach(&mut self) -> bool;

    fn dispose(&mut self);

    fn is_attached(&self) -> bool;

    /// Called once per rendered frame while the frame observer is registered.
    fn on_xr_frame(&mut self, frame: &dyn XrFrame);

    /// Called for every select event while the select listener is registered.
    fn on_select(&mut self, event: &SelectEvent) -> SelectDispatch {
        let _ = event;
        SelectDispatch::default()
    }
}

// ---------------------------------------------------------------------------
// Factory + metadata
// ---------------------------------------------------------------------------

/// Produces a fresh feature bound to `host`.
pub type FeatureFactory =
    Box<dyn Fn(Arc<dyn XrHost>, AnchorSystemOptions) -> Box<dyn XrFeature> + Send + Sync>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeatureMeta {
    /// Registry key, shared by all versions of the feature.
    pub name: String,
    /// Implementation version. Not the device API version.
    pub version: u32,
    pub description: String,
}

impl FeatureMeta {
    /// Names are not checked here; [`FeatureRegistry::register`] rejects
    /// empty ones.
    pub fn new(name: impl Into<String>, version: u32, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version,
            description: description.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// The same name and version is already registered.
    DuplicateVersion { name: String, version: u32 },
    /// No feature with this name is registered.
    UnknownFeature { name: String },
    /// The feature exists but not in the requested version.
    UnknownVersion { name: String, version: u32 },
    /// The feature name is empty or whitespace.
    EmptyName,
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateVersion { name, version } => {
                write!(f, "feature '{name}' v{version} is already registered")
            }
            Self::UnknownFeature { name } => write!(f, "no feature named '{name}' is registered"),
            Self::UnknownVersion { name, version } => {
                write!(f, "feature '{name}' has no registered version {version}")
            }
            Self::EmptyName => write!(f, "feature name must not be empty"),
        }
    }
}

impl std::error::Error for RegistryError {}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

struct RegistryEntry {
    meta: FeatureMeta,
    factory: FeatureFactory,
}

/// Catalogue of available features. `list()` follows insertion order.
pub struct FeatureRegistry {
    entries: Vec<RegistryEntry>,
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Registry with the features shipped in this crate.
    pub fn with_builtin() -> Self {
        let mut reg = Self::new();
        reg.entries.push(RegistryEntry {
            meta: FeatureMeta::new(
                AnchorSystem::NAME,
                AnchorSystem::VERSION,
                "tracks native anchors and creates anchors on select",
            ),
            factory: Box::new(|host, options| -> Box<dyn XrFeature> {
                Box::new(AnchorSystem::new(host, options))
            }),
        });
        reg
    }

    /// # Errors
    /// - [`RegistryError::EmptyName`] if `meta.name` is empty/whitespace.
    /// - [`RegistryError::DuplicateVersion`] if this name+version exists.
    pub fn register<F>(&mut self, meta: FeatureMeta, factory: F) -> Result<(), RegistryError>
    where
        F: Fn(Arc<dyn XrHost>, AnchorSystemOptions) -> Box<dyn XrFeature> + Send + Sync + 'static,
    {
        if meta.name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.find(&meta.name, Some(meta.version)).is_some() {
            return Err(RegistryError::DuplicateVersion {
                name: meta.name.clone(),
                version: meta.version,
            });
        }
        self.entries.push(RegistryEntry {
            meta,
            factory: Box::new(factory),
        });
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.meta.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn list(&self) -> Vec<&FeatureMeta> {
        self.entries.iter().map(|e| &e.meta).collect()
    }

    /// Highest registered version of `name`.
    pub fn latest_version(&self, name: &str) -> Option<u32> {
        self.entries
            .iter()
            .filter(|e| e.meta.name == name)
            .map(|e| e.meta.version)
            .max()
    }

    /// Build a fresh, detached instance. `version: None` picks the latest.
    ///
    /// # Errors
    /// - [`RegistryError::UnknownFeature`] if the name is not registered.
    /// - [`RegistryError::UnknownVersion`] if the requested version is not.
    pub fn instantiate(
        &self,
        name: &str,
        version: Option<u32>,
        host: Arc<dyn XrHost>,
        options: AnchorSystemOptions,
    ) -> Result<Box<dyn XrFeature>, RegistryError> {
        let entry = self.find(name, version).ok_or_else(|| match version {
            Some(v) if self.contains(name) => RegistryError::UnknownVersion {
                name: name.to_string(),
                version: v,
            },
            _ => RegistryError::UnknownFeature {
                name: name.to_string(),
            },
        })?;
        Ok((entry.factory)(host, options))
    }

    /// Remove every version of `name`. Returns `true` if anything was removed.
    pub fn deregister(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.meta.name != name);
        self.entries.len() < before
    }

    fn find(&self, name: &str, version: Option<u32>) -> Option<&RegistryEntry> {
        let version = match version {
            Some(v) => v,
            None => self.latest_version(name)?,
        };
        self.entries
            .iter()
            .find(|e| e.meta.name == name && e.meta.version == version)
    }
}

impl Default for FeatureRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
