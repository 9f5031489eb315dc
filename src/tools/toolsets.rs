//! Toolset groups and which of them are currently enabled.
//!
//! Every tool belongs to one toolset. The configuration names the toolsets
//! to enable (or `all`). With dynamic toolsets on, clients can enable more
//! at runtime through the `enable_toolset` tool.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::config::ALL_TOOLSETS;
use crate::tools::registry::ToolRegistry;
use crate::types::ToolsetName;

/// Toolset holding the dynamic toolset management tools.
///
/// Never listed as available and exposed only when dynamic toolsets are on.
pub const DYNAMIC_TOOLSET: &str = "dynamic";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolsetError {
    /// The name does not match any registered toolset.
    Unknown(String),
}

impl fmt::Display for ToolsetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(name) => write!(f, "toolset {} does not exist", name),
        }
    }
}

impl std::error::Error for ToolsetError {}

/// One entry of `list_available_toolsets`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ToolsetSummary {
    pub name: ToolsetName,
    pub enabled: bool,
    pub tool_count: usize,
}

pub struct Toolsets {
    /// Tool count per known toolset.
    available: BTreeMap<ToolsetName, usize>,
    enabled: RwLock<BTreeSet<ToolsetName>>,
    /// Bumped every time the enabled set grows.
    revision: AtomicU64,
    dynamic: bool,
}

impl Toolsets {
    /// Resolve the configured toolset list against the registry.
    pub fn new(
        registry: &ToolRegistry,
        requested: &[String],
        dynamic: bool,
    ) -> Result<Self, ToolsetError> {
        let mut available: BTreeMap<ToolsetName, usize> = BTreeMap::new();
        for handler in registry.handlers() {
            if handler.toolset() == DYNAMIC_TOOLSET {
                continue;
            }
            *available.entry(ToolsetName::new(handler.toolset())).or_default() += 1;
        }

        let mut enabled = BTreeSet::new();
        for name in requested {
            if name == ALL_TOOLSETS {
                enabled.extend(available.keys().cloned());
                continue;
            }
            if !available.contains_key(name.as_str()) {
                return Err(ToolsetError::Unknown(name.clone()));
            }
            enabled.insert(ToolsetName::new(name.as_str()));
        }

        Ok(Self {
            available,
            enabled: RwLock::new(enabled),
            revision: AtomicU64::new(0),
            dynamic,
        })
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    /// Whether tools of `toolset` are currently exposed.
    pub fn is_enabled(&self, toolset: &str) -> bool {
        if toolset == DYNAMIC_TOOLSET {
            return self.dynamic;
        }
        self.enabled
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(toolset)
    }

    /// Enable a toolset at runtime. Returns `false` if it already was.
    pub fn enable(&self, toolset: &str) -> Result<bool, ToolsetError> {
        if !self.available.contains_key(toolset) {
            return Err(ToolsetError::Unknown(toolset.to_string()));
        }
        let inserted = self
            .enabled
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(ToolsetName::new(toolset));
        if inserted {
            self.revision.fetch_add(1, Ordering::SeqCst);
        }
        Ok(inserted)
    }

    /// Changes whenever the set of exposed tools changes.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    /// All known toolsets with their current state.
    pub fn summaries(&self) -> Vec<ToolsetSummary> {
        let enabled = self.enabled.read().unwrap_or_else(|e| e.into_inner());
        self.available
            .iter()
            .map(|(name, count)| ToolsetSummary {
                name: name.clone(),
                enabled: enabled.contains(name),
                tool_count: *count,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::default_registry;

    #[test]
    fn test_all_enables_every_toolset() {
        let toolsets = Toolsets::new(&default_registry(), &["all".to_string()], false).unwrap();
        assert!(toolsets.is_enabled("context"));
        assert!(!toolsets.is_enabled(DYNAMIC_TOOLSET));
    }

    #[test]
    fn test_unknown_toolset_rejected() {
        let result = Toolsets::new(&default_registry(), &["nope".to_string()], false);
        assert_eq!(result.err(), Some(ToolsetError::Unknown("nope".to_string())));
    }

    #[test]
    fn test_dynamic_starts_with_requested_only() {
        let toolsets = Toolsets::new(&default_registry(), &[], true).unwrap();
        assert!(toolsets.is_dynamic());
        assert!(toolsets.is_enabled(DYNAMIC_TOOLSET));
        assert!(!toolsets.is_enabled("context"));

        assert_eq!(toolsets.revision(), 0);
        assert_eq!(toolsets.enable("context"), Ok(true));
        assert_eq!(toolsets.revision(), 1);
        assert_eq!(toolsets.enable("context"), Ok(false));
        assert_eq!(toolsets.revision(), 1);
        assert!(toolsets.is_enabled("context"));
        assert!(toolsets.enable("repos").is_err());
        assert_eq!(toolsets.revision(), 1);
    }

    #[test]
    fn test_summaries_exclude_dynamic_group() {
        let toolsets = Toolsets::new(&default_registry(), &["context".to_string()], true).unwrap();
        let summaries = toolsets.summaries();
        assert!(summaries.iter().all(|s| s.name.as_str() != DYNAMIC_TOOLSET));
        let context = summaries
            .iter()
            .find(|s| s.name.as_str() == "context")
            .unwrap();
        assert!(context.enabled);
        assert_eq!(context.tool_count, 1);
    }
}
