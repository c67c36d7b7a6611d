use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::resource::{ResourceType, SchemaError};

/// A lightweight projection of a [`crate::Resource`] suitable for the
/// top-level `index.yaml`, where the full document would be wasteful to
/// repeat for every entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ResourceSummary {
    /// Unique identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Short summary.
    #[serde(default)]
    pub summary: String,
}

/// The per-type slice of the catalog index: every summary of that type,
/// plus a count that must equal the list's length.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ResourceTypeIndex {
    /// Summaries of every resource of this type.
    #[serde(default)]
    pub resources: Vec<ResourceSummary>,
    /// Must equal `resources.len()`.
    pub count: usize,
}

impl ResourceTypeIndex {
    /// Check that `count` matches the list length and that ids are unique.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.count != self.resources.len() {
            return Err(SchemaError::InvalidType {
                type_: format!(
                    "index count {} does not match {} resources",
                    self.count,
                    self.resources.len()
                ),
            });
        }
        let mut seen = std::collections::HashSet::with_capacity(self.resources.len());
        for r in &self.resources {
            if !seen.insert(r.id.as_str()) {
                return Err(SchemaError::InvalidType {
                    type_: format!("duplicate resource id in index: {}", r.id),
                });
            }
        }
        Ok(())
    }
}

/// The top-level `index.yaml`: a summary view over every resource type in
/// the catalog, used by the loader to answer counts without reading every
/// per-resource document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Catalog {
    /// Sum of every `types[*].count`.
    pub total: usize,
    /// One entry per resource type present in the catalog.
    #[serde(default)]
    pub types: BTreeMap<ResourceType, ResourceTypeIndex>,
}

impl Catalog {
    /// Check that `total` is the sum of the per-type counts and that each
    /// per-type index is internally consistent.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let sum: usize = self.types.values().map(|t| t.count).sum();
        if sum != self.total {
            return Err(SchemaError::InvalidType {
                type_: format!("catalog total {} does not match sum of type counts {}", self.total, sum),
            });
        }
        for index in self.types.values() {
            index.validate()?;
        }
        Ok(())
    }

    /// Find which [`ResourceType`] a given id belongs to, if the index
    /// knows about it.
    pub fn type_of(&self, id: &str) -> Option<ResourceType> {
        self.types
            .iter()
            .find(|(_, index)| index.resources.iter().any(|r| r.id == id))
            .map(|(t, _)| *t)
    }
}
