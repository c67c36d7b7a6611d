use std::collections::BTreeMap;
use std::sync::OnceLock;

use camino::Utf8PathBuf;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A resource ID must be non-empty lowercase ascii, digits, and hyphens.
fn id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z0-9-]+$").expect("id pattern is valid"))
}

/// Errors produced while validating a [`Resource`] against the data model's
/// invariants. These are schema-level invariants only -- loading, security,
/// and dependency-graph errors live in `resource-manager`.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// `id` was empty or contained characters outside `[a-z0-9-]`.
    #[error("invalid resource id {id:?}: must match ^[a-z0-9-]+$")]
    InvalidId {
        /// The offending id.
        id: String,
    },
    /// `type` was not one of the five enumerated resource types.
    #[error("invalid resource type {type_:?}: must be one of agent, command, hook, template, mcp")]
    InvalidType {
        /// The offending type string.
        type_: String,
    },
    /// A resource listed itself as its own dependency.
    #[error("resource {id:?} cannot depend on itself")]
    SelfDependency {
        /// The resource's own id.
        id: String,
    },
}

/// The five kinds of resource the catalog can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    /// A system-prompt agent persona.
    Agent,
    /// A slash-command style invocation.
    Command,
    /// A lifecycle hook.
    Hook,
    /// A reusable document template.
    Template,
    /// A Model Context Protocol server descriptor.
    Mcp,
}

impl ResourceType {
    /// All resource types, in the catalog's canonical order.
    pub const ALL: [ResourceType; 5] = [
        ResourceType::Agent,
        ResourceType::Command,
        ResourceType::Hook,
        ResourceType::Template,
        ResourceType::Mcp,
    ];

    /// The lowercase singular form used in ids and `type:` fields.
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceType::Agent => "agent",
            ResourceType::Command => "command",
            ResourceType::Hook => "hook",
            ResourceType::Template => "template",
            ResourceType::Mcp => "mcp",
        }
    }

    /// The pluralized directory / URL path segment for this type
    /// (`agent` -> `agents`, `mcp` -> `mcps`).
    pub fn plural(self) -> &'static str {
        match self {
            ResourceType::Agent => "agents",
            ResourceType::Command => "commands",
            ResourceType::Hook => "hooks",
            ResourceType::Template => "templates",
            ResourceType::Mcp => "mcps",
        }
    }

    /// Parse from either the singular or plural directory name, accepting
    /// both so the loader can treat `agent/` and `agents/` the same way.
    pub fn from_dir_name(name: &str) -> Option<ResourceType> {
        ResourceType::ALL
            .into_iter()
            .find(|t| t.as_str() == name || t.plural() == name)
    }
}

impl std::str::FromStr for ResourceType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| SchemaError::InvalidType {
                type_: s.to_owned(),
            })
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a resource's content lives and how to verify it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Source {
    /// Repository name or identifier, for diagnostics only.
    pub repo: String,
    /// Path to the resource within its repository, for diagnostics only.
    pub path: String,
    /// HTTPS URL the installer downloads from. Must be on the allow-list
    /// enforced by `resource_manager::security::url`.
    pub url: String,
    /// Lowercase hex SHA-256 digest of the resource's content, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// The required/recommended dependency edges declared by a resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Dependency {
    /// Resource ids that must be installed before this one.
    #[serde(default)]
    pub required: Vec<String>,
    /// Resource ids that should be offered, but whose absence is not fatal.
    #[serde(default)]
    pub recommended: Vec<String>,
}

impl Dependency {
    /// `required` with exact duplicates removed, preserving first occurrence.
    pub fn required_deduped(&self) -> Vec<&str> {
        dedupe(&self.required)
    }

    /// `recommended` with exact duplicates removed, preserving first occurrence.
    pub fn recommended_deduped(&self) -> Vec<&str> {
        dedupe(&self.recommended)
    }
}

fn dedupe(ids: &[String]) -> Vec<&str> {
    let mut seen = std::collections::HashSet::with_capacity(ids.len());
    ids.iter()
        .filter(|id| seen.insert(id.as_str()))
        .map(String::as_str)
        .collect()
}

/// A single declarative catalog entry: the unit of installation.
///
/// Unknown YAML fields are preserved in `extra` rather than rejected, so a
/// forward-compatible catalog doesn't break older engine binaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Resource {
    /// Unique identifier, matching `^[a-z0-9-]+$`.
    pub id: String,
    /// Which of the five resource kinds this is.
    #[serde(rename = "type")]
    pub type_: ResourceType,
    /// Display name.
    pub name: String,
    /// Long-form description.
    pub description: String,
    /// Short summary, e.g. for list views.
    pub summary: String,
    /// Informational version string.
    pub version: String,
    /// Optional author attribution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// File extension of the installed content, e.g. `.md`.
    pub file_type: String,
    /// Where to download the resource's content from.
    pub source: Source,
    /// Relative (or `~`-prefixed) install destination, subject to path
    /// containment checks when actually used by the installer.
    pub install_path: String,
    /// Open-ended metadata. Recognized keys include `tools`, `model`, `tags`.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    /// Required/recommended dependency edges, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Dependency>,
    /// Fields present in the document but not modeled above.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Resource {
    /// Check the cross-field invariants the data model promises:
    /// a well-formed id, a known type, and no self-referencing dependency.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.id.is_empty() || !id_pattern().is_match(&self.id) {
            return Err(SchemaError::InvalidId {
                id: self.id.clone(),
            });
        }
        if let Some(deps) = &self.dependencies {
            if deps.required.iter().any(|d| d == &self.id)
                || deps.recommended.iter().any(|d| d == &self.id)
            {
                return Err(SchemaError::SelfDependency {
                    id: self.id.clone(),
                });
            }
        }
        Ok(())
    }

    /// The default on-disk install destination for this resource's type and
    /// id (`<plural-type>/<id>.<ext without leading dot>`), used when a
    /// resource doesn't specify its own `install_path`.
    pub fn default_install_path(type_: ResourceType, id: &str, file_type: &str) -> Utf8PathBuf {
        let ext = file_type.trim_start_matches('.');
        Utf8PathBuf::from(type_.plural()).join(format!("{id}.{ext}"))
    }
}
