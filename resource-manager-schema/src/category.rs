use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A resource id's hierarchical category, derived purely from its prefix
/// structure (see `resource_manager::category::extract_category`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Category {
    /// Main category, e.g. `"mcp"`, or `"general"` for single-token ids.
    pub primary: String,
    /// Subcategory, present for three-or-more-token ids.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary: Option<String>,
    /// The final, leaf-level name.
    pub resource_name: String,
    /// `[primary, secondary?, resource_name]`, in display order.
    pub full_path: Vec<String>,
}
