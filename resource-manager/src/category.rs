//! Prefix-based categorization: derives a [`resource_manager_schema::Category`]
//! from a resource id, and aggregates those into a queryable tree.

use std::collections::BTreeMap;
use std::sync::Mutex;

use resource_manager_schema::{Category, Resource, ResourceType};

/// Split `id` on `-` and classify it per the exact rule table:
///
/// | parts | primary | secondary | resource_name |
/// |---|---|---|---|
/// | 1 | `"general"` | none | the single token |
/// | 2 | `parts[0]` | none | `parts[1]` |
/// | 3 | `parts[0]` | `parts[1]` | `parts[2]` |
/// | ≥4, `len(parts[1]) <= 6` | `parts[0]` | `parts[1..last-1]` joined | `parts[last]` |
/// | ≥4, `len(parts[1]) > 6` | `parts[0]` | `parts[1]` | `parts[2..]` joined |
///
/// Pure, case-insensitive, and idempotent: re-extracting a category's own
/// `full_path.join("-")` yields the same category.
pub fn extract_category(id: &str) -> Category {
    let normalized = id.to_lowercase();
    let parts: Vec<&str> = normalized.split('-').collect();

    match parts.len() {
        0 => unreachable!("str::split always yields at least one part"),
        1 => Category {
            primary: "general".to_owned(),
            secondary: None,
            resource_name: parts[0].to_owned(),
            full_path: vec!["general".to_owned(), parts[0].to_owned()],
        },
        2 => Category {
            primary: parts[0].to_owned(),
            secondary: None,
            resource_name: parts[1].to_owned(),
            full_path: vec![parts[0].to_owned(), parts[1].to_owned()],
        },
        3 => Category {
            primary: parts[0].to_owned(),
            secondary: Some(parts[1].to_owned()),
            resource_name: parts[2].to_owned(),
            full_path: vec![parts[0].to_owned(), parts[1].to_owned(), parts[2].to_owned()],
        },
        _ => {
            let primary = parts[0].to_owned();
            let (secondary, resource_name) = if parts[1].len() <= 6 {
                (parts[1..parts.len() - 1].join("-"), parts[parts.len() - 1].to_owned())
            } else {
                (parts[1].to_owned(), parts[2..].join("-"))
            };
            Category {
                full_path: vec![primary.clone(), secondary.clone(), resource_name.clone()],
                primary,
                secondary: Some(secondary),
                resource_name,
            }
        }
    }
}

/// One node of a [`CategoryTree`]: holds the resources filed directly at
/// this path, plus any child categories one level deeper.
#[derive(Debug, Default, Clone)]
pub struct CategoryNode {
    /// This node's own path segment.
    pub name: String,
    /// Resources filed directly at this node (not in a child).
    pub resources: Vec<Resource>,
    /// Child nodes keyed by their own `name`.
    pub children: BTreeMap<String, CategoryNode>,
}

impl CategoryNode {
    fn new(name: impl Into<String>) -> Self {
        CategoryNode {
            name: name.into(),
            resources: Vec::new(),
            children: BTreeMap::new(),
        }
    }

    /// Every resource filed at this node or any descendant.
    pub fn all_resources(&self) -> Vec<Resource> {
        let mut out = self.resources.clone();
        for child in self.children.values() {
            out.extend(child.all_resources());
        }
        out
    }

    /// Total resource count at this node and every descendant.
    pub fn count_resources(&self) -> usize {
        self.resources.len() + self.children.values().map(CategoryNode::count_resources).sum::<usize>()
    }
}

/// Aggregate statistics over a [`CategoryTree`]'s top-level categories.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryStatistics {
    /// Sum of resources across every top-level category.
    pub total_resources: usize,
    /// Number of top-level categories.
    pub total_categories: usize,
    /// Resource count per top-level category name.
    pub category_counts: BTreeMap<String, usize>,
    /// Percentage (0-100) of `total_resources` per top-level category.
    pub category_percentages: BTreeMap<String, f64>,
}

/// A rooted tree of categories built by repeatedly calling `add_resource`.
/// Depth is between 1 and 3 by construction (primary / secondary / leaf),
/// except that the "secondary" level itself may encode a joined multi-token
/// subcategory per [`extract_category`]'s 4+-token rule.
#[derive(Debug, Default, Clone)]
pub struct CategoryTree {
    top_level: BTreeMap<String, CategoryNode>,
    order: Vec<String>,
}

impl CategoryTree {
    /// An empty tree.
    pub fn new() -> Self {
        CategoryTree::default()
    }

    /// File `resource` under the category path implied by `category`,
    /// creating any missing ancestor nodes.
    pub fn add_resource(&mut self, category: &Category, resource: Resource) {
        if !self.top_level.contains_key(&category.primary) {
            self.top_level
                .insert(category.primary.clone(), CategoryNode::new(category.primary.clone()));
            self.order.push(category.primary.clone());
        }
        let primary = self.top_level.get_mut(&category.primary).expect("just inserted");

        let node = if let Some(secondary) = &category.secondary {
            primary
                .children
                .entry(secondary.clone())
                .or_insert_with(|| CategoryNode::new(secondary.clone()))
        } else {
            primary
        };

        node.resources.push(resource);
    }

    /// Resource count for `name` (a top-level category), including every
    /// descendant subcategory. Zero if `name` is unknown.
    pub fn get_category_count(&self, name: &str) -> usize {
        self.top_level.get(name).map(CategoryNode::count_resources).unwrap_or(0)
    }

    /// Top-level categories in alphabetical order.
    pub fn get_sorted_categories(&self) -> Vec<&CategoryNode> {
        self.top_level.values().collect()
    }

    /// Top-level categories in the order they were first encountered.
    pub fn get_insertion_order_categories(&self) -> Vec<&CategoryNode> {
        self.order.iter().filter_map(|name| self.top_level.get(name)).collect()
    }

    /// Resolve a dotted path such as `["mcp", "dev-team"]` to its node.
    pub fn find_by_path(&self, path: &[String]) -> Option<&CategoryNode> {
        let mut iter = path.iter();
        let mut node = self.top_level.get(iter.next()?)?;
        for segment in iter {
            node = node.children.get(segment)?;
        }
        Some(node)
    }

    /// Every resource filed under the top-level category `name`.
    pub fn filter_by_category(&self, name: &str) -> Vec<Resource> {
        self.top_level.get(name).map(CategoryNode::all_resources).unwrap_or_default()
    }

    /// Every resource filed under the category path `path`.
    pub fn filter_by_path(&self, path: &[String]) -> Vec<Resource> {
        self.find_by_path(path).map(CategoryNode::all_resources).unwrap_or_default()
    }

    /// `filter_by_category`, further restricted to resources of `type_`.
    pub fn filter_by_category_and_type(&self, name: &str, type_: ResourceType) -> Vec<Resource> {
        self.filter_by_category(name)
            .into_iter()
            .filter(|r| r.type_ == type_)
            .collect()
    }

    /// Visit every node pre-order: each top-level category (in insertion
    /// order), then its descendants depth-first.
    pub fn traverse(&self, mut visitor: impl FnMut(&CategoryNode)) {
        fn walk(node: &CategoryNode, visitor: &mut impl FnMut(&CategoryNode)) {
            visitor(node);
            for child in node.children.values() {
                walk(child, visitor);
            }
        }
        for name in &self.order {
            if let Some(node) = self.top_level.get(name) {
                walk(node, &mut visitor);
            }
        }
    }

    /// Totals and per-top-level-category counts/percentages.
    pub fn get_statistics(&self) -> CategoryStatistics {
        let counts: BTreeMap<String, usize> = self
            .top_level
            .values()
            .map(|n| (n.name.clone(), n.count_resources()))
            .collect();
        let total: usize = counts.values().sum();
        let percentages = counts
            .iter()
            .map(|(name, count)| {
                let pct = if total > 0 { *count as f64 / total as f64 * 100.0 } else { 0.0 };
                (name.clone(), pct)
            })
            .collect();
        CategoryStatistics {
            total_resources: total,
            total_categories: self.top_level.len(),
            category_counts: counts,
            category_percentages: percentages,
        }
    }
}

struct CachedTree {
    ptr: usize,
    len: usize,
    tree: CategoryTree,
}

/// Builds and caches [`CategoryTree`]s from resource slices, identity-keyed
/// the way the source engine keys on `id(resources)`: two `build_tree`
/// calls against the same backing slice reuse the cached tree.
#[derive(Default)]
pub struct CategoryEngine {
    cache: Mutex<Option<CachedTree>>,
}

impl CategoryEngine {
    /// A fresh engine with no cached tree.
    pub fn new() -> Self {
        CategoryEngine::default()
    }

    /// Categorize every resource in `resources` and return the resulting
    /// tree, reusing the cached tree if `resources` is (by address and
    /// length) the same slice as the previous call.
    pub fn build_tree(&self, resources: &[Resource]) -> CategoryTree {
        let ptr = resources.as_ptr() as usize;
        let len = resources.len();

        let mut guard = self.cache.lock().expect("lock poisoned");
        if let Some(cached) = guard.as_ref() {
            if cached.ptr == ptr && cached.len == len {
                return cached.tree.clone();
            }
        }

        let mut tree = CategoryTree::new();
        for resource in resources {
            let category = extract_category(&resource.id);
            tree.add_resource(&category, resource.clone());
        }

        *guard = Some(CachedTree {
            ptr,
            len,
            tree: tree.clone(),
        });
        tree
    }

    /// Drop the cached tree; the next `build_tree` call rebuilds from scratch.
    pub fn invalidate_cache(&self) {
        *self.cache.lock().expect("lock poisoned") = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resource_manager_schema::Source;

    fn resource(id: &str) -> Resource {
        Resource {
            id: id.to_owned(),
            type_: ResourceType::Agent,
            name: id.to_owned(),
            description: String::new(),
            summary: String::new(),
            version: "1.0.0".to_owned(),
            author: None,
            file_type: ".md".to_owned(),
            source: Source {
                repo: "r".into(),
                path: "p".into(),
                url: format!("https://raw.githubusercontent.com/a/b/{id}.md"),
                sha256: None,
            },
            install_path: format!("agents/{id}.md"),
            metadata: Default::default(),
            dependencies: None,
            extra: Default::default(),
        }
    }

    #[test]
    fn single_token_id_is_general() {
        let c = extract_category("architect");
        assert_eq!(c.primary, "general");
        assert_eq!(c.secondary, None);
        assert_eq!(c.resource_name, "architect");
    }

    #[test]
    fn two_token_id_has_no_secondary() {
        let c = extract_category("mcp-architect");
        assert_eq!(c.primary, "mcp");
        assert_eq!(c.secondary, None);
        assert_eq!(c.resource_name, "architect");
    }

    #[test]
    fn three_token_id_splits_evenly() {
        let c = extract_category("mcp-devteam-architect");
        assert_eq!(c.primary, "mcp");
        assert_eq!(c.secondary.as_deref(), Some("devteam"));
        assert_eq!(c.resource_name, "architect");
    }

    #[test]
    fn four_token_with_short_second_part_groups_middle() {
        let c = extract_category("mcp-dev-team-architect");
        assert_eq!(c.primary, "mcp");
        assert_eq!(c.secondary.as_deref(), Some("dev-team"));
        assert_eq!(c.resource_name, "architect");
    }

    #[test]
    fn four_token_with_long_second_part_groups_tail() {
        let c = extract_category("ai-specialists-prompt-engineer");
        assert_eq!(c.primary, "ai");
        assert_eq!(c.secondary.as_deref(), Some("specialists"));
        assert_eq!(c.resource_name, "prompt-engineer");
    }

    #[test]
    fn extraction_is_case_insensitive_and_idempotent() {
        let a = extract_category("MCP-Dev-Team-Architect");
        let b = extract_category(&a.full_path.join("-"));
        assert_eq!(a.primary, b.primary);
        assert_eq!(a.secondary, b.secondary);
        assert_eq!(a.resource_name, b.resource_name);
    }

    #[test]
    fn build_tree_groups_by_primary_and_secondary() {
        let resources = vec![
            resource("mcp-dev-team-architect"),
            resource("mcp-dev-team-reviewer"),
            resource("mcp-qa-team-tester"),
            resource("general-helper"),
        ];
        let engine = CategoryEngine::new();
        let tree = engine.build_tree(&resources);
        assert_eq!(tree.get_category_count("mcp"), 3);
        assert_eq!(tree.filter_by_category("mcp").len(), 3);
        assert_eq!(
            tree.filter_by_path(&["mcp".to_owned(), "dev-team".to_owned()]).len(),
            2
        );
    }

    #[test]
    fn build_tree_is_cached_by_slice_identity() {
        let resources = vec![resource("mcp-architect")];
        let engine = CategoryEngine::new();
        let first = engine.build_tree(&resources);
        let second = engine.build_tree(&resources);
        assert_eq!(first.get_category_count("mcp"), second.get_category_count("mcp"));
    }

    #[test]
    fn statistics_percentages_sum_to_roughly_100() {
        let resources = vec![resource("a-one"), resource("b-two"), resource("a-three")];
        let engine = CategoryEngine::new();
        let tree = engine.build_tree(&resources);
        let stats = tree.get_statistics();
        assert_eq!(stats.total_resources, 3);
        let sum: f64 = stats.category_percentages.values().sum();
        assert!((sum - 100.0).abs() < 1e-9);
    }
}
