//! Dependency resolution over a directed graph of required/recommended
//! edges: DFS resolution with cycle detection, Kahn's-algorithm topological
//! ordering, and standalone cycle enumeration.

use std::collections::{BTreeMap, HashMap, HashSet};

use miette::Diagnostic;
use resource_manager_schema::{Catalog, Resource};
use thiserror::Error;

use crate::catalog::{CatalogLoader, LoadError};

/// Every way dependency resolution or ordering can fail.
#[derive(Debug, Error, Diagnostic)]
pub enum DependencyError {
    /// A required dependency does not exist anywhere in the catalog.
    #[error("required dependency {id:?} not found in catalog{}", required_by.as_deref().map(|r| format!(" (required by {r:?})")).unwrap_or_default())]
    MissingRequired {
        /// The missing dependency's id.
        id: String,
        /// The resource that required it, if known.
        required_by: Option<String>,
    },

    /// A cycle was found; `path` is closed (first id repeats as last).
    #[error("circular dependency: {}", path.join(" -> "))]
    Circular {
        /// The cycle, first id repeated as the last element.
        path: Vec<String>,
    },

    /// The DFS traversal exceeded the configured maximum depth.
    #[error("maximum dependency depth ({max_depth}) exceeded while resolving {id:?}")]
    DepthExceeded {
        /// The resource being resolved when the bound was hit.
        id: String,
        /// The configured bound.
        max_depth: usize,
    },

    /// Loading a dependency's record from the catalog failed.
    #[error("failed to load dependency {id:?}: {source}")]
    LoadFailure {
        /// The dependency's id.
        id: String,
        /// The underlying load error.
        #[source]
        source: LoadError,
    },
}

/// Resolves transitive dependencies and computes installation order.
pub struct DependencyResolver {
    max_depth: usize,
}

impl DependencyResolver {
    /// A resolver bounding DFS depth at `max_depth` (5 is a sensible default).
    pub fn new(max_depth: usize) -> Self {
        DependencyResolver { max_depth }
    }

    /// Every transitive dependency of `id`, followed by `id` itself, in an
    /// order where every dependency appears before its dependent.
    pub fn resolve(
        &self,
        id: &str,
        catalog: &Catalog,
        loader: &CatalogLoader,
        include_recommended: bool,
    ) -> Result<Vec<Resource>, DependencyError> {
        let mut visited = HashSet::new();
        let mut stack = Vec::new();
        let mut result = Vec::new();
        self.resolve_recursive(id, None, catalog, loader, &mut visited, &mut stack, &mut result, 0, include_recommended)?;
        Ok(result)
    }

    #[allow(clippy::too_many_arguments)]
    fn resolve_recursive(
        &self,
        id: &str,
        required_by: Option<&str>,
        catalog: &Catalog,
        loader: &CatalogLoader,
        visited: &mut HashSet<String>,
        stack: &mut Vec<String>,
        result: &mut Vec<Resource>,
        depth: usize,
        include_recommended: bool,
    ) -> Result<(), DependencyError> {
        if depth > self.max_depth {
            return Err(DependencyError::DepthExceeded {
                id: id.to_owned(),
                max_depth: self.max_depth,
            });
        }
        if stack.iter().any(|s| s == id) {
            let mut path = stack.clone();
            path.push(id.to_owned());
            return Err(DependencyError::Circular { path });
        }
        if visited.contains(id) {
            return Ok(());
        }

        let type_ = catalog.type_of(id).ok_or_else(|| DependencyError::MissingRequired {
            id: id.to_owned(),
            required_by: required_by.map(str::to_owned),
        })?;
        let resource = loader
            .get_resource(id, type_)
            .map_err(|source| DependencyError::LoadFailure {
                id: id.to_owned(),
                source,
            })?
            .ok_or_else(|| DependencyError::MissingRequired {
                id: id.to_owned(),
                required_by: required_by.map(str::to_owned),
            })?;

        stack.push(id.to_owned());

        if let Some(deps) = resource.dependencies.clone() {
            for dep_id in deps.required_deduped() {
                self.resolve_recursive(
                    dep_id,
                    Some(id),
                    catalog,
                    loader,
                    visited,
                    stack,
                    result,
                    depth + 1,
                    include_recommended,
                )?;
            }
            if include_recommended {
                for dep_id in deps.recommended_deduped() {
                    if catalog.type_of(dep_id).is_none() {
                        continue;
                    }
                    let _ = self.resolve_recursive(
                        dep_id,
                        Some(id),
                        catalog,
                        loader,
                        visited,
                        stack,
                        result,
                        depth + 1,
                        include_recommended,
                    );
                }
            }
        }

        stack.pop();
        visited.insert(id.to_owned());
        if !result.iter().any(|r: &Resource| r.id == id) {
            result.push(resource);
        }
        Ok(())
    }

    /// A topological order of `resources` over the sub-graph induced by
    /// required and recommended edges whose endpoints are both in the set.
    /// Fails if that sub-graph has a cycle.
    pub fn get_install_order(&self, resources: &[Resource]) -> Result<Vec<Resource>, DependencyError> {
        if resources.is_empty() {
            return Ok(Vec::new());
        }
        let ids: HashSet<&str> = resources.iter().map(|r| r.id.as_str()).collect();
        let mut indegree: BTreeMap<&str, usize> = resources.iter().map(|r| (r.id.as_str(), 0)).collect();
        let mut adjacency: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

        for r in resources {
            for dep in dependency_ids(r) {
                if ids.contains(dep) {
                    adjacency.entry(dep).or_default().push(r.id.as_str());
                    *indegree.get_mut(r.id.as_str()).expect("present") += 1;
                }
            }
        }

        let mut frontier: std::collections::BTreeSet<&str> =
            indegree.iter().filter(|(_, &d)| d == 0).map(|(&id, _)| id).collect();
        let mut order: Vec<&str> = Vec::new();

        while let Some(&id) = frontier.iter().next() {
            frontier.remove(id);
            order.push(id);
            if let Some(children) = adjacency.get(id) {
                for &child in children {
                    let d = indegree.get_mut(child).expect("present");
                    *d -= 1;
                    if *d == 0 {
                        frontier.insert(child);
                    }
                }
            }
        }

        if order.len() != resources.len() {
            let path = self.detect_cycles(resources).unwrap_or_default();
            return Err(DependencyError::Circular { path });
        }

        let by_id: HashMap<&str, &Resource> = resources.iter().map(|r| (r.id.as_str(), r)).collect();
        Ok(order.into_iter().map(|id| by_id[id].clone()).collect())
    }

    /// One cycle in `resources`' dependency graph (required + recommended
    /// edges), closed by repeating the first id, or `None` if acyclic.
    /// Deterministic for a given input order.
    pub fn detect_cycles(&self, resources: &[Resource]) -> Option<Vec<String>> {
        let ids: HashSet<&str> = resources.iter().map(|r| r.id.as_str()).collect();
        let mut adjacency: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for r in resources {
            let edges: Vec<&str> = dependency_ids(r).into_iter().filter(|d| ids.contains(d)).collect();
            adjacency.insert(r.id.as_str(), edges);
        }

        let mut state: HashMap<&str, u8> = HashMap::new();
        let mut stack: Vec<&str> = Vec::new();
        for r in resources {
            if state.get(r.id.as_str()).copied().unwrap_or(0) == 0 {
                if let Some(cycle) = dfs_find_cycle(r.id.as_str(), &adjacency, &mut state, &mut stack) {
                    return Some(cycle.into_iter().map(str::to_owned).collect());
                }
            }
        }
        None
    }
}

fn dependency_ids(resource: &Resource) -> Vec<&str> {
    match &resource.dependencies {
        Some(deps) => deps
            .required
            .iter()
            .chain(deps.recommended.iter())
            .map(String::as_str)
            .collect(),
        None => Vec::new(),
    }
}

fn dfs_find_cycle<'a>(
    node: &'a str,
    adjacency: &BTreeMap<&'a str, Vec<&'a str>>,
    state: &mut HashMap<&'a str, u8>,
    stack: &mut Vec<&'a str>,
) -> Option<Vec<&'a str>> {
    state.insert(node, 1);
    stack.push(node);

    if let Some(children) = adjacency.get(node) {
        for &child in children {
            match state.get(child).copied().unwrap_or(0) {
                0 => {
                    if let Some(cycle) = dfs_find_cycle(child, adjacency, state, stack) {
                        return Some(cycle);
                    }
                }
                1 => {
                    let pos = stack.iter().position(|&n| n == child).expect("child is on stack");
                    let mut cycle: Vec<&str> = stack[pos..].to_vec();
                    cycle.push(child);
                    return Some(cycle);
                }
                _ => {}
            }
        }
    }

    stack.pop();
    state.insert(node, 2);
    None
}
