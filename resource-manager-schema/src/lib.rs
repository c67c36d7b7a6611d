#![deny(missing_docs)]

//! # resource-manager-schema
//!
//! Data model for the catalog consumed and produced by `resource-manager`.
//!
//! This crate exists to serialize and deserialize the on-disk catalog
//! (`index.yaml` plus per-type resource documents) and to give the rest of
//! the engine a single, strictly-validated vocabulary for resources,
//! sources, dependencies and categories. It has no I/O and no async
//! dependencies of its own -- it is the shape everything else agrees on.

mod catalog;
mod category;
mod resource;

pub use catalog::{Catalog, ResourceSummary, ResourceTypeIndex};
pub use category::Category;
pub use resource::{Dependency, Resource, ResourceType, SchemaError, Source};
