#![deny(missing_docs)]

//! # resource-manager
//!
//! The engine behind the Claude resource manager: loads a declarative
//! catalog of agents, commands, hooks, templates and MCP servers, indexes it
//! for exact/prefix/fuzzy search, groups it into categories, resolves
//! dependency graphs, and installs resources to disk.
//!
//! Every catalog document passes through [`security`] before it is ever
//! deserialized: size bounds, a parse timeout, and rejection of YAML
//! constructs (tags, anchor/alias bombs) that could be used to smuggle
//! unexpected behavior or exhaust memory. [`catalog`] builds on that to load
//! and cache typed [`resource_manager_schema::Resource`] records;
//! [`category`] and [`search`] index them; [`resolver`] orders and validates
//! their dependency edges; [`installer`] performs the actual download and
//! write.

pub mod cache;
pub mod catalog;
pub mod category;
pub mod config;
pub mod errors;
pub mod installer;
pub mod resolver;
pub mod search;
pub mod security;

pub use config::Config;
pub use errors::{Result, RmError};
