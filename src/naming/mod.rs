//! Resource naming
//!
//! Deterministic names for resources that declare an alias instead of a
//! name. The catalog is data-driven: abbreviations and naming rules are
//! loaded from `src/resources/names.yaml` at startup, so new resource types
//! can be added without code changes.
//!
//! - [`catalog`] - Abbreviations and naming rules by resource type
//! - [`hash`] - MurmurHash64 and token encoding
//! - [`generator`] - `unique_string` and the name generator
//! - [`spec_path`] - Property lookup inside a resource spec
//!
//! # Example
//!
//! ```ignore
//! use aery::naming::{unique_string, Catalog, NameGenerator};
//!
//! let catalog = Catalog::embedded()?;
//! let token = unique_string(&[subscription_id, resource_group, "web"]);
//! let name = NameGenerator::new(&catalog).name(&token, &resource)?;
//! ```

pub mod catalog;
pub mod generator;
pub mod hash;
pub mod spec_path;

pub use catalog::{Catalog, ResourceKind};
pub use generator::{unique_string, NameGenerator};
