//! aery applies declarative Azure resource documents.
//!
//! A deployment is a YAML file or a directory of them. Resources that carry
//! an alias instead of a name get a deterministic generated name, child
//! resources find their parent among their siblings, and every resource is
//! PUT against Azure Resource Manager with long-running operations polled to
//! completion.
//!
//! - [`naming`] - Naming catalog, hashing, and name generation
//! - [`deploy`] - Document loading, planning, and the apply executor
//! - [`arm`] - Credentials, HTTP, and operation polling
//! - [`config`] - Persistent defaults
//! - [`error`] - Error types

pub mod arm;
pub mod config;
pub mod deploy;
pub mod error;
pub mod naming;
