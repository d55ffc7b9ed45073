//! Naming Catalog - resource type abbreviations and naming rules
//!
//! The catalog maps an ARM resource type to one or more naming kinds. It is
//! loaded once at startup (from the embedded `names.yaml` or a user-supplied
//! file) and passed by reference to whatever needs it.

use crate::error::NamingError;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Embedded naming catalog (compiled into the binary)
const EMBEDDED_NAMES: &str = include_str!("../resources/names.yaml");

/// Kind recognized from an arbitrary property of the resource spec
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomKind {
    #[serde(default)]
    pub property_path: String,
    #[serde(default)]
    pub value: String,
}

impl CustomKind {
    pub fn is_set(&self) -> bool {
        !self.property_path.is_empty()
    }
}

/// Characters that may not appear in a name, by position
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RestrictedChars {
    #[serde(default)]
    pub global: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub suffix: String,
    #[serde(default)]
    pub consecutive: String,
}

/// Messages shown when a name passes or fails validation
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Messages {
    #[serde(default)]
    pub on_success: String,
    #[serde(default)]
    pub on_failure: String,
}

/// The rules for naming a resource
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamingRules {
    #[serde(default)]
    pub min_length: usize,
    #[serde(default)]
    pub max_length: usize,
    #[serde(default)]
    pub uniqueness_scope: String,
    #[serde(default)]
    pub regex: String,
    #[serde(default)]
    pub word_separator: String,
    #[serde(default)]
    pub restricted_chars: RestrictedChars,
    #[serde(default)]
    pub messages: Messages,
    /// Compiled `regex`, filled in when the catalog is loaded
    #[serde(skip)]
    compiled: Option<Regex>,
}

impl NamingRules {
    /// Check a name against the length bounds and pattern.
    pub fn check(&self, name: &str) -> Result<(), String> {
        let len = name.chars().count();
        if self.min_length > 0 && len < self.min_length {
            return Err(format!(
                "'{}' is shorter than {} characters",
                name, self.min_length
            ));
        }
        if self.max_length > 0 && len > self.max_length {
            return Err(format!(
                "'{}' is longer than {} characters",
                name, self.max_length
            ));
        }
        if let Some(regex) = &self.compiled {
            if !regex.is_match(name) {
                return Err(format!("'{}' does not match {}", name, self.regex));
            }
        }
        Ok(())
    }
}

/// A resource kind. A resource type can have multiple kinds; a type with
/// a single entry and no kind is the common case.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceKind {
    /// Display name of the resource kind
    #[serde(default)]
    pub name: String,
    /// Value of `spec.kind` that selects this entry
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub custom_kind: CustomKind,
    /// Short name abbreviation for new resources
    #[serde(default)]
    pub abbreviation: String,
    #[serde(default)]
    pub naming_rules: NamingRules,
}

impl ResourceKind {
    /// An entry with neither a kind nor a custom kind is the fallback.
    pub fn is_default(&self) -> bool {
        self.kind.is_empty() && !self.custom_kind.is_set()
    }
}

/// Root structure of names.yaml
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogFile {
    #[serde(default)]
    resource_types: HashMap<String, Vec<ResourceKind>>,
}

/// Abbreviations and naming rules by resource type
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    resource_types: HashMap<String, Vec<ResourceKind>>,
}

impl Catalog {
    /// Load the catalog compiled into the binary
    pub fn embedded() -> Result<Self, NamingError> {
        Self::from_yaml_str(EMBEDDED_NAMES)
    }

    /// Load a catalog file from disk
    pub fn from_path(path: &Path) -> Result<Self, NamingError> {
        let content = std::fs::read_to_string(path).map_err(|source| NamingError::CatalogIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// Parse a catalog and compile every naming rule pattern
    pub fn from_yaml_str(content: &str) -> Result<Self, NamingError> {
        let file: CatalogFile =
            serde_yaml::from_str(content).map_err(NamingError::CatalogParse)?;

        let mut resource_types = file.resource_types;
        for (resource_type, kinds) in resource_types.iter_mut() {
            for kind in kinds.iter_mut() {
                let rules = &mut kind.naming_rules;
                if rules.regex.is_empty() {
                    continue;
                }
                let compiled =
                    Regex::new(&rules.regex).map_err(|source| NamingError::InvalidRule {
                        resource_type: resource_type.clone(),
                        source,
                    })?;
                rules.compiled = Some(compiled);
            }
        }

        tracing::debug!("Naming catalog loaded with {} resource types", resource_types.len());
        Ok(Self { resource_types })
    }

    /// Naming kinds for a resource type
    pub fn kinds(&self, resource_type: &str) -> Option<&[ResourceKind]> {
        self.resource_types.get(resource_type).map(|k| k.as_slice())
    }

    /// All resource types in the catalog
    pub fn resource_types(&self) -> Vec<&str> {
        self.resource_types.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.resource_types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resource_types.is_empty()
    }
}
