//! Name Generator
//!
//! Derives deterministic resource names from an alias (or the catalog
//! abbreviation) and a token hashed from the deployment scope.

use super::catalog::{Catalog, ResourceKind};
use super::hash::{base32_token, murmur_hash64};
use super::spec_path;
use crate::deploy::ResourceSpec;
use crate::error::NamingError;

/// Hash `parts` joined with `-` into a 13-character token.
///
/// Deterministic across runs and processes, not cryptographically secure.
pub fn unique_string<S: AsRef<str>>(parts: &[S]) -> String {
    let joined = parts
        .iter()
        .map(|p| p.as_ref())
        .collect::<Vec<_>>()
        .join("-");
    base32_token(murmur_hash64(joined.as_bytes(), 0))
}

/// Generates names for resources that only carry an alias
#[derive(Debug, Clone, Copy)]
pub struct NameGenerator<'a> {
    catalog: &'a Catalog,
}

impl<'a> NameGenerator<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Name for `resource`, using `token` as the unique suffix.
    ///
    /// An explicit name is returned unchanged.
    pub fn name(&self, token: &str, resource: &ResourceSpec) -> Result<String, NamingError> {
        if let Some(name) = &resource.name {
            return Ok(name.clone());
        }

        let kinds = self
            .catalog
            .kinds(&resource.resource_type)
            .ok_or_else(|| NamingError::UnknownType(resource.resource_type.clone()))?;

        let kind = select_kind(kinds, resource)?.ok_or_else(|| NamingError::NoMatchingKind {
            resource_type: resource.resource_type.clone(),
        })?;

        let prefix = resource.alias.as_deref().unwrap_or(&kind.abbreviation);
        let hyphen_restricted = kind.naming_rules.restricted_chars.global.contains('-');
        let separator = if prefix.is_empty() || hyphen_restricted {
            ""
        } else {
            "-"
        };
        let name = format!("{prefix}{separator}{token}");

        if let Err(reason) = kind.naming_rules.check(&name) {
            let hint = &kind.naming_rules.messages.on_failure;
            tracing::warn!(
                "generated name for {} breaks naming rules: {} {}",
                resource.resource_type,
                reason,
                hint
            );
        }

        Ok(name)
    }
}

/// Pick the naming kind that applies to `resource`.
///
/// `kind` entries match `spec.kind` exactly. `customKind` entries match when
/// the configured property contains the value, ignoring case; this can
/// misclassify a resource whose property merely shares a substring.
fn select_kind<'k>(
    kinds: &'k [ResourceKind],
    resource: &ResourceSpec,
) -> Result<Option<&'k ResourceKind>, NamingError> {
    if let [only] = kinds {
        if only.is_default() {
            return Ok(Some(only));
        }
    }

    let mut fallback = None;
    for kind in kinds {
        if kind.is_default() {
            if fallback.is_none() {
                fallback = Some(kind);
            }
            continue;
        }

        let matched = if kind.custom_kind.is_set() {
            let wanted = kind.custom_kind.value.to_lowercase();
            lookup_str(resource, &kind.custom_kind.property_path)?
                .is_some_and(|actual| actual.to_lowercase().contains(&wanted))
        } else {
            lookup_str(resource, "kind")? == Some(kind.kind.as_str())
        };

        if matched {
            return Ok(Some(kind));
        }
    }

    Ok(fallback)
}

fn lookup_str<'r>(resource: &'r ResourceSpec, path: &str) -> Result<Option<&'r str>, NamingError> {
    let Some(value) = spec_path::lookup(&resource.spec, path)? else {
        return Ok(None);
    };
    value
        .as_str()
        .map(Some)
        .ok_or_else(|| NamingError::NonStringKind {
            resource_type: resource.resource_type.clone(),
            path: path.to_string(),
        })
}
