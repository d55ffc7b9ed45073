//! Parent Resolver
//!
//! Child resources (`Provider/type/child`) that do not name a parent get one
//! from the sibling whose type is exactly one segment shorter.

use super::document::ResourceSpec;
use crate::error::ParentResolutionError;

/// Whether `resource_type` nests under another resource type.
///
/// `Microsoft.Foo/bars` is top level, `Microsoft.Foo/bars/bazs` is a child.
pub fn is_child_resource(resource_type: &str) -> bool {
    match resource_type.split_once('/') {
        Some((_, rest)) => !rest.is_empty() && rest.contains('/'),
        None => false,
    }
}

/// Whether `parent_type` is exactly one segment shorter than `child_type`.
pub fn is_direct_parent(child_type: &str, parent_type: &str) -> bool {
    child_type
        .strip_prefix(parent_type)
        .and_then(|rest| rest.strip_prefix('/'))
        .is_some_and(|segment| !segment.is_empty() && !segment.contains('/'))
}

/// Fill `parent` for every child resource that lacks one.
///
/// Siblings are scanned in document order. Exactly one sibling must qualify;
/// none or several is an error. All resources must already have names.
pub fn resolve_parents(resources: &mut [ResourceSpec]) -> Result<(), ParentResolutionError> {
    let mut resolved = Vec::new();

    for (i, resource) in resources.iter().enumerate() {
        if resource.parent.is_some() || !is_child_resource(&resource.resource_type) {
            continue;
        }

        tracing::debug!("dynamic-resolve: resolving parent for {}", resource.display_name());

        let candidates: Vec<String> = resources
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .filter(|(_, p)| is_direct_parent(&resource.resource_type, &p.resource_type))
            .filter_map(|(_, p)| p.reference())
            .collect();

        if candidates.len() > 1 {
            return Err(ParentResolutionError::Ambiguous {
                name: resource.display_name().to_string(),
                resource_type: resource.resource_type.clone(),
                candidates,
            });
        }

        let Some(parent) = candidates.into_iter().next() else {
            return Err(ParentResolutionError::Unresolved {
                name: resource.display_name().to_string(),
                resource_type: resource.resource_type.clone(),
            });
        };
        tracing::debug!("dynamic-resolve: found parent: {}", parent);
        resolved.push((i, parent));
    }

    for (i, parent) in resolved {
        resources[i].parent = Some(parent);
    }
    Ok(())
}
