//! Deployment plan
//!
//! Turns a loaded deployment into fully named, fully addressed PUT requests.
//! Nothing here touches the network, so a plan doubles as the dry-run output.

use super::document::{Deployment, ResourceSpec};
use super::parent::resolve_parents;
use crate::error::{ApplyError, DocumentError, ParentResolutionError};
use crate::naming::{unique_string, Catalog, NameGenerator};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::fmt;

/// Resource groups live under `resourcegroups`, not a provider segment
pub const RESOURCE_GROUP_TYPE: &str = "Microsoft.Resources/resourceGroups";

/// One PUT request
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub name: String,
    pub resource_type: String,
    /// Path below the control-plane host
    pub resource_id: String,
    pub api_version: String,
    pub body: Value,
    /// Step in the same plan that must be applied first
    pub parent: Option<usize>,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PUT {}?api-version={}",
            self.resource_id, self.api_version
        )
    }
}

/// Everything an apply will send, in document order
#[derive(Debug, Clone)]
pub struct Plan {
    pub subscription_id: String,
    pub resource_group: Option<String>,
    /// Resource group declared by `group.yaml`, applied before anything else
    pub group: Option<Step>,
    pub steps: Vec<Step>,
}

impl Plan {
    /// In-batch children of every step
    pub fn children(&self) -> Vec<Vec<usize>> {
        let mut children = vec![Vec::new(); self.steps.len()];
        for (i, step) in self.steps.iter().enumerate() {
            if let Some(parent) = step.parent {
                children[parent].push(i);
            }
        }
        children
    }

    pub fn is_empty(&self) -> bool {
        self.group.is_none() && self.steps.is_empty()
    }
}

/// The `--dry-run` listing: scope, then each resource and its request line
impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "subscription {}", self.subscription_id)?;
        if let Some(group) = &self.resource_group {
            writeln!(f, "resource group {group}")?;
        }
        if self.is_empty() {
            return writeln!(f, "  nothing to apply");
        }
        for step in self.group.iter().chain(&self.steps) {
            writeln!(f, "  {} ({})", step.name, step.resource_type)?;
            writeln!(f, "    {step}")?;
        }
        Ok(())
    }
}

/// `/subscriptions/<sub>[/resourceGroups/<group>]`
pub fn scope_path(subscription_id: &str, resource_group: Option<&str>) -> String {
    match resource_group {
        Some(group) => format!("/subscriptions/{subscription_id}/resourceGroups/{group}"),
        None => format!("/subscriptions/{subscription_id}"),
    }
}

/// Path of a resource without a parent
pub fn top_level_id(scope: &str, resource_type: &str, name: &str) -> String {
    if resource_type == RESOURCE_GROUP_TYPE {
        format!("{scope}/resourcegroups/{name}")
    } else {
        format!("{scope}/providers/{resource_type}/{name}")
    }
}

/// Path of a child whose parent is referenced as `<type>/<name>`.
///
/// The parent's leading segments must equal the child's base type:
/// `A/B/C` named `y` under `A/B/x` becomes `providers/A/B/x/C/y`.
pub fn spliced_id(
    scope: &str,
    resource_type: &str,
    name: &str,
    parent: &str,
) -> Result<String, ParentResolutionError> {
    let (base, child_suffix) = split_child_type(resource_type, name, parent)?;
    let parent_suffix = &parent[base.len()..];
    Ok(format!(
        "{scope}/providers/{base}{parent_suffix}{child_suffix}/{name}"
    ))
}

/// Split `resource_type` at its last `/` after checking `parent` shares the base
fn split_child_type<'t>(
    resource_type: &'t str,
    name: &str,
    parent: &str,
) -> Result<(&'t str, &'t str), ParentResolutionError> {
    let invalid = || ParentResolutionError::InvalidParent {
        name: name.to_string(),
        parent: parent.to_string(),
    };

    let last_slash = resource_type.rfind('/').ok_or_else(invalid)?;
    let (base, child_suffix) = resource_type.split_at(last_slash);
    let shares_base = parent
        .strip_prefix(base)
        .is_some_and(|rest| rest.len() > 1 && rest.starts_with('/'));
    if !shares_base {
        return Err(invalid());
    }
    Ok((base, child_suffix))
}

/// Name every resource, resolve parents, and address every request.
pub fn build(catalog: &Catalog, deployment: Deployment) -> Result<Plan, ApplyError> {
    let Deployment {
        subscription_id,
        mut resource_group,
        group,
        mut resources,
    } = deployment;
    let generator = NameGenerator::new(catalog);

    let group = match group {
        Some(mut group) => {
            // The group itself lives at subscription scope
            let name = assign_name(&generator, &subscription_id, "", &mut group)?;
            if let Some(given) = &resource_group {
                if *given != name {
                    return Err(DocumentError::GroupMismatch {
                        given: given.clone(),
                        declared: name,
                    }
                    .into());
                }
            }
            resource_group = Some(name);
            let scope = scope_path(&subscription_id, None);
            let resource_id = top_level_id(&scope, &group.resource_type, group.display_name());
            Some(to_step(group, resource_id, None)?)
        }
        None => None,
    };

    let group_name = resource_group.as_deref().unwrap_or("");
    for resource in resources.iter_mut() {
        assign_name(&generator, &subscription_id, group_name, resource)?;
    }

    resolve_parents(&mut resources)?;

    let parents = in_batch_parents(&resources)?;
    let scope = scope_path(&subscription_id, resource_group.as_deref());
    let mut ids: Vec<Option<String>> = vec![None; resources.len()];

    for i in topological_order(&resources, &parents)? {
        let resource = &resources[i];
        let name = resource.display_name();
        let id = match (&resource.parent, parents[i]) {
            (None, _) => top_level_id(&scope, &resource.resource_type, name),
            (Some(parent), Some(p)) => {
                let (_, child_suffix) = split_child_type(&resource.resource_type, name, parent)?;
                let parent_id = ids[p].as_deref().unwrap_or_default();
                format!("{parent_id}{child_suffix}/{name}")
            }
            (Some(parent), None) => spliced_id(&scope, &resource.resource_type, name, parent)?,
        };
        ids[i] = Some(id);
    }

    let steps = resources
        .into_iter()
        .zip(ids)
        .zip(parents)
        .map(|((resource, id), parent)| to_step(resource, id.unwrap_or_default(), parent))
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!(
        "planned {} resources in {}",
        steps.len(),
        scope_path(&subscription_id, resource_group.as_deref())
    );

    Ok(Plan {
        subscription_id,
        resource_group,
        group,
        steps,
    })
}

/// Fill in a generated name for an aliased resource and return the final name
fn assign_name(
    generator: &NameGenerator<'_>,
    subscription_id: &str,
    group: &str,
    resource: &mut ResourceSpec,
) -> Result<String, ApplyError> {
    if let Some(name) = &resource.name {
        return Ok(name.clone());
    }

    let alias = resource.alias.clone().unwrap_or_default();
    let token = unique_string(&[subscription_id, group, alias.as_str()]);
    let name = generator
        .name(&token, resource)
        .map_err(|e| ApplyError::for_resource(&alias, e.into()))?;

    tracing::debug!("named {} ({}) {}", alias, resource.resource_type, name);
    resource.name = Some(name.clone());
    Ok(name)
}

/// Index of the resource each parent reference points at, when it is in this batch
fn in_batch_parents(resources: &[ResourceSpec]) -> Result<Vec<Option<usize>>, ParentResolutionError> {
    let mut by_reference = HashMap::new();
    for (i, resource) in resources.iter().enumerate() {
        if let Some(reference) = resource.reference() {
            by_reference.entry(reference).or_insert(i);
        }
    }

    let mut parents = Vec::with_capacity(resources.len());
    for resource in resources {
        let Some(parent) = &resource.parent else {
            parents.push(None);
            continue;
        };
        split_child_type(&resource.resource_type, resource.display_name(), parent)?;
        parents.push(by_reference.get(parent.as_str()).copied());
    }
    Ok(parents)
}

/// Parents before children, otherwise document order
fn topological_order(
    resources: &[ResourceSpec],
    parents: &[Option<usize>],
) -> Result<Vec<usize>, ParentResolutionError> {
    let mut children = vec![Vec::new(); resources.len()];
    let mut queue = VecDeque::new();
    for (i, parent) in parents.iter().enumerate() {
        match parent {
            Some(p) => children[*p].push(i),
            None => queue.push_back(i),
        }
    }

    let mut order = Vec::with_capacity(resources.len());
    while let Some(i) = queue.pop_front() {
        order.push(i);
        queue.extend(children[i].iter().copied());
    }

    if order.len() < resources.len() {
        let mut placed = vec![false; resources.len()];
        for &i in &order {
            placed[i] = true;
        }
        let names = resources
            .iter()
            .zip(placed)
            .filter(|(_, placed)| !placed)
            .map(|(r, _)| r.display_name().to_string())
            .collect();
        return Err(ParentResolutionError::Cycle { names });
    }
    Ok(order)
}

fn to_step(
    resource: ResourceSpec,
    resource_id: String,
    parent: Option<usize>,
) -> Result<Step, ApplyError> {
    let name = resource.display_name().to_string();
    let body = serde_json::to_value(&resource.spec).map_err(|source| DocumentError::SpecToJson {
        name: name.clone(),
        source,
    })?;

    Ok(Step {
        name,
        resource_type: resource.resource_type,
        resource_id,
        api_version: resource.api_version,
        body,
        parent,
    })
}
