//! Document Loader
//!
//! Reads resource documents from a YAML file or a deployment directory.

use crate::error::DocumentError;
use serde::Deserialize;
use serde_yaml::Value;
use std::path::{Path, PathBuf};

/// File declaring the resource group of a deployment directory
pub const GROUP_FILE: &str = "group.yaml";

/// File declaring the subscription of a deployment directory
pub const SUBSCRIPTION_FILE: &str = "subscription.yaml";

/// One resource to materialize
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpec {
    /// Explicit final name
    #[serde(default)]
    pub name: Option<String>,
    /// Symbolic name used to derive `name`
    #[serde(default)]
    pub alias: Option<String>,
    /// Containing resource as `<type>/<name>`
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(rename = "type", default)]
    pub resource_type: String,
    #[serde(default)]
    pub api_version: String,
    /// Resource properties, sent as the request body
    #[serde(default)]
    pub spec: Value,
}

impl ResourceSpec {
    /// Name if known, otherwise alias, otherwise type. For messages only.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.alias.as_deref())
            .unwrap_or(&self.resource_type)
    }

    /// `<type>/<name>`, the form other resources use to reference this one.
    pub fn reference(&self) -> Option<String> {
        self.name
            .as_ref()
            .map(|name| format!("{}/{}", self.resource_type, name))
    }

    fn normalize(mut self) -> Self {
        for field in [&mut self.name, &mut self.alias, &mut self.parent] {
            if field.as_deref().is_some_and(str::is_empty) {
                *field = None;
            }
        }
        self
    }

    fn validate(&self, path: &Path, index: usize) -> Result<(), DocumentError> {
        let missing = |field| DocumentError::MissingField {
            path: path.to_path_buf(),
            index,
            field,
        };

        if self.resource_type.is_empty() {
            return Err(missing("type"));
        }
        if self.api_version.is_empty() {
            return Err(missing("apiVersion"));
        }
        if self.spec.is_null() {
            return Err(missing("spec"));
        }

        match (&self.name, &self.alias) {
            (None, None) => Err(DocumentError::MissingNameOrAlias {
                path: path.to_path_buf(),
                resource_type: self.resource_type.clone(),
            }),
            (Some(name), Some(_)) => Err(DocumentError::NameAndAlias {
                path: path.to_path_buf(),
                name: name.clone(),
            }),
            _ => Ok(()),
        }
    }
}

/// Decode a multi-document YAML stream. Empty documents are skipped.
pub fn parse_documents(content: &str, path: &Path) -> Result<Vec<ResourceSpec>, DocumentError> {
    let yaml_error = |source| DocumentError::Yaml {
        path: path.to_path_buf(),
        source,
    };

    let mut resources = Vec::new();
    for (index, document) in serde_yaml::Deserializer::from_str(content).enumerate() {
        let value = Value::deserialize(document).map_err(yaml_error)?;
        if value.is_null() {
            continue;
        }

        let resource = serde_yaml::from_value::<ResourceSpec>(value)
            .map_err(yaml_error)?
            .normalize();
        resource.validate(path, index + 1)?;
        resources.push(resource);
    }

    tracing::debug!("Loaded {} documents from {}", resources.len(), path.display());
    Ok(resources)
}

/// Read every resource document in a file, in stream order
pub fn load_documents(path: &Path) -> Result<Vec<ResourceSpec>, DocumentError> {
    let content = std::fs::read_to_string(path).map_err(|source| DocumentError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_documents(&content, path)
}

/// Everything an apply needs from the input path
#[derive(Debug, Clone)]
pub struct Deployment {
    pub subscription_id: String,
    /// Resource group given by the caller, if any
    pub resource_group: Option<String>,
    /// Resource group declared by `group.yaml`
    pub group: Option<ResourceSpec>,
    pub resources: Vec<ResourceSpec>,
}

/// Load a single file or a deployment directory.
///
/// A directory may hold `group.yaml` or `subscription.yaml` (not both);
/// every other YAML file is read in file name order and the documents form a
/// single set.
pub fn load_deployment(
    path: &Path,
    subscription_id: Option<&str>,
    resource_group: Option<&str>,
) -> Result<Deployment, DocumentError> {
    let metadata = std::fs::metadata(path).map_err(|source| DocumentError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut subscription_id = subscription_id.filter(|s| !s.is_empty()).map(str::to_string);
    let resource_group = resource_group.filter(|s| !s.is_empty()).map(str::to_string);

    if !metadata.is_dir() {
        if resource_group.is_none() {
            return Err(DocumentError::MissingResourceGroup {
                path: path.to_path_buf(),
            });
        }
        return Ok(Deployment {
            subscription_id: subscription_id.ok_or(DocumentError::MissingSubscription)?,
            resource_group,
            group: None,
            resources: load_documents(path)?,
        });
    }

    let subscription_def = load_scope_file(&path.join(SUBSCRIPTION_FILE), "subscription")?;
    let group = load_scope_file(&path.join(GROUP_FILE), "group")?;

    if subscription_def.is_some() && group.is_some() {
        return Err(DocumentError::ConflictingScope {
            dir: path.to_path_buf(),
        });
    }

    if let Some(subscription) = subscription_def {
        // Subscriptions are validated, never created.
        let declared = subscription.name.ok_or_else(|| DocumentError::MissingField {
            path: path.join(SUBSCRIPTION_FILE),
            index: 1,
            field: "name",
        })?;
        match &subscription_id {
            None => subscription_id = Some(declared),
            Some(given) if *given != declared => {
                return Err(DocumentError::SubscriptionMismatch {
                    given: given.clone(),
                    declared,
                })
            }
            Some(_) => {}
        }
    }

    let mut resources = Vec::new();
    for file in resource_files(path)? {
        resources.extend(load_documents(&file)?);
    }

    Ok(Deployment {
        subscription_id: subscription_id.ok_or(DocumentError::MissingSubscription)?,
        resource_group,
        group,
        resources,
    })
}

/// Load a scope file holding exactly one document, if it exists
fn load_scope_file(path: &Path, scope: &'static str) -> Result<Option<ResourceSpec>, DocumentError> {
    if !path.is_file() {
        return Ok(None);
    }

    let mut documents = load_documents(path)?;
    if documents.len() != 1 {
        return Err(DocumentError::ScopeDefinitionCount {
            scope,
            path: path.to_path_buf(),
            count: documents.len(),
        });
    }
    Ok(documents.pop())
}

/// Resource files of a deployment directory, sorted by file name
fn resource_files(dir: &Path) -> Result<Vec<PathBuf>, DocumentError> {
    let io_error = |source| DocumentError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_error)? {
        let path = entry.map_err(io_error)?.path();
        if !path.is_file() {
            continue;
        }

        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if file_name == GROUP_FILE || file_name == SUBSCRIPTION_FILE {
            continue;
        }

        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e == "yaml" || e == "yml");
        if is_yaml {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}
