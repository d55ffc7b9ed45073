//! Error types
//!
//! Every stage of an apply has its own error type so callers can tell a bad
//! document from a naming problem or a failed control-plane call. Messages
//! never embed their source; print the chain with `{:#}` to see the cause.

use reqwest::StatusCode;
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Malformed input documents or an inconsistent deployment layout.
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("reading {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing {}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("{}: document {index} is missing required field '{field}'", path.display())]
    MissingField {
        path: PathBuf,
        index: usize,
        field: &'static str,
    },

    #[error("{}: resource {resource_type} must specify either name or alias", path.display())]
    MissingNameOrAlias { path: PathBuf, resource_type: String },

    #[error("{}: resource {name} cannot specify both name and alias", path.display())]
    NameAndAlias { path: PathBuf, name: String },

    #[error("expected to find either subscription.yaml or group.yaml in {}, not both", dir.display())]
    ConflictingScope { dir: PathBuf },

    #[error("expected a single {scope} definition in {}, found {count}", path.display())]
    ScopeDefinitionCount {
        scope: &'static str,
        path: PathBuf,
        count: usize,
    },

    #[error("group {given} does not match group.yaml: {declared}")]
    GroupMismatch { given: String, declared: String },

    #[error("subscription {given} does not match subscription.yaml: {declared}")]
    SubscriptionMismatch { given: String, declared: String },

    #[error("resource group is required when {} is a file", path.display())]
    MissingResourceGroup { path: PathBuf },

    #[error("subscription id is required")]
    MissingSubscription,

    #[error("converting spec of {name} to JSON")]
    SpecToJson {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A child resource whose parent cannot be determined.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParentResolutionError {
    #[error("failed to resolve parent for {name} ({resource_type})")]
    Unresolved { name: String, resource_type: String },

    #[error("ambiguous parent for {name} ({resource_type}): candidates {}", candidates.join(", "))]
    Ambiguous {
        name: String,
        resource_type: String,
        candidates: Vec<String>,
    },

    #[error("parent resource {parent} is not a valid parent for resource {name}")]
    InvalidParent { name: String, parent: String },

    #[error("parent references form a cycle: {}", names.join(" -> "))]
    Cycle { names: Vec<String> },
}

/// Catalog lookups and naming rule failures.
#[derive(Error, Debug)]
pub enum NamingError {
    #[error(
        "naming translation for resource type {0} not found; set `name` instead of `alias`, or pass --names-file with an entry for it"
    )]
    UnknownType(String),

    #[error("no naming kind of {resource_type} matches the resource and no default exists")]
    NoMatchingKind { resource_type: String },

    #[error("invalid property path '{path}'")]
    InvalidPath { path: String },

    #[error("property '{path}' of {resource_type} is not a string")]
    NonStringKind { resource_type: String, path: String },

    #[error("reading naming catalog {}", path.display())]
    CatalogIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing naming catalog")]
    CatalogParse(#[source] serde_yaml::Error),

    #[error("invalid naming rule for {resource_type}")]
    InvalidRule {
        resource_type: String,
        #[source]
        source: regex::Error,
    },
}

/// A control-plane call answered with an unexpected status.
#[derive(Debug, Clone)]
pub struct ResponseError {
    pub method: String,
    pub url: String,
    pub status: StatusCode,
    pub body: String,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

impl ResponseError {
    pub fn new(method: &str, url: &str, status: StatusCode, body: String) -> Self {
        let parsed = serde_json::from_str::<Value>(&body).ok();
        let error = parsed.as_ref().and_then(|v| v.get("error"));
        let field = |name: &str| {
            error
                .and_then(|e| e.get(name))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
        };

        Self {
            method: method.to_string(),
            url: url.to_string(),
            status,
            error_code: field("code"),
            error_message: field("message"),
            body,
        }
    }
}

impl fmt::Display for ResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.method, self.url, self.status)?;
        match (&self.error_code, &self.error_message) {
            (Some(code), Some(message)) => write!(f, " ({code}: {message})"),
            (Some(code), None) => write!(f, " ({code})"),
            _ if !self.body.is_empty() => write!(f, "\n{}", self.body),
            _ => Ok(()),
        }
    }
}

impl std::error::Error for ResponseError {}

/// A long-running operation that did not reach a successful terminal state.
#[derive(Error, Debug)]
pub enum PollingError {
    #[error("operation ended in state {status}")]
    Failed { status: String, body: String },

    #[error("polling cancelled")]
    Cancelled,

    #[error(transparent)]
    Response(#[from] ResponseError),

    #[error("polling {url}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unreadable operation status from {url}")]
    MalformedStatus {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("operation status from {url} has no status field: {body}")]
    MissingStatus { url: String, body: String },

    #[error("acquiring access token")]
    Credential(#[source] anyhow::Error),
}

/// Everything that can stop an apply.
#[derive(Error, Debug)]
pub enum ApplyError {
    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    ParentResolution(#[from] ParentResolutionError),

    #[error(transparent)]
    Naming(#[from] NamingError),

    #[error(transparent)]
    Response(#[from] ResponseError),

    #[error(transparent)]
    Polling(#[from] PollingError),

    #[error("failed applying resource {name}")]
    Resource {
        name: String,
        #[source]
        source: Box<ApplyError>,
    },

    #[error("sending request to {url}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid request URL {url}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("acquiring access token")]
    Credential(#[source] anyhow::Error),

    #[error("apply cancelled")]
    Cancelled,
}

impl ApplyError {
    /// Wrap an error with the name of the resource being applied.
    pub fn for_resource(name: &str, source: ApplyError) -> Self {
        ApplyError::Resource {
            name: name.to_string(),
            source: Box::new(source),
        }
    }

    /// The error underneath any resource wrappers.
    pub fn innermost(&self) -> &ApplyError {
        match self {
            ApplyError::Resource { source, .. } => source.innermost(),
            other => other,
        }
    }

    /// HTTP status of the failed control-plane call, if there was one.
    pub fn status(&self) -> Option<StatusCode> {
        match self.innermost() {
            ApplyError::Response(e) => Some(e.status),
            ApplyError::Polling(PollingError::Response(e)) => Some(e.status),
            _ => None,
        }
    }
}
