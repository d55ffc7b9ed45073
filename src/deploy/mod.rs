//! Applying resource documents
//!
//! - [`document`] - Loads resource documents from a file or directory
//! - [`parent`] - Fills in parents of child resources
//! - [`plan`] - Names resources and builds every request up front
//! - [`executor`] - Sends the requests and waits for provisioning
//!
//! All naming and parent resolution finishes before the first request is
//! sent, so a bad document never leaves a half-applied batch behind it.

pub mod document;
pub mod executor;
pub mod parent;
pub mod plan;

pub use document::{load_deployment, load_documents, Deployment, ResourceSpec};
pub use executor::{ApplyReport, AppliedResource, ExecuteOptions, Outcome};
pub use plan::{Plan, Step};

use crate::arm::ArmClient;
use crate::error::ApplyError;
use crate::naming::Catalog;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// What to apply and where
#[derive(Debug, Clone)]
pub struct ApplyRequest {
    /// A resource file or a deployment directory
    pub path: PathBuf,
    pub subscription_id: Option<String>,
    /// Required for a single file; a directory may declare it in `group.yaml`
    pub resource_group: Option<String>,
    pub options: ExecuteOptions,
}

/// Load, name, and address every resource without sending anything
pub fn plan(catalog: &Catalog, request: &ApplyRequest) -> Result<Plan, ApplyError> {
    let deployment = load_deployment(
        &request.path,
        request.subscription_id.as_deref(),
        request.resource_group.as_deref(),
    )?;
    plan::build(catalog, deployment)
}

/// Apply the resources at `request.path`
pub async fn apply(
    client: &ArmClient,
    catalog: &Catalog,
    request: &ApplyRequest,
    cancel: &CancellationToken,
) -> Result<ApplyReport, ApplyError> {
    let plan = plan(catalog, request)?;
    tracing::info!(
        "applying {} resources to subscription {}",
        plan.steps.len() + usize::from(plan.group.is_some()),
        plan.subscription_id
    );
    executor::execute(client, &plan, &request.options, cancel).await
}
