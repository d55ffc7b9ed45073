//! Apply Executor
//!
//! Sends the PUT for every step of a plan, parents before children, and
//! follows long-running operations to completion.

use super::plan::{Plan, Step};
use crate::arm::{ArmClient, Poller};
use crate::error::{ApplyError, PollingError, ResponseError};
use futures::stream::{FuturesUnordered, StreamExt};
use reqwest::StatusCode;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Knobs for a single apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Delay between status polls of a long-running operation
    pub poll_interval: Duration,
    /// Resources in flight at once; 1 applies strictly in document order
    pub max_parallel: usize,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_parallel: 1,
        }
    }
}

/// How a resource reached its applied state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The PUT answered 200
    Sync,
    /// The PUT answered 201 and the operation was polled to completion
    Polled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedResource {
    pub name: String,
    pub resource_id: String,
    pub outcome: Outcome,
    pub elapsed: Duration,
}

/// Resources applied by one run, in completion order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: Vec<AppliedResource>,
    pub elapsed: Duration,
}

/// Apply every step of `plan`.
///
/// The group goes first. Afterwards up to `max_parallel` steps run at once;
/// a step starts only after its in-batch parent applied, and ready steps are
/// picked in document order. The first failure stops new steps from starting;
/// steps already in flight run to completion.
pub async fn execute(
    client: &ArmClient,
    plan: &Plan,
    options: &ExecuteOptions,
    cancel: &CancellationToken,
) -> Result<ApplyReport, ApplyError> {
    let start = Instant::now();
    let mut report = ApplyReport::default();

    if let Some(group) = &plan.group {
        let applied = apply_one(client, group, options, cancel)
            .await
            .map_err(|e| ApplyError::for_resource(&group.name, e))?;
        report.applied.push(applied);
    }

    let children = plan.children();
    let mut ready: BTreeSet<usize> = plan
        .steps
        .iter()
        .enumerate()
        .filter(|(_, step)| step.parent.is_none())
        .map(|(i, _)| i)
        .collect();
    let max_parallel = options.max_parallel.max(1);
    let mut running = FuturesUnordered::new();
    let mut failure = None;

    loop {
        while failure.is_none() && running.len() < max_parallel {
            let Some(i) = ready.pop_first() else {
                break;
            };
            let step = &plan.steps[i];
            running.push(async move { (i, apply_one(client, step, options, cancel).await) });
        }

        let Some((i, result)) = running.next().await else {
            break;
        };

        match result {
            Ok(applied) => {
                report.applied.push(applied);
                ready.extend(children[i].iter().copied());
            }
            Err(e) => {
                tracing::error!("applying {} failed: {}", plan.steps[i].name, e);
                if failure.is_none() {
                    failure = Some(ApplyError::for_resource(&plan.steps[i].name, e));
                }
            }
        }
    }

    if let Some(e) = failure {
        return Err(e);
    }

    report.elapsed = start.elapsed();
    println!("applied all in {:.1}s", report.elapsed.as_secs_f64());
    Ok(report)
}

/// PUT one resource and wait until it is provisioned
pub async fn apply_one(
    client: &ArmClient,
    step: &Step,
    options: &ExecuteOptions,
    cancel: &CancellationToken,
) -> Result<AppliedResource, ApplyError> {
    if cancel.is_cancelled() {
        return Err(ApplyError::Cancelled);
    }

    println!("  applying {}...", step.name);
    let start = Instant::now();

    let url = client.resource_url(&step.resource_id, &step.api_version)?;
    tracing::debug!("PUT {}\n{}", url, step.body);

    let response = client.put(&url, &step.body).await?;
    let (outcome, body) = match response.status {
        StatusCode::OK => (Outcome::Sync, response.body),
        StatusCode::CREATED => {
            let poller = Poller::from_created(client, url.as_str(), &response, options.poll_interval);
            let body = poller
                .poll_until_done(cancel)
                .await
                .map_err(|e| match e {
                    PollingError::Cancelled => ApplyError::Cancelled,
                    other => other.into(),
                })?;
            (Outcome::Polled, body.to_string())
        }
        status => {
            return Err(ResponseError::new("PUT", url.as_str(), status, response.body).into())
        }
    };

    let elapsed = start.elapsed();
    println!("  applied {} in {:.1}s", step.name, elapsed.as_secs_f64());
    tracing::debug!("Result of applying resource: {}\n{}", url, body);

    Ok(AppliedResource {
        name: step.name.clone(),
        resource_id: step.resource_id.clone(),
        outcome,
        elapsed,
    })
}
