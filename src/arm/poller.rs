//! Long-running operation poller
//!
//! A PUT answered with 201 keeps provisioning in the background. The poller
//! follows whichever status monitor the response points at until the
//! operation reaches a terminal state.

use super::client::ArmClient;
use super::http::RawResponse;
use crate::error::{PollingError, ResponseError};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const ASYNC_OPERATION_HEADER: &str = "azure-asyncoperation";
pub const LOCATION_HEADER: &str = "location";
pub const RETRY_AFTER_HEADER: &str = "retry-after";

/// Where the operation status is read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStrategy {
    /// Operation resource from `Azure-AsyncOperation`; its body carries `status`
    AsyncOperation(String),
    /// Monitor from `Location`; 202 while running
    Location(String),
    /// The resource itself; `properties.provisioningState`
    ProvisioningState(String),
}

/// Provisioning state as reported by ARM
#[derive(Debug, Clone, PartialEq, Eq)]
enum OperationState {
    InProgress,
    Succeeded,
    Failed(String),
}

impl OperationState {
    fn parse(status: &str) -> Self {
        if status.eq_ignore_ascii_case("succeeded") {
            OperationState::Succeeded
        } else if ["failed", "canceled", "cancelled"]
            .iter()
            .any(|s| status.eq_ignore_ascii_case(s))
        {
            OperationState::Failed(status.to_string())
        } else {
            OperationState::InProgress
        }
    }
}

fn provisioning_state(body: &Value) -> Option<&str> {
    body.pointer("/properties/provisioningState")
        .and_then(Value::as_str)
}

fn retry_after(response: &RawResponse) -> Option<Duration> {
    response
        .header(RETRY_AFTER_HEADER)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Follows a long-running operation to completion
pub struct Poller<'c> {
    client: &'c ArmClient,
    strategy: PollStrategy,
    resource_url: String,
    interval: Duration,
    next_delay: Duration,
    /// Body of the creating response when it was already terminal
    initial: Option<Value>,
}

impl<'c> Poller<'c> {
    /// Poller for a PUT to `resource_url` that answered 201
    pub fn from_created(
        client: &'c ArmClient,
        resource_url: &str,
        response: &RawResponse,
        interval: Duration,
    ) -> Self {
        let strategy = if let Some(url) = response.header(ASYNC_OPERATION_HEADER) {
            PollStrategy::AsyncOperation(url.to_string())
        } else if let Some(url) = response.header(LOCATION_HEADER) {
            PollStrategy::Location(url.to_string())
        } else {
            PollStrategy::ProvisioningState(resource_url.to_string())
        };

        tracing::debug!("polling strategy for {}: {:?}", resource_url, strategy);

        Self {
            client,
            strategy,
            resource_url: resource_url.to_string(),
            interval,
            next_delay: retry_after(response).unwrap_or(interval),
            initial: response.json().ok(),
        }
    }

    pub fn strategy(&self) -> &PollStrategy {
        &self.strategy
    }

    /// Poll at the configured interval until the operation is terminal.
    ///
    /// Returns the final resource body. Cancellation interrupts the wait
    /// between requests.
    pub async fn poll_until_done(
        mut self,
        cancel: &CancellationToken,
    ) -> Result<Value, PollingError> {
        if let Some(body) = self.initial.take() {
            match provisioning_state(&body).map(OperationState::parse) {
                Some(OperationState::Succeeded) => return Ok(body),
                Some(OperationState::Failed(status)) => {
                    return Err(PollingError::Failed {
                        status,
                        body: body.to_string(),
                    })
                }
                _ => {}
            }
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(PollingError::Cancelled),
                _ = tokio::time::sleep(self.next_delay) => {}
            }

            if let Some(body) = self.poll_once().await? {
                return Ok(body);
            }
        }
    }

    /// One status request. `Some` carries the final body.
    async fn poll_once(&mut self) -> Result<Option<Value>, PollingError> {
        let url = match &self.strategy {
            PollStrategy::AsyncOperation(url)
            | PollStrategy::Location(url)
            | PollStrategy::ProvisioningState(url) => url.clone(),
        };

        let response = self.client.get(&url).await?;
        self.next_delay = retry_after(&response).unwrap_or(self.interval);

        match &self.strategy {
            PollStrategy::Location(_) => match response.status {
                StatusCode::ACCEPTED => Ok(None),
                StatusCode::OK | StatusCode::CREATED | StatusCode::NO_CONTENT => {
                    let body = parse_body(&url, &response)?;
                    Ok(Some(body))
                }
                status => Err(unexpected(&url, status, response.body).into()),
            },
            PollStrategy::AsyncOperation(_) => {
                let body = expect_success(&url, response)?;
                let Some(status) = body.get("status").and_then(Value::as_str) else {
                    return Err(PollingError::MissingStatus {
                        url,
                        body: body.to_string(),
                    });
                };
                tracing::debug!("operation status: {}", status);

                match OperationState::parse(status) {
                    OperationState::InProgress => Ok(None),
                    OperationState::Failed(status) => Err(PollingError::Failed {
                        status,
                        body: body.to_string(),
                    }),
                    OperationState::Succeeded => {
                        let resource_url = self.resource_url.clone();
                        let final_response = self.client.get(&resource_url).await?;
                        expect_success(&resource_url, final_response).map(Some)
                    }
                }
            }
            PollStrategy::ProvisioningState(_) => {
                let body = expect_success(&url, response)?;
                // A resource without a provisioning state is done once readable
                let state = provisioning_state(&body)
                    .map(OperationState::parse)
                    .unwrap_or(OperationState::Succeeded);
                tracing::debug!("provisioning state: {:?}", state);

                match state {
                    OperationState::InProgress => Ok(None),
                    OperationState::Succeeded => Ok(Some(body)),
                    OperationState::Failed(status) => Err(PollingError::Failed {
                        status,
                        body: body.to_string(),
                    }),
                }
            }
        }
    }
}

fn unexpected(url: &str, status: StatusCode, body: String) -> ResponseError {
    ResponseError::new("GET", url, status, body)
}

fn parse_body(url: &str, response: &RawResponse) -> Result<Value, PollingError> {
    response
        .json()
        .map_err(|source| PollingError::MalformedStatus {
            url: url.to_string(),
            source,
        })
}

fn expect_success(url: &str, response: RawResponse) -> Result<Value, PollingError> {
    if !response.status.is_success() {
        return Err(unexpected(url, response.status, response.body).into());
    }
    parse_body(url, &response)
}
