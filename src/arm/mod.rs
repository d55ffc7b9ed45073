//! Azure Resource Manager interaction module
//!
//! This module provides the control-plane plumbing an apply needs:
//! authentication, an HTTP client, and long-running operation polling.
//!
//! # Module Structure
//!
//! - [`auth`] - Access tokens from azd, az, or the environment
//! - [`client`] - Main ARM client for making API requests
//! - [`http`] - HTTP utilities for REST API calls
//! - [`poller`] - Long-running operation polling
//!
//! # Example
//!
//! ```ignore
//! use aery::arm::{ArmClient, ArmCredentials, CredentialKind};
//!
//! let credentials = ArmCredentials::from_kind(CredentialKind::Azd)?;
//! let client = ArmClient::new(credentials)?;
//! let url = client.resource_url("/subscriptions/.../resourcegroups/rg", "2021-04-01")?;
//! let response = client.put(&url, &body).await?;
//! ```

pub mod auth;
pub mod client;
pub mod http;
pub mod poller;

pub use auth::{ArmCredentials, CredentialKind};
pub use client::ArmClient;
pub use poller::Poller;
