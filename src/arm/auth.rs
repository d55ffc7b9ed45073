//! Azure Authentication
//!
//! Acquires Azure Resource Manager access tokens from the Azure Developer CLI,
//! the Azure CLI, or a pre-issued token in the environment.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::RwLock;

/// Resource the tokens are issued for
pub const ARM_RESOURCE: &str = "https://management.azure.com/";

/// Environment variable holding a pre-issued access token
pub const ACCESS_TOKEN_ENV: &str = "AZURE_ACCESS_TOKEN";

/// Token expiry buffer - refresh tokens this much before they actually expire
const TOKEN_EXPIRY_BUFFER: Duration = Duration::seconds(60);

/// Default token TTL if the source doesn't report one
const DEFAULT_TOKEN_TTL: Duration = Duration::minutes(30);

/// An access token and when it stops being valid
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Something that can issue access tokens
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_token(&self) -> Result<AccessToken>;
}

/// Which token source to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialKind {
    /// `azd auth token`
    #[default]
    Azd,
    /// `az account get-access-token`
    Az,
    /// The AZURE_ACCESS_TOKEN environment variable
    Env,
}

/// A fixed token, used for `AZURE_ACCESS_TOKEN` and in tests
pub struct StaticTokenSource {
    token: String,
}

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn fetch_token(&self) -> Result<AccessToken> {
        Ok(AccessToken {
            token: self.token.clone(),
            expires_at: None,
        })
    }
}

/// `azd auth token --output json`
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzdTokenOutput {
    token: String,
    expires_on: Option<String>,
}

/// `az account get-access-token --output json`
#[derive(Deserialize)]
struct AzTokenOutput {
    #[serde(rename = "accessToken")]
    access_token: String,
    /// Unix timestamp, present in az 2.54 and later
    expires_on: Option<i64>,
}

/// Tokens from the Azure Developer CLI or the Azure CLI
pub struct CliTokenSource {
    kind: CredentialKind,
}

impl CliTokenSource {
    pub fn new(kind: CredentialKind) -> Self {
        Self { kind }
    }

    async fn run(program: &str, args: &[&str]) -> Result<Vec<u8>> {
        tracing::debug!("Requesting token: {} {}", program, args.join(" "));
        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .with_context(|| format!("Failed to run '{}'. Is it installed and on PATH?", program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow::anyhow!(
                "'{}' exited with {}: {}",
                program,
                output.status,
                stderr.trim()
            ));
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl TokenSource for CliTokenSource {
    async fn fetch_token(&self) -> Result<AccessToken> {
        match self.kind {
            CredentialKind::Azd => {
                let scope = format!("{ARM_RESOURCE}.default");
                let stdout =
                    Self::run("azd", &["auth", "token", "--output", "json", "--scope", &scope])
                        .await
                        .context("Run 'azd auth login' to sign in")?;
                let parsed: AzdTokenOutput =
                    serde_json::from_slice(&stdout).context("Failed to parse azd token output")?;
                let expires_at = parsed
                    .expires_on
                    .as_deref()
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|t| t.with_timezone(&Utc));
                Ok(AccessToken {
                    token: parsed.token,
                    expires_at,
                })
            }
            CredentialKind::Az => {
                let stdout = Self::run(
                    "az",
                    &[
                        "account",
                        "get-access-token",
                        "--resource",
                        ARM_RESOURCE,
                        "--output",
                        "json",
                    ],
                )
                .await
                .context("Run 'az login' to sign in")?;
                let parsed: AzTokenOutput =
                    serde_json::from_slice(&stdout).context("Failed to parse az token output")?;
                Ok(AccessToken {
                    token: parsed.access_token,
                    expires_at: parsed
                        .expires_on
                        .and_then(|secs| DateTime::from_timestamp(secs, 0)),
                })
            }
            CredentialKind::Env => Err(anyhow::anyhow!(
                "{} is not a command line credential",
                ACCESS_TOKEN_ENV
            )),
        }
    }
}

/// Azure credentials holder with token caching
#[derive(Clone)]
pub struct ArmCredentials {
    provider: Arc<dyn TokenSource>,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    /// When this token expires (with buffer applied)
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Utc::now() < self.expires_at
    }
}

impl ArmCredentials {
    pub fn new(provider: Arc<dyn TokenSource>) -> Self {
        Self {
            provider,
            token_cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Credentials for the given kind
    pub fn from_kind(kind: CredentialKind) -> Result<Self> {
        let provider: Arc<dyn TokenSource> = match kind {
            CredentialKind::Env => {
                let token = std::env::var(ACCESS_TOKEN_ENV)
                    .with_context(|| format!("{} is not set", ACCESS_TOKEN_ENV))?;
                Arc::new(StaticTokenSource::new(token))
            }
            CredentialKind::Az | CredentialKind::Azd => Arc::new(CliTokenSource::new(kind)),
        };
        Ok(Self::new(provider))
    }

    /// Credentials that always hand out `token`
    pub fn from_static(token: impl Into<String>) -> Self {
        Self::new(Arc::new(StaticTokenSource::new(token)))
    }

    /// Get an access token for API calls
    pub async fn get_token(&self) -> Result<String> {
        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.token.clone());
                }
                tracing::debug!("Cached token expired, fetching new token");
            }
        }

        let fetched = self
            .provider
            .fetch_token()
            .await
            .context("Failed to get access token")?;

        let expires_at = fetched
            .expires_at
            .unwrap_or_else(|| Utc::now() + DEFAULT_TOKEN_TTL)
            - TOKEN_EXPIRY_BUFFER;

        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(CachedToken {
                token: fetched.token.clone(),
                expires_at,
            });
        }

        tracing::debug!("New token cached, expires at {}", expires_at);
        Ok(fetched.token)
    }
}

/// Get the Azure CLI configuration directory
pub fn get_azure_config_dir() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("AZURE_CONFIG_DIR") {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|p| p.join(".azure"))
}

/// Subscription ids are GUIDs
fn validate_subscription_id(id: &str) -> bool {
    uuid::Uuid::parse_str(id).is_ok()
}

#[derive(Deserialize)]
struct AzureProfile {
    #[serde(default)]
    subscriptions: Vec<ProfileSubscription>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileSubscription {
    id: String,
    #[serde(default)]
    is_default: bool,
}

/// Read the default subscription from the environment or the Azure CLI profile
pub fn get_default_subscription() -> Option<String> {
    if let Ok(id) = std::env::var("AZURE_SUBSCRIPTION_ID") {
        if validate_subscription_id(&id) {
            return Some(id);
        }
        tracing::warn!("Invalid subscription ID format in AZURE_SUBSCRIPTION_ID");
    }

    let profile_path = get_azure_config_dir()?.join("azureProfile.json");
    let content = std::fs::read_to_string(profile_path).ok()?;
    default_subscription_from_profile(&content)
}

fn default_subscription_from_profile(content: &str) -> Option<String> {
    // The Azure CLI writes this file with a UTF-8 BOM
    let content = content.trim_start_matches('\u{feff}');
    let profile: AzureProfile = serde_json::from_str(content).ok()?;
    profile
        .subscriptions
        .into_iter()
        .find(|s| s.is_default)
        .map(|s| s.id)
        .filter(|id| validate_subscription_id(id))
}
