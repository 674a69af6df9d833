//! Credential supply for the Gong API
//!
//! The fetch engine treats credentials as opaque: it asks a
//! [`CredentialSupplier`] once per run and hands the result to the HTTP
//! client. Rejected credentials surface later as a fatal API error.

use std::fmt;

/// Environment variable holding the access key
pub const ACCESS_KEY_VAR: &str = "GONG_ACCESS_KEY";
/// Environment variable holding the access key secret
pub const ACCESS_KEY_SECRET_VAR: &str = "GONG_ACCESS_KEY_SECRET";
/// Environment variable holding the account subdomain
pub const SUBDOMAIN_VAR: &str = "GONG_SUBDOMAIN";

/// Credential errors
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// A required value is not set
    #[error("missing credential: {0} is not set")]
    Missing(&'static str),

    /// A value is present but unusable
    #[error("invalid credential: {0}")]
    Invalid(String),
}

/// API credentials for one account
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    access_key: String,
    access_key_secret: String,
    subdomain: String,
}

impl Credentials {
    /// Build credentials, normalizing the subdomain
    pub fn new(
        access_key: impl Into<String>,
        access_key_secret: impl Into<String>,
        subdomain: &str,
    ) -> Result<Self, CredentialError> {
        let access_key = access_key.into();
        let access_key_secret = access_key_secret.into();
        if access_key.trim().is_empty() {
            return Err(CredentialError::Missing(ACCESS_KEY_VAR));
        }
        if access_key_secret.trim().is_empty() {
            return Err(CredentialError::Missing(ACCESS_KEY_SECRET_VAR));
        }
        let subdomain = normalize_subdomain(subdomain);
        if subdomain.is_empty() {
            return Err(CredentialError::Missing(SUBDOMAIN_VAR));
        }
        if !subdomain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(CredentialError::Invalid(format!(
                "subdomain '{subdomain}' contains invalid characters"
            )));
        }
        Ok(Self {
            access_key,
            access_key_secret,
            subdomain,
        })
    }

    /// Access key (basic-auth user)
    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    /// Access key secret (basic-auth password)
    pub fn access_key_secret(&self) -> &str {
        &self.access_key_secret
    }

    /// Normalized account subdomain
    pub fn subdomain(&self) -> &str {
        &self.subdomain
    }

    /// API base URL for this account
    pub fn base_url(&self) -> String {
        format!("https://{}.api.gong.io", self.subdomain)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("access_key_secret", &"***")
            .field("subdomain", &self.subdomain)
            .finish()
    }
}

/// Reduce whatever the user pasted to the bare account subdomain.
///
/// Accepts `acme`, `ACME`, `https://acme.gong.io/`, `acme.api.gong.io` and
/// similar forms; all yield `acme`.
pub fn normalize_subdomain(raw: &str) -> String {
    let mut subdomain = raw.trim().to_lowercase();
    if let Some((_, rest)) = subdomain.split_once("://") {
        subdomain = rest.to_string();
    }
    if let Some((host, _)) = subdomain.split_once('/') {
        subdomain = host.to_string();
    }
    subdomain = subdomain.replace(".gong.io", "");
    if let Some(stripped) = subdomain.strip_suffix(".api") {
        subdomain = stripped.to_string();
    }
    subdomain
}

/// Source of credentials for a run
pub trait CredentialSupplier: Send + Sync {
    /// Produce credentials; called once before the first request
    fn credentials(&self) -> Result<Credentials, CredentialError>;
}

/// Reads credentials from the process environment.
///
/// The binary loads `.env` with `dotenvy` before this runs, so values from
/// the file are visible here too.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentials;

impl CredentialSupplier for EnvCredentials {
    fn credentials(&self) -> Result<Credentials, CredentialError> {
        let read = |name: &'static str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or(CredentialError::Missing(name))
        };
        Credentials::new(
            read(ACCESS_KEY_VAR)?,
            read(ACCESS_KEY_SECRET_VAR)?,
            &read(SUBDOMAIN_VAR)?,
        )
    }
}

/// Fixed credentials, for tests and embedding
#[derive(Debug, Clone)]
pub struct StaticCredentials(pub Credentials);

impl CredentialSupplier for StaticCredentials {
    fn credentials(&self) -> Result<Credentials, CredentialError> {
        Ok(self.0.clone())
    }
}
