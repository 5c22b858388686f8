/// Credential store adapter
/// Thin wrapper over the hosting platform's key-value secret store. The raw
/// get/put layer never fails the caller; deciding whether a missing value is
/// fatal belongs to `CredentialStore`.

use tracing::{error, warn};

use crate::error::{Error, Result};
use crate::models::Credential;

#[derive(Clone)]
pub struct SecretStore {
    http: reqwest::Client,
    base_url: String,
}

impl SecretStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Fetch a secret value. Any failure is logged and collapsed to `None`.
    pub async fn get(&self, name: &str) -> Option<String> {
        let url = format!("{}/secrets/{}", self.base_url, name);
        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => match response.text().await {
                Ok(value) => Some(value),
                Err(e) => {
                    error!(name, error = %e, "failed to read secret value");
                    None
                }
            },
            Ok(response) => {
                error!(name, status = %response.status(), "secret store returned an error");
                None
            }
            Err(e) => {
                error!(name, error = %e, "secret store unreachable");
                None
            }
        }
    }

    /// Best-effort write; errors are logged and swallowed.
    pub async fn put(&self, name: &str, value: String) {
        let url = format!("{}/secrets/{}", self.base_url, name);
        match self.http.put(&url).body(value).send().await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                warn!(name, status = %response.status(), "secret store rejected write");
            }
            Err(e) => {
                warn!(name, error = %e, "secret store write failed");
            }
        }
    }
}

/// JSON credential collection stored under a single parameter name.
pub struct CredentialStore {
    store: SecretStore,
    parameter: String,
}

impl CredentialStore {
    pub fn new(store: SecretStore, parameter: impl Into<String>) -> Self {
        Self {
            store,
            parameter: parameter.into(),
        }
    }

    /// Load the stored credential list. A missing or malformed payload is
    /// fatal for the run: there is nothing to process and nothing safe to
    /// write back.
    pub async fn load(&self) -> Result<Vec<Credential>> {
        let raw = self.store.get(&self.parameter).await.ok_or_else(|| {
            Error::CredentialStore(format!("no value for parameter {}", self.parameter))
        })?;
        serde_json::from_str::<Vec<Credential>>(&raw)
            .map_err(|e| Error::CredentialStore(format!("malformed credential list: {e}")))
    }

    /// Persist the updated credential list. Best-effort; the run never fails
    /// on this.
    pub async fn save(&self, credentials: &[Credential]) {
        match serde_json::to_string(credentials) {
            Ok(payload) => self.store.put(&self.parameter, payload).await,
            Err(e) => warn!(error = %e, "failed to encode credential list"),
        }
    }
}
