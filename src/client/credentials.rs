//! Connection endpoint and shared secret, persisted across sessions.

use tracing::debug;

use super::settings_store::KeyValueStore;
use crate::error::StoreError;

const ENDPOINT_KEY: &str = "serverUrl";
const SECRET_KEY: &str = "password";

/// Endpoint URL and shared secret.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub endpoint: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(endpoint: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            secret: secret.into(),
        }
    }

    /// Both fields are non-empty.
    pub fn is_configured(&self) -> bool {
        !self.endpoint.is_empty() && !self.secret.is_empty()
    }

    /// Endpoint without trailing slashes, ready for path concatenation.
    pub fn base_url(&self) -> &str {
        self.endpoint.trim_end_matches('/')
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("endpoint", &self.endpoint)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Owns the current credentials and writes every change through to a
/// [`KeyValueStore`].
pub struct CredentialStore {
    backend: Box<dyn KeyValueStore>,
    current: Credentials,
}

impl CredentialStore {
    /// Reads any previously saved credentials from `backend`.
    pub fn load(backend: Box<dyn KeyValueStore>) -> Result<Self, StoreError> {
        let current = Credentials {
            endpoint: backend.get(ENDPOINT_KEY)?.unwrap_or_default(),
            secret: backend.get(SECRET_KEY)?.unwrap_or_default(),
        };
        debug!(configured = current.is_configured(), "Loaded credentials");
        Ok(Self { backend, current })
    }

    pub fn credentials(&self) -> &Credentials {
        &self.current
    }

    pub fn is_configured(&self) -> bool {
        self.current.is_configured()
    }

    pub fn set_endpoint(&mut self, endpoint: &str) -> Result<(), StoreError> {
        let endpoint = endpoint.trim();
        self.backend.set(ENDPOINT_KEY, endpoint)?;
        self.current.endpoint = endpoint.to_string();
        Ok(())
    }

    pub fn set_secret(&mut self, secret: &str) -> Result<(), StoreError> {
        self.backend.set(SECRET_KEY, secret)?;
        self.current.secret = secret.to_string();
        Ok(())
    }

    /// Replaces both fields.
    pub fn update(&mut self, credentials: &Credentials) -> Result<(), StoreError> {
        self.set_endpoint(&credentials.endpoint)?;
        self.set_secret(&credentials.secret)
    }
}
