use crate::constants::{GOOGLE_APPLICATION_CREDENTIALS, GOOGLE_SCOPE};
use crate::Context;

/// Config carries the knobs for the default credential chain.
#[derive(Clone, Debug, Default)]
pub struct Config {
    /// Credential file path.
    pub credential_path: Option<String>,
    /// Credential content (JSON, possibly base64-encoded).
    pub credential_content: Option<String>,
    /// Disable reading from environment variables.
    pub disable_env: bool,
    /// Disable reading from well-known locations.
    pub disable_well_known_location: bool,
    /// Disable the VM metadata token fallback.
    pub disable_vm_metadata: bool,
    /// Scope for OAuth2 token requests.
    pub scope: Option<String>,
}

impl Config {
    /// Create a new config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set credential file path.
    pub fn with_credential_path(mut self, path: impl Into<String>) -> Self {
        self.credential_path = Some(path.into());
        self
    }

    /// Set credential content.
    pub fn with_credential_content(mut self, content: impl Into<String>) -> Self {
        self.credential_content = Some(content.into());
        self
    }

    /// Disable reading from environment variables.
    pub fn with_disable_env(mut self) -> Self {
        self.disable_env = true;
        self
    }

    /// Disable reading from well-known locations.
    pub fn with_disable_well_known_location(mut self) -> Self {
        self.disable_well_known_location = true;
        self
    }

    /// Disable the VM metadata token fallback.
    pub fn with_disable_vm_metadata(mut self) -> Self {
        self.disable_vm_metadata = true;
        self
    }

    /// Set the OAuth2 scope.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Load config from environment variables.
    pub fn from_env(ctx: &Context) -> Self {
        let mut cfg = Self::default();

        if let Some(v) = ctx.env_var(GOOGLE_APPLICATION_CREDENTIALS) {
            cfg.credential_path = Some(v);
        }

        if let Some(v) = ctx.env_var(GOOGLE_SCOPE) {
            cfg.scope = Some(v);
        }

        cfg
    }
}
