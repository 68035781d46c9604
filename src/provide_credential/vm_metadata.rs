use log::debug;
use serde::Deserialize;

use crate::constants::{DEFAULT_ACCOUNT, DEFAULT_SCOPE, GOOGLE_SCOPE};
use crate::credential::{Credential, Token};
use crate::metadata;
use crate::provide_credential::ProvideCredential;
use crate::time::now;
use crate::{Context, Error, Result};

/// VM metadata token response.
#[derive(Deserialize)]
struct VmMetadataTokenResponse {
    access_token: String,
    expires_in: u64,
}

/// VmMetadataCredentialProvider loads access tokens from the Google Compute
/// Engine VM metadata service.
#[derive(Debug, Clone, Default)]
pub struct VmMetadataCredentialProvider {
    scope: Option<String>,
}

impl VmMetadataCredentialProvider {
    /// Create a new VmMetadataCredentialProvider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the OAuth2 scope.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }
}

#[async_trait::async_trait]
impl ProvideCredential for VmMetadataCredentialProvider {
    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Credential>> {
        // Scope from instance, environment, or default.
        let scope = self
            .scope
            .clone()
            .or_else(|| ctx.env_var(GOOGLE_SCOPE))
            .unwrap_or_else(|| DEFAULT_SCOPE.to_string());

        debug!(
            "loading token from VM metadata service for account: {}",
            DEFAULT_ACCOUNT
        );

        let url = format!(
            "http://{}/computeMetadata/v1/instance/service-accounts/{}/token?scopes={}",
            metadata::metadata_host(ctx),
            DEFAULT_ACCOUNT,
            scope
        );

        let req = http::Request::builder()
            .method(http::Method::GET)
            .uri(&url)
            .header("Metadata-Flavor", "Google")
            .body(bytes::Bytes::new())
            .map_err(|e| Error::unexpected("failed to build HTTP request").with_source(e))?;

        let resp = ctx.http_send(req).await?;

        if resp.status() != http::StatusCode::OK {
            // Metadata service might not be available (e.g., not running on GCE).
            debug!("VM metadata service not available or returned error");
            return Ok(None);
        }

        let token_resp: VmMetadataTokenResponse = serde_json::from_slice(resp.body())
            .map_err(|e| Error::decode_failed("failed to parse VM metadata response").with_source(e))?;

        let expires_at =
            now() + chrono::TimeDelta::try_seconds(token_resp.expires_in as i64).expect("in bounds");

        Ok(Some(Credential::with_token(Token {
            access_token: token_resp.access_token,
            expires_at: Some(expires_at),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::GCE_METADATA_HOST;
    use crate::{StaticEnv, StaticHttpSend};
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_vm_metadata_token() {
        let url = format!(
            "http://127.0.0.1:9990/computeMetadata/v1/instance/service-accounts/default/token?scopes={}",
            DEFAULT_SCOPE
        );
        let http = StaticHttpSend::new().with_response(
            &url,
            200,
            r#"{"access_token": "vm-token", "expires_in": 3600}"#,
        );
        let ctx = Context::new().with_http_send(http).with_env(StaticEnv {
            envs: HashMap::from([(GCE_METADATA_HOST.to_string(), "127.0.0.1:9990".to_string())]),
        });

        let cred = VmMetadataCredentialProvider::new()
            .provide_credential(&ctx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cred.token.unwrap().access_token, "vm-token");
    }

    #[tokio::test]
    async fn test_unavailable_metadata_is_none_not_error() {
        // No route registered: StaticHttpSend answers 404.
        let ctx = Context::new().with_http_send(StaticHttpSend::new());

        let cred = VmMetadataCredentialProvider::new()
            .provide_credential(&ctx)
            .await
            .unwrap();
        assert!(cred.is_none());
    }
}
