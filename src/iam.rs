//! Remote blob signing through the IAM Credentials API.

use std::fmt::Debug;
use std::sync::{Arc, Mutex};

use http::header;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_SCOPE, IAM_CREDENTIALS_ENDPOINT};
use crate::credential::Token;
use crate::hash::{base64_decode, base64_encode};
use crate::oauth2;
use crate::provide_credential::ProvideCredential;
use crate::sign::SignBytes;
use crate::{Context, Error, Result};

/// Result of a `signBlob` call: the signature and the key that produced it.
#[derive(Debug, Clone)]
pub struct SignedBlob {
    /// Identifier of the key the service signed with.
    pub key_id: String,
    /// Raw signature bytes.
    pub signature: Vec<u8>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignBlobRequest {
    payload: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignBlobResponse {
    key_id: String,
    signed_blob: String,
}

/// IamSigner signs bytes with a key held by Google, via the IAM Credentials
/// `signBlob` RPC.
///
/// The caller never possesses the private key; it only needs ambient
/// credentials with `iam.serviceAccounts.signBlob` permission on the target
/// account. Those credentials come from the injected [`ProvideCredential`]
/// so the dependency stays visible and fakeable.
pub struct IamSigner {
    service_account: String,
    project_id: Option<String>,
    scope: Option<String>,
    provider: Arc<dyn ProvideCredential>,
    token: Arc<Mutex<Option<Token>>>,
}

impl Debug for IamSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IamSigner")
            .field("service_account", &self.service_account)
            .field("project_id", &self.project_id)
            .finish()
    }
}

impl IamSigner {
    /// Create a signer for the given service account email.
    ///
    /// The account is always explicit; there is no default-account fallback
    /// on this path.
    pub fn new(service_account: impl Into<String>, provider: impl ProvideCredential) -> Self {
        Self {
            service_account: service_account.into(),
            project_id: None,
            scope: None,
            provider: Arc::new(provider),
            token: Arc::new(Mutex::new(None)),
        }
    }

    /// Scope the RPC to a project. Without this the service resolves the
    /// account's own project (`-`).
    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    /// Set the OAuth2 scope used when exchanging a service account for an
    /// access token.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Resource name of the account in the RPC path.
    fn resource_name(&self) -> String {
        format!(
            "projects/{}/serviceAccounts/{}",
            self.project_id.as_deref().unwrap_or("-"),
            self.service_account
        )
    }

    async fn access_token(&self, ctx: &Context) -> Result<Token> {
        let cached = self.token.lock().expect("lock poisoned").clone();
        if let Some(token) = cached {
            if token.is_valid() {
                return Ok(token);
            }
        }

        let cred = self
            .provider
            .provide_credential(ctx)
            .await?
            .ok_or_else(|| Error::credential_invalid("no credentials available for signing"))?;

        let token = if let Some(token) = cred.token.filter(|t| t.is_valid()) {
            token
        } else if let Some(sa) = &cred.service_account {
            debug!("no valid token available, exchanging service account for token");
            let scope = self.scope.as_deref().unwrap_or(DEFAULT_SCOPE);
            oauth2::exchange_service_account(ctx, sa, scope).await?
        } else {
            return Err(Error::credential_invalid(
                "credential has neither a valid token nor a service account",
            ));
        };

        *self.token.lock().expect("lock poisoned") = Some(token.clone());
        Ok(token)
    }

    /// Sign the payload with the account's Google-held key.
    ///
    /// One RPC attempt per call; failures propagate immediately.
    pub async fn sign_blob(&self, ctx: &Context, payload: &[u8]) -> Result<SignedBlob> {
        let token = self.access_token(ctx).await?;

        let name = self.resource_name();
        let url = format!("{}/{}:signBlob", IAM_CREDENTIALS_ENDPOINT, name);
        debug!("signing blob as {}", name);

        let body = serde_json::to_vec(&SignBlobRequest {
            payload: base64_encode(payload),
        })
        .map_err(|e| Error::unexpected("failed to serialize request").with_source(e))?;

        let req = http::Request::builder()
            .method(http::Method::POST)
            .uri(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, {
                let mut value: http::HeaderValue =
                    format!("Bearer {}", token.access_token).parse()?;
                value.set_sensitive(true);
                value
            })
            .body(body.into())
            .map_err(|e| Error::unexpected("failed to build HTTP request").with_source(e))?;

        let resp = ctx.http_send(req).await?;

        if resp.status() != http::StatusCode::OK {
            let body = String::from_utf8_lossy(resp.body());
            return Err(Error::unexpected(format!(
                "sign blob for {} failed ({}): {}",
                name,
                resp.status(),
                body
            )));
        }

        let resp: SignBlobResponse = serde_json::from_slice(resp.body())
            .map_err(|e| Error::decode_failed("failed to parse signBlob response").with_source(e))?;

        Ok(SignedBlob {
            key_id: resp.key_id,
            signature: base64_decode(&resp.signed_blob)?,
        })
    }
}

#[async_trait::async_trait]
impl SignBytes for IamSigner {
    async fn sign_bytes(&self, ctx: &Context, payload: &[u8]) -> Result<Vec<u8>> {
        self.sign_blob(ctx, payload).await.map(|blob| blob.signature)
    }
}
