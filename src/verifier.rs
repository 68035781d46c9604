//! OpenID Connect ID token verification.
//!
//! [`IdTokenVerifier`] validates that a presented bearer token was issued by
//! the expected issuer, signed with a currently-valid key from that issuer's
//! published key set, is not expired, and is scoped to the expected
//! audience. The key set is cached so that repeated verifications stay
//! cheap; create one verifier per audience and reuse it for the lifetime of
//! the process.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::constants::GOOGLE_ISSUER_URL;
use crate::time::now;
use crate::{Context, Error, Result};

const DEFAULT_LEEWAY_SECS: u64 = 60;
const DEFAULT_KEYS_TTL: Duration = Duration::from_secs(300);

/// Standard claims of a Google-issued ID token.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IdTokenClaims {
    /// Issuer.
    pub iss: String,
    /// Audience the token was minted for.
    pub aud: String,
    /// Subject, the stable identifier of the authenticated identity.
    pub sub: String,
    /// Expiration time (seconds since epoch).
    pub exp: u64,
    /// Issued at (seconds since epoch).
    pub iat: u64,
    /// Email of the identity, when the issuer includes it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Whether the issuer verified the email.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    /// Authorized presenter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub azp: Option<String>,
    /// Hosted G Suite domain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hd: Option<String>,
}

/// Configuration for [`IdTokenVerifier`].
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    issuer: String,
    audience: Option<String>,
    jwks_uri: Option<String>,
    leeway: u64,
    keys_ttl: Duration,
}

impl VerifierConfig {
    /// Config for Google's issuer with the given expected audience.
    pub fn new(audience: impl Into<String>) -> Self {
        Self {
            issuer: GOOGLE_ISSUER_URL.to_string(),
            audience: Some(audience.into()),
            jwks_uri: None,
            leeway: DEFAULT_LEEWAY_SECS,
            keys_ttl: DEFAULT_KEYS_TTL,
        }
    }

    /// Config for Google's issuer that accepts any audience.
    ///
    /// Only for call sites that check the audience themselves.
    pub fn without_audience_check() -> Self {
        Self {
            issuer: GOOGLE_ISSUER_URL.to_string(),
            audience: None,
            jwks_uri: None,
            leeway: DEFAULT_LEEWAY_SECS,
            keys_ttl: DEFAULT_KEYS_TTL,
        }
    }

    /// Expect tokens from a different issuer.
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    /// Pin the key set endpoint instead of discovering it.
    ///
    /// Skips the discovery request at construction; keys are fetched lazily
    /// on first verification.
    pub fn with_jwks_uri(mut self, jwks_uri: impl Into<String>) -> Self {
        self.jwks_uri = Some(jwks_uri.into());
        self
    }

    /// Clock skew tolerated on time-based claims, in seconds.
    pub fn with_leeway(mut self, leeway: u64) -> Self {
        self.leeway = leeway;
        self
    }

    /// How long a fetched key set stays fresh.
    pub fn with_keys_ttl(mut self, ttl: Duration) -> Self {
        self.keys_ttl = ttl;
        self
    }
}

#[derive(Deserialize)]
struct DiscoveryDocument {
    jwks_uri: String,
}

#[derive(Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

#[derive(Deserialize)]
struct Jwk {
    kty: String,
    #[serde(default)]
    kid: Option<String>,
    #[serde(default)]
    alg: Option<String>,
    #[serde(default, rename = "use")]
    use_: Option<String>,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
}

struct KeySet {
    keys: HashMap<String, Arc<DecodingKey>>,
    fetched_at: Instant,
}

/// Verifier for OpenID Connect ID tokens, with a cached remote key set.
///
/// Safe to share: many tasks may call [`verify`](Self::verify) concurrently
/// without external locking. The key cache refreshes at most once per
/// unresolvable key id, and a refresh mutex keeps concurrent misses from
/// stampeding the key endpoint.
pub struct IdTokenVerifier {
    config: VerifierConfig,
    jwks_uri: String,
    keys: RwLock<Option<KeySet>>,
    refresh_lock: Mutex<()>,
}

impl std::fmt::Debug for IdTokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdTokenVerifier")
            .field("config", &self.config)
            .field("jwks_uri", &self.jwks_uri)
            .finish()
    }
}

impl IdTokenVerifier {
    /// Create a verifier for Google-issued tokens with the given expected
    /// audience, discovering the key set endpoint from the issuer's OIDC
    /// discovery document.
    ///
    /// This is the production constructor: discovery at construction time
    /// keeps the verifier correct across key-set endpoint rotation, at the
    /// cost of failing here when the issuer is unreachable.
    pub async fn discover(ctx: &Context, audience: impl Into<String>) -> Result<Self> {
        Self::with_config(ctx, VerifierConfig::new(audience)).await
    }

    /// Create a verifier from an explicit configuration.
    pub async fn with_config(ctx: &Context, config: VerifierConfig) -> Result<Self> {
        let jwks_uri = match &config.jwks_uri {
            Some(uri) => uri.clone(),
            None => resolve_jwks_uri(ctx, &config.issuer).await?,
        };

        Ok(Self {
            config,
            jwks_uri,
            keys: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        })
    }

    /// Verify an ID token and return its claims.
    ///
    /// Checks, in order: JWT structure and algorithm, signature against the
    /// issuer's key set (refreshing the cached set once if the key id is
    /// unknown), `exp`, `iss`, `aud` (unless disabled) and `iat`. Each
    /// failure carries a distinct [`ErrorKind`](crate::ErrorKind) so "bad
    /// token" and "infrastructure failure" stay distinguishable.
    pub async fn verify(&self, ctx: &Context, token: &str) -> Result<IdTokenClaims> {
        let header = decode_header(token)
            .map_err(|e| Error::token_malformed("failed to decode token header").with_source(e))?;

        if header.alg != Algorithm::RS256 {
            return Err(Error::token_malformed(format!(
                "unexpected token algorithm: {:?}",
                header.alg
            )));
        }

        let kid = header
            .kid
            .ok_or_else(|| Error::token_malformed("token header missing kid"))?;

        let key = self.decoding_key(ctx, &kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = self.config.leeway;
        validation.set_issuer(&[self.config.issuer.as_str()]);
        match &self.config.audience {
            Some(audience) => {
                validation.set_audience(&[audience]);
                validation.set_required_spec_claims(&["exp", "iss", "aud"]);
            }
            None => {
                validation.validate_aud = false;
                validation.set_required_spec_claims(&["exp", "iss"]);
            }
        }

        let data = decode::<IdTokenClaims>(token, &key, &validation).map_err(map_jwt_error)?;

        // jsonwebtoken checks exp/iss/aud; iat in the future is on us.
        let current = now().timestamp() as u64;
        if data.claims.iat > current + self.config.leeway {
            return Err(Error::token_malformed("iat claim is in the future"));
        }

        Ok(data.claims)
    }

    async fn decoding_key(&self, ctx: &Context, kid: &str) -> Result<Arc<DecodingKey>> {
        if let Some(key) = self.lookup(kid).await {
            return Ok(key);
        }

        // One pass loads a missing/stale key set, the forced pass is the
        // single refresh granted to an unknown kid.
        for force in [false, true] {
            self.refresh_keys(ctx, force).await?;
            if let Some(key) = self.lookup(kid).await {
                return Ok(key);
            }
        }

        Err(Error::key_not_found(format!(
            "key {kid} not present in key set after refresh"
        )))
    }

    async fn lookup(&self, kid: &str) -> Option<Arc<DecodingKey>> {
        let keys = self.keys.read().await;
        keys.as_ref()
            .filter(|set| set.fetched_at.elapsed() <= self.config.keys_ttl)
            .and_then(|set| set.keys.get(kid))
            .cloned()
    }

    async fn refresh_keys(&self, ctx: &Context, force: bool) -> Result<()> {
        let _guard = self.refresh_lock.lock().await;

        if !force {
            let keys = self.keys.read().await;
            if keys
                .as_ref()
                .is_some_and(|set| set.fetched_at.elapsed() <= self.config.keys_ttl)
            {
                return Ok(());
            }
        }

        debug!("refreshing key set from {}", self.jwks_uri);

        let req = http::Request::builder()
            .method(http::Method::GET)
            .uri(&self.jwks_uri)
            .body(bytes::Bytes::new())
            .map_err(|e| Error::unexpected("failed to build HTTP request").with_source(e))?;

        let resp = ctx.http_send(req).await?;

        if resp.status() != http::StatusCode::OK {
            return Err(Error::unexpected(format!(
                "fetch key set failed ({})",
                resp.status()
            )));
        }

        let jwks: Jwks = serde_json::from_slice(resp.body())
            .map_err(|e| Error::decode_failed("failed to parse key set").with_source(e))?;

        let mut keys = HashMap::new();
        for jwk in jwks.keys {
            if jwk.kty != "RSA" {
                continue;
            }
            let Some(kid) = jwk.kid.filter(|k| !k.is_empty()) else {
                continue;
            };
            if jwk.alg.as_deref().is_some_and(|alg| alg != "RS256") {
                continue;
            }
            if jwk.use_.as_deref().is_some_and(|u| u != "sig") {
                continue;
            }
            let (Some(n), Some(e)) = (&jwk.n, &jwk.e) else {
                continue;
            };

            match DecodingKey::from_rsa_components(n, e) {
                Ok(key) => {
                    keys.insert(kid, Arc::new(key));
                }
                Err(err) => {
                    warn!("skipping invalid RSA key {kid}: {err}");
                }
            }
        }

        if keys.is_empty() {
            return Err(Error::unexpected("key set contained no usable signing keys"));
        }

        debug!("key set refreshed with {} keys", keys.len());
        *self.keys.write().await = Some(KeySet {
            keys,
            fetched_at: Instant::now(),
        });

        Ok(())
    }
}

async fn resolve_jwks_uri(ctx: &Context, issuer: &str) -> Result<String> {
    let url = format!(
        "{}/.well-known/openid-configuration",
        issuer.trim_end_matches('/')
    );
    debug!("resolving key set endpoint from {}", url);

    let req = http::Request::builder()
        .method(http::Method::GET)
        .uri(&url)
        .body(bytes::Bytes::new())
        .map_err(|e| Error::unexpected("failed to build HTTP request").with_source(e))?;

    let resp = ctx.http_send(req).await?;

    if resp.status() != http::StatusCode::OK {
        return Err(Error::unexpected(format!(
            "fetch OIDC discovery document failed ({})",
            resp.status()
        )));
    }

    let doc: DiscoveryDocument = serde_json::from_slice(resp.body())
        .map_err(|e| Error::decode_failed("failed to parse discovery document").with_source(e))?;

    Ok(doc.jwks_uri)
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> Error {
    use jsonwebtoken::errors::ErrorKind as JwtErrorKind;

    let mapped = match err.kind() {
        JwtErrorKind::ExpiredSignature => Error::token_expired("token expired"),
        JwtErrorKind::InvalidSignature => {
            Error::signature_invalid("token signature verification failed")
        }
        JwtErrorKind::InvalidIssuer => Error::issuer_mismatch("token issuer does not match"),
        JwtErrorKind::InvalidAudience => Error::audience_mismatch("token audience does not match"),
        JwtErrorKind::ImmatureSignature => Error::token_malformed("token not yet valid"),
        JwtErrorKind::MissingRequiredClaim(claim) => {
            Error::token_malformed(format!("token missing required claim: {claim}"))
        }
        _ => Error::token_malformed(format!("token validation failed: {err}")),
    };

    mapped.with_source(err)
}
