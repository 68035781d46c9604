//! Offline verification tests against a locally generated key set.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use once_cell::sync::Lazy;
use rand::thread_rng;
use rsa::pkcs8::EncodePrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;

use gcp_identity::time::now;
use gcp_identity::{
    Context, ErrorKind, IdTokenClaims, IdTokenVerifier, StaticHttpSend, VerifierConfig,
};

const ISSUER: &str = "https://accounts.google.com";
const AUDIENCE: &str = "https://myapp/myservice";
const KID: &str = "test-key-001";
const JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";
const DISCOVERY_URL: &str = "https://accounts.google.com/.well-known/openid-configuration";

struct TestKey {
    private_key: RsaPrivateKey,
    pem: String,
}

static SIGNING_KEY: Lazy<TestKey> = Lazy::new(generate_key);
static ROGUE_KEY: Lazy<TestKey> = Lazy::new(generate_key);

fn generate_key() -> TestKey {
    let private_key = RsaPrivateKey::new(&mut thread_rng(), 2048).expect("generate RSA key");
    let pem = private_key
        .to_pkcs8_pem(rsa::pkcs8::LineEnding::LF)
        .expect("encode PEM")
        .to_string();
    TestKey { private_key, pem }
}

fn jwks_json(key: &TestKey, kid: &str) -> String {
    let public_key = key.private_key.to_public_key();
    let n = URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be());
    let e = URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be());
    format!(
        r#"{{"keys": [{{"kty": "RSA", "alg": "RS256", "use": "sig", "kid": "{kid}", "n": "{n}", "e": "{e}"}}]}}"#
    )
}

fn claims() -> IdTokenClaims {
    let current = now().timestamp() as u64;
    IdTokenClaims {
        iss: ISSUER.to_string(),
        aud: AUDIENCE.to_string(),
        sub: "1234567890".to_string(),
        exp: current + 3600,
        iat: current - 10,
        email: Some("user@example.com".to_string()),
        email_verified: Some(true),
        azp: None,
        hd: None,
    }
}

fn sign_token(key: &TestKey, kid: &str, claims: &IdTokenClaims) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let encoding_key = EncodingKey::from_rsa_pem(key.pem.as_bytes()).expect("load PEM");
    jsonwebtoken::encode(&header, claims, &encoding_key).expect("encode token")
}

fn jwks_http() -> StaticHttpSend {
    StaticHttpSend::new().with_response(JWKS_URL, 200, jwks_json(&SIGNING_KEY, KID))
}

async fn pinned_verifier(ctx: &Context) -> IdTokenVerifier {
    IdTokenVerifier::with_config(ctx, VerifierConfig::new(AUDIENCE).with_jwks_uri(JWKS_URL))
        .await
        .expect("pinned construction needs no network")
}

#[tokio::test]
async fn valid_token_round_trips_claims() {
    let http = jwks_http();
    let ctx = Context::new().with_http_send(http.clone());
    let verifier = pinned_verifier(&ctx).await;

    let claims = claims();
    let token = sign_token(&SIGNING_KEY, KID, &claims);

    let verified = verifier.verify(&ctx, &token).await.unwrap();
    assert_eq!(verified, claims);
    assert_eq!(http.request_count_for(JWKS_URL), 1);
}

#[tokio::test]
async fn key_set_is_cached_across_verifications() {
    let http = jwks_http();
    let ctx = Context::new().with_http_send(http.clone());
    let verifier = pinned_verifier(&ctx).await;

    let token = sign_token(&SIGNING_KEY, KID, &claims());
    verifier.verify(&ctx, &token).await.unwrap();
    verifier.verify(&ctx, &token).await.unwrap();
    verifier.verify(&ctx, &token).await.unwrap();

    assert_eq!(http.request_count_for(JWKS_URL), 1);
}

#[tokio::test]
async fn unknown_kid_fails_after_exactly_one_refresh() {
    let http = jwks_http();
    let ctx = Context::new().with_http_send(http.clone());
    let verifier = pinned_verifier(&ctx).await;

    // Warm the cache with a good token.
    let token = sign_token(&SIGNING_KEY, KID, &claims());
    verifier.verify(&ctx, &token).await.unwrap();
    assert_eq!(http.request_count_for(JWKS_URL), 1);

    // A kid the key set will never contain: one forced refresh, then failure.
    let token = sign_token(&SIGNING_KEY, "rotated-away", &claims());
    let err = verifier.verify(&ctx, &token).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::KeyNotFound);
    assert_eq!(http.request_count_for(JWKS_URL), 2);
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let http = jwks_http();
    let ctx = Context::new().with_http_send(http);
    let verifier = pinned_verifier(&ctx).await;

    let mut claims = claims();
    let current = now().timestamp() as u64;
    claims.exp = current - 7200;
    claims.iat = current - 10800;
    let token = sign_token(&SIGNING_KEY, KID, &claims);

    let err = verifier.verify(&ctx, &token).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TokenExpired);
    assert!(err.is_token_error());
}

#[tokio::test]
async fn wrong_issuer_is_rejected() {
    let http = jwks_http();
    let ctx = Context::new().with_http_send(http);
    let verifier = pinned_verifier(&ctx).await;

    let mut claims = claims();
    claims.iss = "https://evil.example.com".to_string();
    let token = sign_token(&SIGNING_KEY, KID, &claims);

    let err = verifier.verify(&ctx, &token).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IssuerMismatch);
}

#[tokio::test]
async fn wrong_audience_is_rejected() {
    let http = jwks_http();
    let ctx = Context::new().with_http_send(http);
    let verifier = pinned_verifier(&ctx).await;

    let mut claims = claims();
    claims.aud = "https://some-other-service".to_string();
    let token = sign_token(&SIGNING_KEY, KID, &claims);

    let err = verifier.verify(&ctx, &token).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AudienceMismatch);
}

#[tokio::test]
async fn audience_check_can_be_disabled() {
    let http = jwks_http();
    let ctx = Context::new().with_http_send(http);
    let verifier = IdTokenVerifier::with_config(
        &ctx,
        VerifierConfig::without_audience_check().with_jwks_uri(JWKS_URL),
    )
    .await
    .unwrap();

    let mut claims = claims();
    claims.aud = "https://some-other-service".to_string();
    let token = sign_token(&SIGNING_KEY, KID, &claims);

    let verified = verifier.verify(&ctx, &token).await.unwrap();
    assert_eq!(verified.aud, "https://some-other-service");
}

#[tokio::test]
async fn token_signed_by_rogue_key_is_rejected() {
    let http = jwks_http();
    let ctx = Context::new().with_http_send(http);
    let verifier = pinned_verifier(&ctx).await;

    // Correct kid, wrong private key.
    let token = sign_token(&ROGUE_KEY, KID, &claims());

    let err = verifier.verify(&ctx, &token).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SignatureInvalid);
}

#[tokio::test]
async fn future_iat_is_rejected() {
    let http = jwks_http();
    let ctx = Context::new().with_http_send(http);
    let verifier = pinned_verifier(&ctx).await;

    let mut claims = claims();
    claims.iat = now().timestamp() as u64 + 3600;
    let token = sign_token(&SIGNING_KEY, KID, &claims);

    let err = verifier.verify(&ctx, &token).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TokenMalformed);
}

#[tokio::test]
async fn discovery_resolves_key_set_endpoint() {
    let http = jwks_http().with_response(
        DISCOVERY_URL,
        200,
        &format!(r#"{{"issuer": "{ISSUER}", "jwks_uri": "{JWKS_URL}"}}"#),
    );
    let ctx = Context::new().with_http_send(http.clone());

    let verifier = IdTokenVerifier::discover(&ctx, AUDIENCE).await.unwrap();
    assert_eq!(http.request_count_for(DISCOVERY_URL), 1);

    let claims = claims();
    let token = sign_token(&SIGNING_KEY, KID, &claims);
    let verified = verifier.verify(&ctx, &token).await.unwrap();
    assert_eq!(verified.sub, claims.sub);
}

#[tokio::test]
async fn concurrent_verifications_share_one_key_fetch() {
    let http = jwks_http();
    let ctx = Context::new().with_http_send(http.clone());
    let verifier = std::sync::Arc::new(pinned_verifier(&ctx).await);

    let token = sign_token(&SIGNING_KEY, KID, &claims());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let verifier = verifier.clone();
        let ctx = ctx.clone();
        let token = token.clone();
        handles.push(tokio::spawn(async move {
            verifier.verify(&ctx, &token).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // The refresh mutex keeps concurrent cache misses from stampeding.
    assert_eq!(http.request_count_for(JWKS_URL), 1);
}
