//! OAuth2 token exchanges used by the credential chain and the blob signer.

use http::header;
use jsonwebtoken::{Algorithm, EncodingKey, Header as JwtHeader};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::constants::OAUTH2_TOKEN_URL;
use crate::credential::{OAuth2Credentials, ServiceAccount, Token};
use crate::time::now;
use crate::{Context, Error, Result};

/// Claims for the JWT-bearer assertion sent to the token endpoint.
#[derive(Debug, Serialize)]
struct AssertionClaims {
    iss: String,
    scope: String,
    aud: String,
    exp: u64,
    iat: u64,
}

impl AssertionClaims {
    fn new(client_email: &str, scope: &str) -> Self {
        let current = now().timestamp() as u64;

        AssertionClaims {
            iss: client_email.to_string(),
            scope: scope.to_string(),
            aud: OAUTH2_TOKEN_URL.to_string(),
            exp: current + 3600,
            iat: current,
        }
    }
}

/// OAuth2 token response.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

fn token_from_response(resp: TokenResponse) -> Token {
    Token {
        access_token: resp.access_token,
        expires_at: resp.expires_in.map(|expires_in| {
            now() + chrono::TimeDelta::try_seconds(expires_in as i64).expect("in bounds")
        }),
    }
}

/// Exchange a service account for an access token.
///
/// Creates an RS256-signed JWT assertion with the account's private key and
/// trades it for an OAuth2 access token at Google's token endpoint.
pub async fn exchange_service_account(
    ctx: &Context,
    sa: &ServiceAccount,
    scope: &str,
) -> Result<Token> {
    debug!("exchanging service account for token with scope: {}", scope);

    let jwt = jsonwebtoken::encode(
        &JwtHeader::new(Algorithm::RS256),
        &AssertionClaims::new(&sa.client_email, scope),
        &EncodingKey::from_rsa_pem(sa.private_key.as_bytes())
            .map_err(|e| Error::credential_invalid("failed to parse RSA private key").with_source(e))?,
    )
    .map_err(|e| Error::unexpected("failed to encode JWT").with_source(e))?;

    let body = format!(
        "grant_type=urn:ietf:params:oauth:grant-type:jwt-bearer&assertion={}",
        jwt
    );
    post_token_request(ctx, body).await
}

/// Refresh an authorized user's access token with its refresh token.
pub async fn refresh_authorized_user(ctx: &Context, creds: &OAuth2Credentials) -> Result<Token> {
    debug!("refreshing authorized user token");

    let body = form_urlencoded::Serializer::new(String::new())
        .append_pair("grant_type", "refresh_token")
        .append_pair("client_id", &creds.client_id)
        .append_pair("client_secret", &creds.client_secret)
        .append_pair("refresh_token", &creds.refresh_token)
        .finish();
    post_token_request(ctx, body).await
}

async fn post_token_request(ctx: &Context, body: String) -> Result<Token> {
    let req = http::Request::builder()
        .method(http::Method::POST)
        .uri(OAUTH2_TOKEN_URL)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(body.into_bytes().into())
        .map_err(|e| Error::unexpected("failed to build HTTP request").with_source(e))?;

    let resp = ctx.http_send(req).await?;

    if resp.status() != http::StatusCode::OK {
        let body = String::from_utf8_lossy(resp.body());
        return Err(Error::unexpected(format!(
            "exchange token failed ({}): {}",
            resp.status(),
            body
        )));
    }

    let token_resp: TokenResponse = serde_json::from_slice(resp.body())
        .map_err(|e| Error::decode_failed("failed to parse token response").with_source(e))?;

    Ok(token_from_response(token_resp))
}
