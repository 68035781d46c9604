//! V4 signed URLs for Cloud Storage objects.

use http::Method;
use log::debug;
use percent_encoding::utf8_percent_encode;

use crate::constants::{GOOG_QUERY_ENCODE_SET, GOOG_URI_ENCODE_SET, STORAGE_HOST};
use crate::hash::hex_sha256;
use crate::sign::SignBytes;
use crate::time::{format_date, format_iso8601, now, DateTime};
use crate::{Context, Error, Result};

/// V4 signed URLs are refused by the service beyond this expiry (7 days).
const MAX_EXPIRES_IN_SECS: i64 = 7 * 24 * 3600;

const SIGNING_ALGORITHM: &str = "GOOG4-RSA-SHA256";

/// Request for a time-limited, method-scoped URL to a storage object.
#[derive(Debug, Clone)]
pub struct SignedUrlRequest {
    /// Bucket name.
    pub bucket: String,
    /// Object name, slash-separated path allowed.
    pub object: String,
    /// HTTP method the URL grants.
    pub method: Method,
    /// Instant at which the URL stops working.
    pub expires_at: DateTime,
    /// Identity the URL is signed as (the signing service account's email).
    pub access_id: String,
    signing_time: Option<DateTime>,
}

impl SignedUrlRequest {
    /// Create a request.
    pub fn new(
        bucket: impl Into<String>,
        object: impl Into<String>,
        method: Method,
        expires_at: DateTime,
        access_id: impl Into<String>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            object: object.into(),
            method,
            expires_at,
            access_id: access_id.into(),
            signing_time: None,
        }
    }

    /// Pin `X-Goog-Date` instead of reading the wall clock.
    ///
    /// With a fixed signing time and a deterministic signer the generated
    /// URL is byte-identical across calls.
    pub fn with_signing_time(mut self, signing_time: DateTime) -> Self {
        self.signing_time = Some(signing_time);
        self
    }

    fn validate(&self, signing_time: DateTime) -> Result<i64> {
        if self.bucket.is_empty() || self.bucket.contains('/') {
            return Err(Error::request_invalid(format!(
                "invalid bucket name: {:?}",
                self.bucket
            )));
        }
        if self.object.is_empty() {
            return Err(Error::request_invalid("object name must not be empty"));
        }
        if !matches!(
            self.method,
            Method::GET | Method::PUT | Method::POST | Method::DELETE | Method::HEAD
        ) {
            return Err(Error::request_invalid(format!(
                "method {} cannot be signed",
                self.method
            )));
        }
        if self.access_id.is_empty() {
            return Err(Error::request_invalid("access id must not be empty"));
        }

        let expires_in = (self.expires_at - signing_time).num_seconds();
        if expires_in <= 0 {
            return Err(Error::request_invalid("expiry must be in the future"));
        }
        if expires_in > MAX_EXPIRES_IN_SECS {
            return Err(Error::request_invalid(
                "expiry must be within 7 days of signing",
            ));
        }

        Ok(expires_in)
    }
}

/// Generate a signed URL granting `req.method` access to the object until
/// `req.expires_at`.
///
/// The signer is invoked exactly once, with the canonical string-to-sign
/// bytes; any signer or construction failure propagates immediately, without
/// retries. Signing via [`IamSigner`](crate::IamSigner) does network I/O and
/// could introduce latency.
pub async fn signed_url(
    ctx: &Context,
    req: &SignedUrlRequest,
    signer: &dyn SignBytes,
) -> Result<String> {
    let signing_time = req.signing_time.unwrap_or_else(now);
    let expires_in = req.validate(signing_time)?;

    let path = format!(
        "/{}/{}",
        req.bucket,
        utf8_percent_encode(&req.object, &GOOG_URI_ENCODE_SET)
    );

    let scope = format!("{}/auto/storage/goog4_request", format_date(signing_time));

    let mut query: Vec<(String, String)> = vec![
        ("X-Goog-Algorithm".into(), SIGNING_ALGORITHM.into()),
        (
            "X-Goog-Credential".into(),
            format!("{}/{}", req.access_id, scope),
        ),
        ("X-Goog-Date".into(), format_iso8601(signing_time)),
        ("X-Goog-Expires".into(), expires_in.to_string()),
        ("X-Goog-SignedHeaders".into(), "host".into()),
    ];
    query.sort();

    let canonical_query = query
        .iter()
        .map(|(k, v)| {
            format!(
                "{}={}",
                utf8_percent_encode(k, &GOOG_QUERY_ENCODE_SET),
                utf8_percent_encode(v, &GOOG_QUERY_ENCODE_SET)
            )
        })
        .collect::<Vec<_>>()
        .join("&");

    // Only the host header is signed; the payload stays unsigned so the URL
    // works for arbitrary bodies.
    let creq = format!(
        "{}\n{}\n{}\nhost:{}\n\nhost\nUNSIGNED-PAYLOAD",
        req.method, path, canonical_query, STORAGE_HOST
    );
    debug!("canonical request string: {}", creq);

    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        SIGNING_ALGORITHM,
        format_iso8601(signing_time),
        scope,
        hex_sha256(creq.as_bytes())
    );
    debug!("calculated string to sign: {}", string_to_sign);

    let signature = signer.sign_bytes(ctx, string_to_sign.as_bytes()).await?;

    Ok(format!(
        "https://{}{}?{}&X-Goog-Signature={}",
        STORAGE_HOST,
        path,
        canonical_query,
        hex::encode(signature)
    ))
}
