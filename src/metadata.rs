//! GCE metadata-server helpers.
//!
//! Available on Google Compute Engine, AppEngine standard second generation
//! runtimes and AppEngine flexible. Every function performs at most one
//! request per call; nothing is cached or retried.

use log::debug;

use crate::account::AccountRef;
use crate::constants::{DEFAULT_METADATA_HOST, GCE_METADATA_HOST};
use crate::{Context, Error, Result};

pub(crate) fn metadata_host(ctx: &Context) -> String {
    ctx.env_var(GCE_METADATA_HOST)
        .unwrap_or_else(|| DEFAULT_METADATA_HOST.to_string())
}

/// Report whether this process runs where a metadata server is reachable.
///
/// `GCE_METADATA_HOST` being set counts as a yes (it is how tests and
/// non-standard environments point at their server); otherwise the metadata
/// root is probed once and the `Metadata-Flavor: Google` response header is
/// required. Any probe failure means "not on GCE".
pub async fn on_gce(ctx: &Context) -> bool {
    if ctx.env_var(GCE_METADATA_HOST).is_some() {
        return true;
    }

    let req = match http::Request::builder()
        .method(http::Method::GET)
        .uri(format!("http://{DEFAULT_METADATA_HOST}/"))
        .header("Metadata-Flavor", "Google")
        .body(bytes::Bytes::new())
    {
        Ok(req) => req,
        Err(_) => return false,
    };

    match ctx.http_send(req).await {
        Ok(resp) => resp
            .headers()
            .get("Metadata-Flavor")
            .is_some_and(|v| v == "Google"),
        Err(_) => false,
    }
}

/// Fetch an OIDC identity token for the current compute identity.
///
/// `aud` is a free-form string (usually a URL) naming the receiver the token
/// will be presented to. The raw token string is returned without any
/// validation; verification is the receiver's job.
pub async fn fetch_identity_token(ctx: &Context, aud: &str, account: &AccountRef) -> Result<String> {
    if aud.is_empty() {
        return Err(Error::config_invalid(
            "must specify a value for the aud parameter",
        ));
    }

    if !on_gce(ctx).await {
        return Err(Error::config_invalid(
            "not running on GCE or compatible environment",
        ));
    }

    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("audience", aud)
        .finish();

    metadata_get(
        ctx,
        &format!("instance/service-accounts/{}/identity?{}", account, query),
    )
    .await
}

/// Fetch the email of a service account on this instance.
///
/// Handy for obtaining the access id to sign URLs under.
pub async fn service_account_email(ctx: &Context, account: &AccountRef) -> Result<String> {
    if !on_gce(ctx).await {
        return Err(Error::config_invalid(
            "not running on GCE or compatible environment",
        ));
    }

    metadata_get(ctx, &format!("instance/service-accounts/{}/email", account)).await
}

async fn metadata_get(ctx: &Context, path_and_query: &str) -> Result<String> {
    let url = format!(
        "http://{}/computeMetadata/v1/{}",
        metadata_host(ctx),
        path_and_query
    );
    debug!("fetching from metadata server: {}", path_and_query);

    let req = http::Request::builder()
        .method(http::Method::GET)
        .uri(&url)
        .header("Metadata-Flavor", "Google")
        .body(bytes::Bytes::new())
        .map_err(|e| Error::unexpected("failed to build HTTP request").with_source(e))?;

    let resp = ctx.http_send_as_string(req).await?;

    if !resp.status().is_success() {
        return Err(Error::unexpected(format!(
            "metadata request for {} failed ({}): {}",
            path_and_query,
            resp.status(),
            resp.body()
        )));
    }

    Ok(resp.into_body())
}
