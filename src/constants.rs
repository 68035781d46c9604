use percent_encoding::AsciiSet;
use percent_encoding::NON_ALPHANUMERIC;

// Env values used by the credential chain and metadata helpers.
pub const GOOGLE_APPLICATION_CREDENTIALS: &str = "GOOGLE_APPLICATION_CREDENTIALS";
pub const GOOGLE_SCOPE: &str = "GOOGLE_SCOPE";
pub const GCE_METADATA_HOST: &str = "GCE_METADATA_HOST";

// Default OAuth2 scope for Google Cloud services.
pub const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

// Name of the instance's default service account on the metadata server.
pub const DEFAULT_ACCOUNT: &str = "default";

// Hosts and endpoints.
pub const DEFAULT_METADATA_HOST: &str = "metadata.google.internal";
pub const STORAGE_HOST: &str = "storage.googleapis.com";
pub const OAUTH2_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const IAM_CREDENTIALS_ENDPOINT: &str = "https://iamcredentials.googleapis.com/v1";

// Google's issuer (iss) URL for ID tokens.
pub const GOOGLE_ISSUER_URL: &str = "https://accounts.google.com";

/// AsciiSet for [Google UriEncode](https://cloud.google.com/storage/docs/authentication/canonical-requests)
///
/// - URI encode every byte except the unreserved characters: 'A'-'Z', 'a'-'z', '0'-'9', '-', '.', '_', and '~'.
pub static GOOG_URI_ENCODE_SET: AsciiSet = NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Same as [`GOOG_URI_ENCODE_SET`] but for query strings, where `/` is
/// encoded as well.
pub static GOOG_QUERY_ENCODE_SET: AsciiSet = NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');
