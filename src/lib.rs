//! Helpers around Google Cloud Platform identity primitives.
//!
//! Four small building blocks, each a thin wrapper over an existing Google
//! endpoint:
//!
//! - [`signed_url`]: time-limited V4 signed URLs for Cloud Storage objects,
//!   with byte-signing delegated to a [`SignBytes`] implementation.
//! - [`metadata`]: identity tokens and account lookups from the GCE
//!   metadata server.
//! - [`IamSigner`]: remote signatures over arbitrary bytes via the IAM
//!   Credentials `signBlob` RPC.
//! - [`IdTokenVerifier`]: verification of Google-issued OpenID Connect ID
//!   tokens against the issuer's cached key set.
//!
//! Everything talks to the outside world through a [`Context`], so HTTP,
//! file and environment access stay injectable.
//!
//! ## Example
//!
//! ```no_run
//! use gcp_identity::{
//!     signed_url, AccountRef, Context, IamSigner, OsEnv, ReqwestHttpSend, SignedUrlRequest,
//!     StaticCredentialProvider, TokioFileRead,
//! };
//!
//! # async fn example(credential_json: &str) -> gcp_identity::Result<()> {
//! let ctx = Context::new()
//!     .with_file_read(TokioFileRead)
//!     .with_http_send(ReqwestHttpSend::default())
//!     .with_env(OsEnv);
//!
//! // Who are we on this instance?
//! let email = gcp_identity::metadata::service_account_email(&ctx, &AccountRef::Default).await?;
//!
//! // Sign a URL for that identity, with Google holding the key.
//! let signer = IamSigner::new(&email, StaticCredentialProvider::new(credential_json));
//! let request = SignedUrlRequest::new(
//!     "bucket1",
//!     "path/to/my/file",
//!     http::Method::GET,
//!     gcp_identity::time::now() + chrono::TimeDelta::try_minutes(60).expect("in bounds"),
//!     &email,
//! );
//! let url = signed_url(&ctx, &request, &signer).await?;
//! println!("signed URL: {url}");
//! # Ok(())
//! # }
//! ```

// Make sure all our public APIs have docs.
#![warn(missing_docs)]

pub mod hash;
pub mod time;
pub mod utils;

mod constants;

mod account;
pub use account::AccountRef;

mod config;
pub use config::Config;

mod context;
pub use context::{
    Context, Env, FileRead, HttpSend, OsEnv, ReqwestHttpSend, StaticEnv, StaticHttpSend,
    TokioFileRead,
};

mod credential;
pub use credential::{Credential, CredentialFile, OAuth2Credentials, ServiceAccount, Token};

mod error;
pub use error::{Error, ErrorKind, Result};

mod iam;
pub use iam::{IamSigner, SignedBlob};

pub mod metadata;

mod oauth2;

mod provide_credential;
pub use provide_credential::{
    DefaultCredentialProvider, ProvideCredential, ProvideCredentialChain,
    StaticCredentialProvider, VmMetadataCredentialProvider,
};

mod sign;
pub use sign::{ServiceAccountSigner, SignBytes};

mod signed_url;
pub use signed_url::{signed_url, SignedUrlRequest};

mod verifier;
pub use verifier::{IdTokenClaims, IdTokenVerifier, VerifierConfig};
