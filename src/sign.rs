use std::fmt::Debug;

use rand::thread_rng;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{RandomizedSigner, SignatureEncoding};

use crate::credential::ServiceAccount;
use crate::{Context, Error, Result};

/// SignBytes produces a cryptographic signature over caller-supplied bytes.
///
/// This is the seam between URL construction and the cryptographic backend:
/// the signed-URL generator calls it exactly once per URL and never cares
/// whether the bytes were signed locally or by a remote service.
#[async_trait::async_trait]
pub trait SignBytes: Debug + Send + Sync {
    /// Sign the payload and return the raw signature bytes.
    async fn sign_bytes(&self, ctx: &Context, payload: &[u8]) -> Result<Vec<u8>>;
}

/// ServiceAccountSigner signs locally with the service account's own RSA
/// private key (PKCS#1 v1.5 over SHA-256, the scheme V4 signed URLs expect).
#[derive(Clone)]
pub struct ServiceAccountSigner {
    service_account: ServiceAccount,
}

impl Debug for ServiceAccountSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountSigner")
            .field("service_account", &self.service_account)
            .finish()
    }
}

impl ServiceAccountSigner {
    /// Create a signer from a service account.
    pub fn new(service_account: ServiceAccount) -> Self {
        Self { service_account }
    }

    /// The account email, usable as the signed URL access id.
    pub fn access_id(&self) -> &str {
        &self.service_account.client_email
    }
}

#[async_trait::async_trait]
impl SignBytes for ServiceAccountSigner {
    async fn sign_bytes(&self, _ctx: &Context, payload: &[u8]) -> Result<Vec<u8>> {
        let private_key = rsa::RsaPrivateKey::from_pkcs8_pem(&self.service_account.private_key)
            .map_err(|e| Error::credential_invalid("failed to parse private key").with_source(e))?;
        let signing_key = SigningKey::<sha2::Sha256>::new(private_key);

        let mut rng = thread_rng();
        let signature = signing_key.sign_with_rng(&mut rng, payload);

        Ok(signature.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::EncodePrivateKey;
    use rsa::signature::Verifier;

    #[tokio::test]
    async fn test_sign_bytes_verifies_with_public_key() {
        let mut rng = thread_rng();
        let private_key = rsa::RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let pem = private_key
            .to_pkcs8_pem(rsa::pkcs8::LineEnding::LF)
            .unwrap()
            .to_string();

        let signer = ServiceAccountSigner::new(ServiceAccount {
            client_email: "svc@example.iam.gserviceaccount.com".to_string(),
            private_key: pem,
        });
        assert_eq!(signer.access_id(), "svc@example.iam.gserviceaccount.com");

        let payload = b"string to sign";
        let signature = signer.sign_bytes(&Context::new(), payload).await.unwrap();

        let verifying_key = rsa::pkcs1v15::VerifyingKey::<sha2::Sha256>::new(private_key.to_public_key());
        let signature = rsa::pkcs1v15::Signature::try_from(signature.as_slice()).unwrap();
        verifying_key.verify(payload, &signature).unwrap();
    }

    #[tokio::test]
    async fn test_garbage_key_is_credential_error() {
        let signer = ServiceAccountSigner::new(ServiceAccount {
            client_email: "svc@example.iam.gserviceaccount.com".to_string(),
            private_key: "not a key".to_string(),
        });

        let err = signer.sign_bytes(&Context::new(), b"x").await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::CredentialInvalid);
    }
}
