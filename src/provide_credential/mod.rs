//! Credential providers make the crate's ambient-credential dependency an
//! explicit, swappable capability.

use std::fmt::Debug;
use std::sync::Arc;

use crate::credential::Credential;
use crate::{Context, Result};

mod default;
pub use default::DefaultCredentialProvider;

mod static_provider;
pub use static_provider::StaticCredentialProvider;

mod vm_metadata;
pub use vm_metadata::VmMetadataCredentialProvider;

/// ProvideCredential loads Google credentials from some source.
///
/// Returning `Ok(None)` means "this source has nothing", which lets a chain
/// move on to the next provider; errors abort the chain.
#[async_trait::async_trait]
pub trait ProvideCredential: Debug + Send + Sync + 'static {
    /// Load a credential from this source, if available.
    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Credential>>;
}

/// ProvideCredentialChain tries a list of providers in order and returns the
/// first credential found.
#[derive(Debug, Default)]
pub struct ProvideCredentialChain {
    providers: Vec<Arc<dyn ProvideCredential>>,
}

impl ProvideCredentialChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider to the chain.
    pub fn push(mut self, provider: impl ProvideCredential) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }
}

#[async_trait::async_trait]
impl ProvideCredential for ProvideCredentialChain {
    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Credential>> {
        for provider in &self.providers {
            if let Some(cred) = provider.provide_credential(ctx).await? {
                return Ok(Some(cred));
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::Token;

    #[derive(Debug)]
    struct Empty;

    #[async_trait::async_trait]
    impl ProvideCredential for Empty {
        async fn provide_credential(&self, _: &Context) -> Result<Option<Credential>> {
            Ok(None)
        }
    }

    #[derive(Debug)]
    struct Fixed(&'static str);

    #[async_trait::async_trait]
    impl ProvideCredential for Fixed {
        async fn provide_credential(&self, _: &Context) -> Result<Option<Credential>> {
            Ok(Some(Credential::with_token(Token {
                access_token: self.0.to_string(),
                expires_at: None,
            })))
        }
    }

    #[tokio::test]
    async fn test_chain_returns_first_hit() {
        let chain = ProvideCredentialChain::new()
            .push(Empty)
            .push(Fixed("first"))
            .push(Fixed("second"));

        let cred = chain
            .provide_credential(&Context::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cred.token.unwrap().access_token, "first");
    }

    #[tokio::test]
    async fn test_empty_chain_returns_none() {
        let chain = ProvideCredentialChain::new().push(Empty);
        let cred = chain.provide_credential(&Context::new()).await.unwrap();
        assert!(cred.is_none());
    }
}
