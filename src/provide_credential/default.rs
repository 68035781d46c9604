use async_trait::async_trait;
use log::debug;

use crate::config::Config;
use crate::constants::GOOGLE_APPLICATION_CREDENTIALS;
use crate::credential::{Credential, CredentialFile};
use crate::oauth2;
use crate::provide_credential::{
    ProvideCredential, ProvideCredentialChain, VmMetadataCredentialProvider,
};
use crate::{Context, Result};

/// DefaultCredentialProvider tries to load credentials from multiple sources
/// in order: explicit content, explicit path, `GOOGLE_APPLICATION_CREDENTIALS`,
/// the gcloud well-known location, and finally the VM metadata service.
#[derive(Debug)]
pub struct DefaultCredentialProvider {
    chain: ProvideCredentialChain,
}

impl DefaultCredentialProvider {
    /// Create a new DefaultCredentialProvider.
    pub fn new(config: Config) -> Self {
        let mut chain = ProvideCredentialChain::new().push(CredentialFileProvider::new(config.clone()));

        if !config.disable_vm_metadata {
            let mut provider = VmMetadataCredentialProvider::new();
            if let Some(scope) = &config.scope {
                provider = provider.with_scope(scope);
            }
            chain = chain.push(provider);
        }

        Self { chain }
    }
}

#[async_trait]
impl ProvideCredential for DefaultCredentialProvider {
    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Credential>> {
        self.chain.provide_credential(ctx).await
    }
}

/// CredentialFileProvider loads credentials from configured content, files
/// and well-known locations.
#[derive(Debug, Clone)]
struct CredentialFileProvider {
    config: Config,
}

impl CredentialFileProvider {
    fn new(config: Config) -> Self {
        Self { config }
    }

    async fn load_credential_file(&self, ctx: &Context) -> Result<Option<CredentialFile>> {
        // Try explicit content
        if let Some(content) = &self.config.credential_content {
            if let Ok(cred) = CredentialFile::from_base64(content) {
                return Ok(Some(cred));
            }
            if let Ok(cred) = CredentialFile::from_slice(content.as_bytes()) {
                return Ok(Some(cred));
            }
        }

        // Try explicit path
        if let Some(path) = &self.config.credential_path {
            if let Ok(content) = ctx.file_read(path).await {
                if let Ok(cred) = CredentialFile::from_slice(&content) {
                    return Ok(Some(cred));
                }
            }
        }

        // Try environment variable
        if !self.config.disable_env {
            if let Some(path) = ctx.env_var(GOOGLE_APPLICATION_CREDENTIALS) {
                if let Ok(content) = ctx.file_read(&path).await {
                    if let Ok(cred) = CredentialFile::from_slice(&content) {
                        return Ok(Some(cred));
                    }
                }
            }
        }

        // Try well-known location
        if !self.config.disable_well_known_location {
            let config_dir = if let Some(v) = ctx.env_var("APPDATA") {
                v
            } else if let Some(v) = ctx.env_var("XDG_CONFIG_HOME") {
                v
            } else if let Some(v) = ctx.env_var("HOME") {
                format!("{v}/.config")
            } else {
                return Ok(None);
            };

            let path = format!("{config_dir}/gcloud/application_default_credentials.json");
            if let Ok(content) = ctx.file_read(&path).await {
                if let Ok(cred) = CredentialFile::from_slice(&content) {
                    return Ok(Some(cred));
                }
            }
        }

        Ok(None)
    }
}

#[async_trait]
impl ProvideCredential for CredentialFileProvider {
    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Credential>> {
        if let Some(cred_file) = self.load_credential_file(ctx).await? {
            match cred_file {
                CredentialFile::ServiceAccount(sa) => {
                    debug!("loaded service account credential");
                    return Ok(Some(Credential::with_service_account(sa)));
                }
                CredentialFile::AuthorizedUser(au) => {
                    debug!("loaded authorized user credential, exchanging for token");
                    let token = oauth2::refresh_authorized_user(ctx, &au).await?;
                    return Ok(Some(Credential::with_token(token)));
                }
            }
        }

        Ok(None)
    }
}
