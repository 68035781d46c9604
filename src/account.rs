use std::fmt;

use crate::constants::DEFAULT_ACCOUNT;

/// Reference to a service account on the metadata server.
///
/// The metadata server addresses the instance's default identity by the
/// literal path segment `default`; this enum makes that sentinel explicit so
/// call sites cannot typo it into a real account name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AccountRef {
    /// The instance's default service account.
    #[default]
    Default,
    /// A service account addressed by name (usually its email).
    Named(String),
}

impl AccountRef {
    /// Create a named account reference.
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// The path segment used on the metadata server.
    pub fn as_str(&self) -> &str {
        match self {
            AccountRef::Default => DEFAULT_ACCOUNT,
            AccountRef::Named(name) => name,
        }
    }
}

impl fmt::Display for AccountRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
