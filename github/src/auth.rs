//! Credential resolution for API calls.
//!
//! The resolver is consulted on every request, so rotated credentials are
//! picked up without restarting. Absence of a credential is not an error:
//! requests proceed unauthenticated under the upstream's much stricter
//! anonymous quota, which is logged once per call site by the client.

use std::future::Future;

use secrecy::SecretString;

/// Supplies an optional bearer credential per call.
pub trait TokenResolver {
    /// Resolves the current credential, or `None` to go unauthenticated.
    fn resolve(&self) -> impl Future<Output = Option<SecretString>> + Send;
}

/// Resolver returning a fixed credential.
#[derive(Debug, Clone)]
pub struct StaticToken(Option<SecretString>);

impl StaticToken {
    /// Creates a resolver around an optional raw token.
    pub fn new(token: Option<String>) -> Self {
        Self(token.map(SecretString::new))
    }

    /// Creates a resolver that always goes unauthenticated.
    pub fn anonymous() -> Self {
        Self(None)
    }
}

impl TokenResolver for StaticToken {
    async fn resolve(&self) -> Option<SecretString> {
        self.0.clone()
    }
}

/// Resolver reading the credential from an environment variable per call.
#[derive(Debug, Clone)]
pub struct EnvToken {
    var: String,
}

impl EnvToken {
    /// Creates a resolver over the given environment variable.
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl TokenResolver for EnvToken {
    async fn resolve(&self) -> Option<SecretString> {
        std::env::var(&self.var)
            .ok()
            .filter(|token| !token.is_empty())
            .map(SecretString::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[tokio::test]
    async fn static_token_resolves_to_its_value() {
        let resolver = StaticToken::new(Some("ghp_test".to_owned()));
        let token = resolver.resolve().await.unwrap();
        assert_eq!(token.expose_secret(), "ghp_test");

        assert!(StaticToken::anonymous().resolve().await.is_none());
    }
}
