//! Static token authenticator.

use std::collections::HashMap;

use async_trait::async_trait;
use recordkit_security::SecurityContext;
use secrecy::ExposeSecret;

use crate::config::{AuthnMode, IdentityConfig, StaticAuthnConfig};
use crate::domain::error::AuthnError;
use crate::domain::ports::{Authenticator, Credentials};

/// Token-to-identity mapping based on configuration mode:
/// - `accept_all`: any non-empty token maps to the default identity
/// - `static_tokens`: specific tokens map to specific identities
#[derive(Debug, Clone)]
pub struct StaticTokenAuthenticator {
    mode: AuthnMode,
    default_identity: IdentityConfig,
    token_map: HashMap<String, IdentityConfig>,
}

impl StaticTokenAuthenticator {
    #[must_use]
    pub fn from_config(cfg: &StaticAuthnConfig) -> Self {
        let token_map = cfg
            .tokens
            .iter()
            .map(|m| (m.token.clone(), m.identity.clone()))
            .collect();

        Self {
            mode: cfg.mode,
            default_identity: cfg.default_identity.clone(),
            token_map,
        }
    }

    fn identity(&self, bearer_token: &str) -> Option<&IdentityConfig> {
        match self.mode {
            AuthnMode::AcceptAll => Some(&self.default_identity),
            AuthnMode::StaticTokens => self.token_map.get(bearer_token),
        }
    }
}

#[async_trait]
impl Authenticator for StaticTokenAuthenticator {
    async fn authenticate(&self, credentials: &Credentials) -> Result<SecurityContext, AuthnError> {
        let token = credentials
            .bearer_token()
            .map(ExposeSecret::expose_secret)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthnError::Unauthorized("missing bearer token".to_owned()))?;
        let identity = self
            .identity(token)
            .ok_or_else(|| AuthnError::Unauthorized("unknown bearer token".to_owned()))?;
        Ok(build_context(identity))
    }
}

fn build_context(identity: &IdentityConfig) -> SecurityContext {
    let mut builder = SecurityContext::builder().subject_id(identity.subject_id);
    if let Some(subject_type) = &identity.subject_type {
        builder = builder.subject_type(subject_type);
    }
    builder.build()
}
