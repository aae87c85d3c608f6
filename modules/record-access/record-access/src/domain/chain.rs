//! Ordered, short-circuiting evaluation of security models.
//!
//! One [`AuthorizationChain`] serves one request. The authenticated user is
//! resolved lazily at the first model that needs it and at most once; a
//! failed resolution is remembered and makes every later auth-requiring
//! model non-matching.

use recordkit_security::{FindFilter, SecurityContext};

use crate::domain::error::AccessError;
use crate::domain::models::SecurityModel;
use crate::domain::operation::Operation;
use crate::domain::ports::{Authenticator, Credentials, Record};

enum UserState {
    Unresolved,
    Resolved(SecurityContext),
    Failed,
}

/// The model that granted an operation and the filter it left behind.
#[derive(Debug)]
pub struct Grant<'m> {
    pub model: &'m SecurityModel,
    pub filter: FindFilter,
}

pub struct AuthorizationChain<'a> {
    authenticator: &'a dyn Authenticator,
    credentials: &'a Credentials,
    user: UserState,
}

impl<'a> AuthorizationChain<'a> {
    #[must_use]
    pub fn new(authenticator: &'a dyn Authenticator, credentials: &'a Credentials) -> Self {
        Self {
            authenticator,
            credentials,
            user: UserState::Unresolved,
        }
    }

    /// The user resolved so far, if any.
    #[must_use]
    pub fn user(&self) -> Option<&SecurityContext> {
        match &self.user {
            UserState::Resolved(ctx) => Some(ctx),
            UserState::Unresolved | UserState::Failed => None,
        }
    }

    async fn resolve_user(&mut self) -> Option<&SecurityContext> {
        if matches!(self.user, UserState::Unresolved) {
            self.user = match self.authenticator.authenticate(self.credentials).await {
                Ok(ctx) => UserState::Resolved(ctx),
                Err(err) => {
                    tracing::debug!(error = %err, "authentication failed");
                    UserState::Failed
                }
            };
        }
        self.user()
    }

    /// Try `models` in order; the first that grants wins.
    ///
    /// Every model sees `filter` as left by the models before it.
    ///
    /// # Errors
    /// - [`AccessError::Forbidden`] when no model grants the operation
    /// - [`AccessError::Store`] when a model's lookup fails
    pub async fn evaluate<'m>(
        &mut self,
        models: &'m [SecurityModel],
        mut filter: FindFilter,
        operation: Operation,
        body: Option<&Record>,
    ) -> Result<Grant<'m>, AccessError> {
        for model in models {
            let user = if model.needs_authenticated_user() {
                let Some(user) = self.resolve_user().await else {
                    tracing::debug!(
                        record_type = %model.record_type(),
                        operation = %operation,
                        model = model.kind(),
                        "skipping model: no authenticated user"
                    );
                    continue;
                };
                Some(user)
            } else {
                self.user()
            };

            if model
                .has_permission(user, &mut filter, operation, body)
                .await?
            {
                tracing::debug!(
                    record_type = %model.record_type(),
                    operation = %operation,
                    model = model.kind(),
                    "operation granted"
                );
                return Ok(Grant { model, filter });
            }
        }

        tracing::debug!(
            operation = %operation,
            models = models.len(),
            "no security model granted the operation"
        );
        Err(AccessError::Forbidden)
    }
}

impl std::fmt::Debug for AuthorizationChain<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationChain")
            .field("user", &self.user().map(SecurityContext::subject_id))
            .finish_non_exhaustive()
    }
}
