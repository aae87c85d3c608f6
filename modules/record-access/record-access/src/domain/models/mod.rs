//! Security models.
//!
//! A closed set of variants dispatched by `match`. Each protects one record
//! type, says whether it needs an authenticated user, decides a permission
//! (possibly narrowing the find filter) and picks how an empty store result
//! is reported.

mod ownership;
mod role_membership;

use std::sync::Arc;

use recordkit_security::{FindFilter, SecurityContext};

pub use ownership::Ownership;
pub use role_membership::{RoleCache, RoleMembership};

use crate::domain::error::AccessError;
use crate::domain::operation::Operation;
use crate::domain::ports::Record;

/// How a winning model reports "the store returned nothing".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyResultPolicy {
    /// Legitimately nothing: null payload.
    NotFound,
    /// Look the record up without the model's narrowing; if it exists the
    /// caller gets a denial instead of an empty success.
    CheckExistence,
}

#[derive(Debug, Clone)]
pub enum SecurityModel {
    /// Always allows; never needs a user.
    OpenAccess { record_type: String },
    Ownership(Ownership),
    RoleMembership(RoleMembership),
    /// Never allows; never needs a user.
    DenyAll { record_type: String },
}

impl SecurityModel {
    #[must_use]
    pub fn open_access(record_type: impl Into<String>) -> Self {
        Self::OpenAccess {
            record_type: record_type.into(),
        }
    }

    #[must_use]
    pub fn deny_all(record_type: impl Into<String>) -> Self {
        Self::DenyAll {
            record_type: record_type.into(),
        }
    }

    #[must_use]
    pub fn ownership(record_type: impl Into<String>) -> Self {
        Self::Ownership(Ownership::new(record_type))
    }

    #[must_use]
    pub fn role_membership(
        record_type: impl Into<String>,
        layer: impl Into<String>,
        roles: &Arc<RoleCache>,
    ) -> Self {
        Self::RoleMembership(RoleMembership::new(record_type, layer, Arc::clone(roles)))
    }

    /// Variant name used in logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::OpenAccess { .. } => "open_access",
            Self::Ownership(_) => "ownership",
            Self::RoleMembership(_) => "role_membership",
            Self::DenyAll { .. } => "deny_all",
        }
    }

    #[must_use]
    pub fn record_type(&self) -> &str {
        match self {
            Self::OpenAccess { record_type } | Self::DenyAll { record_type } => record_type,
            Self::Ownership(model) => model.record_type(),
            Self::RoleMembership(model) => model.record_type(),
        }
    }

    #[must_use]
    pub fn needs_authenticated_user(&self) -> bool {
        matches!(self, Self::Ownership(_) | Self::RoleMembership(_))
    }

    /// Decide `operation`, possibly narrowing `filter`.
    ///
    /// `user` is `None` only for models that do not need one.
    ///
    /// # Errors
    /// [`AccessError::Store`] when a backing lookup fails.
    pub async fn has_permission(
        &self,
        user: Option<&SecurityContext>,
        filter: &mut FindFilter,
        operation: Operation,
        body: Option<&Record>,
    ) -> Result<bool, AccessError> {
        match (self, user) {
            (Self::OpenAccess { .. }, _) => Ok(true),
            (Self::Ownership(model), Some(user)) => {
                Ok(model.has_permission(user, filter, operation, body))
            }
            (Self::RoleMembership(model), Some(user)) => {
                model.has_permission(user, filter, operation).await
            }
            (Self::DenyAll { .. } | Self::Ownership(_) | Self::RoleMembership(_), _) => Ok(false),
        }
    }

    #[must_use]
    pub fn handle_empty_query_results(&self, _operation: Operation) -> EmptyResultPolicy {
        match self {
            Self::Ownership(_) => EmptyResultPolicy::CheckExistence,
            Self::OpenAccess { .. } | Self::RoleMembership(_) | Self::DenyAll { .. } => {
                EmptyResultPolicy::NotFound
            }
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn open_access_and_deny_all_ignore_the_user() {
        let mut filter = FindFilter::new();
        let open = SecurityModel::open_access("note");
        let deny = SecurityModel::deny_all("note");

        assert!(!open.needs_authenticated_user());
        assert!(!deny.needs_authenticated_user());
        let opened = open.has_permission(None, &mut filter, Operation::Delete, None);
        assert!(opened.await.unwrap());
        let denied = deny.has_permission(None, &mut filter, Operation::Get, None);
        assert!(!denied.await.unwrap());
        assert!(filter.is_empty());
    }

    #[tokio::test]
    async fn ownership_without_user_denies() {
        let mut filter = FindFilter::new();
        let model = SecurityModel::ownership("note");

        assert!(model.needs_authenticated_user());
        let anonymous = model.has_permission(None, &mut filter, Operation::Get, None);
        assert!(!anonymous.await.unwrap());

        let user = SecurityContext::builder().subject_id(Uuid::new_v4()).build();
        let owner = model.has_permission(Some(&user), &mut filter, Operation::Get, None);
        assert!(owner.await.unwrap());
    }

    #[test]
    fn only_ownership_checks_existence() {
        assert_eq!(
            SecurityModel::ownership("note").handle_empty_query_results(Operation::Get),
            EmptyResultPolicy::CheckExistence
        );
        assert_eq!(
            SecurityModel::open_access("note").handle_empty_query_results(Operation::Get),
            EmptyResultPolicy::NotFound
        );
        assert_eq!(SecurityModel::deny_all("note").kind(), "deny_all");
        assert_eq!(SecurityModel::deny_all("note").record_type(), "note");
    }
}
