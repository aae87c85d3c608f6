#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use recordkit_security::SecurityContext;
use uuid::Uuid;

use crate::domain::error::AuthnError;
use crate::domain::ports::{Authenticator, Credentials, Membership, Role, RoleDirectory};

#[must_use]
pub fn user_ctx(subject_id: Uuid) -> SecurityContext {
    SecurityContext::builder()
        .subject_id(subject_id)
        .subject_type("user")
        .build()
}

/// Resolves every request to the same user and counts the calls.
pub struct CountingAuthenticator {
    ctx: SecurityContext,
    calls: AtomicUsize,
}

impl CountingAuthenticator {
    #[must_use]
    pub fn new(ctx: SecurityContext) -> Self {
        Self {
            ctx,
            calls: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Authenticator for CountingAuthenticator {
    async fn authenticate(&self, _: &Credentials) -> Result<SecurityContext, AuthnError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.ctx.clone())
    }
}

/// Rejects every request and counts the calls.
#[derive(Default)]
pub struct FailingAuthenticator {
    calls: AtomicUsize,
}

impl FailingAuthenticator {
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Authenticator for FailingAuthenticator {
    async fn authenticate(&self, _: &Credentials) -> Result<SecurityContext, AuthnError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AuthnError::Unauthorized("rejected".to_owned()))
    }
}

/// Memberships and roles held in maps; lookups are counted.
#[derive(Default)]
pub struct StaticRoleDirectory {
    memberships: Mutex<HashMap<(String, String), Membership>>,
    roles: Mutex<HashMap<String, Role>>,
    pub membership_lookups: AtomicUsize,
    pub role_lookups: AtomicUsize,
}

impl StaticRoleDirectory {
    pub fn add_membership(&self, user_id: &str, layer_id: &str, role_id: &str) {
        self.memberships.lock().insert(
            (user_id.to_owned(), layer_id.to_owned()),
            Membership {
                user_id: user_id.to_owned(),
                role_id: role_id.to_owned(),
            },
        );
    }

    pub fn add_role(&self, role_id: &str, record_type: &str, grants: &[(&str, bool)]) {
        let actions = grants
            .iter()
            .map(|(action, granted)| ((*action).to_owned(), *granted))
            .collect();
        let role = Role {
            id: role_id.to_owned(),
            permissions: HashMap::from([(record_type.to_owned(), actions)]),
        };
        self.roles.lock().insert(role_id.to_owned(), role);
    }
}

#[async_trait]
impl RoleDirectory for StaticRoleDirectory {
    async fn find_membership(
        &self,
        user_id: &str,
        _layer: &str,
        layer_id: &str,
    ) -> anyhow::Result<Option<Membership>> {
        self.membership_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .memberships
            .lock()
            .get(&(user_id.to_owned(), layer_id.to_owned()))
            .cloned())
    }

    async fn find_role(&self, role_id: &str) -> anyhow::Result<Option<Role>> {
        self.role_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.roles.lock().get(role_id).cloned())
    }
}
