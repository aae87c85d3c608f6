use uuid::Uuid;

/// `SecurityContext` carries the identity of the authenticated user for a request.
///
/// Built by an authenticator and shared by every security model of one
/// authorization chain evaluation.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SecurityContext {
    /// Subject ID - the authenticated user or service making the request.
    subject_id: Uuid,
    /// Subject type classification (e.g., "user", "service").
    subject_type: Option<String>,
}

impl SecurityContext {
    /// Create a new `SecurityContext` builder
    #[must_use]
    pub fn builder() -> SecurityContextBuilder {
        SecurityContextBuilder::default()
    }

    /// Get the subject ID associated with the security context
    #[must_use]
    pub fn subject_id(&self) -> Uuid {
        self.subject_id
    }

    /// Subject ID rendered the way record owner fields store it.
    #[must_use]
    pub fn subject_key(&self) -> String {
        self.subject_id.to_string()
    }

    /// Get the subject type classification (e.g., "user", "service").
    #[must_use]
    pub fn subject_type(&self) -> Option<&str> {
        self.subject_type.as_deref()
    }
}

#[derive(Default)]
pub struct SecurityContextBuilder {
    subject_id: Option<Uuid>,
    subject_type: Option<String>,
}

impl SecurityContextBuilder {
    #[must_use]
    pub fn subject_id(mut self, subject_id: Uuid) -> Self {
        self.subject_id = Some(subject_id);
        self
    }

    #[must_use]
    pub fn subject_type(mut self, subject_type: &str) -> Self {
        self.subject_type = Some(subject_type.to_owned());
        self
    }

    #[must_use]
    pub fn build(self) -> SecurityContext {
        SecurityContext {
            subject_id: self.subject_id.unwrap_or_default(),
            subject_type: self.subject_type,
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_all_fields() {
        let subject_id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440001").unwrap();

        let ctx = SecurityContext::builder()
            .subject_id(subject_id)
            .subject_type("user")
            .build();

        assert_eq!(ctx.subject_id(), subject_id);
        assert_eq!(ctx.subject_key(), "550e8400-e29b-41d4-a716-446655440001");
        assert_eq!(ctx.subject_type(), Some("user"));
    }

    #[test]
    fn minimal_builder_defaults() {
        let ctx = SecurityContext::builder().build();

        assert_eq!(ctx.subject_id(), Uuid::default());
        assert!(ctx.subject_type().is_none());
    }

    #[test]
    fn serde_round_trip_keeps_identity() {
        let ctx = SecurityContext::builder()
            .subject_id(Uuid::new_v4())
            .subject_type("service")
            .build();

        let serialized = serde_json::to_string(&ctx).unwrap();
        let restored: SecurityContext = serde_json::from_str(&serialized).unwrap();
        assert_eq!(restored.subject_id(), ctx.subject_id());
        assert_eq!(restored.subject_type(), Some("service"));
    }
}
