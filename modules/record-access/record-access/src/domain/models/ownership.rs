use recordkit_security::{FindFilter, SecurityContext, filter_keys};
use serde_json::Value;

use crate::domain::operation::Operation;
use crate::domain::ports::Record;

/// Grants access to records owned by the caller.
#[derive(Debug, Clone)]
pub struct Ownership {
    record_type: String,
    owner_field: String,
}

impl Ownership {
    /// Ownership keyed by the `user_id` field.
    #[must_use]
    pub fn new(record_type: impl Into<String>) -> Self {
        Self::with_owner_field(record_type, filter_keys::OWNER_ID)
    }

    #[must_use]
    pub fn with_owner_field(
        record_type: impl Into<String>,
        owner_field: impl Into<String>,
    ) -> Self {
        Self {
            record_type: record_type.into(),
            owner_field: owner_field.into(),
        }
    }

    #[must_use]
    pub fn record_type(&self) -> &str {
        &self.record_type
    }

    #[must_use]
    pub fn owner_field(&self) -> &str {
        &self.owner_field
    }

    /// Reads and deletes are narrowed to the caller's records. Creates and
    /// updates must not name anyone else as the owner.
    pub fn has_permission(
        &self,
        user: &SecurityContext,
        filter: &mut FindFilter,
        operation: Operation,
        body: Option<&Record>,
    ) -> bool {
        let owner = Value::String(user.subject_key());
        let claimed = body.and_then(|b| b.get(&self.owner_field));
        match operation {
            Operation::Create => claimed == Some(&owner),
            Operation::Update if claimed.is_some_and(|c| *c != owner) => false,
            Operation::Get | Operation::Update | Operation::Delete => {
                filter.set_eq(self.owner_field.clone(), owner);
                true
            }
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn user() -> SecurityContext {
        SecurityContext::builder().subject_id(Uuid::new_v4()).build()
    }

    fn body(owner: &str) -> Record {
        let mut record = Record::new();
        record.insert("user_id".to_owned(), json!(owner));
        record
    }

    #[test]
    fn reads_are_narrowed_to_the_caller() {
        let model = Ownership::new("note");
        let user = user();
        let mut filter = FindFilter::new();
        filter.set_eq("user_id", json!("someone-else"));

        assert!(model.has_permission(&user, &mut filter, Operation::Get, None));
        assert_eq!(filter.eq_value("user_id"), Some(&json!(user.subject_key())));
        assert_eq!(filter.clauses().len(), 1);
    }

    #[test]
    fn create_requires_matching_owner() {
        let model = Ownership::new("note");
        let user = user();
        let mut filter = FindFilter::new();

        let own = body(&user.subject_key());
        let other = body("other");

        assert!(model.has_permission(&user, &mut filter, Operation::Create, Some(&own)));
        assert!(!model.has_permission(&user, &mut filter, Operation::Create, Some(&other)));
        assert!(!model.has_permission(&user, &mut filter, Operation::Create, None));
        assert!(filter.is_empty());
    }

    #[test]
    fn update_cannot_hand_the_record_to_someone_else() {
        let model = Ownership::with_owner_field("note", "user_id");
        let user = user();
        let mut filter = FindFilter::new();

        let other = body("other");
        let empty = Record::new();

        assert!(!model.has_permission(&user, &mut filter, Operation::Update, Some(&other)));
        assert!(model.has_permission(&user, &mut filter, Operation::Update, Some(&empty)));
        assert!(filter.has_path("user_id"));
    }
}
