use std::sync::Arc;

/// A failed fetch, shared by every caller awaiting it.
#[derive(Debug, Clone, thiserror::Error)]
#[error("fetch for cache key `{key}` failed: {cause:#}")]
pub struct FetchError {
    key: String,
    cause: Arc<anyhow::Error>,
}

impl FetchError {
    #[must_use]
    pub fn new(key: impl Into<String>, cause: anyhow::Error) -> Self {
        Self {
            key: key.into(),
            cause: Arc::new(cause),
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The error returned by the fetch function.
    #[must_use]
    pub fn cause(&self) -> &anyhow::Error {
        &self.cause
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_cause() {
        let err = FetchError::new("user-1", anyhow::anyhow!("store offline"));
        let copy = err.clone();

        assert!(Arc::ptr_eq(&err.cause, &copy.cause));
        assert_eq!(
            copy.to_string(),
            "fetch for cache key `user-1` failed: store offline"
        );
        assert_eq!(copy.key(), "user-1");
    }
}
