//! Configuration for the record access module.

use std::time::Duration;

use recordkit_schema::{QueryOptions, SchemaOptions, StorageOptions};
use recordkit_security::filter_keys;
use serde::Deserialize;
use uuid::Uuid;

/// Module configuration.
///
/// Loading (files, environment) is left to the host; this is only the shape.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RecordAccessConfig {
    /// Page size when a list request omits `limit`.
    pub default_limit: u64,

    /// Upper bound applied to any requested `limit`.
    pub max_limit: u64,

    /// Maximum `$and`/`$or` nesting accepted in `advanced_query`.
    pub max_query_depth: usize,

    /// Name of the record identity field.
    pub id_field: String,

    /// Membership lookups (stale-while-revalidate).
    pub membership_cache: CacheConfig,

    /// Role documents.
    pub role_cache: CacheConfig,
}

impl Default for RecordAccessConfig {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 100,
            max_query_depth: 16,
            id_field: filter_keys::RECORD_ID.to_owned(),
            membership_cache: CacheConfig::default(),
            role_cache: CacheConfig::default(),
        }
    }
}

impl RecordAccessConfig {
    /// Compiler options derived from this configuration.
    #[must_use]
    pub fn schema_options(&self) -> SchemaOptions {
        SchemaOptions {
            storage: StorageOptions {
                id_field: self.id_field.clone(),
            },
            query: QueryOptions {
                max_query_depth: self.max_query_depth,
            },
        }
    }

    /// Effective page size for a requested `limit`.
    #[must_use]
    pub fn page_size(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit.max(1))
    }
}

/// TTL cache settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Sliding expiry in seconds.
    pub ttl_secs: u64,

    /// Sweep interval in seconds; `0` disables the sweeper.
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 60,
            sweep_interval_secs: 300,
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}

/// Static token authenticator configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StaticAuthnConfig {
    /// Authentication mode.
    pub mode: AuthnMode,

    /// Identity returned in `accept_all` mode.
    pub default_identity: IdentityConfig,

    /// Token-to-identity mappings for `static_tokens` mode.
    pub tokens: Vec<TokenMapping>,
}

impl Default for StaticAuthnConfig {
    fn default() -> Self {
        Self {
            mode: AuthnMode::StaticTokens,
            default_identity: IdentityConfig::default(),
            tokens: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthnMode {
    /// Any non-empty token maps to the default identity.
    AcceptAll,
    /// Only configured tokens are accepted.
    #[default]
    StaticTokens,
}

/// Identity of one subject. The default is the nil subject.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IdentityConfig {
    pub subject_id: Uuid,

    pub subject_type: Option<String>,
}

/// Maps a static token to a specific identity.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenMapping {
    pub token: String,
    pub identity: IdentityConfig,
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_config_uses_defaults() {
        let cfg: RecordAccessConfig = serde_json::from_value(json!({})).unwrap();

        assert_eq!(cfg.default_limit, 20);
        assert_eq!(cfg.max_limit, 100);
        assert_eq!(cfg.id_field, "id");
        assert_eq!(cfg.membership_cache.ttl(), Duration::from_secs(60));
        assert_eq!(cfg.schema_options().query.max_query_depth, 16);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result: Result<RecordAccessConfig, _> =
            serde_json::from_value(json!({"default_limt": 5}));
        assert!(result.is_err());
    }

    #[test]
    fn page_size_is_clamped() {
        let cfg = RecordAccessConfig {
            max_limit: 50,
            ..RecordAccessConfig::default()
        };

        assert_eq!(cfg.page_size(None), 20);
        assert_eq!(cfg.page_size(Some(7)), 7);
        assert_eq!(cfg.page_size(Some(500)), 50);
    }

    #[test]
    fn zero_sweep_interval_disables_sweeper() {
        let cache: CacheConfig =
            serde_json::from_value(json!({"ttl_secs": 5, "sweep_interval_secs": 0})).unwrap();
        assert_eq!(cache.sweep_interval(), None);
    }

    #[test]
    fn static_tokens_parse() {
        let cfg: StaticAuthnConfig = serde_json::from_value(json!({
            "mode": "static_tokens",
            "tokens": [{
                "token": "t-1",
                "identity": {"subject_id": "0190a5f0-0000-7000-8000-000000000001"}
            }]
        }))
        .unwrap();

        assert_eq!(cfg.mode, AuthnMode::StaticTokens);
        assert!(cfg.tokens[0].identity.subject_type.is_none());
    }
}
