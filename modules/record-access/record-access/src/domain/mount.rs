use std::sync::Arc;

use recordkit_schema::{RecordSchema, ValidationError};
use recordkit_security::{FindFilter, filter_keys};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::error::{AccessError, ConfigError};
use crate::domain::models::SecurityModel;

/// One record type exposed under one access layer path.
#[derive(Debug)]
pub struct Mount {
    schema: Arc<RecordSchema>,
    layers: Vec<String>,
    models: Vec<SecurityModel>,
    id_field: String,
}

impl Mount {
    /// Check the wiring of `models` at `layers` against `schema`.
    ///
    /// # Errors
    /// [`ConfigError`] for an empty model list, a layer the record type
    /// cannot be filtered by, or a model that does not fit this mount.
    pub fn new(
        schema: Arc<RecordSchema>,
        layers: Vec<String>,
        models: Vec<SecurityModel>,
        id_field: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let record_type = schema.name().to_owned();
        if models.is_empty() {
            return Err(ConfigError::NoModels { record_type });
        }
        for layer in &layers {
            let field = filter_keys::layer_key(layer);
            if !schema.has_field(&field) {
                return Err(ConfigError::MissingLayerField {
                    record_type,
                    layer: layer.clone(),
                    field,
                });
            }
        }
        for model in &models {
            if model.record_type() != record_type {
                return Err(ConfigError::ModelRecordTypeMismatch {
                    record_type,
                    model_record_type: model.record_type().to_owned(),
                });
            }
            match model {
                SecurityModel::RoleMembership(m) if !layers.iter().any(|l| l == m.layer()) => {
                    return Err(ConfigError::LayerNotOnPath {
                        record_type,
                        layer: m.layer().to_owned(),
                    });
                }
                SecurityModel::Ownership(m) if !schema.has_field(m.owner_field()) => {
                    return Err(ConfigError::MissingOwnerField {
                        record_type,
                        field: m.owner_field().to_owned(),
                    });
                }
                _ => {}
            }
        }

        Ok(Self {
            schema,
            layers,
            models,
            id_field: id_field.into(),
        })
    }

    #[must_use]
    pub fn record_type(&self) -> &str {
        self.schema.name()
    }

    #[must_use]
    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    #[must_use]
    pub fn layers(&self) -> &[String] {
        &self.layers
    }

    #[must_use]
    pub fn models(&self) -> &[SecurityModel] {
        &self.models
    }

    #[must_use]
    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    /// `/<l1>/{<l1>_id}/.../<record>`
    #[must_use]
    pub fn collection_path(&self) -> String {
        let mut path = String::new();
        for layer in &self.layers {
            path.push('/');
            path.push_str(layer);
            path.push_str("/{");
            path.push_str(&filter_keys::layer_key(layer));
            path.push('}');
        }
        path.push('/');
        path.push_str(self.record_type());
        path
    }

    /// `<collection>/{id}`
    #[must_use]
    pub fn item_path(&self) -> String {
        format!("{}/{{{}}}", self.collection_path(), self.id_field)
    }

    /// The layer ids as `(field, id)` pairs, validated as identifiers.
    ///
    /// # Errors
    /// [`AccessError::Validation`] for a malformed id,
    /// [`AccessError::Internal`] when the count does not match the mount.
    pub fn layer_values(
        &self,
        layer_ids: &[String],
    ) -> Result<Vec<(String, String)>, AccessError> {
        if layer_ids.len() != self.layers.len() {
            return Err(AccessError::internal(format!(
                "mount of `{}` expects {} layer ids, got {}",
                self.record_type(),
                self.layers.len(),
                layer_ids.len()
            )));
        }
        self.layers
            .iter()
            .zip(layer_ids)
            .map(|(layer, id)| {
                let field = filter_keys::layer_key(layer);
                let id = identifier(&field, id)?;
                Ok((field, id))
            })
            .collect()
    }

    /// Filter seeded with every layer id and, for single-record
    /// operations, the target id.
    ///
    /// # Errors
    /// See [`Mount::layer_values`].
    pub fn seed_filter(
        &self,
        layer_ids: &[String],
        id: Option<&str>,
    ) -> Result<FindFilter, AccessError> {
        let values = self.layer_values(layer_ids)?;
        let mut filter = FindFilter::for_layers(
            self.layers
                .iter()
                .map(String::as_str)
                .zip(values.iter().map(|(_, id)| id.as_str())),
        );
        if let Some(id) = id {
            let id = identifier(&self.id_field, id)?;
            filter.set_eq(self.id_field.clone(), Value::String(id));
        }
        Ok(filter)
    }
}

fn identifier(field: &str, raw: &str) -> Result<String, AccessError> {
    Uuid::parse_str(raw)
        .map(|id| id.hyphenated().to_string())
        .map_err(|_| ValidationError::single(field, "expected a UUID").into())
}
