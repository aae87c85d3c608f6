//! In-memory record store.
//!
//! Records live in one ordered map per record type, keyed by their `UUIDv7`
//! id, so id order is creation order.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, bail};
use async_trait::async_trait;
use parking_lot::RwLock;
use recordkit_schema::{SortOrder, StorageSchema};
use recordkit_security::{CompareOp, Comparison, FilterExpr, FindFilter};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::ports::{FindOptions, Record, RecordStore};

#[derive(Default)]
struct Collection {
    schema: StorageSchema,
    records: BTreeMap<Uuid, Record>,
}

/// [`RecordStore`] over process memory. Ids are generated as `UUIDv7`.
pub struct InMemoryStore {
    id_field: String,
    collections: RwLock<HashMap<String, Collection>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(recordkit_security::filter_keys::RECORD_ID)
    }
}

impl InMemoryStore {
    #[must_use]
    pub fn new(id_field: impl Into<String>) -> Self {
        Self {
            id_field: id_field.into(),
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Number of records of `record_type`.
    #[must_use]
    pub fn count(&self, record_type: &str) -> usize {
        self.collections
            .read()
            .get(record_type)
            .map_or(0, |c| c.records.len())
    }

    fn first_match(collection: &Collection, filter: &FindFilter) -> Option<Uuid> {
        collection
            .records
            .iter()
            .find(|(_, record)| matches_filter(record, filter))
            .map(|(id, _)| *id)
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("id_field", &self.id_field)
            .field("collections", &self.collections.read().len())
            .finish()
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn ensure_schema(
        &self,
        record_type: &str,
        schema: &StorageSchema,
    ) -> anyhow::Result<()> {
        self.collections
            .write()
            .entry(record_type.to_owned())
            .or_default()
            .schema = schema.clone();
        Ok(())
    }

    async fn find_one(
        &self,
        record_type: &str,
        filter: &FindFilter,
    ) -> anyhow::Result<Option<Record>> {
        let collections = self.collections.read();
        let collection = collection(&collections, record_type)?;
        Ok(Self::first_match(collection, filter)
            .and_then(|id| collection.records.get(&id).cloned()))
    }

    async fn find_many(
        &self,
        record_type: &str,
        filter: &FindFilter,
        options: &FindOptions,
    ) -> anyhow::Result<Vec<Record>> {
        if options.sort.is_some() && options.cursor.is_some() {
            bail!("`sort` and `cursor` cannot be combined");
        }
        let cursor = options
            .cursor
            .as_deref()
            .map(Uuid::parse_str)
            .transpose()
            .context("invalid cursor")?;

        let collections = self.collections.read();
        let collection = collection(&collections, record_type)?;
        let mut matched: Vec<(&Uuid, &Record)> = collection
            .records
            .iter()
            .filter(|(id, _)| match (cursor, options.sort_order) {
                (Some(cursor), SortOrder::Ascending) => **id > cursor,
                (Some(cursor), SortOrder::Descending) => **id < cursor,
                (None, _) => true,
            })
            .filter(|(_, record)| matches_filter(record, filter))
            .collect();

        if let Some(path) = &options.sort {
            matched.sort_by(|(left_id, left), (right_id, right)| {
                compare_values(lookup(left, path), lookup(right, path))
                    .then_with(|| left_id.cmp(right_id))
            });
        }
        if options.sort_order == SortOrder::Descending {
            matched.reverse();
        }

        let limit = usize::try_from(options.limit).unwrap_or(usize::MAX);
        Ok(matched
            .into_iter()
            .take(limit)
            .map(|(_, record)| record.clone())
            .collect())
    }

    async fn insert(&self, record_type: &str, mut record: Record) -> anyhow::Result<Record> {
        let id = Uuid::now_v7();
        record.insert(self.id_field.clone(), Value::String(id.to_string()));

        let mut collections = self.collections.write();
        let collection = collection_mut(&mut collections, record_type)?;
        for field in &collection.schema.fields {
            if let Some(default) = &field.default {
                record
                    .entry(field.name.clone())
                    .or_insert_with(|| default.clone());
            }
        }
        if let Some(missing) = collection
            .schema
            .required_fields()
            .find(|name| !record.contains_key(*name))
        {
            bail!("record of type `{record_type}` is missing required field `{missing}`");
        }
        collection.records.insert(id, record.clone());
        Ok(record)
    }

    async fn update_one(
        &self,
        record_type: &str,
        filter: &FindFilter,
        changes: Record,
    ) -> anyhow::Result<Option<Record>> {
        let mut collections = self.collections.write();
        let collection = collection_mut(&mut collections, record_type)?;
        let Some(id) = Self::first_match(collection, filter) else {
            return Ok(None);
        };
        let Some(record) = collection.records.get_mut(&id) else {
            return Ok(None);
        };
        for (field, value) in changes {
            if field != self.id_field {
                record.insert(field, value);
            }
        }
        Ok(Some(record.clone()))
    }

    async fn delete_one(
        &self,
        record_type: &str,
        filter: &FindFilter,
    ) -> anyhow::Result<Option<Record>> {
        let mut collections = self.collections.write();
        let collection = collection_mut(&mut collections, record_type)?;
        Ok(Self::first_match(collection, filter)
            .and_then(|id| collection.records.remove(&id)))
    }
}

fn collection<'a>(
    collections: &'a HashMap<String, Collection>,
    record_type: &str,
) -> anyhow::Result<&'a Collection> {
    collections
        .get(record_type)
        .with_context(|| format!("unknown record type `{record_type}`"))
}

fn collection_mut<'a>(
    collections: &'a mut HashMap<String, Collection>,
    record_type: &str,
) -> anyhow::Result<&'a mut Collection> {
    collections
        .get_mut(record_type)
        .with_context(|| format!("unknown record type `{record_type}`"))
}

/// Value at a dotted path.
fn lookup<'r>(record: &'r Record, path: &str) -> Option<&'r Value> {
    let mut segments = path.split('.');
    let mut current = record.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn matches_filter(record: &Record, filter: &FindFilter) -> bool {
    filter.clauses().iter().all(|expr| matches_expr(record, expr))
}

fn matches_expr(record: &Record, expr: &FilterExpr) -> bool {
    match expr {
        FilterExpr::Compare(cmp) => matches_comparison(record, cmp),
        FilterExpr::And(all) => all.iter().all(|e| matches_expr(record, e)),
        FilterExpr::Or(any) => any.iter().any(|e| matches_expr(record, e)),
    }
}

fn matches_comparison(record: &Record, cmp: &Comparison) -> bool {
    let actual = lookup(record, cmp.path()).unwrap_or(&Value::Null);
    let (op, expected) = (cmp.op(), cmp.value());
    match actual {
        // Array fields match when any element does; `$nin` when none does.
        Value::Array(items) if op == CompareOp::Nin => {
            items.iter().all(|item| compare(item, op, expected))
        }
        Value::Array(items) => {
            compare(actual, op, expected) || items.iter().any(|item| compare(item, op, expected))
        }
        _ => compare(actual, op, expected),
    }
}

fn compare(actual: &Value, op: CompareOp, expected: &Value) -> bool {
    match op {
        CompareOp::Eq => same(actual, expected),
        CompareOp::Gt => ordered(actual, expected) == Some(Ordering::Greater),
        CompareOp::Gte => matches!(
            ordered(actual, expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        CompareOp::Lt => ordered(actual, expected) == Some(Ordering::Less),
        CompareOp::Lte => matches!(
            ordered(actual, expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
        CompareOp::In => expected
            .as_array()
            .is_some_and(|set| set.iter().any(|v| same(actual, v))),
        CompareOp::Nin => expected
            .as_array()
            .is_some_and(|set| !set.iter().any(|v| same(actual, v))),
        CompareOp::Search => match (actual.as_str(), expected.as_str()) {
            (Some(text), Some(needle)) => text.to_lowercase().contains(&needle.to_lowercase()),
            _ => false,
        },
    }
}

/// Equality where `5` and `5.0` are the same number.
fn same(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => ordered(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}

/// Ordering between two values of the same JSON type; `None` otherwise.
fn ordered(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Total order for sorting; missing and incomparable values sort first.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => ordered(a, b).unwrap_or(Ordering::Equal),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
