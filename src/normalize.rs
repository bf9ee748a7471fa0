//! Bidirectional transform between nested response trees and flat records.
//!
//! `normalize` flattens a response into identity-keyed records with
//! cross-references instead of duplication; `denormalize` reconstructs a
//! response tree by reading records back out of the store through the same
//! resolver. Both walk the operation's selection shape.

use crate::resolver::KeyResolver;
use crate::storage::RecordStore;
use crate::types::{CacheError, CacheKey, Field, Operation, Record, RecordValue, Selection};
use eyre::Result;
use serde_json::{Map, Value};

/// The flat output of normalizing one response: every record the response
/// contained, plus the key of the root record.
#[derive(Debug)]
pub struct NormalizedBatch {
    pub root_key: String,
    pub records: Vec<(String, Record)>,
}

/// Flatten a response tree into records.
///
/// Walks depth-first; every object node is offered to the resolver. Nodes
/// with an identity become their own `(key, record)` entry and are replaced
/// in the parent by a reference; anonymous nodes are inlined. The response
/// root itself is stored under `operation.root_key()`.
///
/// Fails with `MalformedResponseBody` if `data` is not a JSON object; no
/// partial output is produced.
pub fn normalize(
    data: &Value,
    operation: &Operation,
    resolver: &dyn KeyResolver,
) -> Result<NormalizedBatch> {
    let Value::Object(object) = data else {
        return Err(eyre::eyre!(CacheError::MalformedResponseBody(
            "response data is not an object".to_string()
        )));
    };

    let mut walker = Normalizer {
        variables: &operation.variables,
        resolver,
        records: Vec::new(),
    };

    let root = walker.object(Some(&operation.selection), object);
    let mut records = walker.records;
    let root_key = operation.root_key();
    records.push((root_key.clone(), root));

    Ok(NormalizedBatch { root_key, records })
}

/// Reconstruct a response tree for an operation from the store.
///
/// Returns `Ok(None)` when the cache is incomplete: a referenced record is
/// absent (possibly evicted), or a selected field was never stored. Callers
/// treat that as a cache miss and fall back to the network. An operation that
/// never executed has no root record; it can still be served if the resolver
/// maps every root field to a stored entity from its arguments alone.
pub fn denormalize(
    operation: &Operation,
    store: &RecordStore,
    resolver: &dyn KeyResolver,
) -> Result<Option<Value>> {
    let root_key = operation.root_key();
    let reader = Denormalizer {
        variables: &operation.variables,
        resolver,
        store,
    };

    match store.get(&root_key)? {
        Some(root) => reader.object(Some(&operation.selection), &root),
        None => {
            log::debug!("no cached root for {}", root_key);
            reader.from_arguments_only(&operation.selection)
        }
    }
}

struct Normalizer<'a> {
    variables: &'a Map<String, Value>,
    resolver: &'a dyn KeyResolver,
    records: Vec<(String, Record)>,
}

impl Normalizer<'_> {
    /// Normalize one object node into a record, emitting identified children.
    ///
    /// With a selection, only selected fields are walked and argument-bearing
    /// fields get canonicalized slots. Without one (an object below a leaf
    /// field), every response field is walked under its plain name.
    fn object(&mut self, selection: Option<&Selection>, object: &Map<String, Value>) -> Record {
        let mut record = Record::new();

        match selection {
            Some(selection) => {
                for field in &selection.fields {
                    let Some(value) = object.get(&field.name) else {
                        continue;
                    };
                    let slot = field.storage_key(self.variables);
                    record.insert(slot, self.value(field, value));
                }
            }
            None => {
                for (name, value) in object {
                    let field = Field::new(name.clone());
                    record.insert(name.clone(), self.value(&field, value));
                }
            }
        }

        record
    }

    fn value(&mut self, field: &Field, value: &Value) -> RecordValue {
        if let Some(scalar) = RecordValue::from_scalar(value) {
            return scalar;
        }

        match value {
            Value::Array(items) => {
                RecordValue::List(items.iter().map(|item| self.value(field, item)).collect())
            }
            Value::Object(object) => {
                let child = self.object(field.selection.as_ref(), object);
                match self.resolver.from_record_set(field, object) {
                    CacheKey::Key(key) => {
                        self.records.push((key.clone(), child));
                        RecordValue::Reference(key)
                    }
                    CacheKey::NoKey => RecordValue::Object(child),
                }
            }
            // from_scalar covered the rest
            _ => RecordValue::Null,
        }
    }
}

struct Denormalizer<'a> {
    variables: &'a Map<String, Value>,
    resolver: &'a dyn KeyResolver,
    store: &'a RecordStore,
}

impl Denormalizer<'_> {
    /// Serve a selection purely through argument-based resolution.
    ///
    /// Used when the operation has never executed, so no root record exists.
    /// Every root field must resolve to a stored entity or the whole read is
    /// a miss. With the default resolver this resolves nothing, which keeps
    /// parameterized queries network-bound until first execution.
    fn from_arguments_only(&self, selection: &Selection) -> Result<Option<Value>> {
        let mut object = Map::new();

        for field in &selection.fields {
            let CacheKey::Key(key) = self.resolver.from_field_arguments(field, self.variables)
            else {
                return Ok(None);
            };
            let Some(entity) = self.store.get(&key)? else {
                return Ok(None);
            };
            match self.object(field.selection.as_ref(), &entity)? {
                Some(value) => object.insert(field.name.clone(), value),
                None => return Ok(None),
            };
        }

        Ok(Some(Value::Object(object)))
    }

    fn object(&self, selection: Option<&Selection>, record: &Record) -> Result<Option<Value>> {
        let mut object = Map::new();

        match selection {
            Some(selection) => {
                for field in &selection.fields {
                    // Argument-based resolution lets a custom resolver serve a
                    // field straight from an entity record, even for a query
                    // that has never executed.
                    if let CacheKey::Key(key) = self.resolver.from_field_arguments(field, self.variables)
                        && let Some(entity) = self.store.get(&key)?
                    {
                        match self.object(field.selection.as_ref(), &entity)? {
                            Some(value) => {
                                object.insert(field.name.clone(), value);
                                continue;
                            }
                            None => return Ok(None),
                        }
                    }

                    let slot = field.storage_key(self.variables);
                    let Some(stored) = record.get(&slot) else {
                        log::debug!("field '{}' not in cached record", slot);
                        return Ok(None);
                    };
                    match self.value(stored, field.selection.as_ref())? {
                        Some(value) => object.insert(field.name.clone(), value),
                        None => return Ok(None),
                    };
                }
            }
            None => {
                for (slot, stored) in record.iter() {
                    match self.value(stored, None)? {
                        Some(value) => object.insert(slot.clone(), value),
                        None => return Ok(None),
                    };
                }
            }
        }

        Ok(Some(Value::Object(object)))
    }

    fn value(&self, stored: &RecordValue, selection: Option<&Selection>) -> Result<Option<Value>> {
        match stored {
            RecordValue::Null => Ok(Some(Value::Null)),
            RecordValue::Bool(b) => Ok(Some(Value::Bool(*b))),
            RecordValue::Number(n) => Ok(Some(Value::Number(n.clone()))),
            RecordValue::Text(s) => Ok(Some(Value::String(s.clone()))),
            RecordValue::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    match self.value(item, selection)? {
                        Some(value) => values.push(value),
                        None => return Ok(None),
                    }
                }
                Ok(Some(Value::Array(values)))
            }
            RecordValue::Reference(key) => {
                let Some(record) = self.store.get(key)? else {
                    log::debug!("referenced record missing: {}", key);
                    return Ok(None);
                };
                self.object(selection, &record)
            }
            RecordValue::Object(record) => self.object(selection, record),
        }
    }
}
