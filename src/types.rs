//! Core data types for the normalized cache.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Introspection field carrying the GraphQL type name.
pub const TYPENAME_FIELD: &str = "__typename";

/// Field conventionally carrying an entity's identity.
pub const ID_FIELD: &str = "id";

/// Stable identity for a normalized record.
///
/// `Key` values follow the `"{typename}.{id}"` convention. `NoKey` marks a
/// record that cannot be independently identified; such records are stored
/// inline inside their parent instead of getting their own store entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKey {
    NoKey,
    Key(String),
}

impl CacheKey {
    /// Build a key from a typename and an id.
    pub fn from_parts(typename: &str, id: &str) -> Self {
        CacheKey::Key(format!("{}.{}", typename, id))
    }

    /// The key string, if this is an identified key.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            CacheKey::Key(k) => Some(k),
            CacheKey::NoKey => None,
        }
    }

    /// True for `Key`, false for `NoKey`.
    pub fn is_key(&self) -> bool {
        matches!(self, CacheKey::Key(_))
    }
}

/// A single field value inside a normalized record.
///
/// References to other identified records store only the record key, never a
/// nested copy. Unidentified child objects are inlined as `Object`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "snake_case")]
pub enum RecordValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
    List(Vec<RecordValue>),
    Reference(String),
    Object(Record),
}

impl RecordValue {
    /// Convert a scalar JSON value. Returns `None` for objects and arrays.
    pub fn from_scalar(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(RecordValue::Null),
            Value::Bool(b) => Some(RecordValue::Bool(*b)),
            Value::Number(n) => Some(RecordValue::Number(n.clone())),
            Value::String(s) => Some(RecordValue::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }
}

/// One normalized entity: a mapping from field name to value.
///
/// Field names include canonicalized arguments when the originating query
/// field took any (e.g. `task({"id":"1"})`), so the same field queried with
/// different arguments occupies distinct slots.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, RecordValue>,
}

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a field value.
    pub fn get(&self, field: &str) -> Option<&RecordValue> {
        self.fields.get(field)
    }

    /// Set a field value, replacing any previous one.
    pub fn insert(&mut self, field: impl Into<String>, value: RecordValue) {
        self.fields.insert(field.into(), value);
    }

    /// Merge another record into this one, field by field.
    ///
    /// Last write wins per field; fields absent from `other` are kept. This is
    /// what makes a mutation response update every previously cached query
    /// that referenced the same entity.
    pub fn merge(&mut self, other: Record) {
        for (field, value) in other.fields {
            self.fields.insert(field, value);
        }
    }

    /// Iterate over fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &RecordValue)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(String, RecordValue)> for Record {
    fn from_iter<T: IntoIterator<Item = (String, RecordValue)>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// GraphQL operation kinds understood by the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Query,
    Mutation,
}

impl OperationKind {
    /// Prefix used when deriving root record keys.
    pub fn root_prefix(&self) -> &'static str {
        match self {
            OperationKind::Query => "QUERY",
            OperationKind::Mutation => "MUTATION",
        }
    }
}

/// An argument bound to a selection field: either a literal value or a
/// reference to an operation variable.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Literal(Value),
    Variable(String),
}

impl Argument {
    /// Resolve against the operation's variable bindings.
    /// Unbound variables resolve to JSON null.
    pub fn resolve(&self, variables: &Map<String, Value>) -> Value {
        match self {
            Argument::Literal(v) => v.clone(),
            Argument::Variable(name) => variables.get(name).cloned().unwrap_or(Value::Null),
        }
    }
}

/// One field of a selection shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Response field name.
    pub name: String,

    /// Arguments as authored in the query.
    pub arguments: Vec<(String, Argument)>,

    /// Sub-selection for object-valued fields.
    pub selection: Option<Selection>,
}

impl Field {
    /// Create a leaf field with no arguments.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Vec::new(),
            selection: None,
        }
    }

    /// Add a literal argument.
    pub fn argument(mut self, name: impl Into<String>, value: Value) -> Self {
        self.arguments.push((name.into(), Argument::Literal(value)));
        self
    }

    /// Add an argument bound to an operation variable.
    pub fn argument_var(mut self, name: impl Into<String>, variable: impl Into<String>) -> Self {
        self.arguments
            .push((name.into(), Argument::Variable(variable.into())));
        self
    }

    /// Attach a sub-selection.
    pub fn select(mut self, selection: Selection) -> Self {
        self.selection = Some(selection);
        self
    }

    /// The record slot this field occupies.
    ///
    /// Fields without arguments use their bare name. Fields with arguments
    /// append the resolved arguments in canonical form so that e.g.
    /// `task(id: 1)` and `task(id: 2)` normalize into distinct slots.
    pub fn storage_key(&self, variables: &Map<String, Value>) -> String {
        if self.arguments.is_empty() {
            return self.name.clone();
        }

        // serde_json's default map is key-ordered, so serialization is canonical
        let resolved: Map<String, Value> = self
            .arguments
            .iter()
            .map(|(name, arg)| (name.clone(), arg.resolve(variables)))
            .collect();

        let rendered = serde_json::to_string(&resolved).unwrap_or_default();
        format!("{}({})", self.name, rendered)
    }
}

/// The selection shape of an operation, mirroring the query document.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub fields: Vec<Field>,
}

impl Selection {
    /// Build a selection from fields.
    pub fn of(fields: impl IntoIterator<Item = Field>) -> Self {
        Self {
            fields: fields.into_iter().collect(),
        }
    }

    /// Look up a field by response name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Descriptor for one outbound query or mutation.
///
/// Carries everything the cache needs: the raw document for the transport,
/// the variable bindings, and the selection shape used to normalize the
/// response and reconstruct it later.
#[derive(Debug, Clone)]
pub struct Operation {
    pub kind: OperationKind,
    pub name: String,
    pub document: String,
    pub variables: Map<String, Value>,
    pub selection: Selection,
}

impl Operation {
    /// Create a query operation.
    pub fn query(name: impl Into<String>, document: impl Into<String>, selection: Selection) -> Self {
        Self {
            kind: OperationKind::Query,
            name: name.into(),
            document: document.into(),
            variables: Map::new(),
            selection,
        }
    }

    /// Create a mutation operation.
    pub fn mutation(name: impl Into<String>, document: impl Into<String>, selection: Selection) -> Self {
        Self {
            kind: OperationKind::Mutation,
            name: name.into(),
            document: document.into(),
            variables: Map::new(),
            selection,
        }
    }

    /// Bind a variable.
    pub fn variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    /// Derive the store key for this operation's root record.
    ///
    /// Format: prefix + "." + 10 hex chars of SHA256(document + variables).
    /// The same document with the same variable bindings always maps to the
    /// same root record, across processes and restarts.
    pub fn root_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.document.as_bytes());
        let vars = serde_json::to_string(&self.variables).unwrap_or_default();
        hasher.update(vars.as_bytes());
        let hash = hasher.finalize();
        // 10 hex chars = 40 bits
        format!(
            "{}.{:010x}",
            self.kind.root_prefix(),
            u64::from_be_bytes([hash[0], hash[1], hash[2], hash[3], hash[4], 0, 0, 0]) >> 24
        )
    }
}

/// Errors surfaced by cache operations.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheError {
    /// Denormalization referenced a key absent from the store. Non-fatal:
    /// the caller should treat it as a cache miss and fetch from network.
    MissingRecord(String),
    /// A record expected to carry `id` and `__typename` lacks one.
    AmbiguousIdentity(String),
    /// The underlying request failed; the cache was not modified.
    TransportFailure(String),
    /// The response body was not parseable where structure was expected.
    MalformedResponseBody(String),
    /// Store I/O failed (disk or database error).
    CacheUnavailable(String),
    /// The operation was cancelled before completion.
    Cancelled,
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheError::MissingRecord(key) => write!(f, "record not in cache: {}", key),
            CacheError::AmbiguousIdentity(detail) => {
                write!(f, "record identity is ambiguous: {}", detail)
            }
            CacheError::TransportFailure(detail) => write!(f, "transport failure: {}", detail),
            CacheError::MalformedResponseBody(detail) => {
                write!(f, "malformed response body: {}", detail)
            }
            CacheError::CacheUnavailable(detail) => write!(f, "cache unavailable: {}", detail),
            CacheError::Cancelled => write!(f, "operation cancelled"),
        }
    }
}

impl std::error::Error for CacheError {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cache_key_from_parts() {
        let key = CacheKey::from_parts("Task", "1");
        assert_eq!(key, CacheKey::Key("Task.1".to_string()));
        assert_eq!(key.as_str(), Some("Task.1"));
        assert!(key.is_key());
        assert!(!CacheKey::NoKey.is_key());
    }

    #[test]
    fn test_record_merge_last_write_wins() {
        let mut base: Record = [
            ("title".to_string(), RecordValue::Text("old".to_string())),
            ("version".to_string(), RecordValue::Number(1.into())),
        ]
        .into_iter()
        .collect();

        let update: Record = [
            ("title".to_string(), RecordValue::Text("new".to_string())),
            ("status".to_string(), RecordValue::Bool(true)),
        ]
        .into_iter()
        .collect();

        base.merge(update);

        assert_eq!(base.get("title"), Some(&RecordValue::Text("new".to_string())));
        assert_eq!(base.get("version"), Some(&RecordValue::Number(1.into())));
        assert_eq!(base.get("status"), Some(&RecordValue::Bool(true)));
    }

    #[test]
    fn test_record_serialization_roundtrip() {
        let record: Record = [
            ("id".to_string(), RecordValue::Text("1".to_string())),
            ("owner".to_string(), RecordValue::Reference("User.9".to_string())),
            (
                "tags".to_string(),
                RecordValue::List(vec![
                    RecordValue::Text("a".to_string()),
                    RecordValue::Null,
                ]),
            ),
        ]
        .into_iter()
        .collect();

        let json = serde_json::to_string(&record).unwrap();
        let parsed: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(record, parsed);
    }

    #[test]
    fn test_reference_survives_roundtrip_distinctly() {
        // A reference and an inline object must not collapse into each other
        let reference = RecordValue::Reference("Task.1".to_string());
        let object = RecordValue::Object(
            [("id".to_string(), RecordValue::Text("Task.1".to_string()))]
                .into_iter()
                .collect(),
        );

        let ref_json = serde_json::to_string(&reference).unwrap();
        let obj_json = serde_json::to_string(&object).unwrap();
        assert_ne!(ref_json, obj_json);

        assert_eq!(serde_json::from_str::<RecordValue>(&ref_json).unwrap(), reference);
        assert_eq!(serde_json::from_str::<RecordValue>(&obj_json).unwrap(), object);
    }

    #[test]
    fn test_storage_key_without_arguments() {
        let field = Field::new("allTasks");
        assert_eq!(field.storage_key(&Map::new()), "allTasks");
    }

    #[test]
    fn test_storage_key_with_literal_arguments() {
        let field = Field::new("task").argument("id", json!("1"));
        assert_eq!(field.storage_key(&Map::new()), r#"task({"id":"1"})"#);
    }

    #[test]
    fn test_storage_key_resolves_variables() {
        let field = Field::new("task").argument_var("id", "taskId");
        let mut vars = Map::new();
        vars.insert("taskId".to_string(), json!("42"));
        assert_eq!(field.storage_key(&vars), r#"task({"id":"42"})"#);
    }

    #[test]
    fn test_storage_key_distinct_per_arguments() {
        let a = Field::new("task").argument("id", json!("1"));
        let b = Field::new("task").argument("id", json!("2"));
        assert_ne!(a.storage_key(&Map::new()), b.storage_key(&Map::new()));
    }

    #[test]
    fn test_root_key_stable_and_prefixed() {
        let op = Operation::query(
            "AllTasks",
            "query AllTasks { allTasks { id title } }",
            Selection::of([Field::new("allTasks")]),
        );

        let key = op.root_key();
        assert!(key.starts_with("QUERY."));
        assert_eq!(key.len(), "QUERY.".len() + 10);
        assert_eq!(key, op.root_key());
    }

    #[test]
    fn test_root_key_varies_with_variables() {
        let base = Operation::query(
            "GetTask",
            "query GetTask($id: ID!) { task(id: $id) { id } }",
            Selection::of([Field::new("task")]),
        );

        let a = base.clone().variable("id", json!("1"));
        let b = base.variable("id", json!("2"));
        assert_ne!(a.root_key(), b.root_key());
    }

    #[test]
    fn test_mutation_root_key_prefix() {
        let op = Operation::mutation(
            "CreateTask",
            "mutation CreateTask { createTask { id } }",
            Selection::of([Field::new("createTask")]),
        );
        assert!(op.root_key().starts_with("MUTATION."));
    }
}
