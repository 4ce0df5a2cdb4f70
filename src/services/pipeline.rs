//! Typed aggregation stages and their evaluator.
//!
//! A pipeline is an ordered sequence of [`Stage`] descriptors applied to the
//! documents of one collection. The evaluator is a pure function over plain
//! JSON documents, so query shapes can be built and tested without touching
//! the storage engine; [`super::document_store::DocumentStore`] feeds it the
//! base collection and prefetched lookup sources.

use serde_json::{Map, Value, json};
use std::cmp::Ordering;
use std::collections::HashMap;

/// A single condition on a document field.
#[derive(Debug, Clone, PartialEq)]
pub enum Cond {
    /// Field equals the given JSON value.
    Eq(Value),
    /// Field is present (and not null).
    Exists,
    /// Field is a string containing the needle, case-insensitively.
    ContainsCi(String),
}

/// A conjunction of field conditions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<(String, Cond)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((field.into(), Cond::Eq(value.into())));
        self
    }

    pub fn exists(mut self, field: impl Into<String>) -> Self {
        self.clauses.push((field.into(), Cond::Exists));
        self
    }

    pub fn contains_ci(mut self, field: impl Into<String>, needle: impl Into<String>) -> Self {
        self.clauses
            .push((field.into(), Cond::ContainsCi(needle.into())));
        self
    }

    /// Raw clauses, used by the store to translate into SQL.
    pub fn clauses(&self) -> &[(String, Cond)] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Evaluate against one document.
    pub fn matches(&self, doc: &Value) -> bool {
        self.clauses.iter().all(|(field, cond)| {
            let value = path(doc, field);
            match cond {
                Cond::Eq(expected) => value.is_some_and(|v| v == expected),
                Cond::Exists => value.is_some_and(|v| !v.is_null()),
                Cond::ContainsCi(needle) => value
                    .and_then(Value::as_str)
                    .is_some_and(|s| s.to_lowercase().contains(&needle.to_lowercase())),
            }
        })
    }
}

/// Join description: pull documents from another collection whose
/// `foreign_field` matches this document's `local_field`.
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
    pub from: &'static str,
    pub local_field: String,
    pub foreign_field: String,
    pub as_field: String,
}

/// Sort key and direction.
#[derive(Debug, Clone, PartialEq)]
pub struct SortSpec {
    pub field: String,
    pub descending: bool,
}

/// How one output field of a projection is produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectExpr {
    /// Copy the value at a dot-path.
    Field(String),
    /// Pick a whitelisted subset of keys from a nested document.
    SubDoc { path: String, fields: Vec<String> },
    /// Length of the array at a dot-path (0 when absent).
    ArrayLen(String),
}

/// An explicit output shape. Fields not listed never appear in results,
/// which is how joined user documents shed `password` and `refreshToken`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    fields: Vec<(String, ProjectExpr)>,
}

impl Projection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy `name` through unchanged.
    pub fn field(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.fields.push((name.clone(), ProjectExpr::Field(name)));
        self
    }

    /// Emit `name` from a (possibly nested) source path.
    pub fn path(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.fields
            .push((name.into(), ProjectExpr::Field(source.into())));
        self
    }

    /// Emit `name` as a sub-document restricted to the listed keys.
    pub fn sub_doc(mut self, name: impl Into<String>, fields: &[&str]) -> Self {
        let name = name.into();
        self.fields.push((
            name.clone(),
            ProjectExpr::SubDoc {
                path: name,
                fields: fields.iter().map(|f| f.to_string()).collect(),
            },
        ));
        self
    }

    /// Emit `name` as the length of the array at `of`.
    pub fn array_len(mut self, name: impl Into<String>, of: impl Into<String>) -> Self {
        self.fields
            .push((name.into(), ProjectExpr::ArrayLen(of.into())));
        self
    }

    fn apply(&self, doc: &Value) -> Value {
        let mut out = Map::new();
        for (name, expr) in &self.fields {
            match expr {
                ProjectExpr::Field(source) => {
                    if let Some(value) = path(doc, source) {
                        out.insert(name.clone(), value.clone());
                    }
                }
                ProjectExpr::SubDoc { path: source, fields } => {
                    if let Some(nested) = path(doc, source).and_then(Value::as_object) {
                        let mut picked = Map::new();
                        for key in fields {
                            if let Some(value) = nested.get(key) {
                                picked.insert(key.clone(), value.clone());
                            }
                        }
                        out.insert(name.clone(), Value::Object(picked));
                    }
                }
                ProjectExpr::ArrayLen(source) => {
                    let len = path(doc, source)
                        .and_then(Value::as_array)
                        .map(|a| a.len())
                        .unwrap_or(0);
                    out.insert(name.clone(), json!(len));
                }
            }
        }
        Value::Object(out)
    }
}

/// Group accumulator applied across the whole document set.
#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    /// Sum an integer field into a single `{into: total}` document.
    Sum { field: String, into: String },
}

/// One step of an aggregation pipeline. Order matters: stages are applied
/// strictly in sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Filter),
    Lookup(Lookup),
    /// Replace an array field with its elements, one output document per
    /// element. Documents whose array is missing or empty are dropped,
    /// which silently excludes records with dangling references.
    Unwind(String),
    Project(Projection),
    Sort(SortSpec),
    Skip(usize),
    Limit(usize),
    /// Collapse to a single `{name: n}` document.
    Count(String),
    Group(Accumulator),
}

/// Resolve a dot-path inside a document.
pub fn path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for part in path.split('.') {
        current = current.get(part)?;
    }
    Some(current)
}

/// Run a pipeline over `docs`. `foreign` must contain the documents of every
/// collection referenced by a `Lookup` stage.
pub fn run(docs: Vec<Value>, stages: &[Stage], foreign: &HashMap<String, Vec<Value>>) -> Vec<Value> {
    let mut docs = docs;
    for stage in stages {
        docs = apply(docs, stage, foreign);
    }
    docs
}

fn apply(docs: Vec<Value>, stage: &Stage, foreign: &HashMap<String, Vec<Value>>) -> Vec<Value> {
    match stage {
        Stage::Match(filter) => docs.into_iter().filter(|d| filter.matches(d)).collect(),
        Stage::Lookup(lookup) => {
            let source = foreign.get(lookup.from).map(Vec::as_slice).unwrap_or(&[]);
            docs.into_iter()
                .map(|mut doc| {
                    let joined = join(&doc, lookup, source);
                    if let Some(obj) = doc.as_object_mut() {
                        obj.insert(lookup.as_field.clone(), Value::Array(joined));
                    }
                    doc
                })
                .collect()
        }
        Stage::Unwind(field) => docs
            .into_iter()
            .flat_map(|doc| {
                let elements = match path(&doc, field).and_then(Value::as_array) {
                    Some(arr) => arr.clone(),
                    None => Vec::new(),
                };
                elements.into_iter().map(move |element| {
                    let mut copy = doc.clone();
                    if let Some(obj) = copy.as_object_mut() {
                        obj.insert(field.clone(), element);
                    }
                    copy
                })
            })
            .collect(),
        Stage::Project(projection) => docs.iter().map(|d| projection.apply(d)).collect(),
        Stage::Sort(sort) => {
            let mut docs = docs;
            docs.sort_by(|a, b| value_cmp(path(a, &sort.field), path(b, &sort.field)));
            if sort.descending {
                docs.reverse();
            }
            docs
        }
        Stage::Skip(n) => docs.into_iter().skip(*n).collect(),
        Stage::Limit(n) => docs.into_iter().take(*n).collect(),
        Stage::Count(name) => {
            let mut doc = Map::new();
            doc.insert(name.clone(), json!(docs.len()));
            vec![Value::Object(doc)]
        }
        Stage::Group(Accumulator::Sum { field, into }) => {
            let total: i64 = docs
                .iter()
                .filter_map(|d| path(d, field))
                .filter_map(Value::as_i64)
                .sum();
            let mut doc = Map::new();
            doc.insert(into.clone(), json!(total));
            vec![Value::Object(doc)]
        }
    }
}

fn join(doc: &Value, lookup: &Lookup, source: &[Value]) -> Vec<Value> {
    let local = match path(doc, &lookup.local_field) {
        Some(v) if !v.is_null() => v,
        _ => return Vec::new(),
    };
    source
        .iter()
        .filter(|candidate| match path(candidate, &lookup.foreign_field) {
            Some(fv) => match local.as_array() {
                // Array-valued local fields join element-wise.
                Some(elements) => elements.iter().any(|e| e == fv),
                None => fv == local,
            },
            None => false,
        })
        .cloned()
        .collect()
}

/// Total ordering over JSON values suitable for sort stages.
///
/// Strings that both parse as RFC 3339 timestamps compare as instants, so
/// `createdAt` ordering is not at the mercy of fractional-second precision.
fn value_cmp(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (a, b) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            (Value::Number(x), Value::Number(y)) => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
            (Value::String(x), Value::String(y)) => {
                match (
                    chrono::DateTime::parse_from_rfc3339(x),
                    chrono::DateTime::parse_from_rfc3339(y),
                ) {
                    (Ok(tx), Ok(ty)) => tx.cmp(&ty),
                    _ => x.cmp(y),
                }
            }
            _ => type_rank(a).cmp(&type_rank(b)),
        },
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}
