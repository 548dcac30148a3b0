//! JSON:API envelope.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub(crate) struct Document<T> {
    pub data: T,
    #[serde(default)]
    pub meta: Option<Meta>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Meta {
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct Pagination {
    #[serde(default)]
    pub next_page: Option<u32>,
}

impl<T> Document<T> {
    pub fn next_page(&self) -> Option<u32> {
        self.meta
            .as_ref()
            .and_then(|m| m.pagination.as_ref())
            .and_then(|p| p.next_page)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct Resource<A> {
    pub id: String,
    #[serde(default)]
    pub attributes: A,
    #[serde(default)]
    pub relationships: HashMap<String, Relationship>,
}

impl<A> Resource<A> {
    /// ID of a to-one relationship, if set.
    pub fn related_id(&self, name: &str) -> Option<String> {
        match self.relationships.get(name).and_then(|r| r.data.as_ref()) {
            Some(RelationshipData::One(ident)) => Some(ident.id.clone()),
            _ => None,
        }
    }

    /// IDs of a to-many relationship.
    pub fn related_ids(&self, name: &str) -> Vec<String> {
        match self.relationships.get(name).and_then(|r| r.data.as_ref()) {
            Some(RelationshipData::Many(idents)) => idents.iter().map(|i| i.id.clone()).collect(),
            Some(RelationshipData::One(ident)) => vec![ident.id.clone()],
            None => Vec::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Relationship {
    #[serde(default)]
    pub data: Option<RelationshipData>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum RelationshipData {
    One(Identifier),
    Many(Vec<Identifier>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Identifier {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
}

/// `{"data": {"type": ..., "id": ...}}` relationship body.
pub(crate) fn to_one(kind: &str, id: &str) -> Value {
    serde_json::json!({ "data": { "type": kind, "id": id } })
}

/// `{"data": [{"type": ..., "id": ...}, ...]}` relationship body.
pub(crate) fn to_many<'a>(kind: &str, ids: impl IntoIterator<Item = &'a String>) -> Value {
    let data: Vec<Identifier> = ids
        .into_iter()
        .map(|id| Identifier {
            kind: kind.to_string(),
            id: id.clone(),
        })
        .collect();
    serde_json::json!({ "data": data })
}

/// Extract a human readable message from an error body.
///
/// The service answers with either `{"errors": [{"detail": ...}]}` or
/// `{"errors": ["..."]}`.
pub(crate) fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let errors = value.get("errors")?.as_array()?;
    let messages: Vec<String> = errors
        .iter()
        .filter_map(|e| match e {
            Value::String(s) => Some(s.clone()),
            Value::Object(o) => o
                .get("detail")
                .or_else(|| o.get("title"))
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        })
        .collect();
    (!messages.is_empty()).then(|| messages.join("; "))
}
