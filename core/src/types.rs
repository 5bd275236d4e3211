//! Query inputs and typed results for the record operations.
//!
//! # Design
//! Inputs are small builders that render to the exact JSON the server wants
//! for each positional argument. Outputs are decoded leniently: the server
//! mixes numbers and numeric strings, and omits keys it considers empty.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{lenient_i64, ApiError};
use crate::record::Record;

/// Fields to fetch from one link, the `link_name_to_fields_array` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkFields {
    pub name: String,
    pub fields: Vec<String>,
}

impl LinkFields {
    pub fn new<I, S>(name: &str, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.to_string(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub(crate) fn to_value(links: &[LinkFields]) -> Value {
        Value::Array(
            links
                .iter()
                .map(|link| json!({"name": link.name, "value": link.fields}))
                .collect(),
        )
    }
}

/// Options for fetching a single record.
#[derive(Debug, Clone, Default)]
pub struct RecordQuery {
    pub fields: Vec<String>,
    pub links: Vec<LinkFields>,
    pub track_view: bool,
}

impl RecordQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn link(mut self, link: LinkFields) -> Self {
        self.links.push(link);
        self
    }

    pub fn track_view(mut self, track: bool) -> Self {
        self.track_view = track;
        self
    }
}

/// Options for listing records of a module.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    /// SQL `WHERE` fragment, e.g. `contacts.last_name = 'Smith'`.
    pub query: String,
    pub order_by: String,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
    pub fields: Vec<String>,
    pub links: Vec<LinkFields>,
    pub deleted: bool,
    pub favorites: bool,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, query: &str) -> Self {
        self.query = query.to_string();
        self
    }

    pub fn order_by(mut self, order_by: &str) -> Self {
        self.order_by = order_by.to_string();
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn link(mut self, link: LinkFields) -> Self {
        self.links.push(link);
        self
    }

    pub fn deleted(mut self, deleted: bool) -> Self {
        self.deleted = deleted;
        self
    }

    pub fn favorites(mut self, favorites: bool) -> Self {
        self.favorites = favorites;
        self
    }
}

/// Options for fetching the records behind a link.
#[derive(Debug, Clone, Default)]
pub struct RelatedQuery {
    pub related_module_query: String,
    pub related_fields: Vec<String>,
    pub related_links: Vec<LinkFields>,
    pub deleted: bool,
    pub order_by: String,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

impl RelatedQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, query: &str) -> Self {
        self.related_module_query = query.to_string();
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.related_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn order_by(mut self, order_by: &str) -> Self {
        self.order_by = order_by.to_string();
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Unset numeric arguments go out as `""`, which the server reads as "default".
pub(crate) fn optional_number(value: Option<u64>) -> Value {
    value.map(Value::from).unwrap_or_else(|| Value::String(String::new()))
}

pub(crate) fn flag(value: bool) -> Value {
    Value::from(u8::from(value))
}

/// One page of a record listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordPage {
    pub entries: Vec<Record>,
    pub result_count: u64,
    pub total_count: u64,
    pub previous_offset: Option<u64>,
    pub current_offset: Option<u64>,
    pub next_offset: Option<u64>,
    pub current_limit: Option<u64>,
}

impl RecordPage {
    pub(crate) fn from_response(
        module: &str,
        response: &Value,
        offset: Option<u64>,
        limit: Option<u64>,
    ) -> Self {
        let entries = decode_entries(module, response);
        let result_count = count(response, "result_count").unwrap_or(entries.len() as u64);
        let total_count = count(response, "total_count").unwrap_or(result_count);
        let server_next = count(response, "next_offset");
        Self {
            entries,
            result_count,
            total_count,
            previous_offset: previous_offset(offset, limit),
            current_offset: offset,
            next_offset: next_offset(server_next, Some(total_count)),
            current_limit: limit,
        }
    }
}

/// `offset - limit`, when both are known and the result is not negative.
pub fn previous_offset(offset: Option<u64>, limit: Option<u64>) -> Option<u64> {
    offset?.checked_sub(limit?)
}

/// The server's next offset, only while it still points inside the result set.
pub fn next_offset(server_next: Option<u64>, total_count: Option<u64>) -> Option<u64> {
    let (next, total) = (server_next?, total_count?);
    (next < total).then_some(next)
}

fn count(response: &Value, key: &str) -> Option<u64> {
    response
        .get(key)
        .and_then(lenient_i64)
        .and_then(|n| u64::try_from(n).ok())
}

/// Turn `entry_list` (+ the parallel `relationship_list`) into records.
/// Each entry's own `module_name` wins over `module`.
pub(crate) fn decode_entries(module: &str, response: &Value) -> Vec<Record> {
    let Some(entries) = response.get("entry_list").and_then(Value::as_array) else {
        return Vec::new();
    };
    let relationships = response.get("relationship_list").and_then(Value::as_array);

    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let entry_module = entry
                .get("module_name")
                .and_then(Value::as_str)
                .unwrap_or(module);
            let name_value_list = entry.get("name_value_list").unwrap_or(&Value::Null);
            let relationship_list = relationships.and_then(|list| list.get(i));
            Record::from_entry(entry_module, name_value_list, relationship_list)
        })
        .collect()
}

/// Result of `set_relationship`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelationshipOutcome {
    pub created: u64,
    pub failed: u64,
    pub deleted: u64,
}

impl RelationshipOutcome {
    pub(crate) fn from_response(response: &Value) -> Self {
        Self {
            created: count(response, "created").unwrap_or(0),
            failed: count(response, "failed").unwrap_or(0),
            deleted: count(response, "deleted").unwrap_or(0),
        }
    }
}

/// A file attached to a note; `file` is base64.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NoteAttachment {
    pub id: String,
    pub filename: String,
    pub file: String,
    pub related_module_id: String,
    pub related_module_name: String,
}

impl NoteAttachment {
    /// Decoded file bytes.
    pub fn contents(&self) -> Result<Vec<u8>, ApiError> {
        STANDARD
            .decode(self.file.as_bytes())
            .map_err(|e| ApiError::DeserializationError(e.to_string()))
    }
}

pub(crate) fn encode_file(contents: &[u8]) -> String {
    STANDARD.encode(contents)
}
