//! In-memory representation of a SuiteCRM bean.
//!
//! # Design
//! Field values are kept as strings in server order. Lookups that miss return
//! `""` instead of failing: the API omits empty fields freely and callers read
//! optional fields without checking first.

use std::fmt;

use indexmap::IndexMap;
use serde_json::{json, Value};

/// One related record: field name to value.
pub type RelatedRecord = IndexMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    module: String,
    fields: IndexMap<String, String>,
    relationships: IndexMap<String, Vec<RelatedRecord>>,
}

impl Record {
    /// An empty record of the given module, e.g. `"Contacts"`.
    pub fn new(module: &str) -> Self {
        Self {
            module: module.to_string(),
            ..Self::default()
        }
    }

    /// Build a record from a server `name_value_list` and optional
    /// `relationship_list`.
    pub fn from_entry(
        module: &str,
        name_value_list: &Value,
        relationship_list: Option<&Value>,
    ) -> Self {
        let mut record = Self::new(module);
        record.assign_name_value_list(name_value_list);
        if let Some(relationships) = relationship_list {
            record.assign_relationship_list(relationships);
        }
        record
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// Field value, or `""` when the field is not set.
    pub fn get(&self, field: &str) -> &str {
        self.fields.get(field).map(String::as_str).unwrap_or("")
    }

    pub fn id(&self) -> &str {
        self.get("id")
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn set(&mut self, field: &str, value: impl Into<String>) {
        self.fields.insert(field.to_string(), value.into());
    }

    /// Records related through `link`, or an empty slice.
    pub fn related(&self, link: &str) -> &[RelatedRecord] {
        self.relationships.get(link).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn relationships(&self) -> impl Iterator<Item = (&str, &[RelatedRecord])> {
        self.relationships.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Fields in the `[{name, value}]` shape `set_entry` expects.
    pub fn name_value_list(&self) -> Value {
        Value::Array(
            self.fields
                .iter()
                .map(|(name, value)| json!({"name": name, "value": value}))
                .collect(),
        )
    }

    /// Fields as a flat JSON object.
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        )
    }

    /// Overwrite fields with the values found in `name_value_list`. Both the
    /// `{field: {name, value}}` and `[{name, value}]` shapes are accepted.
    pub fn assign_name_value_list(&mut self, name_value_list: &Value) {
        for (name, value) in name_value_pairs(name_value_list) {
            self.fields.insert(name, value);
        }
    }

    /// Accepts a list of links, a single `{link_list}` wrapper, or a list of them.
    fn assign_relationship_list(&mut self, relationship_list: &Value) {
        let items = match relationship_list {
            Value::Array(items) => items.as_slice(),
            Value::Object(_) => std::slice::from_ref(relationship_list),
            _ => return,
        };
        for item in items {
            // v4_1 wraps each entry's links in `link_list`.
            match item.get("link_list").and_then(Value::as_array) {
                Some(links) => links.iter().for_each(|link| self.assign_link(link)),
                None => self.assign_link(item),
            }
        }
    }

    fn assign_link(&mut self, link: &Value) {
        let Some(name) = link.get("name").and_then(Value::as_str) else {
            return;
        };
        let records = link
            .get("records")
            .and_then(Value::as_array)
            .map(|records| records.iter().map(related_record).collect())
            .unwrap_or_default();
        self.relationships.insert(name.to_string(), records);
    }
}

fn related_record(record: &Value) -> RelatedRecord {
    let fields = record.get("link_value").unwrap_or(record);
    name_value_pairs(fields).collect()
}

fn name_value_pairs(list: &Value) -> Box<dyn Iterator<Item = (String, String)> + '_> {
    match list {
        Value::Object(map) => Box::new(map.iter().map(|(key, entry)| pair(key, entry))),
        Value::Array(items) => Box::new(items.iter().filter_map(|entry| {
            let name = entry.get("name")?.as_str()?;
            Some(pair(name, entry))
        })),
        _ => Box::new(std::iter::empty()),
    }
}

/// `entry` is `{name, value}`; `fallback` names it when `name` is absent.
fn pair(fallback: &str, entry: &Value) -> (String, String) {
    let name = entry
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or(fallback)
        .to_string();
    let value = match entry {
        Value::Object(map) => map.get("value").map(scalar_to_string).unwrap_or_default(),
        other => scalar_to_string(other),
    };
    (name, value)
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.module)?;
        for (key, value) in &self.fields {
            writeln!(f, "\t{key}: {value}")?;
        }
        Ok(())
    }
}
