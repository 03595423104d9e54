use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc};

/// Identifier of a content object (CMIS object id / JCR node id).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentId(pub String);

impl ContentId {
    pub fn new(id: impl Into<String>) -> Self {
        ContentId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ContentId {
    fn from(id: &str) -> Self {
        ContentId(id.to_string())
    }
}

impl From<String> for ContentId {
    fn from(id: String) -> Self {
        ContentId(id)
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Typed property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    String(String),
    Integer(i64),
    Decimal(f64),
    Boolean(bool),
    DateTime(DateTime<Utc>),
    Id(String),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Integer(_) => "integer",
            Value::Decimal(_) => "decimal",
            Value::Boolean(_) => "boolean",
            Value::DateTime(_) => "datetime",
            Value::Id(_) => "id",
        }
    }

    /// String content of textual values (strings and ids).
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Id(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    /// Orders two values of compatible types. Integers and decimals compare
    /// numerically, strings and ids lexicographically; other mixes are unordered.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
            (a, b) => {
                if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
                    return x.partial_cmp(&y);
                }
                match (a.as_str(), b.as_str()) {
                    (Some(x), Some(y)) => Some(x.cmp(y)),
                    _ => None,
                }
            }
        }
    }

    /// Total order used for sorting result rows: comparable values by `compare`,
    /// otherwise by type name so mixed columns still sort deterministically.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        self.compare(other)
            .unwrap_or_else(|| self.type_name().cmp(other.type_name()))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) | Value::Id(s) => f.write_str(s),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Decimal(d)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

/// A content object as handed to the index by the content source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: ContentId,
    pub parent_id: Option<ContentId>,
    pub type_name: String,
    pub name: String,
    pub properties: HashMap<String, Value>,
    /// Extracted document text, if any.
    pub text: Option<String>,
}

impl Document {
    pub fn new(id: impl Into<ContentId>, type_name: &str, name: &str) -> Self {
        Document {
            id: id.into(),
            parent_id: None,
            type_name: type_name.to_string(),
            name: name.to_string(),
            properties: HashMap::new(),
            text: None,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<ContentId>) -> Self {
        self.parent_id = Some(parent.into());
        self
    }

    pub fn with_property(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(name.to_string(), value.into());
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn get_property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Property value including the object's built-in CMIS properties.
    pub fn property_value(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.properties.get(name) {
            return Some(value.clone());
        }
        match name {
            "cmis:objectId" => Some(Value::Id(self.id.0.clone())),
            "cmis:name" => Some(Value::String(self.name.clone())),
            "cmis:objectTypeId" => Some(Value::Id(self.type_name.clone())),
            "cmis:parentId" => self.parent_id.as_ref().map(|p| Value::Id(p.0.clone())),
            _ => None,
        }
    }

    /// Explicit properties merged with the built-in ones, sorted by name.
    pub fn all_properties(&self) -> Vec<(String, Value)> {
        let mut all: Vec<(String, Value)> = BUILTIN_PROPERTIES.iter()
            .filter(|name| !self.properties.contains_key(**name))
            .filter_map(|name| self.property_value(name).map(|v| (name.to_string(), v)))
            .collect();
        all.extend(self.properties.iter().map(|(k, v)| (k.clone(), v.clone())));
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Name without its namespace prefix (`ns:local` → `local`).
    pub fn local_name(&self) -> &str {
        local_name(&self.name)
    }
}

const BUILTIN_PROPERTIES: [&str; 4] = ["cmis:objectId", "cmis:name", "cmis:objectTypeId", "cmis:parentId"];

pub fn local_name(name: &str) -> &str {
    name.rsplit_once(':').map(|(_, local)| local).unwrap_or(name)
}
