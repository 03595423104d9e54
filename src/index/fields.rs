//! Reserved index fields and the term encoding shared by the indexer and the query builder.

use std::collections::BTreeMap;
use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;
use crate::core::error::Result;
use crate::core::types::{Document, Value};

pub const ID_FIELD: &str = "_id";
pub const PARENT_FIELD: &str = "_parent";
pub const TYPE_FIELD: &str = "_type";
pub const NAME_FIELD: &str = "_name";
pub const LOCAL_NAME_FIELD: &str = "_localname";
pub const FULLTEXT_FIELD: &str = "_fulltext";
/// One term per property name the document carries.
pub const PROPS_FIELD: &str = "_props";

/// Parent term of documents without a parent.
pub const ROOT_PARENT: &str = "\u{0}root";

pub const STRING_PREFIX: &str = "s:";
pub const NUMBER_PREFIX: &str = "n:";
pub const BOOLEAN_PREFIX: &str = "b:";
pub const DATE_PREFIX: &str = "d:";

pub fn property_field(name: &str) -> String {
    format!("p:{}", name)
}

pub fn fulltext_field(property: Option<&str>) -> String {
    match property {
        Some(p) => format!("{}:{}", FULLTEXT_FIELD, p),
        None => FULLTEXT_FIELD.to_string(),
    }
}

/// Prefix shared by all encodings of values of this kind.
pub fn value_prefix(value: &Value) -> &'static str {
    match value {
        Value::String(_) | Value::Id(_) => STRING_PREFIX,
        Value::Integer(_) | Value::Decimal(_) => NUMBER_PREFIX,
        Value::Boolean(_) => BOOLEAN_PREFIX,
        Value::DateTime(_) => DATE_PREFIX,
    }
}

/// Encodes a value as a term whose byte order matches the value order within a kind.
pub fn encode_value(value: &Value) -> String {
    match value {
        Value::String(s) | Value::Id(s) => format!("{}{}", STRING_PREFIX, s),
        Value::Integer(i) => {
            let nearest = *i as f64;
            // Integers past 2^53 share a nearest f64; the exact offset keeps them apart.
            let offset = (*i as i128 - nearest as i128) as i16;
            format!("{}{}{}", NUMBER_PREFIX, sortable_f64(nearest), sortable_offset(offset))
        }
        Value::Decimal(d) => format!("{}{}{}", NUMBER_PREFIX, sortable_f64(*d), sortable_offset(0)),
        Value::Boolean(b) => format!("{}{}", BOOLEAN_PREFIX, b),
        Value::DateTime(dt) => {
            let millis = dt.timestamp_millis() as u64 ^ (1u64 << 63);
            format!("{}{:016x}", DATE_PREFIX, millis)
        }
    }
}

fn sortable_f64(value: f64) -> String {
    let value = if value == 0.0 { 0.0 } else { value };
    let bits = value.to_bits();
    let key = if bits >> 63 == 1 { !bits } else { bits | (1u64 << 63) };
    format!("{:016x}", key)
}

fn sortable_offset(offset: i16) -> String {
    format!("{:04x}", offset as u16 ^ 0x8000)
}

/// Lower-cased Unicode words, the only text analysis the index performs.
pub fn tokenize(text: &str) -> Vec<String> {
    text.unicode_words().map(|w| w.to_lowercase()).collect()
}

/// Translates a CMIS `LIKE` pattern into an anchored regex.
pub fn like_to_regex(pattern: &str) -> Result<Regex> {
    let mut out = String::from("^(?s)");
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            '\\' => {
                if let Some(escaped) = chars.next() {
                    out.push_str(&regex::escape(&escaped.to_string()));
                }
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    Ok(Regex::new(&out)?)
}

/// Field → term → token positions for one document. Keyword fields carry no positions.
pub fn document_terms(doc: &Document) -> BTreeMap<String, BTreeMap<String, Vec<u32>>> {
    let mut fields: BTreeMap<String, BTreeMap<String, Vec<u32>>> = BTreeMap::new();
    let mut keyword = |field: &str, term: String| {
        fields.entry(field.to_string()).or_default().entry(term).or_default();
    };

    keyword(ID_FIELD, doc.id.as_str().to_string());
    keyword(PARENT_FIELD, doc.parent_id.as_ref()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| ROOT_PARENT.to_string()));
    keyword(TYPE_FIELD, doc.type_name.clone());
    keyword(NAME_FIELD, encode_value(&Value::String(doc.name.clone())));
    keyword(LOCAL_NAME_FIELD, encode_value(&Value::String(doc.local_name().to_string())));

    let properties = doc.all_properties();
    for (name, value) in &properties {
        keyword(PROPS_FIELD, name.clone());
        keyword(&property_field(name), encode_value(value));
    }

    let mut position = 0u32;
    let add_text = |fields: &mut BTreeMap<String, BTreeMap<String, Vec<u32>>>, field: &str, text: &str, position: &mut u32| {
        for token in tokenize(text) {
            fields.entry(field.to_string()).or_default().entry(token).or_default().push(*position);
            *position += 1;
        }
    };

    if let Some(text) = &doc.text {
        add_text(&mut fields, FULLTEXT_FIELD, text, &mut position);
    }

    for (name, value) in &properties {
        if let Value::String(text) = value {
            // Gap so phrases never span two property values.
            position += 1;
            add_text(&mut fields, FULLTEXT_FIELD, text, &mut position);
            let mut own = 0u32;
            add_text(&mut fields, &fulltext_field(Some(name)), text, &mut own);
        }
    }

    fields
}
