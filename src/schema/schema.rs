use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};

/// CMIS base type of an object type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BaseType {
    Document,
    Folder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyType {
    String,
    Integer,
    Decimal,
    Boolean,
    DateTime,
    Id,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyDefinition {
    pub name: String,
    pub property_type: PropertyType,
    pub queryable: bool,
}

/// Object type definition. Properties are inherited from the parent type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDefinition {
    pub id: String,
    pub parent: Option<String>,
    pub base: BaseType,
    pub properties: Vec<PropertyDefinition>,
    /// Whether queries against a supertype also return objects of this type.
    pub include_in_supertype_query: bool,
}

impl TypeDefinition {
    pub fn new(id: &str, base: BaseType) -> Self {
        TypeDefinition {
            id: id.to_string(),
            parent: None,
            base,
            properties: Vec::new(),
            include_in_supertype_query: true,
        }
    }

    pub fn with_parent(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }

    pub fn with_property(mut self, name: &str, property_type: PropertyType) -> Self {
        self.properties.push(PropertyDefinition {
            name: name.to_string(),
            property_type,
            queryable: true,
        });
        self
    }
}

/// Type registry consulted by the planner and the native query builder.
///
/// A non-strict schema accepts unknown types and properties, matching them by name only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    pub types: BTreeMap<String, TypeDefinition>,
    pub strict: bool,
}

pub const CMIS_DOCUMENT: &str = "cmis:document";
pub const CMIS_FOLDER: &str = "cmis:folder";

impl Schema {
    pub fn new() -> Self {
        Schema::default()
    }

    /// Base CMIS types with their common queryable properties.
    pub fn cmis() -> Self {
        let common = |t: TypeDefinition| {
            t.with_property("cmis:objectId", PropertyType::Id)
                .with_property("cmis:name", PropertyType::String)
                .with_property("cmis:objectTypeId", PropertyType::Id)
                .with_property("cmis:createdBy", PropertyType::String)
                .with_property("cmis:creationDate", PropertyType::DateTime)
                .with_property("cmis:lastModifiedBy", PropertyType::String)
                .with_property("cmis:lastModificationDate", PropertyType::DateTime)
        };

        Schema::new()
            .with_type(common(TypeDefinition::new(CMIS_DOCUMENT, BaseType::Document))
                .with_property("cmis:contentStreamLength", PropertyType::Integer)
                .with_property("cmis:contentStreamMimeType", PropertyType::String))
            .with_type(common(TypeDefinition::new(CMIS_FOLDER, BaseType::Folder))
                .with_property("cmis:parentId", PropertyType::Id)
                .with_property("cmis:path", PropertyType::String))
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_type(mut self, definition: TypeDefinition) -> Self {
        self.types.insert(definition.id.clone(), definition);
        self
    }

    pub fn get_type(&self, type_id: &str) -> Option<&TypeDefinition> {
        self.types.get(type_id)
    }

    /// The type itself plus every subtype included in supertype queries.
    pub fn query_types(&self, type_id: &str) -> Vec<String> {
        let mut result = vec![type_id.to_string()];
        let mut pending = vec![type_id.to_string()];

        while let Some(current) = pending.pop() {
            for def in self.types.values() {
                if def.parent.as_deref() == Some(current.as_str())
                    && def.include_in_supertype_query
                    && !result.contains(&def.id)
                {
                    result.push(def.id.clone());
                    pending.push(def.id.clone());
                }
            }
        }

        result
    }

    /// Every property of the type, own properties first, then inherited ones.
    pub fn properties_of(&self, type_id: &str) -> Vec<&PropertyDefinition> {
        let mut out: Vec<&PropertyDefinition> = Vec::new();
        let mut current = self.types.get(type_id);
        let mut hops = 0;

        while let Some(def) = current {
            for prop in &def.properties {
                if !out.iter().any(|p| p.name == prop.name) {
                    out.push(prop);
                }
            }
            hops += 1;
            if hops > self.types.len() {
                break;
            }
            current = def.parent.as_deref().and_then(|p| self.types.get(p));
        }

        out
    }

    /// Looks up a property on the type or any of its ancestors.
    pub fn property(&self, type_id: &str, name: &str) -> Option<&PropertyDefinition> {
        let mut current = self.types.get(type_id);
        let mut hops = 0;

        while let Some(def) = current {
            if let Some(prop) = def.properties.iter().find(|p| p.name == name) {
                return Some(prop);
            }
            hops += 1;
            if hops > self.types.len() {
                break;
            }
            current = def.parent.as_deref().and_then(|p| self.types.get(p));
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_types_include_subtypes() {
        let schema = Schema::cmis()
            .with_type(TypeDefinition::new("invoice", BaseType::Document).with_parent(CMIS_DOCUMENT))
            .with_type(TypeDefinition::new("receipt", BaseType::Document).with_parent("invoice"));

        let types = schema.query_types(CMIS_DOCUMENT);
        assert_eq!(types.len(), 3);
        assert!(types.contains(&"receipt".to_string()));
        assert_eq!(schema.query_types(CMIS_FOLDER), vec![CMIS_FOLDER.to_string()]);
    }

    #[test]
    fn properties_are_inherited() {
        let schema = Schema::cmis()
            .with_type(TypeDefinition::new("invoice", BaseType::Document)
                .with_parent(CMIS_DOCUMENT)
                .with_property("amount", PropertyType::Decimal));

        assert!(schema.property("invoice", "amount").is_some());
        assert!(schema.property("invoice", "cmis:name").is_some());
        assert!(schema.property(CMIS_DOCUMENT, "amount").is_none());
        assert_eq!(schema.properties_of("invoice")[0].name, "amount");
        assert_eq!(schema.properties_of("invoice").len(), 10);
    }
}
