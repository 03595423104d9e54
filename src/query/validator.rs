use std::collections::HashMap;
use crate::core::error::{Error, Result};
use crate::query::ast::{
    Column, Constraint, DynamicOperand, JoinCondition, Query, SelectorName, Source,
};
use crate::query::types::ValidationConfig;
use crate::schema::schema::Schema;

/// Compile-time checks run by the planner before any plan is built.
pub struct QueryValidator {
    config: ValidationConfig,
}

impl QueryValidator {
    pub fn new(config: ValidationConfig) -> Self {
        QueryValidator { config }
    }

    pub fn validate(&self, schema: &Schema, query: &Query) -> Result<()> {
        let types = self.validate_source(schema, &query.source)?;

        if let Some(constraint) = &query.constraint {
            let depth = constraint.depth();
            if depth > self.config.max_constraint_depth {
                return Err(Error::query_compile(format!(
                    "constraint depth {} exceeds maximum {}",
                    depth, self.config.max_constraint_depth
                )));
            }
            self.validate_constraint(schema, &types, constraint)?;
        }

        for column in &query.columns {
            self.validate_column(schema, &types, column)?;
        }

        for ordering in &query.orderings {
            self.validate_operand(schema, &types, &ordering.operand)?;
        }

        Ok(())
    }

    /// Checks selector uniqueness and join conditions; returns selector → type.
    fn validate_source(&self, schema: &Schema, source: &Source) -> Result<HashMap<SelectorName, String>> {
        let selectors = source.selectors();
        if selectors.len() > self.config.max_selectors {
            return Err(Error::query_compile(format!(
                "query uses {} selectors, max is {}",
                selectors.len(), self.config.max_selectors
            )));
        }

        let mut types = HashMap::new();
        for selector in selectors {
            if types.insert(selector.name.clone(), selector.type_name.clone()).is_some() {
                return Err(Error::query_compile(format!(
                    "selector '{}' is declared more than once", selector.name
                )));
            }
            if schema.strict && schema.get_type(&selector.type_name).is_none() {
                return Err(Error::query_compile(format!(
                    "unknown type '{}' for selector '{}'", selector.type_name, selector.name
                )));
            }
        }

        let mut pending = vec![source];
        while let Some(current) = pending.pop() {
            if let Source::Join(join) = current {
                let left = join.left.selector_names();
                let right = join.right.selector_names();
                let names: Vec<SelectorName> = join.condition.selector_names().into_iter().collect();

                let opposite = match names.as_slice() {
                    [a, b] => (left.contains(a) && right.contains(b)) || (left.contains(b) && right.contains(a)),
                    _ => false,
                };
                if !opposite {
                    return Err(Error::query_compile(format!(
                        "join condition {:?} must reference one selector from each side of its join",
                        join.condition
                    )));
                }

                if let JoinCondition::EquiJoin { selector1, property1, selector2, property2 } = &join.condition {
                    self.validate_property(schema, &types, selector1, property1)?;
                    self.validate_property(schema, &types, selector2, property2)?;
                }

                pending.push(&join.left);
                pending.push(&join.right);
            }
        }

        Ok(types)
    }

    fn validate_constraint(
        &self,
        schema: &Schema,
        types: &HashMap<SelectorName, String>,
        constraint: &Constraint,
    ) -> Result<()> {
        match constraint {
            Constraint::And(a, b) | Constraint::Or(a, b) => {
                self.validate_constraint(schema, types, a)?;
                self.validate_constraint(schema, types, b)
            }
            Constraint::Not(inner) => self.validate_constraint(schema, types, inner),
            Constraint::Comparison(cmp) => self.validate_operand(schema, types, &cmp.operand1),
            Constraint::PropertyExistence { selector, property } => {
                self.validate_property(schema, types, selector, property)
            }
            Constraint::FullTextSearch { selector, property, .. } => match property {
                Some(property) => self.validate_property(schema, types, selector, property),
                None => self.validate_selector(types, selector),
            },
            Constraint::ChildNode { selector, path } | Constraint::DescendantNode { selector, path } => {
                if !path.starts_with('/') {
                    return Err(Error::query_compile(format!("path '{}' must be absolute", path)));
                }
                self.validate_selector(types, selector)
            }
            Constraint::InFolder { selector, .. } | Constraint::InTree { selector, .. } => {
                self.validate_selector(types, selector)
            }
        }
    }

    fn validate_operand(
        &self,
        schema: &Schema,
        types: &HashMap<SelectorName, String>,
        operand: &DynamicOperand,
    ) -> Result<()> {
        match operand {
            DynamicOperand::PropertyValue { selector, property } => {
                self.validate_property(schema, types, selector, property)
            }
            DynamicOperand::NodeDepth { selector }
            | DynamicOperand::NodeName { selector }
            | DynamicOperand::NodeLocalName { selector } => self.validate_selector(types, selector),
            DynamicOperand::UpperCase(inner)
            | DynamicOperand::LowerCase(inner)
            | DynamicOperand::Length(inner) => self.validate_operand(schema, types, inner),
        }
    }

    fn validate_column(&self, schema: &Schema, types: &HashMap<SelectorName, String>, column: &Column) -> Result<()> {
        if column.property == "*" {
            return self.validate_selector(types, &column.selector);
        }
        self.validate_property(schema, types, &column.selector, &column.property)
    }

    fn validate_selector(&self, types: &HashMap<SelectorName, String>, selector: &SelectorName) -> Result<()> {
        if types.contains_key(selector) {
            Ok(())
        } else {
            Err(Error::query_compile(format!("unknown selector '{}'", selector)))
        }
    }

    fn validate_property(
        &self,
        schema: &Schema,
        types: &HashMap<SelectorName, String>,
        selector: &SelectorName,
        property: &str,
    ) -> Result<()> {
        self.validate_selector(types, selector)?;
        if !schema.strict {
            return Ok(());
        }

        let type_name = types.get(selector).map(String::as_str).unwrap_or_default();
        match schema.property(type_name, property) {
            Some(def) if def.queryable => Ok(()),
            Some(_) => Err(Error::query_compile(format!(
                "property '{}' of type '{}' is not queryable", property, type_name
            ))),
            None => Err(Error::query_compile(format!(
                "type '{}' has no property '{}'", type_name, property
            ))),
        }
    }
}
