use std::fmt;

use crate::evaluator::{EvalContext, EvalError};
use crate::tree::{NodeId, Tree};
use crate::value::Value;

/// What an expression extracts from (or assigns on) each matched node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    Name,
    Value,
    Path,
    Node,
    Count,
}

impl MatchType {
    /// Case-sensitive lookup of the `?type` declaration.
    pub fn parse(name: &str) -> Option<MatchType> {
        match name {
            "name" => Some(MatchType::Name),
            "value" => Some(MatchType::Value),
            "path" => Some(MatchType::Path),
            "node" => Some(MatchType::Node),
            "count" => Some(MatchType::Count),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MatchType::Name => "name",
            MatchType::Value => "value",
            MatchType::Path => "path",
            MatchType::Node => "node",
            MatchType::Count => "count",
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One matched node together with the type it is read or written as.
///
/// The type is usually the expression's own, but entities produced
/// through a reference expression carry the INNER expression's type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchEntity {
    pub node: NodeId,
    pub match_type: MatchType,
}

impl MatchEntity {
    pub fn new(node: NodeId, match_type: MatchType) -> Self {
        MatchEntity { node, match_type }
    }

    /// Reads this entity's value out of the tree.
    pub fn get(&self, tree: &Tree, ctx: &EvalContext, cast: Option<&str>) -> Result<Value, EvalError> {
        match self.match_type {
            MatchType::Name => Ok(Value::String(tree.name(self.node).to_string())),
            MatchType::Value => {
                let value = tree.value(self.node);
                match cast {
                    // Casting to string always goes through the string
                    // form, whatever the stored type is.
                    Some("string") => Ok(Value::String(value.to_string())),
                    Some(ty) => {
                        if value.is_null() {
                            Ok(Value::Null)
                        } else {
                            ctx.convert(&value.to_string(), ty)
                        }
                    }
                    None => Ok(value.clone()),
                }
            }
            MatchType::Path => Ok(Value::String(tree.path(self.node))),
            MatchType::Node => Ok(Value::Node(self.node)),
            MatchType::Count => Err(EvalError::Unsupported(
                "'count' has no per-entity value".into(),
            )),
        }
    }

    /// Writes `value` into the tree through this entity.
    pub fn set(&self, tree: &mut Tree, value: Value) -> Result<(), EvalError> {
        match self.match_type {
            MatchType::Name => {
                tree.set_name(self.node, value.to_string());
                Ok(())
            }
            MatchType::Value => {
                tree.set_value(self.node, value);
                Ok(())
            }
            MatchType::Node => match value {
                // Assigning null to a node removes it from the tree.
                Value::Null => {
                    if !tree.detach(self.node) {
                        return Err(EvalError::Unsupported(
                            "cannot remove the root node".into(),
                        ));
                    }
                    Ok(())
                }
                Value::Node(source) => {
                    let copy = tree.clone_subtree(source);
                    tree.replace(self.node, copy);
                    Ok(())
                }
                other => Err(EvalError::TypeError(format!(
                    "cannot assign a {} to a node entity",
                    other.type_name()
                ))),
            },
            MatchType::Path | MatchType::Count => Err(EvalError::Unsupported(format!(
                "cannot assign through a '{}' entity",
                self.match_type
            ))),
        }
    }
}

/// The result of evaluating an expression: matched entities in document
/// discovery order, plus the expression's declared type and cast.
#[derive(Debug)]
pub struct Match {
    entities: Vec<MatchEntity>,
    match_type: MatchType,
    cast: Option<String>,
}

impl Match {
    pub fn new(entities: Vec<MatchEntity>, match_type: MatchType, cast: Option<String>) -> Self {
        Match {
            entities,
            match_type,
            cast,
        }
    }

    pub fn match_type(&self) -> MatchType {
        self.match_type
    }

    pub fn cast(&self) -> Option<&str> {
        self.cast.as_deref()
    }

    /// Number of matched entities. For `?count` expressions this is the
    /// expression's whole result.
    pub fn count(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entities(&self) -> &[MatchEntity] {
        &self.entities
    }

    pub fn iter(&self) -> impl Iterator<Item = &MatchEntity> {
        self.entities.iter()
    }

    /// Reads the entity at `index`.
    pub fn get(&self, index: usize, tree: &Tree, ctx: &EvalContext) -> Result<Value, EvalError> {
        let entity = self
            .entities
            .get(index)
            .ok_or_else(|| EvalError::Unsupported(format!("no match entity at index {}", index)))?;
        entity.get(tree, ctx, self.cast.as_deref())
    }

    /// Writes through the entity at `index`.
    pub fn set(&self, index: usize, tree: &mut Tree, value: Value) -> Result<(), EvalError> {
        let entity = self
            .entities
            .get(index)
            .ok_or_else(|| EvalError::Unsupported(format!("no match entity at index {}", index)))?;
        entity.set(tree, value)
    }
}
