use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::iterators::Group;
use crate::matches::{Match, MatchEntity, MatchType};
use crate::parser::{ParseError, Parser};
use crate::tree::{NodeId, Tree};
use crate::value::Value;

/// True when `source` carries the leading `@` sigil of an expression.
/// `"@"` alone is not one.
pub fn is_expression(source: &str) -> bool {
    source.starts_with('@') && source.len() >= 2
}

#[derive(Debug)]
pub enum EvalError {
    Parse(ParseError),
    /// A string could not be converted to the requested type.
    Conversion { text: String, type_name: String },
    UnknownType(String),
    TypeError(String),
    /// An operation the matched type does not support.
    Unsupported(String),
    /// Inner expressions of a reference expression declared different
    /// types.
    MixedReferenceTypes,
    /// A reference expression declared a type other than name or value.
    ReferenceType(MatchType),
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::Parse(err) => write!(f, "{}", err),
            EvalError::Conversion { text, type_name } => {
                write!(f, "cannot convert '{}' to type '{}'", text, type_name)
            }
            EvalError::UnknownType(name) => write!(f, "unknown value type '{}'", name),
            EvalError::TypeError(detail) => write!(f, "{}", detail),
            EvalError::Unsupported(detail) => write!(f, "{}", detail),
            EvalError::MixedReferenceTypes => {
                write!(f, "inner expressions of a reference expression must share one type")
            }
            EvalError::ReferenceType(match_type) => write!(
                f,
                "a reference expression must be typed name or value, not '{}'",
                match_type
            ),
        }
    }
}

impl std::error::Error for EvalError {}

impl From<ParseError> for EvalError {
    fn from(err: ParseError) -> Self {
        EvalError::Parse(err)
    }
}

/// Converts a raw string to a typed [`Value`]. Pluggable so embedders can
/// register their own type names on top of the built-in set.
pub type ConvertFn = dyn Fn(&str, &str) -> Result<Value, EvalError>;

/// Ambient services an evaluation needs: currently just string-to-value
/// conversion.
pub struct EvalContext<'a> {
    converter: &'a ConvertFn,
}

impl<'a> EvalContext<'a> {
    pub fn new() -> Self {
        EvalContext {
            converter: &convert_builtin,
        }
    }

    /// Replaces the built-in converter.
    pub fn with_converter(converter: &'a ConvertFn) -> Self {
        EvalContext { converter }
    }

    pub fn convert(&self, text: &str, type_name: &str) -> Result<Value, EvalError> {
        (self.converter)(text, type_name)
    }
}

impl Default for EvalContext<'_> {
    fn default() -> Self {
        EvalContext::new()
    }
}

/// The built-in type names understood by value comparisons and casts.
pub fn convert_builtin(text: &str, type_name: &str) -> Result<Value, EvalError> {
    let conversion_error = || EvalError::Conversion {
        text: text.to_string(),
        type_name: type_name.to_string(),
    };
    match type_name {
        "string" => Ok(Value::String(text.to_string())),
        "int" => text
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| conversion_error()),
        "float" | "double" => text
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| conversion_error()),
        "decimal" => Decimal::from_str(text)
            .map(Value::Decimal)
            .map_err(|_| conversion_error()),
        "bool" => match text {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(conversion_error()),
        },
        "date" => NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .map(Value::Date)
            .map_err(|_| conversion_error()),
        _ => Err(EvalError::UnknownType(type_name.to_string())),
    }
}

/// A compiled expression: parse once, evaluate against any tree and start
/// node.
#[derive(Debug)]
pub struct Expression {
    source: String,
    match_type: MatchType,
    cast: Option<String>,
    root: Group,
}

impl Expression {
    pub fn new(source: &str) -> Result<Expression, ParseError> {
        if !is_expression(source) {
            return Err(ParseError::NotAnExpression(source.to_string()));
        }
        let parsed = Parser::new(&source[1..])?.parse()?;
        Ok(Expression {
            source: source.to_string(),
            match_type: parsed.match_type,
            cast: parsed.cast,
            root: parsed.root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn match_type(&self) -> MatchType {
        self.match_type
    }

    /// Evaluates against `tree`, with iteration starting at `start`.
    pub fn evaluate(
        &self,
        tree: &Tree,
        start: NodeId,
        ctx: &EvalContext,
    ) -> Result<Match, EvalError> {
        let nodes = self.root.evaluate(tree, vec![start], ctx)?;
        if !self.root.reference {
            let entities = nodes
                .into_iter()
                .map(|node| MatchEntity::new(node, self.match_type))
                .collect();
            return Ok(Match::new(entities, self.match_type, self.cast.clone()));
        }
        self.dereference(tree, nodes, ctx)
    }

    /// Second pass of a reference (`@@`) expression: each matched node's
    /// name or value that is itself an expression is evaluated in place,
    /// relative to the node that held it.
    fn dereference(
        &self,
        tree: &Tree,
        nodes: Vec<NodeId>,
        ctx: &EvalContext,
    ) -> Result<Match, EvalError> {
        if !matches!(self.match_type, MatchType::Name | MatchType::Value) {
            return Err(EvalError::ReferenceType(self.match_type));
        }

        let mut entities: Vec<MatchEntity> = Vec::new();
        let mut inner_type: Option<MatchType> = None;
        let mut cast = self.cast.clone();

        for node in nodes {
            let candidate = match self.match_type {
                MatchType::Name => {
                    let name = tree.name(node);
                    is_expression(name).then(|| name.to_string())
                }
                _ => tree.value(node).as_expression().map(str::to_string),
            };
            let Some(text) = candidate else {
                entities.push(MatchEntity::new(node, self.match_type));
                continue;
            };

            let inner = Expression::new(&text)?;
            match inner_type {
                None => inner_type = Some(inner.match_type),
                Some(seen) if seen != inner.match_type => {
                    return Err(EvalError::MixedReferenceTypes);
                }
                Some(_) => {}
            }
            if cast.is_none() {
                cast = inner.cast.clone();
            }
            let result = inner.evaluate(tree, node, ctx)?;
            entities.extend(result.iter().copied());
        }

        // The match reports the outer expression's type; each inner entity
        // still carries its own.
        Ok(Match::new(entities, self.match_type, cast))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expression_sigil() {
        assert!(is_expression("@/a"));
        assert!(!is_expression("@"));
        assert!(!is_expression("/a"));
    }

    #[test]
    fn builtin_conversions() {
        let ctx = EvalContext::new();
        assert_eq!(ctx.convert("5", "int").unwrap(), Value::Int(5));
        assert_eq!(ctx.convert("true", "bool").unwrap(), Value::Bool(true));
        assert!(matches!(
            ctx.convert("abc", "int"),
            Err(EvalError::Conversion { .. })
        ));
        assert!(matches!(
            ctx.convert("5", "nope"),
            Err(EvalError::UnknownType(_))
        ));
    }
}
