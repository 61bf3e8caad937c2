pub mod evaluator;
pub mod iterators;
pub mod lexer;
pub mod matches;
pub mod parser;
pub mod tree;
pub mod value;

pub use evaluator::{is_expression, EvalContext, EvalError, Expression};
pub use lexer::{LexError, Token, Tokenizer};
pub use matches::{Match, MatchEntity, MatchType};
pub use parser::{ParseError, Parser};
pub use tree::{NodeId, Tree};
pub use value::Value;
