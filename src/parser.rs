use std::fmt;

use regex::{Regex, RegexBuilder};

use crate::iterators::{Group, LogicalOp, Step};
use crate::lexer::{LexError, Token, Tokenizer};
use crate::matches::MatchType;

#[derive(Debug)]
pub enum ParseError {
    /// Input does not carry the `@` sigil of an expression.
    NotAnExpression(String),
    Lex(LexError),
    /// A chunk or operator appeared where an iterator cannot start.
    MissingIterator(String),
    UnclosedGroup,
    UnmatchedParen,
    MisplacedGroup,
    ExpectedInteger(String),
    BadRange(String),
    BadRegex(String),
    DuplicateReference,
    UnknownType(String),
    MissingType,
    TrailingTokens,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::NotAnExpression(source) => {
                write!(f, "not an expression: '{}'", source)
            }
            ParseError::Lex(err) => write!(f, "{}", err),
            ParseError::MissingIterator(chunk) => {
                write!(f, "'{}' is not preceded by an iterator separator", chunk)
            }
            ParseError::UnclosedGroup => write!(f, "expression ends inside an open group"),
            ParseError::UnmatchedParen => write!(f, "')' without a matching '('"),
            ParseError::MisplacedGroup => {
                write!(f, "'(' must follow a separator or a logical operator")
            }
            ParseError::ExpectedInteger(chunk) => {
                write!(f, "'{}' is not a valid integer iterator", chunk)
            }
            ParseError::BadRange(chunk) => write!(f, "malformed range iterator '{}'", chunk),
            ParseError::BadRegex(detail) => write!(f, "malformed regex iterator: {}", detail),
            ParseError::DuplicateReference => {
                write!(f, "'@' reference marker declared more than once")
            }
            ParseError::UnknownType(name) => write!(f, "unknown expression type '{}'", name),
            ParseError::MissingType => write!(f, "'?' is not followed by an expression type"),
            ParseError::TrailingTokens => {
                write!(f, "content after the expression type declaration")
            }
        }
    }
}

impl std::error::Error for ParseError {}

impl From<LexError> for ParseError {
    fn from(err: LexError) -> Self {
        ParseError::Lex(err)
    }
}

/// Fully parsed expression body: the outermost group plus the trailing
/// `?type[.cast]` declaration (defaulting to `node`).
#[derive(Debug)]
pub struct ParsedExpression {
    pub root: Group,
    pub match_type: MatchType,
    pub cast: Option<String>,
}

/// What the previous significant token was; drives implicit empty-name
/// insertion and placement rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prev {
    Start,
    Sep,
    Chunk,
    Logical,
    Open,
    Close,
}

/// Parses an expression body (the part after the leading `@` sigil) into
/// iterator chains grouped by parentheses and logical operators.
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    pub fn new(source: &str) -> Result<Self, ParseError> {
        Ok(Parser {
            tokens: Tokenizer::new(source).tokenize()?,
            position: 0,
        })
    }

    pub fn parse(mut self) -> Result<ParsedExpression, ParseError> {
        let mut stack = vec![Group::new()];
        let mut prev = Prev::Start;
        let mut reference = false;
        let mut match_type = MatchType::Node;
        let mut cast = None;

        while self.position < self.tokens.len() {
            let token = std::mem::replace(&mut self.tokens[self.position], Token::Sep);
            self.position += 1;

            match token {
                Token::Reference => {
                    if reference {
                        return Err(ParseError::DuplicateReference);
                    }
                    reference = true;
                }

                Token::Sep => {
                    // A separator directly followed by another separator,
                    // an operator, ')', '?' or the end matches the empty
                    // name.
                    if prev == Prev::Sep {
                        top(&mut stack).push_step(Step::Named(String::new()));
                    }
                    prev = Prev::Sep;
                }

                Token::Or | Token::And | Token::Xor | Token::Not => {
                    if prev == Prev::Start {
                        return Err(ParseError::MissingIterator(token_name(&token).into()));
                    }
                    if prev == Prev::Sep {
                        top(&mut stack).push_step(Step::Named(String::new()));
                    }
                    let op = match token {
                        Token::And => LogicalOp::And,
                        Token::Xor => LogicalOp::Xor,
                        Token::Not => LogicalOp::Not,
                        _ => LogicalOp::Or,
                    };
                    top(&mut stack).push_logical(op);
                    prev = Prev::Logical;
                }

                Token::OpenGroup => {
                    if !matches!(prev, Prev::Sep | Prev::Logical | Prev::Open) {
                        return Err(ParseError::MisplacedGroup);
                    }
                    stack.push(Group::new());
                    prev = Prev::Open;
                }

                Token::CloseGroup => {
                    if prev == Prev::Sep {
                        top(&mut stack).push_step(Step::Named(String::new()));
                    }
                    if stack.len() == 1 {
                        return Err(ParseError::UnmatchedParen);
                    }
                    let group = stack.pop().unwrap_or_default();
                    top(&mut stack).push_step(Step::Group(Box::new(group)));
                    prev = Prev::Close;
                }

                Token::TypeMark => {
                    if prev == Prev::Sep {
                        top(&mut stack).push_step(Step::Named(String::new()));
                    }
                    if stack.len() > 1 {
                        return Err(ParseError::UnclosedGroup);
                    }
                    let (parsed_type, parsed_cast) = self.parse_type_trailer()?;
                    match_type = parsed_type;
                    cast = parsed_cast;
                    prev = Prev::Chunk;
                    break;
                }

                Token::Chunk(chunk) => {
                    if prev != Prev::Sep {
                        return Err(ParseError::MissingIterator(chunk));
                    }
                    top(&mut stack).push_step(parse_chunk(&chunk)?);
                    prev = Prev::Chunk;
                }
            }
        }

        if prev == Prev::Start {
            return Err(ParseError::MissingIterator(String::new()));
        }
        if prev == Prev::Sep {
            top(&mut stack).push_step(Step::Named(String::new()));
        }
        if stack.len() > 1 {
            return Err(ParseError::UnclosedGroup);
        }

        let mut root = stack.pop().unwrap_or_default();
        root.reference = reference;
        Ok(ParsedExpression {
            root,
            match_type,
            cast,
        })
    }

    /// Consumes the `type[.cast]` chunk after `?` and requires it to end
    /// the expression.
    fn parse_type_trailer(&mut self) -> Result<(MatchType, Option<String>), ParseError> {
        let Some(Token::Chunk(declaration)) = self.tokens.get(self.position) else {
            return Err(ParseError::MissingType);
        };
        let (type_name, cast) = match declaration.split_once('.') {
            Some((type_name, cast)) => (type_name, Some(cast.to_string())),
            None => (declaration.as_str(), None),
        };
        let match_type = MatchType::parse(type_name)
            .ok_or_else(|| ParseError::UnknownType(type_name.to_string()))?;
        self.position += 1;
        if self.position != self.tokens.len() {
            return Err(ParseError::TrailingTokens);
        }
        Ok((match_type, cast))
    }
}

fn top(stack: &mut [Group]) -> &mut Group {
    let last = stack.len() - 1;
    &mut stack[last]
}

fn token_name(token: &Token) -> &'static str {
    match token {
        Token::And => "&",
        Token::Xor => "^",
        Token::Not => "!",
        _ => "|",
    }
}

/// Dispatches one chunk between two separators to its iterator.
fn parse_chunk(chunk: &str) -> Result<Step, ParseError> {
    match chunk {
        "." => return Ok(Step::Parent),
        ".." => return Ok(Step::Root),
        "*" => return Ok(Step::Children),
        "**" => return Ok(Step::Flatten),
        "#" => return Ok(Step::Reference),
        "<" => return Ok(Step::ShiftLeft),
        ">" => return Ok(Step::ShiftRight),
        "$" => return Ok(Step::DistinctName),
        "=$" => return Ok(Step::DistinctValue),
        _ => {}
    }

    if let Some(name) = chunk.strip_prefix("..") {
        return Ok(Step::NamedAncestor(name.to_string()));
    }
    if let Some(rest) = chunk.strip_prefix('=') {
        return parse_value_chunk(rest);
    }
    if chunk.starts_with('[') {
        return parse_range_chunk(chunk);
    }
    if let Some(rest) = chunk.strip_prefix('%') {
        let n: usize = rest
            .parse()
            .map_err(|_| ParseError::ExpectedInteger(chunk.to_string()))?;
        if n == 0 {
            return Err(ParseError::ExpectedInteger(chunk.to_string()));
        }
        return Ok(Step::Modulo(n));
    }
    if chunk.starts_with('+') || chunk.starts_with('-') {
        let negative = chunk.starts_with('-');
        let rest = &chunk[1..];
        let n: i64 = if rest.is_empty() {
            1
        } else {
            rest.parse()
                .map_err(|_| ParseError::ExpectedInteger(chunk.to_string()))?
        };
        return Ok(Step::Sibling(if negative { -n } else { n }));
    }
    if chunk.chars().all(|c| c.is_ascii_digit()) {
        let n: usize = chunk
            .parse()
            .map_err(|_| ParseError::ExpectedInteger(chunk.to_string()))?;
        return Ok(Step::Numbered(n));
    }
    if chunk.starts_with('/') {
        let (regex, distinct) = compile_regex(chunk)?;
        return Ok(Step::NamedRegex { regex, distinct });
    }
    if let Some(pattern) = chunk.strip_prefix(":regex:") {
        let (regex, distinct) = compile_regex(pattern)?;
        return Ok(Step::NamedRegex { regex, distinct });
    }
    if let Some(needle) = chunk.strip_prefix('~') {
        return Ok(Step::NamedLike(needle.to_string()));
    }
    if let Some(name) = chunk.strip_prefix('\\') {
        return Ok(Step::Named(name.to_string()));
    }
    Ok(Step::Named(chunk.to_string()))
}

/// `=...`: literal, 'like', regex or typed value comparison.
fn parse_value_chunk(rest: &str) -> Result<Step, ParseError> {
    if let Some(literal) = rest.strip_prefix('\\') {
        return Ok(Step::Valued {
            raw: literal.to_string(),
            type_name: None,
            like: false,
        });
    }
    if rest.starts_with('/') {
        let (regex, distinct) = compile_regex(rest)?;
        return Ok(Step::ValuedRegex { regex, distinct });
    }

    let (like, rest) = match rest.strip_prefix('~') {
        Some(stripped) => (true, stripped),
        None => (false, rest),
    };

    let (raw, type_name) = split_type_suffix(rest);
    if type_name.as_deref() == Some("regex") {
        let (regex, distinct) = compile_regex(&raw)?;
        return Ok(Step::ValuedRegex { regex, distinct });
    }
    Ok(Step::Valued {
        raw,
        type_name,
        like,
    })
}

/// Splits a trailing `:type` off a value chunk. Only a plain identifier
/// after the LAST colon counts as a type, so values like `12:30` stay
/// intact.
fn split_type_suffix(rest: &str) -> (String, Option<String>) {
    if let Some(colon) = rest.rfind(':') {
        let suffix = &rest[colon + 1..];
        let mut chars = suffix.chars();
        let identifier = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic())
            && chars.all(|c| c.is_ascii_alphanumeric());
        if identifier {
            return (rest[..colon].to_string(), Some(suffix.to_string()));
        }
    }
    (rest.to_string(), None)
}

fn parse_range_chunk(chunk: &str) -> Result<Step, ParseError> {
    let inner = chunk
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| ParseError::BadRange(chunk.to_string()))?;
    let (from_text, to_text) = inner
        .split_once(',')
        .ok_or_else(|| ParseError::BadRange(chunk.to_string()))?;

    let from: usize = from_text
        .trim()
        .parse()
        .map_err(|_| ParseError::BadRange(chunk.to_string()))?;
    let to_text = to_text.trim();
    let to = if to_text.is_empty() {
        None
    } else {
        let to: usize = to_text
            .parse()
            .map_err(|_| ParseError::BadRange(chunk.to_string()))?;
        if to < from {
            return Err(ParseError::BadRange(chunk.to_string()));
        }
        Some(to)
    };
    Ok(Step::Range { from, to })
}

/// Compiles `/body/opts` (or a bare pattern) into a regex. Options: `i`
/// case-insensitive, `m` multi-line, `s` dot-matches-newline, `w` ignore
/// pattern whitespace, `d` de-duplicate matches.
fn compile_regex(pattern: &str) -> Result<(Regex, bool), ParseError> {
    let (body, options) = if let Some(stripped) = pattern.strip_prefix('/') {
        let close = stripped
            .rfind('/')
            .ok_or_else(|| ParseError::BadRegex(pattern.to_string()))?;
        if close == 0 {
            return Err(ParseError::BadRegex(pattern.to_string()));
        }
        (&stripped[..close], &stripped[close + 1..])
    } else {
        (pattern, "")
    };

    let mut builder = RegexBuilder::new(body);
    let mut distinct = false;
    for option in options.chars() {
        match option {
            'i' => {
                builder.case_insensitive(true);
            }
            'm' => {
                builder.multi_line(true);
            }
            's' => {
                builder.dot_matches_new_line(true);
            }
            'w' => {
                builder.ignore_whitespace(true);
            }
            'd' => distinct = true,
            other => {
                return Err(ParseError::BadRegex(format!(
                    "unknown regex option '{}'",
                    other
                )));
            }
        }
    }
    let regex = builder
        .build()
        .map_err(|err| ParseError::BadRegex(err.to_string()))?;
    Ok((regex, distinct))
}
