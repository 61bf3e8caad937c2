/// A syntactic token of the expression language.
///
/// Structural characters (`/ | & ^ ! ( ) ?`) each form their own token;
/// everything between them accumulates into a [`Token::Chunk`]: names,
/// `*`, `**`, `.`, `..`, sibling offsets, numbers, ranges, value
/// comparisons, regex bodies. The parser gives chunks their meaning.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Path separator `/`.
    Sep,
    /// `|`
    Or,
    /// `&`
    And,
    /// `^`
    Xor,
    /// `!`
    Not,
    /// `(`
    OpenGroup,
    /// `)`
    CloseGroup,
    /// `?`, introducing the trailing result-type declaration.
    TypeMark,
    /// A second `@` at the very start: reference-expression marker.
    Reference,
    /// Any run of non-structural characters.
    Chunk(String),
}

/// Errors raised while tokenizing, before the parser or the tree are
/// touched.
#[derive(Debug, Clone, PartialEq)]
pub enum LexError {
    /// A `/regex/` body opened but never closed.
    UnterminatedRegex(String),
}

impl std::fmt::Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LexError::UnterminatedRegex(tok) => {
                write!(f, "regex token '{}' is missing its closing '/'", tok)
            }
        }
    }
}

impl std::error::Error for LexError {}

const STRUCTURAL: &str = "/|&^!()?";

/// Streaming tokenizer for expression strings (sigil already stripped).
///
/// Whitespace around tokens is trimmed, so expressions may span multiple
/// lines. The tokenizer tracks whether the previous token was the path
/// separator: only in that position can a `/` open a regex body instead of
/// separating iterators.
pub struct Tokenizer {
    input: Vec<char>,
    position: usize,
    prev_was_sep: bool,
    leading: bool,
}

impl Tokenizer {
    pub fn new(expression: &str) -> Self {
        Tokenizer {
            input: expression.chars().collect(),
            position: 0,
            prev_was_sep: false,
            leading: true,
        }
    }

    fn current_char(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Returns the next token, or `None` at end of input.
    pub fn next_token(&mut self) -> Result<Option<Token>, LexError> {
        self.skip_whitespace();

        let Some(ch) = self.current_char() else {
            return Ok(None);
        };

        let was_sep = self.prev_was_sep;
        self.prev_was_sep = false;

        let token = match ch {
            '/' => {
                if was_sep && self.regex_follows() {
                    self.leading = false;
                    return Ok(Some(self.read_regex_chunk()?));
                }
                self.advance();
                self.prev_was_sep = true;
                Token::Sep
            }
            '|' => {
                self.advance();
                Token::Or
            }
            '&' => {
                self.advance();
                Token::And
            }
            '^' => {
                self.advance();
                Token::Xor
            }
            '!' => {
                self.advance();
                Token::Not
            }
            '(' => {
                self.advance();
                Token::OpenGroup
            }
            ')' => {
                self.advance();
                Token::CloseGroup
            }
            '?' => {
                self.advance();
                Token::TypeMark
            }
            '@' if self.leading => {
                self.advance();
                return Ok(Some(Token::Reference)); // keep `leading` set
            }
            _ => {
                self.leading = false;
                return Ok(Some(self.read_chunk()?));
            }
        };

        self.leading = false;
        Ok(Some(token))
    }

    /// Collects all remaining tokens. Convenience for tests.
    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    /// Lookahead for a `/.../` regex body starting at the current `/`.
    ///
    /// The body must be non-empty and close before any other structural
    /// character, so that `//` stays a pair of separators (empty-name
    /// iterators) and `/?type`, `/|`, `/(` keep their meaning. Patterns
    /// needing structural characters go through the `:regex:` chunk form.
    fn regex_follows(&self) -> bool {
        let mut index = self.position + 1;
        let mut body_len = 0;
        while let Some(&ch) = self.input.get(index) {
            match ch {
                '\\' => {
                    index += 2;
                    body_len += 1;
                }
                '/' => return body_len > 0,
                '?' | '(' | ')' | '|' | '&' | '^' | '!' => return false,
                _ => {
                    index += 1;
                    body_len += 1;
                }
            }
        }
        false
    }

    /// Reads `/body/` into `out`, honoring `\/` escapes.
    fn read_regex_body(&mut self, out: &mut String) -> Result<(), LexError> {
        out.push('/');
        self.advance();
        loop {
            match self.current_char() {
                None => return Err(LexError::UnterminatedRegex(out.clone())),
                Some('\\') => {
                    out.push('\\');
                    self.advance();
                    if let Some(escaped) = self.current_char() {
                        out.push(escaped);
                        self.advance();
                    }
                }
                Some('/') => {
                    out.push('/');
                    self.advance();
                    return Ok(());
                }
                Some(ch) => {
                    out.push(ch);
                    self.advance();
                }
            }
        }
    }

    /// A regex chunk in name position: `/body/` plus trailing option
    /// letters, as one token.
    fn read_regex_chunk(&mut self) -> Result<Token, LexError> {
        let mut out = String::new();
        self.read_regex_body(&mut out)?;
        while let Some(ch) = self.current_char() {
            if STRUCTURAL.contains(ch) {
                break;
            }
            out.push(ch);
            self.advance();
        }
        Ok(Token::Chunk(out.trim_end().to_string()))
    }

    fn read_chunk(&mut self) -> Result<Token, LexError> {
        if self.rest_starts_with(":regex:") {
            return self.read_typed_regex_chunk();
        }

        let mut out = String::new();

        // `=` value chunks may embed a /regex/ whose body uses structural
        // characters, or close with a `:regex` type marker; either way the
        // pattern is consumed wholesale.
        if self.current_char() == Some('=') {
            out.push('=');
            self.advance();
            if self.current_char() == Some('/') {
                self.read_regex_body(&mut out)?;
            } else if let Some(end) = self.regex_suffix_end() {
                while self.position < end {
                    if let Some(ch) = self.current_char() {
                        out.push(ch);
                    }
                    self.advance();
                }
            }
        }

        while let Some(ch) = self.current_char() {
            if STRUCTURAL.contains(ch) {
                break;
            }
            out.push(ch);
            self.advance();
        }
        Ok(Token::Chunk(out.trim_end().to_string()))
    }

    fn rest_starts_with(&self, prefix: &str) -> bool {
        prefix
            .chars()
            .enumerate()
            .all(|(i, ch)| self.input.get(self.position + i).copied() == Some(ch))
    }

    /// A `:regex:` name chunk. A `/body/opts` pattern keeps its delimiters
    /// and may use structural characters; a bare pattern runs until a
    /// separator or `?`, honoring `\` escapes.
    fn read_typed_regex_chunk(&mut self) -> Result<Token, LexError> {
        let mut out = String::from(":regex:");
        self.position += ":regex:".len();
        if self.current_char() == Some('/') {
            self.read_regex_body(&mut out)?;
            while let Some(ch) = self.current_char() {
                if STRUCTURAL.contains(ch) {
                    break;
                }
                out.push(ch);
                self.advance();
            }
        } else {
            while let Some(ch) = self.current_char() {
                match ch {
                    '/' | '?' => break,
                    '\\' => {
                        out.push('\\');
                        self.advance();
                        if let Some(escaped) = self.current_char() {
                            out.push(escaped);
                            self.advance();
                        }
                    }
                    _ => {
                        out.push(ch);
                        self.advance();
                    }
                }
            }
        }
        Ok(Token::Chunk(out.trim_end().to_string()))
    }

    /// Lookahead inside an `=` chunk for a closing `:regex` type marker
    /// before any separator or `?`. Returns the index one past the marker,
    /// so the pattern in between can be consumed wholesale.
    fn regex_suffix_end(&self) -> Option<usize> {
        const MARKER: &str = ":regex";
        let mut index = self.position;
        loop {
            match self.input.get(index).copied() {
                None | Some('/') | Some('?') => return None,
                Some(':') => {
                    let marker = MARKER
                        .chars()
                        .enumerate()
                        .all(|(i, ch)| self.input.get(index + i).copied() == Some(ch));
                    if marker {
                        let end = index + MARKER.len();
                        match self.input.get(end).copied() {
                            None => return Some(end),
                            Some(next) if STRUCTURAL.contains(next) => return Some(end),
                            Some(_) => {}
                        }
                    }
                    index += 1;
                }
                Some(_) => index += 1,
            }
        }
    }
}

#[test]
fn simple_path() {
    let tokens = Tokenizer::new("/foo/*").tokenize().unwrap();
    assert_eq!(
        tokens,
        vec![
            Token::Sep,
            Token::Chunk("foo".to_string()),
            Token::Sep,
            Token::Chunk("*".to_string()),
        ]
    );
}

#[test]
fn double_slash_is_two_separators() {
    let tokens = Tokenizer::new("//?").tokenize().unwrap();
    assert_eq!(tokens, vec![Token::Sep, Token::Sep, Token::TypeMark]);
}

#[test]
fn regex_chunk_after_separator() {
    let tokens = Tokenizer::new("//fo+o/i?").tokenize().unwrap();
    assert_eq!(
        tokens,
        vec![
            Token::Sep,
            Token::Chunk("/fo+o/i".to_string()),
            Token::TypeMark,
        ]
    );
}

#[test]
fn value_regex_keeps_structural_chars() {
    let tokens = Tokenizer::new("/=/a|b/i?").tokenize().unwrap();
    assert_eq!(
        tokens,
        vec![
            Token::Sep,
            Token::Chunk("=/a|b/i".to_string()),
            Token::TypeMark,
        ]
    );
}
