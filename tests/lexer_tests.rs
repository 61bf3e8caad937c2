use grove_lang::{LexError, Token, Tokenizer};

fn tokens(source: &str) -> Vec<Token> {
    Tokenizer::new(source).tokenize().unwrap()
}

fn chunk(text: &str) -> Token {
    Token::Chunk(text.to_string())
}

#[test]
fn test_structural_characters_each_form_a_token() {
    assert_eq!(
        tokens("/a|/b&/c^/d!/e"),
        vec![
            Token::Sep,
            chunk("a"),
            Token::Or,
            Token::Sep,
            chunk("b"),
            Token::And,
            Token::Sep,
            chunk("c"),
            Token::Xor,
            Token::Sep,
            chunk("d"),
            Token::Not,
            Token::Sep,
            chunk("e"),
        ]
    );
}

#[test]
fn test_groups_and_type_mark() {
    assert_eq!(
        tokens("/(/a)?name"),
        vec![
            Token::Sep,
            Token::OpenGroup,
            Token::Sep,
            chunk("a"),
            Token::CloseGroup,
            Token::TypeMark,
            chunk("name"),
        ]
    );
}

#[test]
fn test_leading_at_is_the_reference_marker() {
    assert_eq!(tokens("@/a"), vec![Token::Reference, Token::Sep, chunk("a")]);
    // Mid-chunk '@' is ordinary name text.
    assert_eq!(tokens("/a@b"), vec![Token::Sep, chunk("a@b")]);
}

#[test]
fn test_whitespace_between_tokens_is_skipped() {
    assert_eq!(
        tokens("/a |\n/b"),
        vec![Token::Sep, chunk("a"), Token::Or, Token::Sep, chunk("b")]
    );
}

#[test]
fn test_double_separator_stays_two_separators() {
    assert_eq!(tokens("//"), vec![Token::Sep, Token::Sep]);
    assert_eq!(
        tokens("//?name"),
        vec![Token::Sep, Token::Sep, Token::TypeMark, chunk("name")]
    );
}

#[test]
fn test_regex_in_name_position_is_one_chunk() {
    assert_eq!(
        tokens("//ab+c/i"),
        vec![Token::Sep, chunk("/ab+c/i")]
    );
}

#[test]
fn test_typed_regex_chunk_swallows_structural_characters() {
    assert_eq!(
        tokens("/:regex:^a.+$"),
        vec![Token::Sep, chunk(":regex:^a.+$")]
    );
    assert_eq!(
        tokens("/:regex:/^(a|b)$/i?name"),
        vec![
            Token::Sep,
            chunk(":regex:/^(a|b)$/i"),
            Token::TypeMark,
            chunk("name"),
        ]
    );
}

#[test]
fn test_value_regex_type_suffix_swallows_structural_characters() {
    assert_eq!(tokens("/=^h$:regex"), vec![Token::Sep, chunk("=^h$:regex")]);
    assert_eq!(
        tokens("/=(a|b):regex?value"),
        vec![
            Token::Sep,
            chunk("=(a|b):regex"),
            Token::TypeMark,
            chunk("value"),
        ]
    );
}

#[test]
fn test_slash_regex_closes_before_structural_characters() {
    // No closing '/' before the operator, so the second '/' is an
    // ordinary separator and the empty name applies.
    assert_eq!(
        tokens("//|/y"),
        vec![Token::Sep, Token::Sep, Token::Or, Token::Sep, chunk("y")]
    );
}

#[test]
fn test_value_regex_swallows_structural_characters() {
    assert_eq!(
        tokens("/=/a|b/?value"),
        vec![Token::Sep, chunk("=/a|b/"), Token::TypeMark, chunk("value")]
    );
}

#[test]
fn test_unterminated_value_regex_errors() {
    let result = Tokenizer::new("/=/never").tokenize();
    assert!(matches!(result, Err(LexError::UnterminatedRegex(_))));
}
