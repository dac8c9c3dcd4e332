//! Tokenization for qvickbuild configurations.
//!
//! Matching rules are tried in a fixed order on each step: skip whitespace
//! and `#` comments, then punctuation, then literals, then identifiers.
//! The first match consumes bytes and emits a token carrying a
//! [`Reference`] into the source. An unmatched byte halts with
//! `InvalidSymbol`.

use nom::branch::alt;
use nom::bytes::complete::{tag, take_while1};
use nom::character::complete::char;
use nom::combinator::value;
use nom::IResult;

use crate::errors::{BuildError, BuildResult, Diagnostics};
use crate::tracking::Reference;

/// What kind of token it is, with the payload for the carrying kinds.
///
/// A `FormattedLiteral` embeds the sub-stream produced by escape parsing:
/// pure-literal runs coalesced into `Literal` tokens, interleaved with the
/// tokens of any escaped `[ … ]` expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Identifier(String),
    Literal(String),
    FormattedLiteral(Vec<Token>),
    Equals,          // `=`
    Modify,          // `:`
    LineStop,        // `;`
    Arrow,           // `->`
    IterateAs,       // `as`
    Separator,       // `,`
    ExpressionOpen,  // `[`
    ExpressionClose, // `]`
    TaskOpen,        // `{`
    TaskClose,       // `}`
    True,            // `true`
    False,           // `false`
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub reference: Reference,
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Recognize one punctuation token. `->` is tried first so the dash does
/// not fall through to the identifier rule.
fn punctuation(input: &str) -> IResult<&str, TokenKind> {
    alt((
        value(TokenKind::Arrow, tag("->")),
        value(TokenKind::Equals, char('=')),
        value(TokenKind::Modify, char(':')),
        value(TokenKind::LineStop, char(';')),
        value(TokenKind::Separator, char(',')),
        value(TokenKind::ExpressionOpen, char('[')),
        value(TokenKind::ExpressionClose, char(']')),
        value(TokenKind::TaskOpen, char('{')),
        value(TokenKind::TaskClose, char('}')),
    ))(input)
}

/// The reduced alphabet available inside escaped `[ … ]` expressions.
fn escaped_punctuation(input: &str) -> IResult<&str, TokenKind> {
    alt((
        value(TokenKind::Arrow, tag("->")),
        value(TokenKind::Modify, char(':')),
        value(TokenKind::Separator, char(',')),
    ))(input)
}

/// The work struct: a cursor over the source plus the diagnostic sink to
/// halt into.
pub struct Lexer<'a, 'd> {
    source: &'a str,
    rest: &'a str,
    diags: &'d Diagnostics,
}

impl<'a, 'd> Lexer<'a, 'd> {
    pub fn new(source: &'a str, diags: &'d Diagnostics) -> Self {
        Lexer {
            source,
            rest: source,
            diags,
        }
    }

    /// Tokenize the whole source.
    pub fn token_stream(mut self) -> BuildResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace_comments();
            if self.rest.is_empty() {
                break;
            }
            tokens.push(self.next_token()?);
        }
        Ok(tokens)
    }

    fn offset(&self) -> usize {
        self.source.len() - self.rest.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest.chars().next()
    }

    fn advance(&mut self, bytes: usize) {
        self.rest = &self.rest[bytes..];
    }

    fn skip_whitespace_comments(&mut self) {
        loop {
            let before = self.rest.len();
            self.rest = self.rest.trim_start_matches([' ', '\t', '\n', '\r']);
            if let Some(comment) = self.rest.strip_prefix('#') {
                self.rest = match comment.find('\n') {
                    Some(newline) => &comment[newline..],
                    None => "",
                };
                continue;
            }
            if self.rest.len() == before {
                break;
            }
        }
    }

    fn next_token(&mut self) -> BuildResult<Token> {
        if let Some(token) = self.match_with(punctuation) {
            return Ok(token);
        }
        if self.peek() == Some('"') {
            return self.match_literal();
        }
        if let Some(token) = self.match_identifier() {
            return Ok(token);
        }
        let at = self.offset();
        let symbol = self.peek().unwrap_or('\0');
        Err(self.diags.halt(BuildError::InvalidSymbol {
            symbol: symbol.to_string(),
            reference: Reference::new(at, symbol.len_utf8().max(1)),
        }))
    }

    /// Run a nom recognizer at the cursor and wrap the match in a token
    /// with its source reference.
    fn match_with(&mut self, parser: fn(&'a str) -> IResult<&'a str, TokenKind>) -> Option<Token> {
        let at = self.offset();
        match parser(self.rest) {
            Ok((next, kind)) => {
                let length = self.rest.len() - next.len();
                self.rest = next;
                Some(Token {
                    kind,
                    reference: Reference::new(at, length),
                })
            }
            Err(_) => None,
        }
    }

    fn match_identifier(&mut self) -> Option<Token> {
        let at = self.offset();
        let parsed: IResult<&str, &str> = take_while1(is_identifier_char)(self.rest);
        let (next, name) = parsed.ok()?;
        self.rest = next;
        let reference = Reference::new(at, name.len());
        let kind = match name {
            "as" => TokenKind::IterateAs,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            _ => TokenKind::Identifier(name.to_string()),
        };
        Some(Token { kind, reference })
    }

    /// Lex a `"…"` literal into a single `FormattedLiteral` token whose
    /// sub-stream alternates pure-literal runs and escaped-expression
    /// tokens.
    fn match_literal(&mut self) -> BuildResult<Token> {
        let origin = self.offset();
        self.advance(1); // opening quote

        let mut stream = Vec::new();
        let mut run = String::new();
        loop {
            let Some(current) = self.peek() else {
                // source ended inside the literal.
                return Err(self.diags.halt(BuildError::InvalidLiteral {
                    reference: Reference::new(self.offset().saturating_sub(1), 1),
                }));
            };
            match current {
                '"' => break,
                '\\' => {
                    run.push(self.escaped_symbol()?);
                }
                '[' => {
                    stream.push(self.literal_run(&run));
                    run.clear();
                    stream.extend(self.escaped_expression()?);
                }
                other => {
                    run.push(other);
                    self.advance(other.len_utf8());
                }
            }
        }
        stream.push(self.literal_run(&run));
        self.advance(1); // closing quote

        Ok(Token {
            kind: TokenKind::FormattedLiteral(stream),
            reference: Reference::new(origin, self.offset() - origin),
        })
    }

    fn literal_run(&self, run: &str) -> Token {
        Token {
            kind: TokenKind::Literal(run.to_string()),
            reference: Reference::new(self.offset() - run.len(), run.len()),
        }
    }

    /// Decode a backslash escape. The recognized codes match the C
    /// standard minus `\e`, plus `\[` and `\]`.
    fn escaped_symbol(&mut self) -> BuildResult<char> {
        self.advance(1); // backslash
        let Some(code) = self.peek() else {
            return Err(self.diags.halt(BuildError::InvalidLiteral {
                reference: Reference::new(self.offset().saturating_sub(1), 1),
            }));
        };
        self.advance(code.len_utf8());
        let decoded = match code {
            'a' => '\x07',
            'b' => '\x08',
            'f' => '\x0c',
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            'v' => '\x0b',
            '\\' => '\\',
            '\'' => '\'',
            '"' => '"',
            '[' => '[',
            ']' => ']',
            other => {
                return Err(self.diags.halt(BuildError::InvalidEscapeCode {
                    code: other,
                    reference: Reference::new(self.offset() - other.len_utf8(), 1),
                }))
            }
        };
        Ok(decoded)
    }

    /// Re-tokenize an escaped `[ … ]` expression with the reduced
    /// alphabet: `:`, `->`, `,` and identifiers.
    fn escaped_expression(&mut self) -> BuildResult<Vec<Token>> {
        self.advance(1); // `[`
        let mut stream = Vec::new();
        loop {
            self.skip_whitespace_comments();
            match self.peek() {
                None => {
                    return Err(self.diags.halt(BuildError::InvalidLiteral {
                        reference: Reference::new(self.offset().saturating_sub(1), 1),
                    }))
                }
                Some(']') => break,
                Some(_) => {}
            }
            let at = self.offset();
            if let Some(token) = self.match_with(escaped_punctuation) {
                stream.push(token);
                continue;
            }
            if let Some(token) = self.match_identifier() {
                stream.push(token);
                continue;
            }
            return Err(self.diags.halt(BuildError::InvalidLiteral {
                reference: Reference::new(at, 1),
            }));
        }
        self.advance(1); // `]`
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<Token> {
        let diags = Diagnostics::new();
        Lexer::new(source, &diags).token_stream().unwrap()
    }

    fn lex_err(source: &str) -> BuildError {
        let diags = Diagnostics::new();
        let result = Lexer::new(source, &diags).token_stream();
        assert!(result.is_err());
        diags.reports().remove(0).error
    }

    fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
        tokens.iter().map(|t| t.kind.clone()).collect()
    }

    #[test]
    fn tokenize_punctuation() {
        let tokens = lex("= : ; -> , [ ] { }");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Equals,
                TokenKind::Modify,
                TokenKind::LineStop,
                TokenKind::Arrow,
                TokenKind::Separator,
                TokenKind::ExpressionOpen,
                TokenKind::ExpressionClose,
                TokenKind::TaskOpen,
                TokenKind::TaskClose,
            ]
        );
    }

    #[test]
    fn tokenize_identifiers_and_keywords() {
        let tokens = lex("cc_flags as true false my-task");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Identifier("cc_flags".into()),
                TokenKind::IterateAs,
                TokenKind::True,
                TokenKind::False,
                TokenKind::Identifier("my-task".into()),
            ]
        );
    }

    #[test]
    fn references_point_into_source() {
        let source = "cc = gcc;";
        let tokens = lex(source);
        assert_eq!(tokens[0].reference, Reference::new(0, 2));
        assert_eq!(tokens[1].reference, Reference::new(3, 1));
        assert_eq!(tokens[2].reference, Reference::new(5, 3));
        assert_eq!(tokens[3].reference, Reference::new(8, 1));
        for token in &tokens {
            let span =
                &source[token.reference.index..token.reference.index + token.reference.length];
            match &token.kind {
                TokenKind::Identifier(name) => assert_eq!(span, name),
                TokenKind::Equals => assert_eq!(span, "="),
                TokenKind::LineStop => assert_eq!(span, ";"),
                _ => {}
            }
        }
    }

    #[test]
    fn comments_are_skipped() {
        let tokens = lex("# leading comment\ncc = gcc; # trailing\n");
        assert_eq!(tokens.len(), 4);
        let tokens = lex("only = this; # comment without newline");
        assert_eq!(tokens.len(), 4);
    }

    #[test]
    fn literal_becomes_formatted_literal() {
        let tokens = lex("\"hello\"");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].reference, Reference::new(0, 7));
        let TokenKind::FormattedLiteral(inner) = &tokens[0].kind else {
            panic!("expected formatted literal");
        };
        assert_eq!(kinds(inner), vec![TokenKind::Literal("hello".into())]);
    }

    #[test]
    fn literal_escape_codes_decode() {
        let tokens = lex(r#""a\tb\nc\\d\"e\[f\]g""#);
        let TokenKind::FormattedLiteral(inner) = &tokens[0].kind else {
            panic!("expected formatted literal");
        };
        assert_eq!(
            kinds(inner),
            vec![TokenKind::Literal("a\tb\nc\\d\"e[f]g".into())]
        );
    }

    #[test]
    fn literal_with_escaped_expression() {
        let tokens = lex("\"lib/[name].o\"");
        let TokenKind::FormattedLiteral(inner) = &tokens[0].kind else {
            panic!("expected formatted literal");
        };
        assert_eq!(
            kinds(inner),
            vec![
                TokenKind::Literal("lib/".into()),
                TokenKind::Identifier("name".into()),
                TokenKind::Literal(".o".into()),
            ]
        );
    }

    #[test]
    fn escaped_expression_reduced_alphabet() {
        let tokens = lex("\"[srcs : a -> b, c]\"");
        let TokenKind::FormattedLiteral(inner) = &tokens[0].kind else {
            panic!("expected formatted literal");
        };
        assert_eq!(
            kinds(inner),
            vec![
                TokenKind::Literal("".into()),
                TokenKind::Identifier("srcs".into()),
                TokenKind::Modify,
                TokenKind::Identifier("a".into()),
                TokenKind::Arrow,
                TokenKind::Identifier("b".into()),
                TokenKind::Separator,
                TokenKind::Identifier("c".into()),
                TokenKind::Literal("".into()),
            ]
        );
    }

    #[test]
    fn invalid_symbol_halts() {
        let error = lex_err("cc = §;");
        let BuildError::InvalidSymbol { symbol, reference } = error else {
            panic!("expected invalid symbol, got {error:?}");
        };
        assert_eq!(symbol, "§");
        assert_eq!(reference.index, 5);
    }

    #[test]
    fn invalid_escape_code_halts() {
        let error = lex_err(r#"x = "\q";"#);
        let BuildError::InvalidEscapeCode { code, .. } = error else {
            panic!("expected invalid escape code, got {error:?}");
        };
        assert_eq!(code, 'q');
    }

    #[test]
    fn unterminated_literal_halts() {
        let error = lex_err("x = \"open");
        assert!(matches!(error, BuildError::InvalidLiteral { .. }));
    }

    #[test]
    fn stray_symbol_in_escaped_expression_halts() {
        let error = lex_err("x = \"[a = b]\";");
        assert!(matches!(error, BuildError::InvalidLiteral { .. }));
    }

    #[test]
    fn dash_identifier_versus_arrow() {
        let tokens = lex("a-b -> c");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Identifier("a-b".into()),
                TokenKind::Arrow,
                TokenKind::Identifier("c".into()),
            ]
        );
    }
}
