// Lexer for expression and domain text.
//
// One token set serves both the expression grammar (instruction sides,
// substitution bodies) and the integer-set grammar (loop domains).
// Uses the `logos` crate for DFA-based lexing.
//
// Preconditions: input is valid UTF-8.
// Postconditions: returns all tokens with byte-offset spans, plus any lex errors.
// Failure modes: unrecognized characters produce `LexError`; lexing continues.
// Side effects: none.

use logos::Logos;
use std::fmt;

/// Byte-offset span in source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// A lexer error with location.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub span: Span,
    pub message: String,
}

/// Result of lexing: tokens plus any errors (non-fatal).
#[derive(Debug)]
pub struct LexResult {
    pub tokens: Vec<(Token, Span)>,
    pub errors: Vec<LexError>,
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Token {
    // ── Keywords ──
    #[token("and")]
    And,

    // ── Symbols ──
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("**")]
    StarStar,
    #[token("/")]
    Slash,
    #[token("//")]
    SlashSlash,
    #[token("%")]
    Percent,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token("->")]
    Arrow,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token(">")]
    Gt,
    #[token(">=")]
    Ge,
    #[token("=")]
    Eq,
    #[token("==")]
    EqEq,

    // ── Literals ──
    //
    // A float needs a decimal point or an exponent; everything else that
    // starts with a digit is an integer.
    #[regex(r"[0-9]+\.[0-9]*([eE][+-]?[0-9]+)?", parse_float)]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?", parse_float)]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+", parse_float)]
    Float(f64),

    #[regex(r"[0-9]+", parse_int)]
    Int(i64),

    // ── Identifier ──
    //
    // A leading `@` is lexed so that legacy reduction-iname duplication
    // requests can be diagnosed instead of failing as a syntax error.
    #[regex(r"@?[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::And => write!(f, "and"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::StarStar => write!(f, "**"),
            Token::Slash => write!(f, "/"),
            Token::SlashSlash => write!(f, "//"),
            Token::Percent => write!(f, "%"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::Comma => write!(f, ","),
            Token::Colon => write!(f, ":"),
            Token::Arrow => write!(f, "->"),
            Token::Lt => write!(f, "<"),
            Token::Le => write!(f, "<="),
            Token::Gt => write!(f, ">"),
            Token::Ge => write!(f, ">="),
            Token::Eq => write!(f, "="),
            Token::EqEq => write!(f, "=="),
            Token::Float(v) => write!(f, "{v:?}"),
            Token::Int(v) => write!(f, "{v}"),
            Token::Ident(name) => write!(f, "{name}"),
        }
    }
}

// ── Callbacks ──

fn parse_float(lex: &mut logos::Lexer<'_, Token>) -> Option<f64> {
    lex.slice().parse().ok()
}

fn parse_int(lex: &mut logos::Lexer<'_, Token>) -> Option<i64> {
    lex.slice().parse().ok()
}

// ── Public API ──

/// Lex expression or domain text into tokens.
///
/// Lexing is non-fatal: errors are collected and the lexer continues past
/// bad characters.
pub fn lex(source: &str) -> LexResult {
    let lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    for (result, range) in lexer.spanned() {
        let span = Span {
            start: range.start,
            end: range.end,
        };
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => errors.push(LexError {
                span,
                message: format!("unexpected character: {:?}", &source[span.start..span.end]),
            }),
        }
    }

    LexResult { tokens, errors }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_ok(source: &str) -> Vec<Token> {
        let result = lex(source);
        assert!(
            result.errors.is_empty(),
            "unexpected lex errors: {:?}",
            result.errors
        );
        result.tokens.into_iter().map(|(t, _)| t).collect()
    }

    fn ident(s: &str) -> Token {
        Token::Ident(s.to_string())
    }

    #[test]
    fn keyword_vs_ident() {
        // `android` is an identifier, not `and` + `roid`
        assert_eq!(lex_ok("and android"), vec![Token::And, ident("android")]);
    }

    #[test]
    fn longest_operator_wins() {
        assert_eq!(
            lex_ok("** * // / <= < >= > == = ->"),
            vec![
                Token::StarStar,
                Token::Star,
                Token::SlashSlash,
                Token::Slash,
                Token::Le,
                Token::Lt,
                Token::Ge,
                Token::Gt,
                Token::EqEq,
                Token::Eq,
                Token::Arrow,
            ]
        );
    }

    #[test]
    fn numbers() {
        assert_eq!(
            lex_ok("12 1.5 2. .25 1e3"),
            vec![
                Token::Int(12),
                Token::Float(1.5),
                Token::Float(2.0),
                Token::Float(0.25),
                Token::Float(1000.0),
            ]
        );
    }

    #[test]
    fn domain_text() {
        assert_eq!(
            lex_ok("[n] -> {[i]: 0<=i<n}"),
            vec![
                Token::LBracket,
                ident("n"),
                Token::RBracket,
                Token::Arrow,
                Token::LBrace,
                Token::LBracket,
                ident("i"),
                Token::RBracket,
                Token::Colon,
                Token::Int(0),
                Token::Le,
                ident("i"),
                Token::Lt,
                ident("n"),
                Token::RBrace,
            ]
        );
    }

    #[test]
    fn at_prefixed_ident() {
        assert_eq!(lex_ok("@k"), vec![ident("@k")]);
    }

    #[test]
    fn bad_character_is_reported() {
        let result = lex("a $ b");
        assert_eq!(result.tokens.len(), 2);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].span, Span { start: 2, end: 3 });
    }
}
