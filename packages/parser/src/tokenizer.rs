use crate::error::{ParseError, ParseResult};
use logos::Logos;
use std::fmt;

/// Token types for template expressions
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r]+")]
pub enum Token<'src> {
    // Keywords
    #[token("true")]
    True,

    #[token("false")]
    False,

    #[token("null")]
    Null,

    #[token("undefined")]
    Undefined,

    #[token("in")]
    In,

    #[token("of")]
    Of,

    // Identifiers (`$` is allowed so framework helpers like `$event` resolve)
    #[regex(r"[a-zA-Z_$][a-zA-Z0-9_$]*", |lex| lex.slice())]
    Ident(&'src str),

    // String literals, either quote style
    #[regex(r#""([^"\\]|\\.)*""#, |lex| lex.slice())]
    #[regex(r#"'([^'\\]|\\.)*'"#, |lex| lex.slice())]
    String(&'src str),

    // Numbers
    #[regex(r"[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?", |lex| lex.slice())]
    Number(&'src str),

    // Symbols
    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,

    #[token(":")]
    Colon,

    #[token(";")]
    Semicolon,

    #[token(",")]
    Comma,

    #[token(".")]
    Dot,

    #[token("...")]
    Ellipsis,

    #[token("?")]
    Question,

    #[token("#")]
    Hash,

    // Operators
    #[token("=")]
    Assign,

    #[token("==")]
    EqualsEquals,

    #[token("!=")]
    NotEquals,

    #[token("===")]
    StrictEquals,

    #[token("!==")]
    StrictNotEquals,

    #[token("<")]
    LAngle,

    #[token("<=")]
    LessThanEquals,

    #[token(">")]
    RAngle,

    #[token(">=")]
    GreaterThanEquals,

    #[token("&&")]
    And,

    #[token("||")]
    Or,

    #[token("+")]
    Plus,

    #[token("-")]
    Minus,

    #[token("*")]
    Star,

    #[token("/")]
    Slash,

    #[token("%")]
    Percent,

    #[token("!")]
    Bang,
}

impl<'src> fmt::Display for Token<'src> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::Null => write!(f, "null"),
            Token::Undefined => write!(f, "undefined"),
            Token::In => write!(f, "in"),
            Token::Of => write!(f, "of"),
            Token::Ident(s) => write!(f, "identifier '{}'", s),
            Token::String(s) => write!(f, "string {}", s),
            Token::Number(n) => write!(f, "number {}", n),
            Token::LBrace => write!(f, "'{{'"),
            Token::RBrace => write!(f, "'}}'"),
            Token::LParen => write!(f, "'('"),
            Token::RParen => write!(f, "')'"),
            Token::LBracket => write!(f, "'['"),
            Token::RBracket => write!(f, "']'"),
            Token::Colon => write!(f, "':'"),
            Token::Semicolon => write!(f, "';'"),
            Token::Comma => write!(f, "','"),
            Token::Dot => write!(f, "'.'"),
            Token::Ellipsis => write!(f, "'...'"),
            Token::Question => write!(f, "'?'"),
            Token::Hash => write!(f, "'#'"),
            Token::Assign => write!(f, "'='"),
            Token::EqualsEquals => write!(f, "'=='"),
            Token::NotEquals => write!(f, "'!='"),
            Token::StrictEquals => write!(f, "'==='"),
            Token::StrictNotEquals => write!(f, "'!=='"),
            Token::LAngle => write!(f, "'<'"),
            Token::LessThanEquals => write!(f, "'<='"),
            Token::RAngle => write!(f, "'>'"),
            Token::GreaterThanEquals => write!(f, "'>='"),
            Token::And => write!(f, "'&&'"),
            Token::Or => write!(f, "'||'"),
            Token::Plus => write!(f, "'+'"),
            Token::Minus => write!(f, "'-'"),
            Token::Star => write!(f, "'*'"),
            Token::Slash => write!(f, "'/'"),
            Token::Percent => write!(f, "'%'"),
            Token::Bang => write!(f, "'!'"),
        }
    }
}

/// Tokenize an expression source, failing on the first character logos cannot lex
pub fn tokenize(source: &str) -> ParseResult<Vec<(Token<'_>, std::ops::Range<usize>)>> {
    let lexer = Token::lexer(source);
    lexer
        .spanned()
        .map(|(result, span)| match result {
            Ok(token) => Ok((token, span)),
            Err(()) => Err(ParseError::lexer_error(span.start)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords() {
        let tokens = tokenize("true false null undefined in of").unwrap();

        assert_eq!(tokens[0].0, Token::True);
        assert_eq!(tokens[1].0, Token::False);
        assert_eq!(tokens[2].0, Token::Null);
        assert_eq!(tokens[3].0, Token::Undefined);
        assert_eq!(tokens[4].0, Token::In);
        assert_eq!(tokens[5].0, Token::Of);
    }

    #[test]
    fn test_identifiers() {
        let tokens = tokenize("user $event _private item2 index").unwrap();

        assert_eq!(tokens[0].0, Token::Ident("user"));
        assert_eq!(tokens[1].0, Token::Ident("$event"));
        assert_eq!(tokens[2].0, Token::Ident("_private"));
        assert_eq!(tokens[3].0, Token::Ident("item2"));
        assert_eq!(tokens[4].0, Token::Ident("index"));
    }

    #[test]
    fn test_strings_both_quotes() {
        let tokens = tokenize(r#""hello" 'it\'s'"#).unwrap();

        assert_eq!(tokens[0].0, Token::String("\"hello\""));
        assert_eq!(tokens[1].0, Token::String("'it\\'s'"));
    }

    #[test]
    fn test_range_does_not_swallow_dots() {
        let tokens = tokenize("1...5").unwrap();

        assert_eq!(tokens[0].0, Token::Number("1"));
        assert_eq!(tokens[1].0, Token::Ellipsis);
        assert_eq!(tokens[2].0, Token::Number("5"));
    }

    #[test]
    fn test_operators_longest_match() {
        let tokens = tokenize("a === b !== c <= d && e || !f").unwrap();
        let kinds: Vec<_> = tokens.into_iter().map(|(t, _)| t).collect();

        assert!(kinds.contains(&Token::StrictEquals));
        assert!(kinds.contains(&Token::StrictNotEquals));
        assert!(kinds.contains(&Token::LessThanEquals));
        assert!(kinds.contains(&Token::And));
        assert!(kinds.contains(&Token::Or));
        assert!(kinds.contains(&Token::Bang));
    }

    #[test]
    fn test_filter_pipe() {
        let tokens = tokenize("price#currency:'$',2").unwrap();

        assert_eq!(tokens[1].0, Token::Hash);
        assert_eq!(tokens[2].0, Token::Ident("currency"));
        assert_eq!(tokens[3].0, Token::Colon);
    }

    #[test]
    fn test_lexer_error_position() {
        let err = tokenize("a ^ b").unwrap_err();
        assert_eq!(err, ParseError::lexer_error(2));
    }
}
