use std::ops::Range;
use thiserror::Error;

pub type ParseResult<T> = Result<T, ParseError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Unexpected token at {pos}: expected {expected}, found {found}")]
    UnexpectedToken {
        pos: usize,
        expected: String,
        found: String,
    },

    #[error("Unexpected end of input at {pos}")]
    UnexpectedEof { pos: usize },

    #[error("Invalid syntax at {pos}: {message}")]
    InvalidSyntax { pos: usize, message: String },

    #[error("Lexer error at {pos}")]
    LexerError { pos: usize },

    #[error("Unterminated {what} starting at {pos}")]
    Unterminated { pos: usize, what: String },
}

impl ParseError {
    pub fn unexpected_token(pos: usize, expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::UnexpectedToken {
            pos,
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn unexpected_eof(pos: usize) -> Self {
        Self::UnexpectedEof { pos }
    }

    pub fn invalid_syntax(pos: usize, message: impl Into<String>) -> Self {
        Self::InvalidSyntax {
            pos,
            message: message.into(),
        }
    }

    pub fn lexer_error(pos: usize) -> Self {
        Self::LexerError { pos }
    }

    pub fn unterminated(pos: usize, what: impl Into<String>) -> Self {
        Self::Unterminated {
            pos,
            what: what.into(),
        }
    }

    /// Byte offset the error points at
    pub fn pos(&self) -> usize {
        match self {
            Self::UnexpectedToken { pos, .. }
            | Self::UnexpectedEof { pos }
            | Self::InvalidSyntax { pos, .. }
            | Self::LexerError { pos }
            | Self::Unterminated { pos, .. } => *pos,
        }
    }

    /// Shift the reported offset, used when a sub-source was parsed out of a larger one
    pub fn offset_by(self, base: usize) -> Self {
        match self {
            Self::UnexpectedToken { pos, expected, found } => Self::UnexpectedToken {
                pos: pos + base,
                expected,
                found,
            },
            Self::UnexpectedEof { pos } => Self::UnexpectedEof { pos: pos + base },
            Self::InvalidSyntax { pos, message } => Self::InvalidSyntax {
                pos: pos + base,
                message,
            },
            Self::LexerError { pos } => Self::LexerError { pos: pos + base },
            Self::Unterminated { pos, what } => Self::Unterminated {
                pos: pos + base,
                what,
            },
        }
    }

    fn label_range(&self, source_len: usize) -> Range<usize> {
        let start = self.pos().min(source_len);
        start..(start + 1).min(source_len.max(start))
    }

    /// Render the error against its source with ariadne
    #[cfg(feature = "pretty-errors")]
    pub fn report(&self, source: &str) -> String {
        use ariadne::{Label, Report, ReportKind, Source};

        let range = self.label_range(source.len());
        let mut out = Vec::new();
        let written = Report::build(ReportKind::Error, (), range.start)
            .with_message(self.to_string())
            .with_label(Label::new(range).with_message("here"))
            .finish()
            .write(Source::from(source), &mut out);

        match written {
            Ok(()) => String::from_utf8_lossy(&out).into_owned(),
            Err(_) => self.to_string(),
        }
    }

    #[cfg(not(feature = "pretty-errors"))]
    pub fn report(&self, source: &str) -> String {
        let range = self.label_range(source.len());
        format!("{} (near `{}`)", self, source.get(range).unwrap_or(""))
    }
}
