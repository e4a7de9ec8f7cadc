use sprig_common::ServiceError;
use sprig_parser::ParseError;
use sprig_reactive::ReactiveError;
use thiserror::Error;

pub type CompileResult<T> = Result<T, CompileError>;
pub type ViewResult<T> = Result<T, ViewError>;

/// Template authoring errors; fatal for the subtree being compiled
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("Directive :{directive} on <{tag}> requires a value")]
    MissingValue { directive: String, tag: String },

    #[error("Malformed :{directive} value `{source_text}`: {error}")]
    Malformed {
        directive: String,
        source_text: String,
        error: ParseError,
    },

    #[error("Unknown validation rule '{rule}' in :validate")]
    UnknownRule { rule: String },

    #[error(transparent)]
    Reactive(#[from] ReactiveError),
}

impl CompileError {
    pub fn missing_value(directive: impl Into<String>, tag: impl Into<String>) -> Self {
        Self::MissingValue {
            directive: directive.into(),
            tag: tag.into(),
        }
    }

    pub fn malformed(directive: impl Into<String>, source_text: impl Into<String>, error: ParseError) -> Self {
        Self::Malformed {
            directive: directive.into(),
            source_text: source_text.into(),
            error,
        }
    }
}

/// Errors surfaced by [`crate::View::load`]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ViewError {
    #[error("Template markup error: {0}")]
    Markup(#[from] ParseError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("View scope must be an object, got {kind}")]
    InvalidScope { kind: &'static str },

    #[error("Unknown model '{name}'")]
    UnknownModel { name: String },

    #[error("View is not loaded")]
    NotLoaded,

    #[error(transparent)]
    Reactive(#[from] ReactiveError),
}
