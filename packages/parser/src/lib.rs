pub mod ast;
pub mod error;
pub mod markup;
pub mod parser;
pub mod template;
pub mod tokenizer;

pub use ast::*;
pub use error::{ParseError, ParseResult};
pub use markup::{decode_entities, is_void_element, parse_markup};
pub use parser::{parse_expression, parse_for_clause, parse_statements, parse_var_bindings, Parser};
pub use template::{has_interpolation, parse_template, Delimiters};
pub use tokenizer::{tokenize, Token};
