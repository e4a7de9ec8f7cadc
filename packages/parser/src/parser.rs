use crate::ast::*;
use crate::error::{ParseError, ParseResult};
use crate::tokenizer::{tokenize, Token};

/// Recursive-descent parser for template expressions
pub struct Parser<'src> {
    tokens: Vec<(Token<'src>, std::ops::Range<usize>)>,
    pos: usize,
    source_len: usize,
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str) -> ParseResult<Self> {
        let tokens = tokenize(source)?;
        Ok(Self {
            tokens,
            pos: 0,
            source_len: source.len(),
        })
    }

    /// Parse a single expression and require that all input was consumed
    pub fn parse_complete(&mut self) -> ParseResult<Expression> {
        let expr = self.parse_expression()?;
        self.expect_end()?;
        Ok(expr)
    }

    /// Parse `;`-separated statements (event handlers, `:exec`)
    pub fn parse_statements(&mut self) -> ParseResult<Expression> {
        let start = self.current_pos();
        let mut items = Vec::new();

        while !self.is_at_end() {
            if self.match_token(Token::Semicolon) {
                continue;
            }
            items.push(self.parse_expression()?);
            if !self.match_token(Token::Semicolon) {
                break;
            }
        }
        self.expect_end()?;

        match items.len() {
            0 => Ok(Expression::Undefined {
                span: Span::new(start, start),
            }),
            1 => Ok(items.remove(0)),
            _ => Ok(Expression::Sequence {
                items,
                span: Span::new(start, self.current_pos()),
            }),
        }
    }

    /// Parse a `:for` clause: `item[, value][, index] (in|of) source`
    pub fn parse_for_clause(&mut self) -> ParseResult<ForClause> {
        let parenthesized = self.match_token(Token::LParen);

        let mut names = vec![self.expect_ident()?];
        while self.match_token(Token::Comma) {
            names.push(self.expect_ident()?);
        }
        if parenthesized {
            self.expect(Token::RParen)?;
        }
        if names.len() > 3 {
            return Err(ParseError::invalid_syntax(
                self.current_pos(),
                "a loop declares at most three names",
            ));
        }

        let mode = if self.match_token(Token::In) {
            ForMode::In
        } else if self.match_token(Token::Of) {
            ForMode::Of
        } else {
            return Err(ParseError::unexpected_token(
                self.peek_pos(),
                "'in' or 'of'",
                Self::format_token(self.peek()),
            ));
        };

        let first = self.parse_expression()?;
        let source = if self.match_token(Token::Ellipsis) {
            if mode != ForMode::Of {
                return Err(ParseError::invalid_syntax(
                    self.current_pos(),
                    "ranges can only be iterated with 'of'",
                ));
            }
            let end = self.parse_expression()?;
            ForSource::Range { start: first, end }
        } else {
            ForSource::Expression(first)
        };
        self.expect_end()?;

        Ok(ForClause {
            names,
            mode,
            source,
        })
    }

    /// Parse `name = expr; other = expr` for `:var`
    pub fn parse_var_bindings(&mut self) -> ParseResult<Vec<VarBinding>> {
        let mut bindings = Vec::new();

        while !self.is_at_end() {
            if self.match_token(Token::Semicolon) {
                continue;
            }
            let name = self.expect_ident()?;
            self.expect(Token::Assign)?;
            let value = self.parse_filtered()?;
            bindings.push(VarBinding { name, value });

            if !self.match_token(Token::Semicolon) {
                break;
            }
        }
        self.expect_end()?;

        if bindings.is_empty() {
            return Err(ParseError::unexpected_eof(self.current_pos()));
        }
        Ok(bindings)
    }

    /// Parse an expression (assignment is the lowest precedence)
    pub fn parse_expression(&mut self) -> ParseResult<Expression> {
        let start = self.peek_pos();
        let target = self.parse_filtered()?;

        if self.match_token(Token::Assign) {
            if !target.is_assignable() {
                return Err(ParseError::invalid_syntax(start, "invalid assignment target"));
            }
            let value = self.parse_expression()?;
            return Ok(Expression::Assign {
                target: Box::new(target),
                value: Box::new(value),
                span: Span::new(start, self.current_end()),
            });
        }

        Ok(target)
    }

    /// Parse filter pipes: `input#name:arg1,arg2#other`
    fn parse_filtered(&mut self) -> ParseResult<Expression> {
        let start = self.peek_pos();
        let mut expr = self.parse_conditional()?;

        while self.match_token(Token::Hash) {
            let name = self.expect_ident()?;
            let mut arguments = Vec::new();
            if self.match_token(Token::Colon) {
                arguments.push(self.parse_conditional()?);
                while self.match_token(Token::Comma) {
                    arguments.push(self.parse_conditional()?);
                }
            }
            expr = Expression::Filter {
                input: Box::new(expr),
                name,
                arguments,
                span: Span::new(start, self.current_end()),
            };
        }

        Ok(expr)
    }

    /// Parse ternary conditional
    fn parse_conditional(&mut self) -> ParseResult<Expression> {
        let start = self.peek_pos();
        let test = self.parse_or_expression()?;

        if self.match_token(Token::Question) {
            let consequent = self.parse_conditional()?;
            self.expect(Token::Colon)?;
            let alternate = self.parse_conditional()?;
            return Ok(Expression::Conditional {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
                span: Span::new(start, self.current_end()),
            });
        }

        Ok(test)
    }

    /// Parse OR expression
    fn parse_or_expression(&mut self) -> ParseResult<Expression> {
        let start = self.peek_pos();
        let mut left = self.parse_and_expression()?;

        while self.match_token(Token::Or) {
            let right = self.parse_and_expression()?;
            left = self.binary(left, BinaryOp::Or, right, start);
        }

        Ok(left)
    }

    /// Parse AND expression
    fn parse_and_expression(&mut self) -> ParseResult<Expression> {
        let start = self.peek_pos();
        let mut left = self.parse_equality_expression()?;

        while self.match_token(Token::And) {
            let right = self.parse_equality_expression()?;
            left = self.binary(left, BinaryOp::And, right, start);
        }

        Ok(left)
    }

    /// Parse equality expression (== != === !==)
    fn parse_equality_expression(&mut self) -> ParseResult<Expression> {
        let start = self.peek_pos();
        let mut left = self.parse_comparison_expression()?;

        while let Some(op) = self.match_equality_op() {
            let right = self.parse_comparison_expression()?;
            left = self.binary(left, op, right, start);
        }

        Ok(left)
    }

    /// Parse comparison expression (< > <= >=)
    fn parse_comparison_expression(&mut self) -> ParseResult<Expression> {
        let start = self.peek_pos();
        let mut left = self.parse_additive_expression()?;

        while let Some(op) = self.match_comparison_op() {
            let right = self.parse_additive_expression()?;
            left = self.binary(left, op, right, start);
        }

        Ok(left)
    }

    /// Parse additive expression (+ -)
    fn parse_additive_expression(&mut self) -> ParseResult<Expression> {
        let start = self.peek_pos();
        let mut left = self.parse_multiplicative_expression()?;

        while let Some(op) = self.match_additive_op() {
            let right = self.parse_multiplicative_expression()?;
            left = self.binary(left, op, right, start);
        }

        Ok(left)
    }

    /// Parse multiplicative expression (* / %)
    fn parse_multiplicative_expression(&mut self) -> ParseResult<Expression> {
        let start = self.peek_pos();
        let mut left = self.parse_unary_expression()?;

        while let Some(op) = self.match_multiplicative_op() {
            let right = self.parse_unary_expression()?;
            left = self.binary(left, op, right, start);
        }

        Ok(left)
    }

    /// Parse unary expression (! - +)
    fn parse_unary_expression(&mut self) -> ParseResult<Expression> {
        let start = self.peek_pos();
        let operator = if self.match_token(Token::Bang) {
            Some(UnaryOp::Not)
        } else if self.match_token(Token::Minus) {
            Some(UnaryOp::Negate)
        } else if self.match_token(Token::Plus) {
            Some(UnaryOp::Plus)
        } else {
            None
        };

        match operator {
            Some(operator) => {
                let operand = self.parse_unary_expression()?;
                Ok(Expression::Unary {
                    operator,
                    operand: Box::new(operand),
                    span: Span::new(start, self.current_end()),
                })
            }
            None => {
                let primary = self.parse_primary_expression()?;
                self.parse_postfix_operations(primary, start)
            }
        }
    }

    /// Parse primary expression (literals, variables, groups, array and object literals)
    fn parse_primary_expression(&mut self) -> ParseResult<Expression> {
        let start = self.peek_pos();

        let Some((token, range)) = self.peek().cloned() else {
            return Err(ParseError::unexpected_eof(self.source_len));
        };
        let span = Span::new(range.start, range.end);

        match token {
            Token::String(raw) => {
                self.advance();
                Ok(Expression::Literal {
                    value: unescape_string(raw, range.start)?,
                    span,
                })
            }
            Token::Number(n) => {
                self.advance();
                let value = n
                    .parse::<f64>()
                    .map_err(|_| ParseError::invalid_syntax(range.start, format!("invalid number {}", n)))?;
                Ok(Expression::Number { value, span })
            }
            Token::True | Token::False => {
                self.advance();
                Ok(Expression::Boolean {
                    value: token == Token::True,
                    span,
                })
            }
            Token::Null => {
                self.advance();
                Ok(Expression::Null { span })
            }
            Token::Undefined => {
                self.advance();
                Ok(Expression::Undefined { span })
            }
            Token::Ident(name) => {
                self.advance();
                Ok(Expression::Variable {
                    name: name.to_string(),
                    span,
                })
            }
            Token::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            Token::LBracket => {
                self.advance();
                let mut items = Vec::new();
                while !self.check(Token::RBracket) && !self.is_at_end() {
                    items.push(self.parse_conditional()?);
                    if !self.match_token(Token::Comma) {
                        break;
                    }
                }
                self.expect(Token::RBracket)?;
                Ok(Expression::Array {
                    items,
                    span: Span::new(start, self.current_end()),
                })
            }
            Token::LBrace => {
                self.advance();
                self.parse_object_literal(start)
            }
            other => Err(ParseError::unexpected_token(
                range.start,
                "expression",
                other.to_string(),
            )),
        }
    }

    /// Parse the body of `{ key: value, 'other': value, shorthand }`
    fn parse_object_literal(&mut self, start: usize) -> ParseResult<Expression> {
        let mut entries = Vec::new();

        while !self.check(Token::RBrace) && !self.is_at_end() {
            let key_pos = self.peek_pos();
            let (key, shorthand_allowed) = match self.advance().cloned() {
                Some((Token::Ident(name), _)) => (name.to_string(), true),
                Some((Token::String(raw), range)) => (unescape_string(raw, range.start)?, false),
                Some((Token::Number(n), _)) => (n.to_string(), false),
                Some((token, range)) => {
                    return Err(ParseError::unexpected_token(
                        range.start,
                        "object key",
                        token.to_string(),
                    ))
                }
                None => return Err(ParseError::unexpected_eof(self.source_len)),
            };

            let value = if self.match_token(Token::Colon) {
                self.parse_conditional()?
            } else if shorthand_allowed {
                Expression::Variable {
                    name: key.clone(),
                    span: Span::new(key_pos, self.current_end()),
                }
            } else {
                return Err(ParseError::unexpected_token(
                    self.peek_pos(),
                    "':'",
                    Self::format_token(self.peek()),
                ));
            };
            entries.push((key, value));

            if !self.match_token(Token::Comma) {
                break;
            }
        }

        self.expect(Token::RBrace)?;
        Ok(Expression::Object {
            entries,
            span: Span::new(start, self.current_end()),
        })
    }

    /// Parse postfix operations (member access, index access and calls)
    /// Handles: obj.prop, obj[key], fn(), obj.method(a).other, etc.
    fn parse_postfix_operations(
        &mut self,
        mut expr: Expression,
        start: usize,
    ) -> ParseResult<Expression> {
        loop {
            if self.match_token(Token::Dot) {
                let property = self.expect_property_name()?;
                expr = Expression::Member {
                    object: Box::new(expr),
                    property,
                    span: Span::new(start, self.current_end()),
                };
            } else if self.match_token(Token::LBracket) {
                let index = self.parse_expression()?;
                self.expect(Token::RBracket)?;
                expr = Expression::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                    span: Span::new(start, self.current_end()),
                };
            } else if self.match_token(Token::LParen) {
                let mut arguments = Vec::new();
                while !self.check(Token::RParen) && !self.is_at_end() {
                    arguments.push(self.parse_conditional()?);
                    if !self.match_token(Token::Comma) {
                        break;
                    }
                }
                self.expect(Token::RParen)?;
                expr = Expression::Call {
                    callee: Box::new(expr),
                    arguments,
                    span: Span::new(start, self.current_end()),
                };
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn binary(&self, left: Expression, operator: BinaryOp, right: Expression, start: usize) -> Expression {
        Expression::Binary {
            left: Box::new(left),
            operator,
            right: Box::new(right),
            span: Span::new(start, self.current_end()),
        }
    }

    // Helper methods for matching operators

    fn match_equality_op(&mut self) -> Option<BinaryOp> {
        if self.match_token(Token::StrictEquals) {
            Some(BinaryOp::StrictEquals)
        } else if self.match_token(Token::StrictNotEquals) {
            Some(BinaryOp::StrictNotEquals)
        } else if self.match_token(Token::EqualsEquals) {
            Some(BinaryOp::Equals)
        } else if self.match_token(Token::NotEquals) {
            Some(BinaryOp::NotEquals)
        } else {
            None
        }
    }

    fn match_comparison_op(&mut self) -> Option<BinaryOp> {
        if self.match_token(Token::LessThanEquals) {
            Some(BinaryOp::LessThanOrEqual)
        } else if self.match_token(Token::GreaterThanEquals) {
            Some(BinaryOp::GreaterThanOrEqual)
        } else if self.match_token(Token::LAngle) {
            Some(BinaryOp::LessThan)
        } else if self.match_token(Token::RAngle) {
            Some(BinaryOp::GreaterThan)
        } else {
            None
        }
    }

    fn match_additive_op(&mut self) -> Option<BinaryOp> {
        if self.match_token(Token::Plus) {
            Some(BinaryOp::Add)
        } else if self.match_token(Token::Minus) {
            Some(BinaryOp::Subtract)
        } else {
            None
        }
    }

    fn match_multiplicative_op(&mut self) -> Option<BinaryOp> {
        if self.match_token(Token::Star) {
            Some(BinaryOp::Multiply)
        } else if self.match_token(Token::Slash) {
            Some(BinaryOp::Divide)
        } else if self.match_token(Token::Percent) {
            Some(BinaryOp::Remainder)
        } else {
            None
        }
    }

    // Helper methods

    fn peek(&self) -> Option<&(Token<'src>, std::ops::Range<usize>)> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&(Token<'src>, std::ops::Range<usize>)> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn check(&self, token: Token) -> bool {
        if let Some((t, _)) = self.peek() {
            std::mem::discriminant(t) == std::mem::discriminant(&token)
        } else {
            false
        }
    }

    fn match_token(&mut self, token: Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> ParseResult<()> {
        if self.check(token.clone()) {
            self.advance();
            Ok(())
        } else if self.is_at_end() {
            Err(ParseError::unexpected_eof(self.source_len))
        } else {
            Err(ParseError::unexpected_token(
                self.peek_pos(),
                token.to_string(),
                Self::format_token(self.peek()),
            ))
        }
    }

    fn expect_end(&self) -> ParseResult<()> {
        match self.peek() {
            None => Ok(()),
            Some((token, range)) => Err(ParseError::unexpected_token(
                range.start,
                "end of expression",
                token.to_string(),
            )),
        }
    }

    fn expect_ident(&mut self) -> ParseResult<String> {
        match self.peek() {
            Some((Token::Ident(s), _)) => {
                let val = s.to_string();
                self.advance();
                Ok(val)
            }
            None => Err(ParseError::unexpected_eof(self.source_len)),
            _ => Err(ParseError::unexpected_token(
                self.peek_pos(),
                "identifier",
                Self::format_token(self.peek()),
            )),
        }
    }

    /// Property names after `.` may also be keywords (`item.of`, `flags.true`)
    fn expect_property_name(&mut self) -> ParseResult<String> {
        let name = match self.peek() {
            Some((Token::Ident(s), _)) => s.to_string(),
            Some((Token::True, _)) => "true".to_string(),
            Some((Token::False, _)) => "false".to_string(),
            Some((Token::Null, _)) => "null".to_string(),
            Some((Token::Undefined, _)) => "undefined".to_string(),
            Some((Token::In, _)) => "in".to_string(),
            Some((Token::Of, _)) => "of".to_string(),
            _ => return self.expect_ident(),
        };
        self.advance();
        Ok(name)
    }

    /// Start of the next token
    fn peek_pos(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|(_, span)| span.start)
            .unwrap_or(self.source_len)
    }

    /// Start of the token we just consumed
    fn current_pos(&self) -> usize {
        self.tokens
            .get(self.pos.saturating_sub(1))
            .map(|(_, span)| span.start)
            .unwrap_or(0)
    }

    /// End of the token we just consumed
    fn current_end(&self) -> usize {
        self.tokens
            .get(self.pos.saturating_sub(1))
            .map(|(_, span)| span.end)
            .unwrap_or(0)
    }

    /// Format a token for display in error messages
    fn format_token(token: Option<&(Token, std::ops::Range<usize>)>) -> String {
        match token {
            None => "end of expression".to_string(),
            Some((token, _)) => token.to_string(),
        }
    }
}

/// Strip quotes and resolve escape sequences of a string token
fn unescape_string(raw: &str, pos: usize) -> ParseResult<String> {
    let inner = &raw[1..raw.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some('0') => out.push('\0'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                let code = u32::from_str_radix(&hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| ParseError::invalid_syntax(pos, format!("invalid escape \\u{}", hex)))?;
                out.push(code);
            }
            Some(other) => out.push(other),
            None => return Err(ParseError::unterminated(pos, "escape sequence")),
        }
    }

    Ok(out)
}

/// Parse a bare expression (directive values such as `:if="ready && count > 0"`)
pub fn parse_expression(source: &str) -> ParseResult<Expression> {
    Parser::new(source)?.parse_complete()
}

/// Parse `;`-separated statements (event handler bodies)
pub fn parse_statements(source: &str) -> ParseResult<Expression> {
    Parser::new(source)?.parse_statements()
}

/// Parse a `:for` clause
pub fn parse_for_clause(source: &str) -> ParseResult<ForClause> {
    Parser::new(source)?.parse_for_clause()
}

/// Parse the bindings of a `:var` directive
pub fn parse_var_bindings(source: &str) -> ParseResult<Vec<VarBinding>> {
    Parser::new(source)?.parse_var_bindings()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variable(expr: &Expression) -> &str {
        match expr {
            Expression::Variable { name, .. } => name,
            other => panic!("Expected variable, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_precedence() {
        let expr = parse_expression("1 + 2 * 3").unwrap();
        match expr {
            Expression::Binary {
                operator: BinaryOp::Add,
                right,
                ..
            } => assert!(matches!(
                *right,
                Expression::Binary {
                    operator: BinaryOp::Multiply,
                    ..
                }
            )),
            other => panic!("Expected addition, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_member_index_and_call() {
        let expr = parse_expression("user.tags[0].toUpperCase()").unwrap();
        let Expression::Call { callee, arguments, .. } = expr else {
            panic!("Expected call");
        };
        assert!(arguments.is_empty());
        let Expression::Member { object, property, .. } = *callee else {
            panic!("Expected member callee");
        };
        assert_eq!(property, "toUpperCase");
        assert!(matches!(*object, Expression::Index { .. }));
    }

    #[test]
    fn test_parse_ternary_and_logical() {
        let expr = parse_expression("a && b ? 'yes' : 'no'").unwrap();
        let Expression::Conditional { test, .. } = expr else {
            panic!("Expected conditional");
        };
        assert!(matches!(
            *test,
            Expression::Binary {
                operator: BinaryOp::And,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_filter_chain() {
        let expr = parse_expression("price#currency:'$',2#upper").unwrap();
        let Expression::Filter { input, name, arguments, .. } = expr else {
            panic!("Expected filter");
        };
        assert_eq!(name, "upper");
        assert!(arguments.is_empty());
        let Expression::Filter { name, arguments, input, .. } = *input else {
            panic!("Expected inner filter");
        };
        assert_eq!(name, "currency");
        assert_eq!(arguments.len(), 2);
        assert_eq!(variable(&input), "price");
    }

    #[test]
    fn test_parse_object_literal_with_shorthand() {
        let expr = parse_expression("{ active: on, 'is-big': size > 2, label }").unwrap();
        let Expression::Object { entries, .. } = expr else {
            panic!("Expected object");
        };
        let keys: Vec<_> = entries.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["active", "is-big", "label"]);
        assert_eq!(variable(&entries[2].1), "label");
    }

    #[test]
    fn test_parse_assignment_statements() {
        let expr = parse_statements("count = count + 1; last = $event.value").unwrap();
        let Expression::Sequence { items, .. } = expr else {
            panic!("Expected sequence");
        };
        assert_eq!(items.len(), 2);
        assert!(matches!(items[0], Expression::Assign { .. }));
    }

    #[test]
    fn test_invalid_assignment_target() {
        let err = parse_expression("1 = a").unwrap_err();
        assert!(matches!(err, ParseError::InvalidSyntax { .. }));
    }

    #[test]
    fn test_trailing_tokens_rejected() {
        let err = parse_expression("a b").unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedToken { pos: 2, .. }));
    }

    #[test]
    fn test_parse_for_clause_variants() {
        let clause = parse_for_clause("x of list").unwrap();
        assert_eq!(clause.names, vec!["x"]);
        assert_eq!(clause.mode, ForMode::Of);

        let clause = parse_for_clause("(key, value, i) in user").unwrap();
        assert_eq!(clause.names, vec!["key", "value", "i"]);
        assert_eq!(clause.mode, ForMode::In);

        let clause = parse_for_clause("n of 1...count").unwrap();
        assert!(matches!(clause.source, ForSource::Range { .. }));
    }

    #[test]
    fn test_parse_for_clause_errors() {
        assert!(parse_for_clause("x list").is_err());
        assert!(parse_for_clause("k in 1...3").is_err());
        assert!(parse_for_clause("a, b, c, d of list").is_err());
    }

    #[test]
    fn test_parse_var_bindings() {
        let bindings = parse_var_bindings("total = a + b; label = name#upper").unwrap();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].name, "total");
        assert!(matches!(bindings[1].value, Expression::Filter { .. }));
    }

    #[test]
    fn test_unescape_strings() {
        let expr = parse_expression(r#""line\nbreak A \"q\"""#).unwrap();
        let Expression::Literal { value, .. } = expr else {
            panic!("Expected literal");
        };
        assert_eq!(value, "line\nbreak A \"q\"");
    }
}
