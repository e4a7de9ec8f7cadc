use serde::{Deserialize, Serialize};

/// Span information for source location tracking (byte offsets into the expression source)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// Expression (used in interpolations, directive values and event handlers)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Expression {
    /// String literal
    Literal { value: String, span: Span },

    /// Number literal
    Number { value: f64, span: Span },

    /// Boolean literal
    Boolean { value: bool, span: Span },

    /// `null`
    Null { span: Span },

    /// `undefined`
    Undefined { span: Span },

    /// Variable reference, resolved through the scope chain
    Variable { name: String, span: Span },

    /// Member access (obj.prop)
    Member {
        object: Box<Expression>,
        property: String,
        span: Span,
    },

    /// Computed member access (obj[key])
    Index {
        object: Box<Expression>,
        index: Box<Expression>,
        span: Span,
    },

    /// Call of a callee expression: `f(x)`, `item.name.toUpperCase()`
    Call {
        callee: Box<Expression>,
        arguments: Vec<Expression>,
        span: Span,
    },

    /// Unary operation (!a, -a, +a)
    Unary {
        operator: UnaryOp,
        operand: Box<Expression>,
        span: Span,
    },

    /// Binary operation (a + b)
    Binary {
        left: Box<Expression>,
        operator: BinaryOp,
        right: Box<Expression>,
        span: Span,
    },

    /// Ternary conditional (a ? b : c)
    Conditional {
        test: Box<Expression>,
        consequent: Box<Expression>,
        alternate: Box<Expression>,
        span: Span,
    },

    /// Array literal
    Array { items: Vec<Expression>, span: Span },

    /// Object literal, keys in source order
    Object {
        entries: Vec<(String, Expression)>,
        span: Span,
    },

    /// Assignment to a variable, member or index target
    Assign {
        target: Box<Expression>,
        value: Box<Expression>,
        span: Span,
    },

    /// Filter pipe: `input#name:arg1,arg2`
    Filter {
        input: Box<Expression>,
        name: String,
        arguments: Vec<Expression>,
        span: Span,
    },

    /// `;`-separated statements, evaluates to the last one
    Sequence { items: Vec<Expression>, span: Span },
}

impl Expression {
    pub fn span(&self) -> Span {
        match self {
            Expression::Literal { span, .. }
            | Expression::Number { span, .. }
            | Expression::Boolean { span, .. }
            | Expression::Null { span }
            | Expression::Undefined { span }
            | Expression::Variable { span, .. }
            | Expression::Member { span, .. }
            | Expression::Index { span, .. }
            | Expression::Call { span, .. }
            | Expression::Unary { span, .. }
            | Expression::Binary { span, .. }
            | Expression::Conditional { span, .. }
            | Expression::Array { span, .. }
            | Expression::Object { span, .. }
            | Expression::Assign { span, .. }
            | Expression::Filter { span, .. }
            | Expression::Sequence { span, .. } => *span,
        }
    }

    /// Whether the expression can appear on the left of `=`
    pub fn is_assignable(&self) -> bool {
        matches!(
            self,
            Expression::Variable { .. } | Expression::Member { .. } | Expression::Index { .. }
        )
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Negate,
    Plus,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    Equals,
    NotEquals,
    StrictEquals,
    StrictNotEquals,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    And,
    Or,
}

/// Interpolation template parts (`Hello {{ name }}!`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TemplatePart {
    Literal(String),
    Expression(Expression),
}

/// Parsed interpolation template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub parts: Vec<TemplatePart>,
}

impl Template {
    /// True when the template has no `{{ }}` segment at all
    pub fn is_static(&self) -> bool {
        self.parts
            .iter()
            .all(|part| matches!(part, TemplatePart::Literal(_)))
    }
}

/// Iteration mode of a `:for` clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForMode {
    /// `in`: own keys of an object
    In,
    /// `of`: array elements or a numeric range
    Of,
}

/// Source collection of a `:for` clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ForSource {
    Expression(Expression),
    Range { start: Expression, end: Expression },
}

/// `item[, value][, index] (in|of) source`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForClause {
    pub names: Vec<String>,
    pub mode: ForMode,
    pub source: ForSource,
}

/// One `name = expression` entry of a `:var` directive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarBinding {
    pub name: String,
    pub value: Expression,
}

/// Markup node produced by the template markup parser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MarkupNode {
    Element {
        tag: String,
        /// Attributes in source order; a bare attribute has an empty value
        attributes: Vec<(String, String)>,
        children: Vec<MarkupNode>,
    },
    Text {
        content: String,
    },
    Comment {
        content: String,
    },
}
