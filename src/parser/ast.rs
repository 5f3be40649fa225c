// src/parser/ast.rs
//! Abstract Syntax Tree definitions for guest scripts

/// A parsed chunk of script source (the whole input)
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// local name = expr
    Local { name: String, value: Expression },

    /// Assignment to a name, a field or an index
    Assignment {
        target: AssignTarget,
        value: Expression,
    },

    /// function name(params) body end  (global function declaration)
    FunctionDecl {
        name: String,
        params: Vec<String>,
        body: Vec<Statement>,
    },

    /// if cond then ... elseif ... else ... end
    IfStatement {
        condition: Expression,
        then_block: Vec<Statement>,
        else_block: Option<Vec<Statement>>,
    },

    /// while cond do ... end
    WhileStatement {
        condition: Expression,
        body: Vec<Statement>,
    },

    /// return [expr]
    Return(Option<Expression>),

    /// Expression statement (a call, result discarded)
    Expression(Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssignTarget {
    /// name = value
    Name(String),

    /// object.field = value
    Field { object: Expression, field: String },

    /// object[index] = value
    Index {
        object: Expression,
        index: Expression,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Binary operation: a + b, a < b, a .. b, etc.
    Binary {
        left: Box<Expression>,
        op: BinaryOp,
        right: Box<Expression>,
    },

    /// Unary operation: not a, -a
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },

    /// Call: f(a, b)
    Call {
        callee: Box<Expression>,
        args: Vec<Expression>,
    },

    /// Field access: t.name
    FieldAccess {
        object: Box<Expression>,
        field: String,
    },

    /// Index access: t[e]
    IndexAccess {
        object: Box<Expression>,
        index: Box<Expression>,
    },

    /// function(params) body end
    FunctionLiteral {
        params: Vec<String>,
        body: Vec<Statement>,
    },

    /// Table constructor: { e1, e2, name = e, [e] = e }
    TableLiteral(Vec<TableItem>),

    /// Literal value
    Literal(Literal),

    /// Name reference (local or global)
    Variable(String),
}

/// One entry of a table constructor
#[derive(Debug, Clone, PartialEq)]
pub enum TableItem {
    /// Positional element, assigned 1-based consecutive indices
    Positional(Expression),

    /// name = value
    Named { key: String, value: Expression },

    /// [key] = value
    Keyed { key: Expression, value: Expression },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,

    // String
    Concat,

    // Comparison
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,

    // Logical
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Nil,
    Bool(bool),
    Number(f64),
    Str(String),
}
