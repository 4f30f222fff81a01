use std::collections::BTreeSet;

use crate::types::Value;

/// Prefix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Arithmetic negation, `-x`.
    Neg,
    /// Boolean negation, `not x` or `~x`.
    Not,
}

impl UnaryOp {
    /// Source spelling used in error messages.
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "not",
        }
    }
}

/// Infix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+`; also concatenates two strings.
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`, always producing a float.
    Div,
    /// `//`, rounding towards negative infinity.
    FloorDiv,
    /// `%`, taking the sign of the divisor.
    Mod,
    /// `**`, right associative.
    Pow,
    /// `==`
    Eq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
    /// `and`, `&` or `&&`
    And,
    /// `or`, `|` or `||`
    Or,
}

impl BinaryOp {
    /// Source spelling used in error messages.
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }
}

/// Restricted syntax tree: literals, column references and operators only.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// A constant, broadcast to every row.
    Literal(Value),
    /// A column of the dataset, by name.
    Column(String),
    /// A prefix operator applied to one operand.
    Unary {
        /// The operator.
        op: UnaryOp,
        /// Its operand.
        operand: Box<Node>,
    },
    /// An infix operator applied to two operands.
    Binary {
        /// The operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<Node>,
        /// Right operand.
        right: Box<Node>,
    },
}

impl Node {
    pub(crate) fn binary(op: BinaryOp, left: Node, right: Node) -> Self {
        Node::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Collects the names of every referenced column.
    pub fn columns(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Node::Literal(_) => {}
            Node::Column(name) => {
                out.insert(name.as_str());
            }
            Node::Unary { operand, .. } => operand.collect_columns(out),
            Node::Binary { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
        }
    }
}
