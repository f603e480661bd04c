use std::fmt;

use serde::{Deserialize, Serialize};

use super::Expression;

/// Binary operators with a direct SQL spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfixOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

impl InfixOp {
    pub fn sql(&self) -> &'static str {
        match self {
            InfixOp::Add => "+",
            InfixOp::Sub => "-",
            InfixOp::Mul => "*",
            InfixOp::Div => "/",
            InfixOp::Mod => "%",
            InfixOp::Eq => "=",
            InfixOp::NotEq => "!=",
            InfixOp::Lt => "<",
            InfixOp::LtEq => "<=",
            InfixOp::Gt => ">",
            InfixOp::GtEq => ">=",
            InfixOp::And => "AND",
            InfixOp::Or => "OR",
        }
    }

    /// Map an operator name as written by clients (`==`, `&`, `%%`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "+" => InfixOp::Add,
            "-" => InfixOp::Sub,
            "*" => InfixOp::Mul,
            "/" => InfixOp::Div,
            "%%" => InfixOp::Mod,
            "==" => InfixOp::Eq,
            "!=" => InfixOp::NotEq,
            "<" => InfixOp::Lt,
            "<=" => InfixOp::LtEq,
            ">" => InfixOp::Gt,
            ">=" => InfixOp::GtEq,
            "&" | "&&" => InfixOp::And,
            "|" | "||" => InfixOp::Or,
            _ => return None,
        })
    }
}

impl fmt::Display for InfixOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrefixOp {
    Not,
    Negate,
}

impl PrefixOp {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "!" => Some(PrefixOp::Not),
            "-" => Some(PrefixOp::Negate),
            _ => None,
        }
    }
}

/// <left> <op> <right>
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfixExpr {
    pub op: InfixOp,
    pub left: Box<Expression>,
    pub right: Box<Expression>,
}

impl fmt::Display for InfixExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {} {})", self.left, self.op, self.right)
    }
}

/// <op> <expr>
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefixExpr {
    pub op: PrefixOp,
    pub expr: Box<Expression>,
}

impl fmt::Display for PrefixExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op {
            PrefixOp::Not => write!(f, "!{}", self.expr),
            PrefixOp::Negate => write!(f, "-{}", self.expr),
        }
    }
}
