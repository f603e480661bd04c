use std::fmt;

use serde::{Deserialize, Serialize};

use super::Expression;

/// What an IN expression tests membership against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InCandidates {
    /// Literal candidates, rendered as a parenthesized list.
    List(Vec<Expression>),
    /// Some other expression (typically a column), rendered as is.
    Expr(Box<Expression>),
}

/// <expr> IN <candidates>
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InListExpr {
    pub expr: Box<Expression>,
    pub candidates: InCandidates,
}

impl fmt::Display for InListExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} %in% ", self.expr)?;
        match &self.candidates {
            InCandidates::List(list) => {
                write!(f, "c(")?;
                for (idx, item) in list.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            InCandidates::Expr(expr) => write!(f, "{expr}"),
        }
    }
}
