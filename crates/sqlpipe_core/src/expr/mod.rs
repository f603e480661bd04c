//! Scalar computation trees.
//!
//! Every leaf is a column reference or a literal. Trees are immutable once
//! handed to the compiler; rewrites produce new trees.

pub mod call_expr;
pub mod conditional_expr;
pub mod in_list_expr;
pub mod operator_expr;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use self::call_expr::{CallArg, CallExpr};
pub use self::conditional_expr::ConditionalExpr;
pub use self::in_list_expr::{InCandidates, InListExpr};
pub use self::operator_expr::{InfixExpr, InfixOp, PrefixExpr, PrefixOp};
use crate::errors::Result;
use crate::scalar::ScalarValue;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expression {
    /// Identifier referencing a column.
    Column(String),
    Literal(ScalarValue),
    Call(CallExpr),
    Conditional(ConditionalExpr),
    InList(InListExpr),
    Infix(InfixExpr),
    Prefix(PrefixExpr),
}

impl Expression {
    pub fn as_column(&self) -> Option<&str> {
        match self {
            Expression::Column(name) => Some(name),
            _ => None,
        }
    }

    pub fn for_each_child<'a, F>(&'a self, mut func: F) -> Result<()>
    where
        F: FnMut(&'a Expression) -> Result<()>,
    {
        match self {
            Expression::Column(_) | Expression::Literal(_) => (),
            Expression::Call(call) => {
                for arg in &call.args {
                    func(&arg.value)?;
                }
            }
            Expression::Conditional(cond) => {
                func(&cond.condition)?;
                func(&cond.then)?;
                if let Some(otherwise) = &cond.otherwise {
                    func(otherwise)?;
                }
            }
            Expression::InList(in_list) => {
                func(&in_list.expr)?;
                match &in_list.candidates {
                    InCandidates::List(list) => {
                        for item in list {
                            func(item)?;
                        }
                    }
                    InCandidates::Expr(expr) => func(expr)?,
                }
            }
            Expression::Infix(infix) => {
                func(&infix.left)?;
                func(&infix.right)?;
            }
            Expression::Prefix(prefix) => func(&prefix.expr)?,
        }
        Ok(())
    }

    pub fn for_each_child_mut<F>(&mut self, mut func: F) -> Result<()>
    where
        F: FnMut(&mut Expression) -> Result<()>,
    {
        match self {
            Expression::Column(_) | Expression::Literal(_) => (),
            Expression::Call(call) => {
                for arg in &mut call.args {
                    func(&mut arg.value)?;
                }
            }
            Expression::Conditional(cond) => {
                func(&mut cond.condition)?;
                func(&mut cond.then)?;
                if let Some(otherwise) = &mut cond.otherwise {
                    func(otherwise)?;
                }
            }
            Expression::InList(in_list) => {
                func(&mut in_list.expr)?;
                match &mut in_list.candidates {
                    InCandidates::List(list) => {
                        for item in list {
                            func(item)?;
                        }
                    }
                    InCandidates::Expr(expr) => func(expr)?,
                }
            }
            Expression::Infix(infix) => {
                func(&mut infix.left)?;
                func(&mut infix.right)?;
            }
            Expression::Prefix(prefix) => func(&mut prefix.expr)?,
        }
        Ok(())
    }

    /// Names of all columns referenced anywhere in this expression.
    pub fn column_refs(&self) -> Vec<&str> {
        fn inner<'a>(expr: &'a Expression, out: &mut Vec<&'a str>) {
            if let Expression::Column(name) = expr {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
                return;
            }
            let _ = expr.for_each_child(|child| {
                inner(child, out);
                Ok(())
            });
        }

        let mut out = Vec::new();
        inner(self, &mut out);
        out
    }

    /// Rename column references in place.
    pub fn rename_columns(&mut self, from: &str, to: &str) {
        if let Expression::Column(name) = self {
            if name == from {
                *name = to.to_string();
            }
            return;
        }
        let _ = self.for_each_child_mut(|child| {
            child.rename_columns(from, to);
            Ok(())
        });
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Column(name) => write!(f, "{name}"),
            Expression::Literal(ScalarValue::Utf8(s)) => write!(f, "'{s}'"),
            Expression::Literal(v) => write!(f, "{v}"),
            Expression::Call(call) => write!(f, "{call}"),
            Expression::Conditional(cond) => write!(f, "{cond}"),
            Expression::InList(in_list) => write!(f, "{in_list}"),
            Expression::Infix(infix) => write!(f, "{infix}"),
            Expression::Prefix(prefix) => write!(f, "{prefix}"),
        }
    }
}

pub fn col(name: impl Into<String>) -> Expression {
    Expression::Column(name.into())
}

pub fn lit(value: impl Into<ScalarValue>) -> Expression {
    Expression::Literal(value.into())
}

/// Call with positional arguments.
pub fn call(name: impl Into<String>, args: impl IntoIterator<Item = Expression>) -> Expression {
    Expression::Call(CallExpr {
        name: name.into(),
        args: args.into_iter().map(CallArg::positional).collect(),
        window: false,
    })
}

/// Call with explicit (possibly named) arguments.
pub fn call_with_args(name: impl Into<String>, args: Vec<CallArg>) -> Expression {
    Expression::Call(CallExpr {
        name: name.into(),
        args,
        window: false,
    })
}

/// Call explicitly flagged for windowed evaluation.
pub fn window_call(
    name: impl Into<String>,
    args: impl IntoIterator<Item = Expression>,
) -> Expression {
    Expression::Call(CallExpr {
        name: name.into(),
        args: args.into_iter().map(CallArg::positional).collect(),
        window: true,
    })
}

pub fn infix(op: InfixOp, left: Expression, right: Expression) -> Expression {
    Expression::Infix(InfixExpr {
        op,
        left: Box::new(left),
        right: Box::new(right),
    })
}

pub fn and(left: Expression, right: Expression) -> Expression {
    infix(InfixOp::And, left, right)
}

pub fn or(left: Expression, right: Expression) -> Expression {
    infix(InfixOp::Or, left, right)
}

pub fn not(expr: Expression) -> Expression {
    Expression::Prefix(PrefixExpr {
        op: PrefixOp::Not,
        expr: Box::new(expr),
    })
}

pub fn negate(expr: Expression) -> Expression {
    Expression::Prefix(PrefixExpr {
        op: PrefixOp::Negate,
        expr: Box::new(expr),
    })
}

pub fn conditional(condition: Expression, then: Expression, otherwise: Option<Expression>) -> Expression {
    Expression::Conditional(ConditionalExpr {
        condition: Box::new(condition),
        then: Box::new(then),
        otherwise: otherwise.map(Box::new),
    })
}

pub fn in_list(expr: Expression, candidates: impl IntoIterator<Item = Expression>) -> Expression {
    Expression::InList(InListExpr {
        expr: Box::new(expr),
        candidates: InCandidates::List(candidates.into_iter().collect()),
    })
}

pub fn in_expr(expr: Expression, candidates: Expression) -> Expression {
    Expression::InList(InListExpr {
        expr: Box::new(expr),
        candidates: InCandidates::Expr(Box::new(candidates)),
    })
}

/// Descending marker for ordering contexts.
pub fn desc(expr: Expression) -> Expression {
    call("desc", [expr])
}
