use std::fmt;

use serde::{Deserialize, Serialize};

use super::Expression;

/// A single, possibly named, argument to a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallArg {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub value: Expression,
}

impl CallArg {
    pub fn positional(value: Expression) -> Self {
        CallArg { name: None, value }
    }

    pub fn named(name: impl Into<String>, value: Expression) -> Self {
        CallArg {
            name: Some(name.into()),
            value,
        }
    }
}

impl fmt::Display for CallArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} = {}", self.value),
            None => write!(f, "{}", self.value),
        }
    }
}

/// Function call by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallExpr {
    pub name: String,
    #[serde(default)]
    pub args: Vec<CallArg>,
    /// Call should be evaluated over a window rather than as a per row or
    /// collapsing aggregate.
    #[serde(default)]
    pub window: bool,
}

impl CallExpr {
    pub fn has_named_args(&self) -> bool {
        self.args.iter().any(|arg| arg.name.is_some())
    }
}

impl fmt::Display for CallExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (idx, arg) in self.args.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ")")
    }
}
