use std::fmt;

use serde::{Deserialize, Serialize};

use super::Expression;

/// if <condition> then <then> [else <otherwise>]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalExpr {
    pub condition: Box<Expression>,
    pub then: Box<Expression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otherwise: Option<Box<Expression>>,
}

impl fmt::Display for ConditionalExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "if ({}) {}", self.condition, self.then)?;
        if let Some(otherwise) = &self.otherwise {
            write!(f, " else {otherwise}")?;
        }
        Ok(())
    }
}
