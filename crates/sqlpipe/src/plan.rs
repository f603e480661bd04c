use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlpipe_core::config::SqlConfig;
use sqlpipe_core::dialect::Backend;
use sqlpipe_core::relational::LazyQuery;

/// A query plan as stored on disk.
///
/// ```json
/// {
///   "dialect": "postgres",
///   "config": {"strict_sql": true},
///   "source": {"name": "t", "columns": ["g", "x"]},
///   "ops": [{"group_by": {"keys": ["g"]}}]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialect: Option<Backend>,
    #[serde(default)]
    pub config: SqlConfig,
    #[serde(flatten)]
    pub query: LazyQuery,
}

impl PlanFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read plan file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid plan file {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use sqlpipe_core::dialect::Dialect;

    use super::*;

    #[test]
    fn bare_query() {
        let plan = PlanFile::parse(r#"{"source": {"name": "t", "columns": ["a"]}}"#).unwrap();
        assert_eq!(None, plan.dialect);
        assert_eq!(SqlConfig::default(), plan.config);
        assert_eq!(
            r#"SELECT * FROM "t""#,
            plan.query.render(&Dialect::ANSI, &plan.config).unwrap().sql
        );
    }

    #[test]
    fn dialect_and_config() {
        let plan = PlanFile::parse(
            r#"{
                "dialect": "mysql",
                "config": {"chunk_size": 50},
                "source": {"name": "t", "columns": ["a"]},
                "ops": [{"select": [{"name": "a"}]}]
            }"#,
        )
        .unwrap();
        assert_eq!(Some(Backend::MySql), plan.dialect);
        assert_eq!(50, plan.config.chunk_size);
        assert!(!plan.config.strict_sql);
    }

    #[test]
    fn unknown_dialect() {
        PlanFile::parse(r#"{"dialect": "oracle", "source": {"name": "t", "columns": []}}"#)
            .unwrap_err();
    }
}
