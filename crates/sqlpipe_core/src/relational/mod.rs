//! Lazy relational queries and their rendering into a single SELECT
//! statement.

mod builder;
mod level;
mod window;

use serde::{Deserialize, Serialize};

use self::builder::QueryBuilder;
use crate::config::SqlConfig;
use crate::dialect::Dialect;
use crate::errors::Result;
use crate::expr::Expression;
use crate::ident::Ident;

/// Table a query reads from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub name: String,
    pub columns: Vec<String>,
}

impl TableSource {
    pub fn new(name: impl Into<String>, columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        TableSource {
            schema: None,
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationalOp {
    /// Keep only these columns, optionally renaming them.
    Select(Vec<Ident>),
    /// Rename columns, keeping all of them.
    Rename(Vec<(String, String)>),
    /// Keep rows matching every predicate.
    Filter(Vec<Expression>),
    /// Add or replace columns. Assignments may refer to earlier ones.
    Mutate(Vec<(String, Expression)>),
    /// Collapse each group into one row.
    Summarise(Vec<(String, Expression)>),
    Arrange(Vec<Expression>),
    GroupBy {
        keys: Vec<String>,
        #[serde(default)]
        add: bool,
    },
    Ungroup,
}

/// SQL text plus the columns it yields.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedQuery {
    pub sql: String,
    /// Output column names, in order.
    pub vars: Vec<String>,
    /// Grouping still in effect at the end of the chain.
    pub groups: Vec<String>,
    /// Non-fatal problems found while rendering.
    pub warnings: Vec<String>,
}

/// A chain of relational operations over a table. Nothing is compiled until
/// one of the render methods is called.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LazyQuery {
    pub source: TableSource,
    #[serde(default)]
    pub ops: Vec<RelationalOp>,
}

impl LazyQuery {
    pub fn new(source: TableSource) -> Self {
        LazyQuery {
            source,
            ops: Vec::new(),
        }
    }

    fn push(mut self, op: RelationalOp) -> Self {
        self.ops.push(op);
        self
    }

    pub fn select(self, idents: impl IntoIterator<Item = impl Into<Ident>>) -> Self {
        self.push(RelationalOp::Select(idents.into_iter().map(Into::into).collect()))
    }

    /// Rename columns given `(old, new)` pairs.
    pub fn rename(
        self,
        pairs: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Self {
        self.push(RelationalOp::Rename(
            pairs
                .into_iter()
                .map(|(from, to)| (from.into(), to.into()))
                .collect(),
        ))
    }

    pub fn filter(self, predicates: impl IntoIterator<Item = Expression>) -> Self {
        self.push(RelationalOp::Filter(predicates.into_iter().collect()))
    }

    pub fn mutate(self, assignments: impl IntoIterator<Item = (impl Into<String>, Expression)>) -> Self {
        self.push(RelationalOp::Mutate(
            assignments
                .into_iter()
                .map(|(name, expr)| (name.into(), expr))
                .collect(),
        ))
    }

    pub fn summarise(
        self,
        assignments: impl IntoIterator<Item = (impl Into<String>, Expression)>,
    ) -> Self {
        self.push(RelationalOp::Summarise(
            assignments
                .into_iter()
                .map(|(name, expr)| (name.into(), expr))
                .collect(),
        ))
    }

    pub fn arrange(self, keys: impl IntoIterator<Item = Expression>) -> Self {
        self.push(RelationalOp::Arrange(keys.into_iter().collect()))
    }

    pub fn group_by(self, keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.push(RelationalOp::GroupBy {
            keys: keys.into_iter().map(Into::into).collect(),
            add: false,
        })
    }

    /// Extend the current grouping instead of replacing it.
    pub fn add_group_by(self, keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.push(RelationalOp::GroupBy {
            keys: keys.into_iter().map(Into::into).collect(),
            add: true,
        })
    }

    pub fn ungroup(self) -> Self {
        self.push(RelationalOp::Ungroup)
    }

    /// Render the query as written.
    pub fn render(&self, dialect: &Dialect, config: &SqlConfig) -> Result<RenderedQuery> {
        let mut builder = QueryBuilder::new(dialect, config);
        let state = builder.build(self)?;
        builder.finish(state)
    }

    /// Render an ungrouped version of the query with grouping columns first
    /// and rows ordered by them, followed by any prior ordering.
    pub fn render_group_ordered(
        &self,
        dialect: &Dialect,
        config: &SqlConfig,
    ) -> Result<RenderedQuery> {
        let mut builder = QueryBuilder::new(dialect, config);
        let state = builder.build(self)?;
        let state = builder.group_ordered(state)?;
        builder.finish(state)
    }

    /// Render one row per distinct group key, ordered by the keys.
    pub fn render_labels(&self, dialect: &Dialect, config: &SqlConfig) -> Result<RenderedQuery> {
        let mut builder = QueryBuilder::new(dialect, config);
        let state = builder.build(self)?;
        let state = builder.labels(state)?;
        builder.finish(state)
    }

    /// Output columns at the end of the chain.
    pub fn vars(&self) -> Result<Vec<String>> {
        Ok(self.render(&Dialect::ANSI, &SqlConfig::default())?.vars)
    }

    /// Grouping at the end of the chain.
    pub fn groups(&self) -> Result<Vec<String>> {
        Ok(self.render(&Dialect::ANSI, &SqlConfig::default())?.groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SqlPipeError;
    use crate::expr::{call, col, desc, lit};

    fn table(columns: &[&str]) -> LazyQuery {
        LazyQuery::new(TableSource::new("t", columns.iter().copied()))
    }

    fn render(query: &LazyQuery) -> RenderedQuery {
        query.render(&Dialect::ANSI, &SqlConfig::default()).unwrap()
    }

    #[test]
    fn filter_select_arrange() {
        let query = table(&["a", "b", "c"])
            .filter([call(">", [col("a"), lit(1)])])
            .select(["a", "b"])
            .arrange([desc(col("b"))]);

        let rendered = render(&query);
        assert_eq!(
            r#"SELECT "a", "b" FROM "t" WHERE "a" > 1 ORDER BY "b" DESC"#,
            rendered.sql
        );
        assert_eq!(vec!["a", "b"], rendered.vars);
    }

    #[test]
    fn multiple_predicates() {
        let query = table(&["a", "b"]).filter([
            call(">", [col("a"), lit(1)]),
            call("|", [col("b"), call("is.na", [col("a")])]),
        ]);
        assert_eq!(
            r#"SELECT * FROM "t" WHERE ("a" > 1) AND ("b" OR (("a") IS NULL))"#,
            render(&query).sql
        );
    }

    #[test]
    fn filter_on_computed_column_wraps() {
        let query = table(&["a", "b", "c"])
            .mutate([("d", call("*", [col("a"), lit(2)]))])
            .filter([call(">", [col("d"), lit(10)])]);

        assert_eq!(
            r#"SELECT * FROM (SELECT "a", "b", "c", "a" * 2 AS "d" FROM "t") AS "q01" WHERE "d" > 10"#,
            render(&query).sql
        );
    }

    #[test]
    fn mutate_replaces_in_place() {
        let query = table(&["a", "b"]).mutate([("a", call("+", [col("a"), lit(1)]))]);
        assert_eq!(r#"SELECT "a" + 1 AS "a", "b" FROM "t""#, render(&query).sql);
    }

    #[test]
    fn mutate_referencing_earlier_assignment() {
        let query = table(&["a"]).mutate([
            ("b", call("*", [col("a"), lit(2)])),
            ("c", call("+", [col("b"), lit(1)])),
        ]);
        assert_eq!(
            r#"SELECT "a", "b", "b" + 1 AS "c" FROM (SELECT "a", "a" * 2 AS "b" FROM "t") AS "q01""#,
            render(&query).sql
        );
    }

    #[test]
    fn grouped_summarise() {
        let query = table(&["g", "x"])
            .group_by(["g"])
            .summarise([("m", call("mean", [col("x")]))]);

        let rendered = render(&query);
        assert_eq!(
            r#"SELECT "g", AVG("x") AS "m" FROM "t" GROUP BY "g""#,
            rendered.sql
        );
        assert_eq!(vec!["g", "m"], rendered.vars);
        assert!(rendered.groups.is_empty());
    }

    #[test]
    fn filter_after_summarise_wraps() {
        let query = table(&["g", "x"])
            .group_by(["g"])
            .summarise([("m", call("mean", [col("x")]))])
            .filter([call(">", [col("m"), lit(0)])]);

        assert_eq!(
            r#"SELECT * FROM (SELECT "g", AVG("x") AS "m" FROM "t" GROUP BY "g") AS "q01" WHERE "m" > 0"#,
            render(&query).sql
        );
    }

    #[test]
    fn summarise_rejects_window_functions() {
        let query = table(&["g", "x"])
            .group_by(["g"])
            .summarise([("r", call("rank", [col("x")]))]);
        let err = query.render(&Dialect::ANSI, &SqlConfig::default()).unwrap_err();
        assert!(matches!(err, SqlPipeError::WindowNotAllowedHere { .. }));
    }

    #[test]
    fn grouped_window_mutate() {
        let query = table(&["g", "x"])
            .group_by(["g"])
            .mutate([("r", call("rank", [col("x")]))]);

        assert_eq!(
            r#"SELECT "g", "x", RANK() OVER (PARTITION BY "g" ORDER BY "x") AS "r" FROM "t""#,
            render(&query).sql
        );
    }

    #[test]
    fn ungrouped_aggregate_mutate() {
        let query = table(&["x"]).mutate([("m", call("max", [col("x")]))]);
        assert_eq!(
            r#"SELECT "x", MAX("x") OVER () AS "m" FROM "t""#,
            render(&query).sql
        );
    }

    #[test]
    fn lag_uses_query_order() {
        let query = table(&["t", "x"])
            .arrange([col("t")])
            .mutate([("prev", call("lag", [col("x")]))]);
        assert_eq!(
            r#"SELECT "t", "x", LAG("x") OVER (ORDER BY "t") AS "prev" FROM "t" ORDER BY "t""#,
            render(&query).sql
        );
    }

    #[test]
    fn grouped_window_filter() {
        let query = table(&["g", "x"])
            .group_by(["g"])
            .filter([call(">", [col("x"), call("mean", [col("x")])])]);

        let rendered = render(&query);
        assert_eq!(
            r#"SELECT "g", "x" FROM (SELECT "g", "x", AVG("x") OVER (PARTITION BY "g") AS "win01" FROM "t") AS "q01" WHERE "x" > "win01""#,
            rendered.sql
        );
        assert_eq!(vec!["g", "x"], rendered.vars);
        assert_eq!(vec!["g"], rendered.groups);
    }

    #[test]
    fn emulated_grouped_aggregate() {
        let query = table(&["g", "x"])
            .group_by(["g"])
            .mutate([("m", call("mean", [col("x")]))]);

        let rendered = query
            .render(&Dialect::MYSQL_57, &SqlConfig::default())
            .unwrap();
        assert!(!rendered.sql.contains("OVER"), "{}", rendered.sql);
        assert!(rendered.sql.contains(
            "LEFT JOIN (SELECT `g`, AVG(`x`) AS `win01` FROM (SELECT * FROM `t`) AS `q01` GROUP BY `g`) AS `RHS`"
        ));
        assert!(rendered.sql.contains(
            "ON (`LHS`.`g` = `RHS`.`g` OR (`LHS`.`g` IS NULL AND `RHS`.`g` IS NULL))"
        ));
        assert!(rendered.sql.starts_with("SELECT `g`, `x`, `win01` AS `m` FROM"));
        assert_eq!(vec!["g", "x", "m"], rendered.vars);
    }

    #[test]
    fn rename_onto_existing_column() {
        let query = table(&["a", "b"]).rename([("a", "b")]);
        let err = query.render(&Dialect::ANSI, &SqlConfig::default()).unwrap_err();
        assert!(matches!(err, SqlPipeError::InvalidArgument { .. }));

        let query = table(&["a", "b", "c"]).rename([("a", "d"), ("b", "d")]);
        let err = query.render(&Dialect::ANSI, &SqlConfig::default()).unwrap_err();
        assert!(matches!(err, SqlPipeError::InvalidArgument { .. }));

        let swapped = table(&["a", "b"]).rename([("a", "b"), ("b", "a")]);
        assert_eq!(vec!["b", "a"], render(&swapped).vars);
    }

    #[test]
    fn distinct_count_joined_even_with_windows() {
        let query = table(&["g", "x"])
            .group_by(["g"])
            .mutate([("k", call("n_distinct", [col("x")]))]);

        let rendered = render(&query);
        assert!(!rendered.sql.contains("OVER"), "{}", rendered.sql);
        assert!(rendered.sql.contains(r#"COUNT(DISTINCT "x") AS "win01""#), "{}", rendered.sql);
        assert!(rendered.sql.contains("LEFT JOIN"), "{}", rendered.sql);
        assert_eq!(vec!["g", "x", "k"], rendered.vars);
        assert_eq!(vec!["g"], rendered.groups);
    }

    #[test]
    fn distinct_count_beside_native_window() {
        let total = call("+", [call("n_distinct", [col("x")]), call("sum", [col("x")])]);
        let query = table(&["g", "x"]).group_by(["g"]).mutate([("k", total)]);

        let sql = render(&query).sql;
        assert!(sql.contains(r#"COUNT(DISTINCT "x")"#), "{sql}");
        assert!(sql.contains(r#"SUM("x") OVER (PARTITION BY "g")"#), "{sql}");
        assert!(!sql.contains("COUNT(DISTINCT \"x\") OVER"), "{sql}");
    }

    #[test]
    fn emulated_rank() {
        let query = table(&["g", "x"])
            .group_by(["g"])
            .mutate([("r", call("rank", [desc(col("x"))]))]);

        let rendered = query
            .render(&Dialect::MYSQL_57, &SqlConfig::default())
            .unwrap();
        assert!(rendered.sql.contains(
            "(SELECT COUNT(*) FROM (SELECT * FROM `t`) AS `RNK` WHERE (`RNK`.`g` = `LHS`.`g` OR (`RNK`.`g` IS NULL AND `LHS`.`g` IS NULL)) AND `RNK`.`x` > `LHS`.`x`) + 1 AS `win01`"
        ), "{}", rendered.sql);
        assert_eq!(vec!["g", "x", "r"], rendered.vars);
    }

    #[test]
    fn emulation_unsupported() {
        let query = table(&["x"]).mutate([("prev", call("lag", [col("x")]))]);
        let err = query
            .render(&Dialect::MYSQL_57, &SqlConfig::default())
            .unwrap_err();
        assert!(matches!(
            err,
            SqlPipeError::UnsupportedWindowEmulation { ref name, .. } if name == "lag"
        ));
    }

    #[test]
    fn select_keeps_grouping_columns() {
        let query = table(&["g", "x", "y"]).group_by(["g"]).select(["x"]);
        let rendered = render(&query);
        assert_eq!(r#"SELECT "g", "x" FROM "t""#, rendered.sql);
        assert_eq!(vec!["g", "x"], rendered.vars);
    }

    #[test]
    fn select_unknown_column() {
        let query = table(&["a"]).select(["b"]);
        let err = query.render(&Dialect::ANSI, &SqlConfig::default()).unwrap_err();
        assert!(matches!(err, SqlPipeError::UnknownColumn { ref name, .. } if name == "b"));
    }

    #[test]
    fn filter_unknown_column() {
        let query = table(&["a"]).filter([call("==", [col("b"), lit(1)])]);
        let err = query.render(&Dialect::ANSI, &SqlConfig::default()).unwrap_err();
        assert!(matches!(err, SqlPipeError::UnknownColumn { .. }));
    }

    #[test]
    fn rename_carries_groups_and_order() {
        let query = table(&["a", "b"])
            .group_by(["a"])
            .arrange([col("a")])
            .rename([("a", "c")]);

        let rendered = render(&query);
        assert_eq!(r#"SELECT "a" AS "c", "b" FROM "t" ORDER BY "c""#, rendered.sql);
        assert_eq!(vec!["c"], rendered.groups);
        assert_eq!(vec!["c", "b"], rendered.vars);
    }

    #[test]
    fn swap_names() {
        let query = table(&["a", "b"])
            .arrange([col("a")])
            .select([Ident::with_alias("a", "b"), Ident::with_alias("b", "a")]);
        assert_eq!(
            r#"SELECT "a" AS "b", "b" AS "a" FROM "t" ORDER BY "b""#,
            render(&query).sql
        );
    }

    #[test]
    fn select_drops_orphaned_ordering() {
        let query = table(&["a", "b"]).arrange([col("b")]).select(["a"]);
        let rendered = render(&query);
        assert_eq!(r#"SELECT "a" FROM "t""#, rendered.sql);
        assert_eq!(1, rendered.warnings.len());
    }

    #[test]
    fn ordering_by_expression_over_computed_column() {
        let query = table(&["a"])
            .mutate([("d", call("*", [col("a"), lit(2)]))])
            .arrange([call("+", [col("d"), lit(1)])]);
        assert_eq!(
            r#"SELECT * FROM (SELECT "a", "a" * 2 AS "d" FROM "t") AS "q01" ORDER BY ("d" + 1)"#,
            render(&query).sql
        );
    }

    #[test]
    fn ungroup_keeps_order() {
        let query = table(&["g", "x"])
            .arrange([col("x")])
            .group_by(["g"])
            .ungroup()
            .select(["x"]);
        let rendered = render(&query);
        assert_eq!(r#"SELECT "x" FROM "t" ORDER BY "x""#, rendered.sql);
        assert!(rendered.groups.is_empty());
    }

    #[test]
    fn add_group_by() {
        let query = table(&["a", "b", "c"]).group_by(["a"]).add_group_by(["b", "a"]);
        assert_eq!(vec!["a", "b"], query.groups().unwrap());
    }

    #[test]
    fn group_ordered_rendering() {
        let query = table(&["x", "g", "y"]).group_by(["g"]).arrange([col("y")]);
        let rendered = query
            .render_group_ordered(&Dialect::ANSI, &SqlConfig::default())
            .unwrap();
        assert_eq!(
            r#"SELECT "g", "x", "y" FROM "t" ORDER BY "g", "y""#,
            rendered.sql
        );
        assert_eq!(vec!["g"], rendered.groups);
    }

    #[test]
    fn label_rendering() {
        let query = table(&["a", "g"])
            .filter([call(">", [col("a"), lit(1)])])
            .group_by(["g"]);
        let rendered = query
            .render_labels(&Dialect::ANSI, &SqlConfig::default())
            .unwrap();
        assert_eq!(
            r#"SELECT "g" FROM "t" WHERE "a" > 1 GROUP BY "g" ORDER BY "g""#,
            rendered.sql
        );
        assert_eq!(vec!["g"], rendered.vars);
    }

    #[test]
    fn labels_require_grouping() {
        let query = table(&["a"]);
        query
            .render_labels(&Dialect::ANSI, &SqlConfig::default())
            .unwrap_err();
    }

    #[test]
    fn plan_from_json() {
        let plan = r#"{
            "source": {"name": "t", "columns": ["g", "x"]},
            "ops": [
                {"group_by": {"keys": ["g"]}},
                {"summarise": [["n", {"call": {"name": "n"}}]]}
            ]
        }"#;
        let query: LazyQuery = serde_json::from_str(plan).unwrap();
        assert_eq!(
            r#"SELECT "g", COUNT(*) AS "n" FROM "t" GROUP BY "g""#,
            render(&query).sql
        );
    }
}
