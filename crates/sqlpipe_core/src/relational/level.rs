//! A single SELECT level of a query being built.

use std::fmt::Write as _;

use crate::dialect::Dialect;
use crate::errors::Result;
use crate::escape::{quote_identifier, quote_qualified};

#[derive(Debug, Clone, PartialEq)]
pub enum FromItem {
    Table {
        schema: Option<String>,
        name: String,
    },
    Subquery {
        level: Box<SelectLevel>,
        alias: String,
    },
    /// `(left) AS "LHS" LEFT JOIN (right) AS "RHS" ON <on>`
    Join {
        left: Box<SelectLevel>,
        right: Box<SelectLevel>,
        on: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemExpr {
    /// Column taken from the FROM item, possibly renamed by the item's name.
    Column {
        qualifier: Option<String>,
        name: String,
    },
    /// Compiled SQL fragment.
    Computed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub name: String,
    pub expr: ItemExpr,
}

impl SelectItem {
    pub fn column(name: impl Into<String>) -> Self {
        let name = name.into();
        SelectItem {
            expr: ItemExpr::Column {
                qualifier: None,
                name: name.clone(),
            },
            name,
        }
    }

    pub fn qualified(qualifier: &str, name: impl Into<String>) -> Self {
        let name = name.into();
        SelectItem {
            expr: ItemExpr::Column {
                qualifier: Some(qualifier.to_string()),
                name: name.clone(),
            },
            name,
        }
    }

    pub fn computed(name: impl Into<String>, sql: String) -> Self {
        SelectItem {
            name: name.into(),
            expr: ItemExpr::Computed(sql),
        }
    }

    /// Item passes an unqualified source column through under its own name.
    ///
    /// Only identity items can be referenced by other clauses of the same
    /// level.
    pub fn is_identity(&self) -> bool {
        matches!(&self.expr, ItemExpr::Column { qualifier: None, name } if *name == self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectLevel {
    pub from: FromItem,
    /// Columns made available by `from`.
    pub from_vars: Vec<String>,
    pub items: Vec<SelectItem>,
    /// Compiled WHERE predicates, combined with AND.
    pub filters: Vec<String>,
    pub group_by: Vec<String>,
    /// Level has a GROUP BY, output rows no longer map to input rows.
    pub aggregated: bool,
    /// Level computes window functions.
    pub windowed: bool,
}

impl SelectLevel {
    /// Select every column of `from` unchanged.
    pub fn identity(from: FromItem, vars: Vec<String>) -> Self {
        SelectLevel {
            from,
            items: vars.iter().cloned().map(SelectItem::column).collect(),
            from_vars: vars,
            filters: Vec::new(),
            group_by: Vec::new(),
            aggregated: false,
            windowed: false,
        }
    }

    pub fn output_names(&self) -> Vec<String> {
        self.items.iter().map(|item| item.name.clone()).collect()
    }

    pub fn item(&self, name: &str) -> Option<&SelectItem> {
        self.items.iter().find(|item| item.name == name)
    }

    pub fn is_joined(&self) -> bool {
        matches!(self.from, FromItem::Join { .. })
    }

    /// Whether every referenced name can be used directly in a clause of
    /// this level.
    pub fn can_reference<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> bool {
        names
            .into_iter()
            .all(|name| self.item(name).is_some_and(SelectItem::is_identity))
    }

    /// A level that only selects and filters source columns.
    pub fn is_plain(&self) -> bool {
        !self.aggregated
            && !self.windowed
            && !self.is_joined()
            && self.items.iter().all(SelectItem::is_identity)
    }

    /// Insert or replace an output item, keeping the position of a replaced
    /// item.
    pub fn set_item(&mut self, item: SelectItem) {
        match self.items.iter_mut().find(|existing| existing.name == item.name) {
            Some(existing) => *existing = item,
            None => self.items.push(item),
        }
    }

    fn selects_all(&self) -> bool {
        self.items.len() == self.from_vars.len()
            && self
                .items
                .iter()
                .zip(&self.from_vars)
                .all(|(item, var)| item.is_identity() && item.name == *var)
    }

    pub fn render(&self, dialect: &Dialect) -> Result<String> {
        let mut sql = String::from("SELECT ");

        if self.selects_all() && !self.items.is_empty() {
            sql.push('*');
        } else {
            for (idx, item) in self.items.iter().enumerate() {
                if idx > 0 {
                    sql.push_str(", ");
                }
                let name = quote_identifier(&item.name, dialect)?;
                match &item.expr {
                    ItemExpr::Column { qualifier, name: source } => {
                        sql.push_str(&quote_qualified(qualifier.as_deref(), source, dialect)?);
                        if *source != item.name {
                            write!(sql, " AS {name}")?;
                        }
                    }
                    ItemExpr::Computed(expr) => write!(sql, "{expr} AS {name}")?,
                }
            }
        }

        sql.push_str(" FROM ");
        self.from.write_sql(dialect, &mut sql)?;

        match self.filters.as_slice() {
            [] => (),
            [filter] => write!(sql, " WHERE {filter}")?,
            filters => {
                sql.push_str(" WHERE ");
                for (idx, filter) in filters.iter().enumerate() {
                    if idx > 0 {
                        sql.push_str(" AND ");
                    }
                    write!(sql, "({filter})")?;
                }
            }
        }

        if !self.group_by.is_empty() {
            let keys = self
                .group_by
                .iter()
                .map(|key| quote_identifier(key, dialect))
                .collect::<Result<Vec<_>>>()?;
            write!(sql, " GROUP BY {}", keys.join(", "))?;
        }

        Ok(sql)
    }
}

pub const JOIN_LEFT_ALIAS: &str = "LHS";
pub const JOIN_RIGHT_ALIAS: &str = "RHS";

impl FromItem {
    fn write_sql(&self, dialect: &Dialect, sql: &mut String) -> Result<()> {
        match self {
            FromItem::Table { schema, name } => {
                sql.push_str(&quote_qualified(schema.as_deref(), name, dialect)?);
            }
            FromItem::Subquery { level, alias } => {
                write!(
                    sql,
                    "({}) AS {}",
                    level.render(dialect)?,
                    quote_identifier(alias, dialect)?
                )?;
            }
            FromItem::Join { left, right, on } => {
                write!(
                    sql,
                    "({}) AS {} LEFT JOIN ({}) AS {} ON {on}",
                    left.render(dialect)?,
                    quote_identifier(JOIN_LEFT_ALIAS, dialect)?,
                    right.render(dialect)?,
                    quote_identifier(JOIN_RIGHT_ALIAS, dialect)?,
                )?;
            }
        }
        Ok(())
    }
}
