//! Window evaluation inside grouped mutate and filter, including subquery
//! emulation for backends without window functions.
//!
//! Emulation joins every row back to a grouped aggregate of its own source
//! (`LHS`/`RHS`), or counts preceding rows with a correlated subquery for
//! ranks. Results match native evaluation when ordering values are not NULL.

use super::builder::{BuildState, QueryBuilder};
use super::level::{FromItem, JOIN_LEFT_ALIAS, JOIN_RIGHT_ALIAS, SelectItem, SelectLevel};
use crate::compile::functions::{SpecialForm, Translation};
use crate::compile::{CompileContext, desc_inner};
use crate::errors::{Result, SqlPipeError};
use crate::escape::{quote_identifier, quote_qualified};
use crate::expr::Expression;
use crate::ident::Ident;

const RANK_ALIAS: &str = "RNK";

impl QueryBuilder<'_> {
    /// Call evaluated over a window when used in mutate or filter.
    fn is_window_call(&self, expr: &Expression) -> bool {
        let Expression::Call(call) = expr else {
            return false;
        };
        if call.window {
            return true;
        }
        self.compiler
            .functions()
            .translation(&call.name, call.args.len())
            .is_some_and(|t| t.is_aggregate() || t.is_window_only())
    }

    /// Window call no backend accepts with OVER (`COUNT(DISTINCT ..)`), always
    /// evaluated through a grouped join.
    fn is_join_only(&self, expr: &Expression) -> bool {
        let Expression::Call(call) = expr else {
            return false;
        };
        matches!(
            self.compiler
                .functions()
                .translation(&call.name, call.args.len()),
            Some(Translation::Special(SpecialForm::NDistinct))
        )
    }

    pub(super) fn needs_join(&self, expr: &Expression) -> bool {
        if self.is_join_only(expr) {
            return true;
        }
        let mut found = false;
        let _ = expr.for_each_child(|child| {
            found = found || self.needs_join(child);
            Ok(())
        });
        found
    }

    pub(super) fn needs_window(&self, expr: &Expression) -> bool {
        if self.is_window_call(expr) {
            return true;
        }
        let mut found = false;
        let _ = expr.for_each_child(|child| {
            found = found || self.needs_window(child);
            Ok(())
        });
        found
    }

    /// Replace outermost window calls with references to temporary columns,
    /// returning the rewritten expression.
    fn extract_windows(
        &mut self,
        expr: &Expression,
        temps: &mut Vec<(String, Expression)>,
    ) -> Result<Expression> {
        let mut expr = expr.clone();
        self.extract_into(&mut expr, temps)?;
        Ok(expr)
    }

    fn extract_into(
        &mut self,
        expr: &mut Expression,
        temps: &mut Vec<(String, Expression)>,
    ) -> Result<()> {
        if self.is_window_call(expr) {
            let temp = self.next_temp();
            let call = std::mem::replace(expr, Expression::Column(temp.clone()));
            temps.push((temp, call));
            return Ok(());
        }
        expr.for_each_child_mut(|child| self.extract_into(child, temps))
    }

    /// Filter on a windowed predicate: materialize the window values as
    /// columns, filter in an outer query, then drop the columns again.
    pub(super) fn filter_windowed(
        &mut self,
        state: BuildState,
        predicate: &Expression,
    ) -> Result<BuildState> {
        let vars = state.vars();
        let mut temps = Vec::new();
        let rewritten = self.extract_windows(predicate, &mut temps)?;

        let state = self.materialize_windows(state, &temps)?;
        let state = self.filter(state, &rewritten)?;
        self.select_names(state, &vars)
    }

    pub(super) fn mutate_emulated(
        &mut self,
        state: BuildState,
        name: &str,
        expr: &Expression,
    ) -> Result<BuildState> {
        let mut vars = state.vars();
        if !vars.iter().any(|v| v == name) {
            vars.push(name.to_string());
        }

        let mut temps = Vec::new();
        let rewritten = self.extract_windows(expr, &mut temps)?;

        let state = self.materialize_windows(state, &temps)?;
        let state = self.mutate(state, name, &rewritten)?;
        self.select_names(state, &vars)
    }

    fn select_names(&mut self, state: BuildState, names: &[String]) -> Result<BuildState> {
        let idents: Vec<Ident> = names.iter().map(|n| Ident::new(n.as_str())).collect();
        self.select(state, &idents)
    }

    /// Add one column per extracted window call. Native OVER where the
    /// backend allows it, the grouped join otherwise.
    fn materialize_windows(
        &mut self,
        state: BuildState,
        temps: &[(String, Expression)],
    ) -> Result<BuildState> {
        if !self.dialect().supports_window_functions() {
            return self.emulate_windows(state, temps);
        }

        let (joined, native): (Vec<_>, Vec<_>) = temps
            .iter()
            .cloned()
            .partition(|(_, expr)| self.needs_join(expr));
        let state = if joined.is_empty() {
            state
        } else {
            self.emulate_windows(state, &joined)?
        };
        native
            .iter()
            .try_fold(state, |state, (temp, expr)| self.mutate(state, temp, expr))
    }

    /// Produce a level exposing the current columns plus one column per
    /// window call, without using OVER.
    fn emulate_windows(
        &mut self,
        state: BuildState,
        temps: &[(String, Expression)],
    ) -> Result<BuildState> {
        let dialect = self.dialect();
        let vars = state.vars();
        let groups = state.groups.clone();
        let source_sql = state.level.render(dialect)?;

        let mut aggregates = Vec::new();
        let mut ranks = Vec::new();
        for (temp, expr) in temps {
            let Expression::Call(call) = expr else {
                continue;
            };
            let translation = self
                .compiler
                .functions()
                .translation(&call.name, call.args.len());
            match translation {
                Some(t) if t.is_aggregate() => {
                    let sql = self.compiler.compile(expr, &CompileContext::scalar())?;
                    aggregates.push(SelectItem::computed(temp.as_str(), sql));
                }
                Some(Translation::Ranking(func @ ("RANK" | "DENSE_RANK"))) => {
                    let sql = self.correlated_rank(
                        &source_sql,
                        func == "DENSE_RANK",
                        &call.args[0].value,
                        &groups,
                    )?;
                    ranks.push(SelectItem::computed(temp.as_str(), sql));
                }
                _ => {
                    return Err(SqlPipeError::UnsupportedWindowEmulation {
                        name: call.name.clone(),
                        dialect: dialect.name,
                    });
                }
            }
        }

        let mut items: Vec<SelectItem> = vars
            .iter()
            .map(|v| SelectItem::qualified(JOIN_LEFT_ALIAS, v.as_str()))
            .collect();

        let BuildState { level, order, .. } = state;
        let from = if aggregates.is_empty() {
            FromItem::Subquery {
                level: Box::new(level),
                alias: JOIN_LEFT_ALIAS.to_string(),
            }
        } else {
            items.extend(
                aggregates
                    .iter()
                    .map(|agg| SelectItem::qualified(JOIN_RIGHT_ALIAS, agg.name.as_str())),
            );

            let mut rhs = SelectLevel::identity(
                FromItem::Subquery {
                    level: Box::new(level.clone()),
                    alias: self.next_alias(),
                },
                vars.clone(),
            );
            rhs.items = groups
                .iter()
                .map(|g| SelectItem::column(g.as_str()))
                .chain(aggregates)
                .collect();
            rhs.group_by = groups.clone();
            rhs.aggregated = true;

            let on = match self.key_matches(JOIN_LEFT_ALIAS, JOIN_RIGHT_ALIAS, &groups)? {
                matches if matches.is_empty() => "1 = 1".to_string(),
                matches => matches.join(" AND "),
            };

            FromItem::Join {
                left: Box::new(level),
                right: Box::new(rhs),
                on,
            }
        };
        items.extend(ranks);

        let mut level = SelectLevel::identity(from, vars);
        level.items = items;

        Ok(BuildState {
            level,
            groups,
            order,
        })
    }

    /// `(SELECT COUNT(*) FROM (source) AS "RNK" WHERE <same group> AND
    /// "RNK".key < "LHS".key) + 1`
    fn correlated_rank(
        &mut self,
        source_sql: &str,
        dense: bool,
        key: &Expression,
        groups: &[String],
    ) -> Result<String> {
        let (key, cmp) = match desc_inner(key) {
            Some(inner) => (inner, ">"),
            None => (key, "<"),
        };

        let inner_key = self
            .compiler
            .compile_operand(key, &CompileContext::qualified(RANK_ALIAS))?;
        let outer_key = self
            .compiler
            .compile_operand(key, &CompileContext::qualified(JOIN_LEFT_ALIAS))?;

        let count = if dense {
            format!("COUNT(DISTINCT {inner_key})")
        } else {
            "COUNT(*)".to_string()
        };

        let mut conditions = self.key_matches(RANK_ALIAS, JOIN_LEFT_ALIAS, groups)?;
        conditions.push(format!("{inner_key} {cmp} {outer_key}"));

        Ok(format!(
            "(SELECT {count} FROM ({source_sql}) AS {} WHERE {}) + 1",
            quote_identifier(RANK_ALIAS, self.dialect())?,
            conditions.join(" AND ")
        ))
    }

    /// NULL-safe equality of each group key between two aliases.
    fn key_matches(&self, left: &str, right: &str, groups: &[String]) -> Result<Vec<String>> {
        let dialect = self.dialect();
        groups
            .iter()
            .map(|g| {
                let l = quote_qualified(Some(left), g, dialect)?;
                let r = quote_qualified(Some(right), g, dialect)?;
                Ok(format!("({l} = {r} OR ({l} IS NULL AND {r} IS NULL))"))
            })
            .collect()
    }
}
