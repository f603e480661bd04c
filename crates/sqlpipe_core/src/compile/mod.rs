//! Compilation of expression trees into SQL fragments.

pub mod functions;

use tracing::warn;

use self::functions::{Arity, FunctionTable, Lookup, SpecialForm, Translation};
use crate::config::SqlConfig;
use crate::dialect::{ConcatStyle, Dialect, SubstringStyle};
use crate::errors::{Result, SqlPipeError};
use crate::escape::{quote_qualified, render_literal};
use crate::expr::{
    CallArg, CallExpr, Expression, InCandidates, InListExpr, InfixOp, PrefixOp,
};
use crate::scalar::ScalarValue;

/// Whether window evaluation is permitted, and the window to use if so.
#[derive(Debug, Clone, Copy)]
pub enum WindowContext<'a> {
    /// Window only functions error, aggregates render without OVER.
    Disallowed,
    /// Aggregates and window functions render with an OVER clause.
    Allowed {
        partition: &'a [String],
        /// Ordering used by order dependent window functions (lag, cumsum).
        order: &'a [Expression],
    },
}

#[derive(Debug, Clone, Copy)]
pub struct CompileContext<'a> {
    pub window: WindowContext<'a>,
    /// Table alias prefixed to every column reference.
    pub qualifier: Option<&'a str>,
}

impl<'a> CompileContext<'a> {
    pub const fn scalar() -> Self {
        CompileContext {
            window: WindowContext::Disallowed,
            qualifier: None,
        }
    }

    pub const fn windowed(partition: &'a [String], order: &'a [Expression]) -> Self {
        CompileContext {
            window: WindowContext::Allowed { partition, order },
            qualifier: None,
        }
    }

    pub const fn qualified(qualifier: &'a str) -> Self {
        CompileContext {
            window: WindowContext::Disallowed,
            qualifier: Some(qualifier),
        }
    }

    /// Context for arguments of a windowed call.
    pub fn without_window(&self) -> Self {
        CompileContext {
            window: WindowContext::Disallowed,
            qualifier: self.qualifier,
        }
    }

    pub fn window_allowed(&self) -> bool {
        matches!(self.window, WindowContext::Allowed { .. })
    }
}

/// Compiles expressions for a single dialect.
///
/// Non-fatal problems (discarded argument names, verbatim fallbacks) are
/// logged and collected in `warnings`.
#[derive(Debug)]
pub struct ExprCompiler<'a> {
    dialect: &'a Dialect,
    config: &'a SqlConfig,
    functions: &'a FunctionTable,
    warnings: Vec<String>,
}

impl<'a> ExprCompiler<'a> {
    pub fn new(dialect: &'a Dialect, config: &'a SqlConfig) -> Self {
        Self::with_functions(dialect, config, FunctionTable::builtin())
    }

    pub fn with_functions(
        dialect: &'a Dialect,
        config: &'a SqlConfig,
        functions: &'a FunctionTable,
    ) -> Self {
        ExprCompiler {
            dialect,
            config,
            functions,
            warnings: Vec::new(),
        }
    }

    pub fn dialect(&self) -> &'a Dialect {
        self.dialect
    }

    pub fn config(&self) -> &'a SqlConfig {
        self.config
    }

    pub fn functions(&self) -> &'a FunctionTable {
        self.functions
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    /// Compile an expression at the top level of a clause.
    pub fn compile(&mut self, expr: &Expression, ctx: &CompileContext) -> Result<String> {
        self.compile_inner(expr, ctx, false)
    }

    /// Compile an expression used as an operand of an enclosing operator.
    pub fn compile_operand(&mut self, expr: &Expression, ctx: &CompileContext) -> Result<String> {
        self.compile_inner(expr, ctx, true)
    }

    /// Compile a key for an ORDER BY list, honoring `desc(x)`.
    pub fn compile_order_key(&mut self, expr: &Expression, ctx: &CompileContext) -> Result<String> {
        match desc_inner(expr) {
            Some(inner) => Ok(format!("{} DESC", self.compile_inner(inner, ctx, true)?)),
            None => self.compile_inner(expr, ctx, true),
        }
    }

    pub fn compile_order_by(
        &mut self,
        keys: &[Expression],
        ctx: &CompileContext,
    ) -> Result<Vec<String>> {
        keys.iter()
            .map(|key| self.compile_order_key(key, ctx))
            .collect()
    }

    pub fn quote(&self, name: &str) -> Result<String> {
        quote_qualified(None, name, self.dialect)
    }

    fn warn(&mut self, msg: String) {
        warn!(dialect = %self.dialect, "{msg}");
        self.warnings.push(msg);
    }

    fn literal(&self, value: &ScalarValue) -> String {
        render_literal(value, self.dialect, self.config.strict_numeric)
    }

    /// `nested` is true when the result becomes an operand of an enclosing
    /// operator, in which case operator forms get one pair of parentheses.
    fn compile_inner(
        &mut self,
        expr: &Expression,
        ctx: &CompileContext,
        nested: bool,
    ) -> Result<String> {
        match expr {
            Expression::Column(name) => quote_qualified(ctx.qualifier, name, self.dialect),
            Expression::Literal(value) => Ok(self.literal(value)),
            Expression::Call(call) => self.compile_call(call, ctx, nested),
            Expression::Conditional(cond) => self.compile_case(
                &cond.condition,
                &cond.then,
                cond.otherwise.as_deref(),
                ctx,
            ),
            Expression::InList(in_list) => self.compile_in_list(in_list, ctx, nested),
            Expression::Infix(infix) => {
                self.compile_infix(infix.op, &infix.left, &infix.right, ctx, nested)
            }
            Expression::Prefix(prefix) => self.compile_prefix(prefix.op, &prefix.expr, ctx),
        }
    }

    fn compile_infix(
        &mut self,
        op: InfixOp,
        left: &Expression,
        right: &Expression,
        ctx: &CompileContext,
        nested: bool,
    ) -> Result<String> {
        let left = self.compile_inner(left, ctx, true)?;
        let right = self.compile_inner(right, ctx, true)?;
        Ok(wrap_if(nested, format!("{left} {} {right}", op.sql())))
    }

    fn compile_prefix(
        &mut self,
        op: PrefixOp,
        expr: &Expression,
        ctx: &CompileContext,
    ) -> Result<String> {
        match op {
            PrefixOp::Not => Ok(format!("NOT({})", self.compile_inner(expr, ctx, false)?)),
            PrefixOp::Negate => {
                let inner = self.compile_inner(expr, ctx, true)?;
                // "--" opens a line comment.
                if inner.starts_with('-') {
                    Ok(format!("-({inner})"))
                } else {
                    Ok(format!("-{inner}"))
                }
            }
        }
    }

    fn compile_case(
        &mut self,
        condition: &Expression,
        then: &Expression,
        otherwise: Option<&Expression>,
        ctx: &CompileContext,
    ) -> Result<String> {
        let mut out = format!(
            "CASE WHEN ({}) THEN ({})",
            self.compile_inner(condition, ctx, false)?,
            self.compile_inner(then, ctx, false)?
        );
        if let Some(otherwise) = otherwise {
            out.push_str(&format!(
                " ELSE ({})",
                self.compile_inner(otherwise, ctx, false)?
            ));
        }
        out.push_str(" END");
        Ok(out)
    }

    fn compile_in_list(
        &mut self,
        in_list: &InListExpr,
        ctx: &CompileContext,
        nested: bool,
    ) -> Result<String> {
        let expr = self.compile_inner(&in_list.expr, ctx, true)?;
        let out = match &in_list.candidates {
            InCandidates::List(list) if list.is_empty() => {
                // Nothing can match an empty set.
                return Ok(self.literal(&ScalarValue::Boolean(false)));
            }
            InCandidates::List(list) => {
                let items = self.compile_args(list.iter(), ctx)?;
                format!("{expr} IN ({})", items.join(", "))
            }
            InCandidates::Expr(other) => {
                format!("{expr} IN {}", self.compile_inner(other, ctx, true)?)
            }
        };
        Ok(wrap_if(nested, out))
    }

    fn compile_args<'e>(
        &mut self,
        args: impl IntoIterator<Item = &'e Expression>,
        ctx: &CompileContext,
    ) -> Result<Vec<String>> {
        args.into_iter()
            .map(|arg| self.compile_inner(arg, ctx, false))
            .collect()
    }

    /// Drop argument names for functions that only take positional
    /// arguments.
    fn positional_args<'c>(&mut self, call: &'c CallExpr) -> Vec<&'c Expression> {
        if call.has_named_args() {
            let names = call
                .args
                .iter()
                .filter_map(|arg| arg.name.as_deref())
                .collect::<Vec<_>>()
                .join(", ");
            self.warn(format!(
                "Named arguments ({names}) ignored for '{}', matching by position",
                call.name
            ));
        }
        call.args.iter().map(|arg| &arg.value).collect()
    }

    fn compile_call(
        &mut self,
        call: &CallExpr,
        ctx: &CompileContext,
        nested: bool,
    ) -> Result<String> {
        let arity = call.args.len();
        let entry = match self.functions.lookup(&call.name, arity) {
            Lookup::Found(entry) => *entry,
            Lookup::WrongArity(expected) => {
                return Err(SqlPipeError::ArityError {
                    name: call.name.clone(),
                    expected: expected
                        .iter()
                        .map(Arity::to_string)
                        .collect::<Vec<_>>()
                        .join(" or "),
                    got: arity,
                });
            }
            Lookup::Unknown => return self.compile_fallback(call, ctx, nested),
        };

        if let Translation::Special(SpecialForm::If) = entry.translation {
            let (condition, then, otherwise) = normalize_if_args(call)?;
            return self.compile_case(condition, then, otherwise, ctx);
        }

        let args = self.positional_args(call);

        match entry.translation {
            Translation::Infix(op) => self.compile_infix(op, args[0], args[1], ctx, nested),
            Translation::Prefix(op) => self.compile_prefix(op, args[0], ctx),
            Translation::Scalar(name) => {
                let args = self.compile_args(args, ctx)?;
                Ok(format!("{name}({})", args.join(", ")))
            }
            Translation::Aggregate(name) => {
                let args = self.compile_args(args, &ctx.without_window())?;
                let body = format!("{name}({})", args.join(", "));
                self.maybe_over(body, ctx, None, false)
            }
            Translation::CountStar => self.maybe_over("COUNT(*)".to_string(), ctx, None, false),
            Translation::Ranking(name) => {
                self.window_only(&call.name, ctx)?;
                let body = format!("{name}()");
                // `row_number()` without an argument follows the query order.
                let order = match args.first() {
                    Some(key) => OrderSource::Key(key),
                    None => OrderSource::Context,
                };
                self.over(body, ctx, Some(order), false)
            }
            Translation::Offset(name) => {
                self.window_only(&call.name, ctx)?;
                let args = self.compile_args(args, &ctx.without_window())?;
                let body = format!("{name}({})", args.join(", "));
                self.over(body, ctx, Some(OrderSource::Context), false)
            }
            Translation::Cumulative(name) => {
                self.window_only(&call.name, ctx)?;
                let args = self.compile_args(args, &ctx.without_window())?;
                let body = format!("{name}({})", args.join(", "));
                self.over(body, ctx, Some(OrderSource::Context), true)
            }
            Translation::Ntile => {
                self.window_only(&call.name, ctx)?;
                let buckets = self.compile_inner(args[1], &ctx.without_window(), false)?;
                let body = format!("NTILE({buckets})");
                self.over(body, ctx, Some(OrderSource::Key(args[0])), false)
            }
            Translation::Special(form) => self.compile_special(form, call, &args, ctx, nested),
        }
    }

    fn compile_special(
        &mut self,
        form: SpecialForm,
        call: &CallExpr,
        args: &[&Expression],
        ctx: &CompileContext,
        nested: bool,
    ) -> Result<String> {
        match form {
            SpecialForm::If => {
                let (condition, then, otherwise) = normalize_if_args(call)?;
                self.compile_case(condition, then, otherwise, ctx)
            }
            SpecialForm::IsNull => Ok(format!(
                "(({}) IS NULL)",
                self.compile_inner(args[0], ctx, false)?
            )),
            SpecialForm::Between => {
                let x = self.compile_inner(args[0], ctx, true)?;
                let lo = self.compile_inner(args[1], ctx, true)?;
                let hi = self.compile_inner(args[2], ctx, true)?;
                Ok(wrap_if(nested, format!("{x} BETWEEN {lo} AND {hi}")))
            }
            SpecialForm::InSet => {
                let candidates = match args[1] {
                    Expression::Call(c) if c.name == "c" => InCandidates::List(
                        c.args.iter().map(|arg| arg.value.clone()).collect(),
                    ),
                    Expression::Literal(v) => {
                        InCandidates::List(vec![Expression::Literal(v.clone())])
                    }
                    other => InCandidates::Expr(Box::new(other.clone())),
                };
                let in_list = InListExpr {
                    expr: Box::new(args[0].clone()),
                    candidates,
                };
                self.compile_in_list(&in_list, ctx, nested)
            }
            SpecialForm::NDistinct => {
                let args = self.compile_args(args.iter().copied(), &ctx.without_window())?;
                let body = format!("COUNT(DISTINCT {})", args.join(", "));
                self.maybe_over(body, ctx, None, false)
            }
            SpecialForm::NullIf => {
                let args = self.compile_args(args.iter().copied(), ctx)?;
                Ok(format!("NULL_IF({})", args.join(", ")))
            }
            SpecialForm::Substr => {
                let start = integer_arg(&call.name, args[1])?;
                let stop = integer_arg(&call.name, args[2])?;
                let length = stop.saturating_sub(start).saturating_add(1).max(0);
                let x = self.compile_inner(args[0], ctx, false)?;
                Ok(match self.dialect.substring {
                    SubstringStyle::Substr => format!("SUBSTR({x}, {start}, {length})"),
                    SubstringStyle::Substring => format!("SUBSTRING({x}, {start}, {length})"),
                    SubstringStyle::FromFor => {
                        format!("SUBSTRING({x} FROM {start} FOR {length})")
                    }
                })
            }
            SpecialForm::Pmin | SpecialForm::Pmax => {
                let name = if form == SpecialForm::Pmin { "MIN" } else { "MAX" };
                let args = self.compile_args(args.iter().copied(), ctx)?;
                Ok(format!("{name}({})", args.join(", ")))
            }
            SpecialForm::LogBase => {
                let x = self.compile_inner(args[0], ctx, false)?;
                let base = self.compile_inner(args[1], ctx, false)?;
                Ok(wrap_if(nested, format!("LOG({x}) / LOG({base})")))
            }
            SpecialForm::Length => Ok(format!(
                "{}({})",
                self.dialect.length_function,
                self.compile_inner(args[0], ctx, false)?
            )),
            SpecialForm::Concat { sep } => {
                let sep = sep.map(|s| self.literal(&ScalarValue::from(s)));
                let operator_concat = self.dialect.concat == ConcatStyle::Operator;
                let mut parts = Vec::with_capacity(args.len() * 2);
                for (idx, arg) in args.iter().enumerate() {
                    if let Some(sep) = sep.as_ref().filter(|_| idx > 0) {
                        parts.push(sep.clone());
                    }
                    parts.push(self.compile_inner(arg, ctx, operator_concat)?);
                }
                Ok(match self.dialect.concat {
                    ConcatStyle::Function => format!("CONCAT({})", parts.join(", ")),
                    ConcatStyle::Operator => wrap_if(nested, parts.join(" || ")),
                })
            }
            SpecialForm::Cast(typ) => Ok(format!(
                "CAST({} AS {typ})",
                self.compile_inner(args[0], ctx, false)?
            )),
            SpecialForm::Desc => Err(SqlPipeError::InvalidArgument {
                function: call.name.clone(),
                reason: "only valid when ordering".to_string(),
            }),
        }
    }

    /// Unknown function. Emitted verbatim unless strict mode is on.
    ///
    /// Arguments are not type checked.
    fn compile_fallback(
        &mut self,
        call: &CallExpr,
        ctx: &CompileContext,
        nested: bool,
    ) -> Result<String> {
        if self.config.strict_sql {
            return Err(SqlPipeError::UnknownFunction {
                name: call.name.clone(),
                arity: call.args.len(),
            });
        }

        let args = self.positional_args(call);

        // `%like%` style infix operators.
        if let Some(op) = custom_infix(&call.name) {
            if args.len() == 2 {
                let left = self.compile_inner(args[0], ctx, true)?;
                let right = self.compile_inner(args[1], ctx, true)?;
                return Ok(wrap_if(nested, format!("{left} {op} {right}")));
            }
        }

        let args = self.compile_args(args, ctx)?;
        Ok(format!("{}({})", call.name, args.join(", ")))
    }

    fn window_only(&self, name: &str, ctx: &CompileContext) -> Result<()> {
        if ctx.window_allowed() {
            Ok(())
        } else {
            Err(SqlPipeError::WindowNotAllowedHere {
                name: name.to_string(),
            })
        }
    }

    /// Attach an OVER clause when windows are allowed, otherwise leave the
    /// aggregate as is.
    fn maybe_over(
        &mut self,
        body: String,
        ctx: &CompileContext,
        order: Option<OrderSource>,
        running: bool,
    ) -> Result<String> {
        if ctx.window_allowed() {
            self.over(body, ctx, order, running)
        } else {
            Ok(body)
        }
    }

    fn over(
        &mut self,
        body: String,
        ctx: &CompileContext,
        order: Option<OrderSource>,
        running: bool,
    ) -> Result<String> {
        let (partition, context_order) = match ctx.window {
            WindowContext::Allowed { partition, order } => (partition, order),
            WindowContext::Disallowed => (&[] as &[String], &[] as &[Expression]),
        };
        let inner = ctx.without_window();

        let mut clauses = Vec::new();
        if !partition.is_empty() {
            let cols = partition
                .iter()
                .map(|p| quote_qualified(ctx.qualifier, p, self.dialect))
                .collect::<Result<Vec<_>>>()?;
            clauses.push(format!("PARTITION BY {}", cols.join(", ")));
        }

        let order_keys = match order {
            Some(OrderSource::Key(key)) => vec![self.compile_order_key(key, &inner)?],
            Some(OrderSource::Context) => self.compile_order_by(context_order, &inner)?,
            None => Vec::new(),
        };
        if !order_keys.is_empty() {
            clauses.push(format!("ORDER BY {}", order_keys.join(", ")));
            if running {
                clauses.push("ROWS UNBOUNDED PRECEDING".to_string());
            }
        }

        Ok(format!("{body} OVER ({})", clauses.join(" ")))
    }
}

#[derive(Debug, Clone, Copy)]
enum OrderSource<'e> {
    /// Order by a call argument.
    Key(&'e Expression),
    /// Order by the ordering of the surrounding query.
    Context,
}

fn wrap_if(nested: bool, s: String) -> String {
    if nested { format!("({s})") } else { s }
}

/// Inner expression of a `desc(x)` call.
pub fn desc_inner(expr: &Expression) -> Option<&Expression> {
    match expr {
        Expression::Call(call) if call.name == "desc" && call.args.len() == 1 => {
            Some(&call.args[0].value)
        }
        _ => None,
    }
}

/// Operator spelled `%op%` that isn't otherwise known.
fn custom_infix(name: &str) -> Option<String> {
    let inner = name.strip_prefix('%')?.strip_suffix('%')?;
    if inner.is_empty() || !inner.chars().all(|c| c.is_ascii_alphabetic() || c == '_') {
        return None;
    }
    Some(inner.to_ascii_uppercase())
}

fn integer_arg(function: &str, expr: &Expression) -> Result<i64> {
    match expr {
        Expression::Literal(ScalarValue::Int64(v)) => Ok(*v),
        Expression::Literal(ScalarValue::Float64(v)) if v.is_finite() && v.fract() == 0.0 => {
            Ok(*v as i64)
        }
        other => Err(SqlPipeError::InvalidArgument {
            function: function.to_string(),
            reason: format!("expected an integer literal, got {other}"),
        }),
    }
}

/// Resolve `if`/`ifelse`/`if_else` arguments to condition, then, else
/// regardless of naming.
fn normalize_if_args(
    call: &CallExpr,
) -> Result<(&Expression, &Expression, Option<&Expression>)> {
    let mut slots: [Option<&Expression>; 3] = [None, None, None];

    let invalid = |reason: String| SqlPipeError::InvalidArgument {
        function: call.name.clone(),
        reason,
    };

    for CallArg { name, value } in &call.args {
        let Some(name) = name else { continue };
        let slot = match name.as_str() {
            "condition" | "test" | "cond" => 0,
            "true" | "yes" | "then" => 1,
            "false" | "no" | "else" => 2,
            other => return Err(invalid(format!("unknown argument name '{other}'"))),
        };
        if slots[slot].is_some() {
            return Err(invalid(format!("argument '{name}' given more than once")));
        }
        slots[slot] = Some(value);
    }

    let mut positional = call
        .args
        .iter()
        .filter(|arg| arg.name.is_none())
        .map(|arg| &arg.value);
    for slot in slots.iter_mut() {
        if slot.is_none() {
            *slot = positional.next();
        }
    }

    match slots {
        [Some(condition), Some(then), otherwise] => Ok((condition, then, otherwise)),
        _ => Err(invalid("missing condition or value".to_string())),
    }
}
