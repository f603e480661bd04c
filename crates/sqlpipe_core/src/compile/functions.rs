//! Translation table for function calls, keyed by name and arity.

use std::fmt;
use std::sync::LazyLock;

use hashbrown::HashMap;

use crate::expr::{InfixOp, PrefixOp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arity {
    Exact(usize),
    /// Inclusive range.
    Range(usize, usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(&self, n: usize) -> bool {
        match self {
            Arity::Exact(a) => n == *a,
            Arity::Range(min, max) => n >= *min && n <= *max,
            Arity::AtLeast(min) => n >= *min,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{n}"),
            Arity::Range(min, max) => write!(f, "{min} to {max}"),
            Arity::AtLeast(min) => write!(f, "at least {min}"),
        }
    }
}

/// Calls with dedicated compilation rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialForm {
    /// `if`, `ifelse`, `if_else`
    If,
    /// `is.na`, `is.null`
    IsNull,
    Between,
    /// `%in%`, `in`
    InSet,
    NDistinct,
    NullIf,
    Substr,
    Pmin,
    Pmax,
    /// Two argument `log`.
    LogBase,
    /// String length, spelled per dialect.
    Length,
    /// String concatenation with an optional separator literal.
    Concat { sep: Option<&'static str> },
    /// `CAST(x AS <type>)`
    Cast(&'static str),
    /// Descending marker, only valid in ordering contexts.
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Translation {
    /// Per row function, `NAME(args)`.
    Scalar(&'static str),
    /// Aggregate, `NAME(args)`. Windowed when evaluated in a window context.
    Aggregate(&'static str),
    /// `COUNT(*)`
    CountStar,
    /// Ranking functions ordered by their (optional) argument,
    /// `NAME() OVER (... ORDER BY arg)`.
    Ranking(&'static str),
    /// `LAG`/`LEAD`, ordered by the context ordering.
    Offset(&'static str),
    /// Running aggregate over the context ordering.
    Cumulative(&'static str),
    /// `NTILE(n) OVER (... ORDER BY x)`
    Ntile,
    Special(SpecialForm),
    Infix(InfixOp),
    Prefix(PrefixOp),
}

impl Translation {
    /// Collapses rows when not windowed.
    pub fn is_aggregate(&self) -> bool {
        matches!(
            self,
            Translation::Aggregate(_)
                | Translation::CountStar
                | Translation::Special(SpecialForm::NDistinct)
        )
    }

    /// Only meaningful with an OVER clause.
    pub fn is_window_only(&self) -> bool {
        matches!(
            self,
            Translation::Ranking(_)
                | Translation::Offset(_)
                | Translation::Cumulative(_)
                | Translation::Ntile
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionEntry {
    pub name: &'static str,
    pub arity: Arity,
    pub translation: Translation,
}

#[derive(Debug)]
pub enum Lookup<'a> {
    Found(&'a FunctionEntry),
    /// Name is known but no entry accepts the given number of arguments.
    WrongArity(Vec<Arity>),
    Unknown,
}

#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    entries: HashMap<&'static str, Vec<FunctionEntry>>,
}

impl FunctionTable {
    /// Shared table of built-in translations.
    pub fn builtin() -> &'static FunctionTable {
        &BUILTIN
    }

    pub fn insert(&mut self, entry: FunctionEntry) {
        self.entries.entry(entry.name).or_default().push(entry);
    }

    /// Copy of this table with an additional entry. Entries added later take
    /// precedence over existing entries with overlapping arity.
    pub fn with_entry(&self, entry: FunctionEntry) -> FunctionTable {
        let mut table = self.clone();
        let entries = table.entries.entry(entry.name).or_default();
        entries.insert(0, entry);
        table
    }

    pub fn lookup(&self, name: &str, arity: usize) -> Lookup<'_> {
        match self.entries.get(name) {
            Some(entries) => match entries.iter().find(|e| e.arity.accepts(arity)) {
                Some(entry) => Lookup::Found(entry),
                None => Lookup::WrongArity(entries.iter().map(|e| e.arity).collect()),
            },
            None => Lookup::Unknown,
        }
    }

    /// Translation for a call, if known with this arity.
    pub fn translation(&self, name: &str, arity: usize) -> Option<Translation> {
        match self.lookup(name, arity) {
            Lookup::Found(entry) => Some(entry.translation),
            _ => None,
        }
    }
}

static BUILTIN: LazyLock<FunctionTable> = LazyLock::new(|| {
    use Arity::*;
    use SpecialForm as S;
    use Translation::*;

    let mut table = FunctionTable::default();
    let mut add = |name: &'static str, arity: Arity, translation: Translation| {
        table.insert(FunctionEntry {
            name,
            arity,
            translation,
        })
    };

    // Operators written as calls.
    for (name, op) in [
        ("+", InfixOp::Add),
        ("*", InfixOp::Mul),
        ("/", InfixOp::Div),
        ("%%", InfixOp::Mod),
        ("==", InfixOp::Eq),
        ("!=", InfixOp::NotEq),
        ("<", InfixOp::Lt),
        ("<=", InfixOp::LtEq),
        (">", InfixOp::Gt),
        (">=", InfixOp::GtEq),
        ("&", InfixOp::And),
        ("&&", InfixOp::And),
        ("|", InfixOp::Or),
        ("||", InfixOp::Or),
    ] {
        add(name, Exact(2), Infix(op));
    }
    add("-", Exact(2), Infix(InfixOp::Sub));
    add("-", Exact(1), Prefix(PrefixOp::Negate));
    add("!", Exact(1), Prefix(PrefixOp::Not));
    add("^", Exact(2), Scalar("POWER"));

    // Control and predicates.
    add("if", Range(2, 3), Special(S::If));
    add("ifelse", Range(2, 3), Special(S::If));
    add("if_else", Range(2, 3), Special(S::If));
    add("is.na", Exact(1), Special(S::IsNull));
    add("is.null", Exact(1), Special(S::IsNull));
    add("between", Exact(3), Special(S::Between));
    add("%in%", Exact(2), Special(S::InSet));
    add("in", Exact(2), Special(S::InSet));
    add("na_if", Exact(2), Special(S::NullIf));
    add("coalesce", AtLeast(1), Scalar("COALESCE"));
    add("desc", Exact(1), Special(S::Desc));

    // Math.
    add("abs", Exact(1), Scalar("ABS"));
    add("ceiling", Exact(1), Scalar("CEIL"));
    add("ceil", Exact(1), Scalar("CEIL"));
    add("floor", Exact(1), Scalar("FLOOR"));
    add("round", Range(1, 2), Scalar("ROUND"));
    add("sqrt", Exact(1), Scalar("SQRT"));
    add("exp", Exact(1), Scalar("EXP"));
    add("log", Exact(1), Scalar("LN"));
    add("log", Exact(2), Special(S::LogBase));
    add("log10", Exact(1), Scalar("LOG10"));
    add("sign", Exact(1), Scalar("SIGN"));
    add("sin", Exact(1), Scalar("SIN"));
    add("cos", Exact(1), Scalar("COS"));
    add("tan", Exact(1), Scalar("TAN"));
    add("asin", Exact(1), Scalar("ASIN"));
    add("acos", Exact(1), Scalar("ACOS"));
    add("atan", Exact(1), Scalar("ATAN"));
    add("atan2", Exact(2), Scalar("ATAN2"));
    add("pmin", AtLeast(1), Special(S::Pmin));
    add("pmax", AtLeast(1), Special(S::Pmax));

    // Strings.
    add("tolower", Exact(1), Scalar("LOWER"));
    add("toupper", Exact(1), Scalar("UPPER"));
    add("trimws", Exact(1), Scalar("TRIM"));
    add("nchar", Exact(1), Special(S::Length));
    add("substr", Exact(3), Special(S::Substr));
    add("paste0", AtLeast(1), Special(S::Concat { sep: None }));
    add("paste", AtLeast(1), Special(S::Concat { sep: Some(" ") }));

    // Casts.
    add("as.numeric", Exact(1), Special(S::Cast("NUMERIC")));
    add("as.double", Exact(1), Special(S::Cast("NUMERIC")));
    add("as.integer", Exact(1), Special(S::Cast("INTEGER")));
    add("as.character", Exact(1), Special(S::Cast("TEXT")));

    // Aggregates.
    add("mean", Exact(1), Aggregate("AVG"));
    add("sum", Exact(1), Aggregate("SUM"));
    add("min", Exact(1), Aggregate("MIN"));
    add("max", Exact(1), Aggregate("MAX"));
    add("sd", Exact(1), Aggregate("STDDEV_SAMP"));
    add("var", Exact(1), Aggregate("VAR_SAMP"));
    add("n", Exact(0), CountStar);
    add("n_distinct", AtLeast(1), Special(S::NDistinct));

    // Window only.
    add("rank", Exact(1), Ranking("RANK"));
    add("min_rank", Exact(1), Ranking("RANK"));
    add("dense_rank", Exact(1), Ranking("DENSE_RANK"));
    add("percent_rank", Exact(1), Ranking("PERCENT_RANK"));
    add("cume_dist", Exact(1), Ranking("CUME_DIST"));
    add("row_number", Range(0, 1), Ranking("ROW_NUMBER"));
    add("ntile", Exact(2), Ntile);
    add("lag", Range(1, 3), Offset("LAG"));
    add("lead", Range(1, 3), Offset("LEAD"));
    add("cumsum", Exact(1), Cumulative("SUM"));
    add("cummean", Exact(1), Cumulative("AVG"));
    add("cummin", Exact(1), Cumulative("MIN"));
    add("cummax", Exact(1), Cumulative("MAX"));

    table
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_arity() {
        let table = FunctionTable::builtin();
        assert_eq!(Some(Translation::Scalar("LN")), table.translation("log", 1));
        assert_eq!(
            Some(Translation::Special(SpecialForm::LogBase)),
            table.translation("log", 2)
        );
        assert!(matches!(table.lookup("log", 3), Lookup::WrongArity(_)));
        assert!(matches!(table.lookup("frobnicate", 1), Lookup::Unknown));
    }

    #[test]
    fn operator_minus_by_arity() {
        let table = FunctionTable::builtin();
        assert_eq!(
            Some(Translation::Prefix(PrefixOp::Negate)),
            table.translation("-", 1)
        );
        assert_eq!(
            Some(Translation::Infix(InfixOp::Sub)),
            table.translation("-", 2)
        );
    }

    #[test]
    fn custom_entry_takes_precedence() {
        let table = FunctionTable::builtin().with_entry(FunctionEntry {
            name: "mean",
            arity: Arity::Exact(1),
            translation: Translation::Aggregate("MEDIAN"),
        });
        assert_eq!(
            Some(Translation::Aggregate("MEDIAN")),
            table.translation("mean", 1)
        );
    }

    #[test]
    fn classification() {
        assert!(Translation::Aggregate("AVG").is_aggregate());
        assert!(Translation::Special(SpecialForm::NDistinct).is_aggregate());
        assert!(!Translation::Special(SpecialForm::Pmin).is_aggregate());
        assert!(Translation::Ranking("RANK").is_window_only());
        assert!(!Translation::Ranking("RANK").is_aggregate());
    }
}
