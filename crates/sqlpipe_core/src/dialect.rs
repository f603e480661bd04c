//! Per backend rendering rules and capability flags.
//!
//! A [`Dialect`] is selected once when a connection is set up and then shared
//! by reference for every compilation against that connection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SqlPipeError};

/// How single quotes (and possibly backslashes) inside string literals are
/// escaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StringEscape {
    /// `'` becomes `''`.
    DoubleQuote,
    /// `'` becomes `\'` and `\` becomes `\\`.
    Backslash,
}

/// Spelling of the substring function. All styles take a start position and
/// a length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubstringStyle {
    /// `SUBSTR(x, start, length)`
    Substr,
    /// `SUBSTRING(x, start, length)`
    Substring,
    /// `SUBSTRING(x FROM start FOR length)`
    FromFor,
}

/// How string concatenation is spelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConcatStyle {
    /// `CONCAT(a, b, ...)`
    Function,
    /// `a || b || ...`
    Operator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DialectFeatures {
    /// Backend supports `OVER (...)`. Query building falls back to subquery
    /// emulation when false.
    pub window_functions: bool,
    /// Backend has boolean literals. Booleans render as `1`/`0` when false.
    pub boolean_literals: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dialect {
    pub name: &'static str,
    /// Opening and closing identifier quote characters.
    pub identifier_quote: (char, char),
    /// Replacement for the closing quote character when it appears inside an
    /// identifier. `None` if the backend cannot escape it.
    pub identifier_escape: Option<&'static str>,
    /// Spelling of true and false.
    pub boolean_literals: (&'static str, &'static str),
    pub null_literal: &'static str,
    pub infinity_literal: &'static str,
    pub neg_infinity_literal: &'static str,
    pub nan_literal: &'static str,
    pub string_escape: StringEscape,
    /// chrono format string applied to timestamps after conversion to UTC.
    pub timestamp_format: &'static str,
    pub substring: SubstringStyle,
    pub length_function: &'static str,
    pub concat: ConcatStyle,
    pub features: DialectFeatures,
}

impl Dialect {
    pub const ANSI: Dialect = Dialect {
        name: "ansi",
        identifier_quote: ('"', '"'),
        identifier_escape: Some("\"\""),
        boolean_literals: ("TRUE", "FALSE"),
        null_literal: "NULL",
        infinity_literal: "'Infinity'",
        neg_infinity_literal: "'-Infinity'",
        nan_literal: "'NaN'",
        string_escape: StringEscape::DoubleQuote,
        timestamp_format: "%Y-%m-%dT%H:%M:%S%.fZ",
        substring: SubstringStyle::FromFor,
        length_function: "LENGTH",
        concat: ConcatStyle::Operator,
        features: DialectFeatures {
            window_functions: true,
            boolean_literals: true,
        },
    };

    pub const POSTGRES: Dialect = Dialect {
        name: "postgres",
        substring: SubstringStyle::Substr,
        concat: ConcatStyle::Function,
        ..Dialect::ANSI
    };

    pub const SQLITE: Dialect = Dialect {
        name: "sqlite",
        substring: SubstringStyle::Substr,
        features: DialectFeatures {
            window_functions: true,
            boolean_literals: false,
        },
        ..Dialect::ANSI
    };

    pub const MYSQL: Dialect = Dialect {
        name: "mysql",
        identifier_quote: ('`', '`'),
        identifier_escape: Some("``"),
        string_escape: StringEscape::Backslash,
        substring: SubstringStyle::Substring,
        length_function: "CHAR_LENGTH",
        concat: ConcatStyle::Function,
        ..Dialect::ANSI
    };

    /// MySQL before 8.0, no window functions.
    pub const MYSQL_57: Dialect = Dialect {
        name: "mysql57",
        features: DialectFeatures {
            window_functions: false,
            boolean_literals: true,
        },
        ..Dialect::MYSQL
    };

    pub const SQL_SERVER: Dialect = Dialect {
        name: "sqlserver",
        identifier_quote: ('[', ']'),
        identifier_escape: Some("]]"),
        substring: SubstringStyle::Substring,
        length_function: "LEN",
        concat: ConcatStyle::Function,
        features: DialectFeatures {
            window_functions: true,
            boolean_literals: false,
        },
        ..Dialect::ANSI
    };

    /// Lowest common denominator for generic ODBC sources.
    pub const ODBC: Dialect = Dialect {
        name: "odbc",
        identifier_escape: None,
        substring: SubstringStyle::Substring,
        concat: ConcatStyle::Function,
        features: DialectFeatures {
            window_functions: false,
            boolean_literals: false,
        },
        ..Dialect::ANSI
    };

    pub fn supports_window_functions(&self) -> bool {
        self.features.window_functions
    }

    pub fn supports_boolean_literals(&self) -> bool {
        self.features.boolean_literals
    }

    /// Copy of this dialect with window function support turned off.
    pub fn without_window_functions(&self) -> Dialect {
        Dialect {
            features: DialectFeatures {
                window_functions: false,
                ..self.features
            },
            ..self.clone()
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Closed set of built-in backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Ansi,
    Postgres,
    Sqlite,
    MySql,
    MySql57,
    SqlServer,
    Odbc,
}

impl Backend {
    pub const ALL: &'static [Backend] = &[
        Backend::Ansi,
        Backend::Postgres,
        Backend::Sqlite,
        Backend::MySql,
        Backend::MySql57,
        Backend::SqlServer,
        Backend::Odbc,
    ];

    pub fn dialect(&self) -> &'static Dialect {
        match self {
            Backend::Ansi => &Dialect::ANSI,
            Backend::Postgres => &Dialect::POSTGRES,
            Backend::Sqlite => &Dialect::SQLITE,
            Backend::MySql => &Dialect::MYSQL,
            Backend::MySql57 => &Dialect::MYSQL_57,
            Backend::SqlServer => &Dialect::SQL_SERVER,
            Backend::Odbc => &Dialect::ODBC,
        }
    }

    pub fn name(&self) -> &'static str {
        self.dialect().name
    }
}

impl FromStr for Backend {
    type Err = SqlPipeError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_ascii_lowercase();
        Backend::ALL
            .iter()
            .find(|b| b.name() == lower)
            .copied()
            .ok_or_else(|| {
                SqlPipeError::InvalidSetting(format!(
                    "Unknown backend '{s}', expected one of: {}",
                    Backend::ALL
                        .iter()
                        .map(|b| b.name())
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
