//! Rendering of identifiers and literal values as backend safe SQL text.

use chrono::Utc;

use crate::dialect::{Dialect, StringEscape};
use crate::errors::{Result, SqlPipeError};
use crate::ident::Ident;
use crate::scalar::ScalarValue;

/// Wrap `name` in the dialect's identifier quotes.
///
/// Errors if the name contains the closing quote character and the dialect
/// has no way of escaping it.
pub fn quote_identifier(name: &str, dialect: &Dialect) -> Result<String> {
    let (open, close) = dialect.identifier_quote;

    let mut out = String::with_capacity(name.len() + 2);
    out.push(open);
    if name.contains(close) {
        match dialect.identifier_escape {
            Some(escape) => {
                for c in name.chars() {
                    if c == close {
                        out.push_str(escape);
                    } else {
                        out.push(c);
                    }
                }
            }
            None => {
                return Err(SqlPipeError::InvalidIdentifier {
                    name: name.to_string(),
                    quote: close,
                    dialect: dialect.name,
                });
            }
        }
    } else {
        out.push_str(name);
    }
    out.push(close);

    Ok(out)
}

/// Quote a possibly qualified column, e.g. `"LHS"."x"`.
pub fn quote_qualified(qualifier: Option<&str>, name: &str, dialect: &Dialect) -> Result<String> {
    match qualifier {
        Some(qualifier) => Ok(format!(
            "{}.{}",
            quote_identifier(qualifier, dialect)?,
            quote_identifier(name, dialect)?
        )),
        None => quote_identifier(name, dialect),
    }
}

/// Render an identifier, including its alias if it has one.
pub fn render_ident(ident: &Ident, dialect: &Dialect) -> Result<String> {
    let name = quote_identifier(&ident.name, dialect)?;
    match &ident.alias {
        Some(alias) => Ok(format!("{name} AS {}", quote_identifier(alias, dialect)?)),
        None => Ok(name),
    }
}

/// Render a comma separated list of identifiers.
pub fn render_idents(idents: &[Ident], dialect: &Dialect) -> Result<String> {
    let rendered = idents
        .iter()
        .map(|ident| render_ident(ident, dialect))
        .collect::<Result<Vec<_>>>()?;
    Ok(rendered.join(", "))
}

/// Render a literal value.
///
/// With `strict_numeric` set, every numeric literal carries an explicit
/// decimal point.
pub fn render_literal(value: &ScalarValue, dialect: &Dialect, strict_numeric: bool) -> String {
    match value {
        ScalarValue::Null => dialect.null_literal.to_string(),
        ScalarValue::Boolean(v) => {
            if dialect.supports_boolean_literals() {
                let (t, f) = dialect.boolean_literals;
                let s = if *v { t } else { f };
                s.to_string()
            } else if *v {
                "1".to_string()
            } else {
                "0".to_string()
            }
        }
        ScalarValue::Int64(v) => {
            if strict_numeric {
                format!("{v}.0")
            } else {
                v.to_string()
            }
        }
        ScalarValue::Float64(v) => {
            if v.is_nan() {
                dialect.nan_literal.to_string()
            } else if v.is_infinite() {
                if v.is_sign_positive() {
                    dialect.infinity_literal.to_string()
                } else {
                    dialect.neg_infinity_literal.to_string()
                }
            } else {
                let mut s = v.to_string();
                if strict_numeric && !s.contains('.') {
                    s.push_str(".0");
                }
                s
            }
        }
        ScalarValue::Utf8(v) => render_string(v, dialect),
        ScalarValue::Timestamp(v) => format!(
            "'{}'",
            v.with_timezone(&Utc).format(dialect.timestamp_format)
        ),
    }
}

fn render_string(v: &str, dialect: &Dialect) -> String {
    let mut out = String::with_capacity(v.len() + 2);
    out.push('\'');
    match dialect.string_escape {
        StringEscape::DoubleQuote => {
            for c in v.chars() {
                if c == '\'' {
                    out.push_str("''");
                } else {
                    out.push(c);
                }
            }
        }
        StringEscape::Backslash => {
            for c in v.chars() {
                match c {
                    '\'' => out.push_str("\\'"),
                    '\\' => out.push_str("\\\\"),
                    c => out.push(c),
                }
            }
        }
    }
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, FixedOffset, TimeZone};

    use super::*;

    fn lit(v: impl Into<ScalarValue>, dialect: &Dialect) -> String {
        render_literal(&v.into(), dialect, false)
    }

    #[test]
    fn quote_identifiers() {
        assert_eq!("\"a\"", quote_identifier("a", &Dialect::POSTGRES).unwrap());
        assert_eq!("`a`", quote_identifier("a", &Dialect::MYSQL).unwrap());
        assert_eq!("[a]", quote_identifier("a", &Dialect::SQL_SERVER).unwrap());
    }

    #[test]
    fn quote_identifier_escapes_closing_quote() {
        assert_eq!(
            "\"a\"\"b\"",
            quote_identifier("a\"b", &Dialect::POSTGRES).unwrap()
        );
        assert_eq!("`a``b`", quote_identifier("a`b", &Dialect::MYSQL).unwrap());
        assert_eq!(
            "[a[b]]]",
            quote_identifier("a[b]", &Dialect::SQL_SERVER).unwrap()
        );
    }

    #[test]
    fn quote_identifier_unescapable() {
        let err = quote_identifier("a\"b", &Dialect::ODBC).unwrap_err();
        assert!(matches!(err, SqlPipeError::InvalidIdentifier { .. }));
        // Other quote characters are fine.
        assert_eq!("\"a`b\"", quote_identifier("a`b", &Dialect::ODBC).unwrap());
    }

    #[test]
    fn identifier_lists() {
        let idents = vec![Ident::new("a"), Ident::with_alias("b", "c")];
        assert_eq!(
            "\"a\", \"b\" AS \"c\"",
            render_idents(&idents, &Dialect::POSTGRES).unwrap()
        );
        assert_eq!(
            "\"t\".\"x\"",
            quote_qualified(Some("t"), "x", &Dialect::ANSI).unwrap()
        );
    }

    #[test]
    fn null_and_sentinels() {
        assert_eq!("NULL", lit(ScalarValue::Null, &Dialect::POSTGRES));
        assert_eq!("'Infinity'", lit(f64::INFINITY, &Dialect::POSTGRES));
        assert_eq!("'-Infinity'", lit(f64::NEG_INFINITY, &Dialect::POSTGRES));
        assert_eq!("'NaN'", lit(f64::NAN, &Dialect::POSTGRES));
    }

    #[test]
    fn booleans_follow_dialect() {
        assert_eq!("TRUE", lit(true, &Dialect::POSTGRES));
        assert_eq!("FALSE", lit(false, &Dialect::POSTGRES));
        assert_eq!("1", lit(true, &Dialect::SQLITE));
        assert_eq!("0", lit(false, &Dialect::SQL_SERVER));
    }

    #[test]
    fn numbers() {
        assert_eq!("3", lit(3_i64, &Dialect::ANSI));
        assert_eq!("2", lit(2.0, &Dialect::ANSI));
        assert_eq!("2.5", lit(2.5, &Dialect::ANSI));
        assert_eq!("-4", lit(-4_i64, &Dialect::ANSI));
    }

    #[test]
    fn strict_numbers_have_decimal_point() {
        let d = &Dialect::ANSI;
        assert_eq!("3.0", render_literal(&3_i64.into(), d, true));
        assert_eq!("2.0", render_literal(&2.0.into(), d, true));
        assert_eq!("2.5", render_literal(&2.5.into(), d, true));
        assert_eq!("-1.0", render_literal(&(-1_i64).into(), d, true));
        // Sentinels are unaffected.
        assert_eq!("'Infinity'", render_literal(&f64::INFINITY.into(), d, true));
    }

    #[test]
    fn strings() {
        assert_eq!("'abc'", lit("abc", &Dialect::POSTGRES));
        assert_eq!("'it''s'", lit("it's", &Dialect::POSTGRES));
        assert_eq!("'it\\'s'", lit("it's", &Dialect::MYSQL));
        assert_eq!("'a\\\\b'", lit("a\\b", &Dialect::MYSQL));
        assert_eq!("'a\\b'", lit("a\\b", &Dialect::POSTGRES));
    }

    #[test]
    fn timestamps_render_as_utc() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let ts: DateTime<FixedOffset> = offset.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap();
        assert_eq!("'2024-03-01T08:30:00Z'", lit(ts, &Dialect::POSTGRES));

        let ts = ts + chrono::Duration::milliseconds(500);
        assert_eq!("'2024-03-01T08:30:00.500Z'", lit(ts, &Dialect::POSTGRES));
    }
}
