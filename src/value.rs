// ABOUTME: Dynamic SQL value model shared by migration and execution
// ABOUTME: Renders values as engine literals and as Python-style result text

use crate::engine::Engine;

/// A dynamically typed scalar read from a source table or a query result.
///
/// Mirrors SQLite's storage classes, which are the lowest common denominator
/// across every engine this tool talks to.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<rusqlite::types::ValueRef<'_>> for SqlValue {
    fn from(value: rusqlite::types::ValueRef<'_>) -> Self {
        use rusqlite::types::ValueRef;
        match value {
            ValueRef::Null => SqlValue::Null,
            ValueRef::Integer(i) => SqlValue::Integer(i),
            ValueRef::Real(f) => SqlValue::Real(f),
            ValueRef::Text(t) => SqlValue::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => SqlValue::Blob(b.to_vec()),
        }
    }
}

impl SqlValue {
    /// Render as a SQL literal in the target engine's dialect.
    ///
    /// Used by the migrator to build INSERT statements; queries are never
    /// assembled from user values, only from source-table snapshots.
    pub fn sql_literal(&self, engine: Engine) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Integer(i) => i.to_string(),
            SqlValue::Real(f) => {
                if f.is_finite() {
                    f.to_string()
                } else {
                    // Engines disagree on infinity literals; treat as missing
                    "NULL".to_string()
                }
            }
            SqlValue::Text(s) => match engine {
                // MySQL treats backslash as an escape character by default
                Engine::Mysql => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "''")),
                Engine::Postgres | Engine::Sqlite => format!("'{}'", s.replace('\'', "''")),
            },
            SqlValue::Blob(b) => match engine {
                Engine::Postgres => format!("'\\x{}'", hex(b)),
                Engine::Mysql | Engine::Sqlite => format!("X'{}'", hex(b)),
            },
        }
    }

    /// Render as a Python literal, matching the result-file wire format.
    pub fn python_literal(&self) -> String {
        match self {
            SqlValue::Null => "None".to_string(),
            SqlValue::Integer(i) => i.to_string(),
            SqlValue::Real(f) => py_float(*f),
            SqlValue::Text(s) => format!("'{}'", py_escape(s)),
            SqlValue::Blob(b) => py_bytes(b),
        }
    }
}

/// Render a sequence of result rows as a Python list of tuples,
/// e.g. `[(1, 'a'), (2, 'b')]`. One-element rows keep the trailing
/// comma (`(1,)`) so the text parses back as a tuple.
pub fn rows_literal(rows: &[Vec<SqlValue>]) -> String {
    let tuples: Vec<String> = rows
        .iter()
        .map(|row| {
            let fields: Vec<String> = row.iter().map(SqlValue::python_literal).collect();
            if fields.len() == 1 {
                format!("({},)", fields[0])
            } else {
                format!("({})", fields.join(", "))
            }
        })
        .collect();
    format!("[{}]", tuples.join(", "))
}

/// Python bytes repr with uniform hex escapes, e.g. `b'\x61\x62'`.
pub(crate) fn py_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 4 + 3);
    out.push_str("b'");
    for b in bytes {
        out.push_str(&format!("\\x{:02x}", b));
    }
    out.push('\'');
    out
}

fn py_float(f: f64) -> String {
    // Python repr always keeps a decimal point on whole floats
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{:.1}", f)
    } else {
        f.to_string()
    }
}

fn py_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
