// ABOUTME: Dialect-aware table-reference qualifier for migrated namespaces
// ABOUTME: Heuristic regex rewrite, intentionally not a SQL parser

//! Rewrites bare table references so an unmodified benchmark query resolves
//! against its migrated namespace.
//!
//! The approach is syntactic: scan for table-introducing keywords followed
//! by an optionally quoted identifier and qualify that identifier. A token
//! that merely *looks* like a table reference (say, an alias right after a
//! keyword-adjacent position) can be mis-rewritten; that is a known
//! limitation of the heuristic, kept isolated behind this module so a real
//! parser could replace it without touching the migrator or executor.

use crate::engine::{Engine, Namespace};
use regex::{Captures, Regex};
use std::sync::OnceLock;

/// Keywords that introduce a table name. FROM also covers DELETE FROM,
/// and INTO covers INSERT INTO.
fn table_ref_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)\b(FROM|JOIN|UPDATE|INTO|TABLE)(\s+)("[\w.]+"|`[\w.]+`|[\w.]+)"#)
            .expect("table reference pattern compiles")
    })
}

/// Qualify bare table names in `sql` for the migrated namespace of `db_id`.
///
/// Idempotent: rewriting an already-rewritten query changes nothing.
/// Identifiers that already carry a namespace separator are left alone,
/// and prefix-style identifiers are not prefixed twice. MySQL routes
/// resolution through `USE`, so its rewrite is the identity.
pub fn qualify_tables(sql: &str, db_id: &str, engine: Engine) -> String {
    let ns = engine.namespace_for(db_id);
    match ns {
        Namespace::Database(_) => sql.to_string(),
        _ => table_ref_pattern()
            .replace_all(sql, |caps: &Captures| rewrite_match(caps, &ns))
            .into_owned(),
    }
}

fn rewrite_match(caps: &Captures, ns: &Namespace) -> String {
    let keyword = &caps[1];
    let whitespace = &caps[2];
    let token = &caps[3];
    let (quote, ident) = strip_quotes(token);

    // Already qualified; leave untouched.
    if ident.contains('.') {
        return caps[0].to_string();
    }

    match ns {
        Namespace::Schema(schema) => format!(
            "{keyword}{whitespace}{schema}.{quote}{}{quote}",
            ident.to_lowercase()
        ),
        Namespace::TablePrefix(prefix) => {
            let upper = ident.to_uppercase();
            if upper.starts_with(&format!("{prefix}_")) {
                caps[0].to_string()
            } else {
                format!("{keyword}{whitespace}\"{prefix}_{upper}\"")
            }
        }
        Namespace::Database(_) => caps[0].to_string(),
    }
}

fn strip_quotes(token: &str) -> (&str, &str) {
    let bytes = token.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        if (first == b'"' || first == b'`') && bytes[bytes.len() - 1] == first {
            return (&token[..1], &token[1..token.len() - 1]);
        }
    }
    ("", token)
}
