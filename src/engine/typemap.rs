// ABOUTME: Per-engine mapping from source column types to target column types
// ABOUTME: Unknown source types fall back to the engine's permissive text type

use super::Engine;

/// Map a source (SQLite) declared column type to the target engine's type.
///
/// The mapping is deliberately lenient: anything outside the core storage
/// classes becomes the target's text type, and values are coerced at insert
/// time. This never fails.
pub fn map_type(source_type: &str, engine: Engine) -> &'static str {
    let key = source_type.trim().to_uppercase();
    match engine {
        Engine::Postgres => match key.as_str() {
            "INTEGER" => "BIGINT",
            "REAL" => "DOUBLE PRECISION",
            "TEXT" => "TEXT",
            "BLOB" => "BYTEA",
            "NUMERIC" => "NUMERIC(38,10)",
            "BOOLEAN" => "SMALLINT",
            _ => "TEXT",
        },
        Engine::Mysql => match key.as_str() {
            "INTEGER" => "BIGINT",
            "REAL" => "DOUBLE",
            "TEXT" => "TEXT",
            "BLOB" => "BLOB",
            "NUMERIC" => "DECIMAL(38,10)",
            "BOOLEAN" => "TINYINT(1)",
            _ => "TEXT",
        },
        Engine::Sqlite => match key.as_str() {
            "INTEGER" => "INTEGER",
            "REAL" => "REAL",
            "TEXT" => "TEXT",
            "BLOB" => "BLOB",
            "NUMERIC" => "NUMERIC",
            "BOOLEAN" => "INTEGER",
            _ => "TEXT",
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_widens_per_engine() {
        assert_eq!(map_type("INTEGER", Engine::Postgres), "BIGINT");
        assert_eq!(map_type("integer", Engine::Mysql), "BIGINT");
        assert_eq!(map_type("INTEGER", Engine::Sqlite), "INTEGER");
    }

    #[test]
    fn boolean_becomes_one_byte_integer() {
        assert_eq!(map_type("BOOLEAN", Engine::Mysql), "TINYINT(1)");
        assert_eq!(map_type("BOOLEAN", Engine::Postgres), "SMALLINT");
    }

    #[test]
    fn unknown_types_fall_back_to_text() {
        for engine in [Engine::Postgres, Engine::Mysql, Engine::Sqlite] {
            assert_eq!(map_type("VARCHAR(40)", engine), "TEXT");
            assert_eq!(map_type("DATETIME", engine), "TEXT");
            assert_eq!(map_type("", engine), "TEXT");
        }
    }

    #[test]
    fn lookup_ignores_case_and_whitespace() {
        assert_eq!(map_type("  real ", Engine::Postgres), "DOUBLE PRECISION");
    }
}
