//! Shared database error helpers (SQLSTATE categorization, etc.)

/// Returns true if the given code represents a unique constraint violation.
/// SQLite reports extended code 2067 (`SQLITE_CONSTRAINT_UNIQUE`) and 1555
/// (`SQLITE_CONSTRAINT_PRIMARYKEY`); 23505 is kept for Postgres-style codes.
pub fn is_unique_violation_code(code: &str) -> bool {
    matches!(code, "2067" | "1555" | "23505")
}

/// Returns true if the sqlx error is a database-side unique violation.
pub fn is_sqlx_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db
            .code()
            .map(|c| is_unique_violation_code(c.as_ref()))
            .unwrap_or(false),
        _ => false,
    }
}

/// Walks an `anyhow` chain looking for a unique violation raised by sqlx.
pub fn chain_has_unique_violation(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<sqlx::Error>())
        .any(is_sqlx_unique_violation)
}
