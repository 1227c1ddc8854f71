//! Identifier handling and query tracing helpers.
//!
//! Table and column names for the branch-scoped tables come from a registry
//! rather than from bind parameters, so every name is validated and quoted
//! before it is spliced into SQL.

use crate::error::{DbError, Result};
use std::future::Future;
use std::time::Instant;
use tracing::{debug, Instrument, Span};

/// A validated, quoted SQL identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident(String);

impl Ident {
    /// Validate `name` as `[A-Za-z_][A-Za-z0-9_]*` and quote it.
    pub fn new(name: &str) -> Result<Self> {
        if !is_valid_identifier(name) {
            return Err(DbError::InvalidIdentifier(name.to_string()));
        }
        Ok(Self(quote_ident(name)))
    }

    pub fn as_sql(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Ident {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(ch) if ch.is_ascii_alphabetic() || ch == '_' => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

fn quote_ident(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len() + 2);
    escaped.push('"');
    for ch in name.chars() {
        if ch == '"' {
            escaped.push('"');
        }
        escaped.push(ch);
    }
    escaped.push('"');
    escaped
}

pub(crate) fn sql_op_name(sql: &str) -> &str {
    sql.split_whitespace().next().unwrap_or("unknown")
}

pub(crate) fn hash_sql(sql: &str) -> String {
    // FNV-1a 64-bit: stable, low-cardinality id for span fields.
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in sql.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    format!("{:016x}", hash)
}

/// Open a `db.query` debug span for a dynamically built statement.
macro_rules! query_span {
    ($sql:expr, $table:expr) => {
        tracing::debug_span!(
            "db.query",
            op = $crate::sql::sql_op_name($sql),
            table = $table,
            sql_hash = %$crate::sql::hash_sql($sql),
            duration_ms = tracing::field::Empty,
        )
    };
}

pub(crate) use query_span;

/// Await `query` inside `span`, then record `duration_ms` on the span.
pub(crate) async fn timed<F: Future>(span: Span, query: F) -> F::Output {
    let start = Instant::now();
    let output = query.instrument(span.clone()).await;
    let duration_ms = start.elapsed().as_millis() as u64;
    span.record("duration_ms", duration_ms);
    span.in_scope(|| debug!(duration_ms, "Query finished"));
    output
}
