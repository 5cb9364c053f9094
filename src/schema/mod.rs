//! C6 — Schema Bootstrap (§4.6).
//!
//! Detect-then-create: queries `information_schema.tables` for the required
//! tables, and only if any are missing does it load the bundled script and
//! execute it statement-by-statement. Never drops or alters existing
//! tables. No advisory lock across replicas — left unresolved per the
//! "idempotent under concurrent startups" open question (DESIGN.md).

use crate::error::BridgeError;
use crate::tiers::DurableTier;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::info;

const REQUIRED_TABLES: &[&str] = &["storage_cache", "customers", "thread_ticket_mappings"];
const STATEMENT_TIMEOUT: Duration = Duration::from_secs(60);
const TOTAL_TIMEOUT: Duration = Duration::from_secs(120);

const BOOTSTRAP_SQL: &str = include_str!("bootstrap.sql");

/// Run the bootstrap phases of §4.6 against an already-connected durable
/// tier.
///
/// # Errors
/// Returns [`BridgeError::Startup`] if detection fails, a statement fails,
/// or the 120s total wall-clock cap is exceeded.
pub async fn bootstrap(durable: &DurableTier) -> Result<(), BridgeError> {
    info!("schema: checking for required tables");
    let missing = missing_tables(durable.pool()).await?;

    if missing.is_empty() {
        info!("schema: all required tables present");
        return Ok(());
    }

    info!(?missing, "schema: bootstrapping missing tables");
    let statements = split_statements(BOOTSTRAP_SQL);

    tokio::time::timeout(TOTAL_TIMEOUT, run_statements(durable.pool(), &statements))
        .await
        .map_err(|_| {
            BridgeError::Startup("schema bootstrap exceeded 120s wall-clock cap".to_string())
        })??;

    info!("schema: bootstrap complete");
    Ok(())
}

async fn missing_tables(pool: &PgPool) -> Result<Vec<String>, BridgeError> {
    let rows = sqlx::query(
        "SELECT table_name FROM information_schema.tables \
         WHERE table_schema = 'public' AND table_name = ANY($1)",
    )
    .bind(REQUIRED_TABLES)
    .fetch_all(pool)
    .await
    .map_err(|e| BridgeError::Startup(format!("schema detection query failed: {e}")))?;

    let existing: Vec<String> = rows
        .iter()
        .filter_map(|row| row.try_get::<String, _>("table_name").ok())
        .collect();

    Ok(REQUIRED_TABLES
        .iter()
        .filter(|t| !existing.iter().any(|e| e == *t))
        .map(|t| (*t).to_string())
        .collect())
}

/// Runs each statement in its own transaction with a server-enforced
/// `statement_timeout` (`SET LOCAL`, scoped to that transaction) rather than
/// a client-side `tokio::time::timeout` — a dropped client future does not
/// cancel the query server-side, and this crate never reuses a connection
/// across a timed-out statement.
async fn run_statements(pool: &PgPool, statements: &[String]) -> Result<(), BridgeError> {
    let timeout_sql = format!(
        "SET LOCAL statement_timeout = '{}s'",
        STATEMENT_TIMEOUT.as_secs()
    );

    for stmt in statements {
        let mut tx = pool
            .begin()
            .await
            .map_err(|e| BridgeError::Startup(format!("failed to begin transaction: {e}")))?;

        sqlx::query(&timeout_sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| BridgeError::Startup(format!("failed to set statement_timeout: {e}")))?;

        sqlx::query(stmt.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| BridgeError::Startup(format!("statement failed: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| BridgeError::Startup(format!("failed to commit statement: {e}")))?;
    }

    Ok(())
}

/// Split a SQL script into individual statements, treating `;` inside a
/// `$tag$ ... $tag$` dollar-quoted body (used by function definitions) as
/// literal text rather than a statement terminator.
fn split_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_dollar_quote = false;
    let mut dollar_tag = String::new();
    let mut chars = sql.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !in_dollar_quote && c == '$' {
            if let Some(end) = sql[i + 1..].find('$') {
                let candidate = &sql[i + 1..i + 1 + end];
                if candidate.chars().all(|ch| ch.is_alphanumeric() || ch == '_') {
                    dollar_tag = format!("${candidate}$");
                    in_dollar_quote = true;
                    current.push_str(&dollar_tag);
                    for _ in 0..dollar_tag.chars().count() - 1 {
                        chars.next();
                    }
                    continue;
                }
            }
            current.push(c);
            continue;
        }

        if in_dollar_quote && sql[i..].starts_with(&dollar_tag) {
            current.push_str(&dollar_tag);
            for _ in 0..dollar_tag.chars().count() - 1 {
                chars.next();
            }
            in_dollar_quote = false;
            continue;
        }

        if !in_dollar_quote && c == ';' {
            current.push(c);
            let stmt = current.trim().to_string();
            if !stmt.is_empty() {
                statements.push(stmt);
            }
            current.clear();
            continue;
        }

        current.push(c);
    }

    let tail = current.trim().to_string();
    if !tail.is_empty() {
        statements.push(tail);
    }

    statements
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_simple_statements() {
        let sql = "CREATE TABLE a (id INT); CREATE TABLE b (id INT);";
        let stmts = split_statements(sql);
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn keeps_dollar_quoted_body_intact() {
        let stmts = split_statements(BOOTSTRAP_SQL);
        let func = stmts
            .iter()
            .find(|s| s.contains("cleanup_expired_cache"))
            .expect("function statement present");
        assert!(func.contains("DELETE FROM storage_cache"));
        assert!(func.trim_end().ends_with("LANGUAGE plpgsql;"));
    }

    #[test]
    fn bundled_script_covers_required_tables() {
        for table in REQUIRED_TABLES {
            assert!(BOOTSTRAP_SQL.contains(table));
        }
    }
}
