//! SOQL composition and paginated execution.
//!
//! Queries are plain strings: identifiers come from describe results, and
//! string literals pass through [`escape_literal`]. `IN`-clause queries are
//! chunked at [`IN_CLAUSE_CHUNK`] values to stay under the platform's query
//! length limit.

use tracing::debug;

use crate::connection::{Connection, Record};
use crate::error::{Result, SeedError};
use crate::plan::RecordLimit;

/// Maximum literal values per `IN` clause. Matches the bulk write batch size.
pub const IN_CLAUSE_CHUNK: usize = 200;

/// Backslash-escape single quotes for use inside a SOQL string literal.
pub fn escape_literal(s: &str) -> String {
    s.replace('\'', "\\'")
}

/// Render values as a quoted, comma-separated `IN` list body.
pub fn in_list(values: &[String]) -> String {
    values
        .iter()
        .map(|v| format!("'{}'", escape_literal(v)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Build a SELECT projection: deduplicating union of `fields` and `extras`,
/// always including `Id`.
pub fn build_projection(fields: &[String], extras: &[&str]) -> String {
    let mut seen = vec!["Id".to_string()];
    for name in fields.iter().map(String::as_str).chain(extras.iter().copied()) {
        if !seen.iter().any(|s| s == name) {
            seen.push(name.to_string());
        }
    }
    seen.join(", ")
}

/// Compose `SELECT {projection} FROM {object} [WHERE ...] [LIMIT n]`.
///
/// `RecordLimit::All` omits the LIMIT clause.
pub fn build_query(
    projection: &str,
    object: &str,
    where_clause: Option<&str>,
    limit: RecordLimit,
) -> String {
    let mut soql = format!("SELECT {} FROM {}", projection, object);
    if let Some(clause) = where_clause {
        let clause = clause.trim();
        if !clause.is_empty() {
            soql.push_str(" WHERE ");
            soql.push_str(clause);
        }
    }
    if let RecordLimit::Count(n) = limit {
        soql.push_str(&format!(" LIMIT {}", n));
    }
    soql
}

/// Execute a query and follow pagination cursors until exhausted.
///
/// A page that reports more records without carrying a cursor would silently
/// truncate the result set, so it is treated as a malformed response.
pub async fn query_all(conn: &dyn Connection, soql: &str) -> Result<Vec<Record>> {
    debug!("query: {}", soql);
    let mut page = conn.query(soql).await?;
    let mut records = page.records;

    while !page.done {
        let total = page.total_size;
        let locator = page.next_records_url.take().ok_or_else(|| {
            SeedError::Query(format!(
                "query reports {} matching records but no cursor for the next page",
                total
            ))
        })?;
        page = conn.query_more(&locator).await?;
        records.append(&mut page.records);
    }

    Ok(records)
}

/// Split `values` into chunks of [`IN_CLAUSE_CHUNK`], build one query per
/// chunk, and concatenate the results. The builder receives each chunk and is
/// expected to wrap it with [`in_list`].
pub async fn query_all_chunked<F>(
    conn: &dyn Connection,
    values: &[String],
    build_soql: F,
) -> Result<Vec<Record>>
where
    F: Fn(&[String]) -> String,
{
    let mut records = Vec::new();
    for chunk in values.chunks(IN_CLAUSE_CHUNK) {
        let soql = build_soql(chunk);
        records.extend(query_all(conn, &soql).await?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_literal() {
        assert_eq!(escape_literal("O'Brien"), "O\\'Brien");
        assert_eq!(escape_literal("plain"), "plain");
    }

    #[test]
    fn test_in_list_quotes_and_escapes() {
        let values = vec!["001A".to_string(), "O'B".to_string()];
        assert_eq!(in_list(&values), "'001A', 'O\\'B'");
    }

    #[test]
    fn test_projection_always_includes_id_once() {
        let fields = vec!["Name".to_string(), "Id".to_string(), "Name".to_string()];
        assert_eq!(build_projection(&fields, &[]), "Id, Name");
    }

    #[test]
    fn test_projection_extras_deduplicate() {
        let fields = vec!["Subject".to_string(), "WhatId".to_string()];
        assert_eq!(
            build_projection(&fields, &["WhatId", "WhoId"]),
            "Id, Subject, WhatId, WhoId"
        );
    }

    #[test]
    fn test_build_query_with_where_and_limit() {
        let soql = build_query("Id, Name", "Account", Some("Industry = 'Tech'"), RecordLimit::Count(5));
        assert_eq!(soql, "SELECT Id, Name FROM Account WHERE Industry = 'Tech' LIMIT 5");
    }

    #[test]
    fn test_build_query_all_records_omits_limit() {
        let soql = build_query("Id", "Account", None, RecordLimit::All);
        assert_eq!(soql, "SELECT Id FROM Account");
    }

    #[test]
    fn test_build_query_blank_where_is_dropped() {
        let soql = build_query("Id", "Account", Some("   "), RecordLimit::All);
        assert_eq!(soql, "SELECT Id FROM Account");
    }
}
