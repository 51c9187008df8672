//! SQL text for the target store.
//!
//! Table and column names come from configuration and are validated before
//! they are interpolated. Titles are the only data values that ever end up in
//! SQL text, and only on the textual batch path; everywhere else they travel
//! as bind parameters.
//!
//! An empty string counts as missing, for titles and ids alike.

use crate::config::{TableRef, INSTANCE_ID_COLUMN};
use crate::error::BackfillError;

/// Column aliases read back from the null-count query.
pub const NULL_ROWS_ALIAS: &str = "cnt";
pub const NULL_TITLES_ALIAS: &str = "count_distinct_problem_titles";

/// One `UPDATE ... WHERE title = ? AND id IS NULL` for a single title.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConditionalUpdate {
    pub title: String,
    pub instance_id: String,
}

impl ConditionalUpdate {
    pub fn new(title: &str, instance_id: &str) -> Self {
        Self {
            title: title.to_string(),
            instance_id: instance_id.to_string(),
        }
    }

    /// Textual form with both values escaped, for multi-statement batches and previews.
    pub fn to_sql(&self, table: &TableRef) -> String {
        format!(
            "UPDATE {} SET {} = {} WHERE {} = {} AND {};",
            table.qualified_name(),
            INSTANCE_ID_COLUMN,
            quote_literal(&self.instance_id),
            table.title_column,
            quote_literal(&self.title),
            id_missing(),
        )
    }
}

/// Id column is null or blank.
pub fn id_missing() -> String {
    format!("({id} IS NULL OR {id} = '')", id = INSTANCE_ID_COLUMN)
}

fn present(column: &str) -> String {
    format!("{col} IS NOT NULL AND {col} <> ''", col = column)
}

pub fn validate_identifier(name: &str) -> Result<(), BackfillError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => chars.all(|c| c.is_ascii_alphanumeric() || c == '_'),
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(BackfillError::Config(format!("invalid SQL identifier: {:?}", name)))
    }
}

/// Doubles every single quote.
pub fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

pub fn quote_literal(value: &str) -> String {
    format!("'{}'", escape_literal(value))
}

/// Reads a quoted literal produced by `quote_literal` back into its value.
pub fn unquote_literal(literal: &str) -> Option<String> {
    let inner = literal.strip_prefix('\'')?.strip_suffix('\'')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\'' {
            // a lone quote would have terminated the literal
            if chars.next() != Some('\'') {
                return None;
            }
        }
        out.push(c);
    }
    Some(out)
}

/// Distinct `(title, id)` pairs with both present, across every table.
pub fn observation_query(tables: &[TableRef]) -> String {
    tables
        .iter()
        .map(|t| {
            format!(
                "SELECT DISTINCT {title} AS title, {id} AS {id} FROM {table} WHERE {title_present} AND {id_present}",
                title = t.title_column,
                id = INSTANCE_ID_COLUMN,
                table = t.qualified_name(),
                title_present = present(&t.title_column),
                id_present = present(INSTANCE_ID_COLUMN),
            )
        })
        .collect::<Vec<_>>()
        .join(" UNION ")
}

/// Distinct non-null titles across every table, whatever their id.
pub fn target_titles_query(tables: &[TableRef]) -> String {
    tables
        .iter()
        .map(|t| {
            format!(
                "SELECT DISTINCT {title} AS title FROM {table} WHERE {title_present}",
                title = t.title_column,
                table = t.qualified_name(),
                title_present = present(&t.title_column),
            )
        })
        .collect::<Vec<_>>()
        .join(" UNION ")
}

pub fn missing_titles_query(table: &TableRef) -> String {
    format!(
        "SELECT DISTINCT {title} AS title FROM {table} WHERE {id_missing} AND {title_present}",
        title = table.title_column,
        table = table.qualified_name(),
        id_missing = id_missing(),
        title_present = present(&table.title_column),
    )
}

pub fn null_counts_query(table: &TableRef) -> String {
    format!(
        "SELECT COUNT(*) AS {rows}, COUNT(DISTINCT {title}) AS {titles} FROM {table} WHERE {id_missing};",
        rows = NULL_ROWS_ALIAS,
        titles = NULL_TITLES_ALIAS,
        title = table.title_column,
        table = table.qualified_name(),
        id_missing = id_missing(),
    )
}

/// Read-only stand-in for the update batch during a dry run.
pub fn dry_run_statement(table: &TableRef) -> String {
    format!("SELECT * FROM {} LIMIT 1;", table.qualified_name())
}

pub fn prepared_update(table: &TableRef) -> String {
    format!(
        "UPDATE {table} SET {id} = $1 WHERE {title} = $2 AND {id_missing}",
        table = table.qualified_name(),
        id = INSTANCE_ID_COLUMN,
        title = table.title_column,
        id_missing = id_missing(),
    )
}

/// Before-count, body, after-count as one multi-statement string.
pub fn text_batch(table: &TableRef, updates: Option<&[ConditionalUpdate]>) -> String {
    let counts = null_counts_query(table);
    let body = match updates {
        Some(updates) => updates.iter().map(|u| u.to_sql(table)).collect::<Vec<_>>().join(" "),
        None => dry_run_statement(table),
    };
    format!("{} {} {}", counts, body, counts)
}
