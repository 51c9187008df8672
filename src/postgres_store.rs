use crate::config::{BackfillConfig, TableRef};
use crate::error::BackfillError;
use crate::sql;
use crate::target_store::{BatchBody, BatchReport, NullCounts, RawPair, TargetStore};
use bb8::Pool;
use bb8_postgres::PostgresConnectionManager;
use rustc_hash::FxHashSet;
use tokio_postgres::{NoTls, Row, SimpleQueryMessage, SimpleQueryRow};

pub struct PostgresTargetStore {
    pool: Pool<PostgresConnectionManager<NoTls>>,
    text_batches: bool,
}

impl PostgresTargetStore {
    pub async fn connect(config: &BackfillConfig) -> Result<Self, BackfillError> {
        let pg_config: tokio_postgres::Config = config.database_url.parse()?;
        let manager = PostgresConnectionManager::new(pg_config, NoTls);
        let pool = Pool::builder().max_size(config.pool_size).build(manager).await?;
        tracing::info!(pool_size = config.pool_size, text_batches = config.text_batches, "connected to postgres");
        Ok(Self {
            pool,
            text_batches: config.text_batches,
        })
    }

    /// Releases the pool. Idle connections close once the last handle is gone.
    pub fn close(self) {
        let state = self.pool.state();
        tracing::info!(connections = state.connections, "closing postgres pool");
        drop(self.pool);
    }

    async fn titles(&self, query: &str) -> Result<FxHashSet<String>, BackfillError> {
        let conn = self.pool.get().await?;
        let rows = conn.query(query, &[]).await?;
        let mut titles = FxHashSet::default();
        for row in rows {
            if let Some(title) = row.try_get::<_, Option<String>>("title")? {
                titles.insert(title);
            }
        }
        Ok(titles)
    }

    async fn execute_prepared(&self, table: &TableRef, body: &BatchBody) -> Result<BatchReport, BackfillError> {
        let mut conn = self.pool.get().await?;
        let tx = conn.transaction().await?;
        let counts = sql::null_counts_query(table);

        let before = counts_from_row(&tx.query_one(counts.as_str(), &[]).await?)?;
        match body {
            BatchBody::Updates(updates) => {
                let statement = tx.prepare(&sql::prepared_update(table)).await?;
                for update in updates {
                    tx.execute(&statement, &[&update.instance_id, &update.title]).await?;
                }
            }
            BatchBody::DryRun => {
                tx.simple_query(&sql::dry_run_statement(table)).await?;
            }
        }
        let after = counts_from_row(&tx.query_one(counts.as_str(), &[]).await?)?;
        tx.commit().await?;
        Ok(BatchReport { before, after })
    }

    /// Sends counts, body and counts as one multi-statement round trip.
    async fn execute_text(&self, table: &TableRef, body: &BatchBody) -> Result<BatchReport, BackfillError> {
        let text = match body {
            BatchBody::Updates(updates) => sql::text_batch(table, Some(updates)),
            BatchBody::DryRun => sql::text_batch(table, None),
        };
        let conn = self.pool.get().await?;
        let messages = conn.simple_query(&text).await?;
        let rows: Vec<Vec<(&str, Option<&str>)>> = messages
            .iter()
            .filter_map(|m| match m {
                SimpleQueryMessage::Row(row) => Some(simple_row_values(row)),
                _ => None,
            })
            .collect();
        batch_report_from_rows(&rows, table)
    }
}

fn simple_row_values(row: &SimpleQueryRow) -> Vec<(&str, Option<&str>)> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, column)| (column.name(), row.get(i)))
        .collect()
}

/// Picks the before and after counts out of a textual batch's result rows.
///
/// The dry-run body returns a table row of its own, so only rows carrying
/// both count columns are considered.
fn batch_report_from_rows(rows: &[Vec<(&str, Option<&str>)>], table: &TableRef) -> Result<BatchReport, BackfillError> {
    let counts: Vec<&Vec<(&str, Option<&str>)>> = rows
        .iter()
        .filter(|row| {
            let has = |name: &str| row.iter().any(|(column, _)| *column == name);
            has(sql::NULL_ROWS_ALIAS) && has(sql::NULL_TITLES_ALIAS)
        })
        .collect();
    match counts.as_slice() {
        [first, .., last] => Ok(BatchReport {
            before: counts_from_values(first)?,
            after: counts_from_values(last)?,
        }),
        _ => Err(BackfillError::Database(format!(
            "expected two count rows for {}, got {}",
            table,
            counts.len()
        ))),
    }
}

fn counts_from_row(row: &Row) -> Result<NullCounts, BackfillError> {
    Ok(NullCounts {
        rows: row.try_get(sql::NULL_ROWS_ALIAS)?,
        titles: row.try_get(sql::NULL_TITLES_ALIAS)?,
    })
}

fn counts_from_values(row: &[(&str, Option<&str>)]) -> Result<NullCounts, BackfillError> {
    let read = |name: &str| -> Result<i64, BackfillError> {
        row.iter()
            .find(|(column, _)| *column == name)
            .and_then(|(_, value)| *value)
            .ok_or_else(|| BackfillError::Database(format!("null {} in count row", name)))?
            .parse::<i64>()
            .map_err(|e| BackfillError::Database(format!("bad {} in count row: {}", name, e)))
    };
    Ok(NullCounts {
        rows: read(sql::NULL_ROWS_ALIAS)?,
        titles: read(sql::NULL_TITLES_ALIAS)?,
    })
}

impl TargetStore for PostgresTargetStore {
    async fn observations(&self, tables: &[TableRef]) -> Result<Vec<RawPair>, BackfillError> {
        let conn = self.pool.get().await?;
        let rows = conn.query(sql::observation_query(tables).as_str(), &[]).await?;
        tracing::info!(count = rows.len(), "fetched observations from postgres");
        let mut pairs = Vec::with_capacity(rows.len());
        for row in rows {
            pairs.push((
                row.try_get::<_, Option<String>>("title")?,
                row.try_get::<_, Option<String>>(crate::config::INSTANCE_ID_COLUMN)?,
            ));
        }
        Ok(pairs)
    }

    async fn target_titles(&self, tables: &[TableRef]) -> Result<FxHashSet<String>, BackfillError> {
        self.titles(&sql::target_titles_query(tables)).await
    }

    async fn titles_missing_id(&self, table: &TableRef) -> Result<FxHashSet<String>, BackfillError> {
        self.titles(&sql::missing_titles_query(table)).await
    }

    async fn execute_batch(&self, table: &TableRef, body: &BatchBody) -> Result<BatchReport, BackfillError> {
        if self.text_batches {
            self.execute_text(table, body).await
        } else {
            self.execute_prepared(table, body).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TableRef {
        TableRef::new("s", "pages_read", "title")
    }

    fn counts<'a>(rows: &'a str, titles: &'a str) -> Vec<(&'a str, Option<&'a str>)> {
        vec![(sql::NULL_ROWS_ALIAS, Some(rows)), (sql::NULL_TITLES_ALIAS, Some(titles))]
    }

    #[test]
    fn test_dry_run_table_row_is_skipped() {
        let table_row = vec![
            ("title", Some("Cat")),
            ("book_instance_id", None),
            ("cnt", Some("99")),
        ];
        let rows = vec![counts("5", "2"), table_row, counts("5", "2")];

        let report = batch_report_from_rows(&rows, &table()).unwrap();
        assert_eq!(report.before, NullCounts { rows: 5, titles: 2 });
        assert_eq!(report.after, report.before);
    }

    #[test]
    fn test_first_and_last_count_rows_are_used() {
        let rows = vec![counts("7", "3"), counts("1", "1")];

        let report = batch_report_from_rows(&rows, &table()).unwrap();
        assert_eq!(report.rows_updated(), 6);
        assert_eq!(report.titles_updated(), 2);
    }

    #[test]
    fn test_single_count_row_is_an_error() {
        let rows = vec![counts("7", "3"), vec![("title", Some("Cat"))]];
        let result = batch_report_from_rows(&rows, &table());
        assert!(matches!(result, Err(BackfillError::Database(_))));
    }

    #[test]
    fn test_unparseable_count_is_an_error() {
        let rows = vec![counts("seven", "3"), counts("1", "1")];
        assert!(batch_report_from_rows(&rows, &table()).is_err());
    }
}
