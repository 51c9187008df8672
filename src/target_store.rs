use crate::config::TableRef;
use crate::error::BackfillError;
use crate::sql::ConditionalUpdate;
use rustc_hash::FxHashSet;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A `(title, instance_id)` row as it comes out of the store, either side possibly null.
pub type RawPair = (Option<String>, Option<String>);

/// Rows with a null id, and distinct titles among them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NullCounts {
    pub rows: i64,
    pub titles: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchBody {
    Updates(Vec<ConditionalUpdate>),
    /// Read-only statement run in place of the updates on a dry run.
    DryRun,
}

impl BatchBody {
    pub fn is_dry_run(&self) -> bool {
        matches!(self, BatchBody::DryRun)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub before: NullCounts,
    pub after: NullCounts,
}

impl BatchReport {
    pub fn rows_updated(&self) -> i64 {
        self.before.rows - self.after.rows
    }

    pub fn titles_updated(&self) -> i64 {
        self.before.titles - self.after.titles
    }
}

/// The relational store whose id columns get backfilled.
#[allow(async_fn_in_trait)]
pub trait TargetStore {
    /// Every row across `tables` where both title and id are present.
    async fn observations(&self, tables: &[TableRef]) -> Result<Vec<RawPair>, BackfillError>;
    /// Distinct non-null titles across `tables`, whether or not their id is set.
    async fn target_titles(&self, tables: &[TableRef]) -> Result<FxHashSet<String>, BackfillError>;
    async fn titles_missing_id(&self, table: &TableRef) -> Result<FxHashSet<String>, BackfillError>;
    /// Counts nulls, runs `body`, counts again, all as one unit.
    async fn execute_batch(&self, table: &TableRef, body: &BatchBody) -> Result<BatchReport, BackfillError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub title: Option<String>,
    pub instance_id: Option<String>,
}

impl Row {
    pub fn new(title: Option<&str>, instance_id: Option<&str>) -> Self {
        Self {
            title: title.map(str::to_string),
            instance_id: instance_id.map(str::to_string),
        }
    }

    /// Title, unless null or blank.
    pub fn present_title(&self) -> Option<&str> {
        self.title.as_deref().filter(|t| !t.is_empty())
    }

    /// True when the id is null or blank.
    pub fn id_missing(&self) -> bool {
        self.instance_id.as_deref().is_none_or(str::is_empty)
    }
}

pub struct InMemoryTargetStore {
    tables: Mutex<BTreeMap<TableRef, Vec<Row>>>,
    statements: AtomicUsize,
}

impl InMemoryTargetStore {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(BTreeMap::new()),
            statements: AtomicUsize::new(0),
        }
    }

    pub fn with_row(mut self, table: &TableRef, title: Option<&str>, instance_id: Option<&str>) -> Self {
        // sole owner, so a poisoned lock has no other holder left to observe it
        let tables = self.tables.get_mut().unwrap_or_else(|e| e.into_inner());
        tables.entry(table.clone()).or_default().push(Row::new(title, instance_id));
        self
    }

    pub fn insert_row(&self, table: &TableRef, title: Option<&str>, instance_id: Option<&str>) -> Result<(), BackfillError> {
        self.lock()?
            .entry(table.clone())
            .or_default()
            .push(Row::new(title, instance_id));
        Ok(())
    }

    pub fn rows(&self, table: &TableRef) -> Vec<Row> {
        self.tables
            .lock()
            .map(|tables| tables.get(table).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Ids currently stored for `title` in `table`.
    pub fn ids_for(&self, table: &TableRef, title: &str) -> Vec<Option<String>> {
        self.rows(table)
            .into_iter()
            .filter(|r| r.title.as_deref() == Some(title))
            .map(|r| r.instance_id)
            .collect()
    }

    /// Number of update statements applied so far.
    pub fn statements_executed(&self) -> usize {
        self.statements.load(Ordering::SeqCst)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<TableRef, Vec<Row>>>, BackfillError> {
        self.tables
            .lock()
            .map_err(|e| BackfillError::Database(format!("in-memory store poisoned: {}", e)))
    }

    fn table_rows<'g>(tables: &'g BTreeMap<TableRef, Vec<Row>>, table: &TableRef) -> Result<&'g Vec<Row>, BackfillError> {
        tables.get(table).ok_or_else(|| missing_relation(table))
    }

    fn null_counts(rows: &[Row]) -> NullCounts {
        let nulls: Vec<&Row> = rows.iter().filter(|r| r.id_missing()).collect();
        let titles: FxHashSet<&str> = nulls.iter().filter_map(|r| r.title.as_deref()).collect();
        NullCounts {
            rows: nulls.len() as i64,
            titles: titles.len() as i64,
        }
    }
}

fn missing_relation(table: &TableRef) -> BackfillError {
    BackfillError::Database(format!("relation \"{}\" does not exist", table))
}

impl Default for InMemoryTargetStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetStore for InMemoryTargetStore {
    async fn observations(&self, tables: &[TableRef]) -> Result<Vec<RawPair>, BackfillError> {
        let guard = self.lock()?;
        let mut seen = FxHashSet::default();
        for table in tables {
            for row in Self::table_rows(&guard, table)? {
                if row.present_title().is_some() && !row.id_missing() {
                    seen.insert((row.title.clone(), row.instance_id.clone()));
                }
            }
        }
        Ok(seen.into_iter().collect())
    }

    async fn target_titles(&self, tables: &[TableRef]) -> Result<FxHashSet<String>, BackfillError> {
        let guard = self.lock()?;
        let mut titles = FxHashSet::default();
        for table in tables {
            titles.extend(Self::table_rows(&guard, table)?.iter().filter_map(|row| row.present_title().map(str::to_string)));
        }
        Ok(titles)
    }

    async fn titles_missing_id(&self, table: &TableRef) -> Result<FxHashSet<String>, BackfillError> {
        let guard = self.lock()?;
        Ok(Self::table_rows(&guard, table)?
            .iter()
            .filter(|row| row.id_missing())
            .filter_map(|row| row.present_title().map(str::to_string))
            .collect())
    }

    async fn execute_batch(&self, table: &TableRef, body: &BatchBody) -> Result<BatchReport, BackfillError> {
        let mut guard = self.lock()?;
        let rows = guard
            .get_mut(table)
            .ok_or_else(|| missing_relation(table))?;
        let before = Self::null_counts(rows);
        if let BatchBody::Updates(updates) = body {
            for update in updates {
                for row in rows.iter_mut() {
                    if row.id_missing() && row.title.as_deref() == Some(update.title.as_str()) {
                        row.instance_id = Some(update.instance_id.clone());
                    }
                }
                self.statements.fetch_add(1, Ordering::SeqCst);
            }
        }
        let after = Self::null_counts(rows);
        Ok(BatchReport { before, after })
    }
}
