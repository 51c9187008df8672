use crate::config::TableRef;
use crate::error::BackfillError;
use crate::sql::ConditionalUpdate;
use crate::target_store::{BatchBody, BatchReport, TargetStore};
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;
use std::time::{Duration, Instant};

const PREVIEW_STATEMENTS: usize = 10;

/// Where one table is in a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableStage {
    Idle,
    QueryMissing,
    PlanBuilt,
    DryRunPreview,
    Executed,
    Reported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    Safe,
    Placeholder,
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassKind::Safe => write!(f, "safe"),
            PassKind::Placeholder => write!(f, "placeholder"),
        }
    }
}

/// Updates for one table, limited to titles whose id is null in that table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePlan {
    pub table: TableRef,
    pub updates: Vec<ConditionalUpdate>,
}

impl UpdatePlan {
    pub fn build(
        table: &TableRef,
        candidates: &FxHashMap<String, String>,
        missing: &FxHashSet<String>,
    ) -> Self {
        let mut updates: Vec<ConditionalUpdate> = candidates
            .iter()
            .filter(|(title, _)| missing.contains(*title))
            .map(|(title, id)| ConditionalUpdate::new(title, id))
            .collect();
        updates.sort();
        Self {
            table: table.clone(),
            updates,
        }
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    pub fn preview(&self, limit: usize) -> Vec<String> {
        self.updates.iter().take(limit).map(|u| u.to_sql(&self.table)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableReport {
    pub table: TableRef,
    pub planned: usize,
    pub stage: TableStage,
    /// None when nothing was planned and no batch ran.
    pub batch: Option<BatchReport>,
}

#[derive(Debug, Clone)]
pub struct PassReport {
    pub kind: PassKind,
    pub candidates: usize,
    pub tables: Vec<TableReport>,
    pub elapsed: Duration,
}

impl PassReport {
    pub fn planned(&self) -> usize {
        self.tables.iter().map(|t| t.planned).sum()
    }

    pub fn rows_updated(&self) -> i64 {
        self.tables.iter().filter_map(|t| t.batch).map(|b| b.rows_updated()).sum()
    }
}

struct TablePass<'a> {
    table: &'a TableRef,
    stage: TableStage,
}

impl<'a> TablePass<'a> {
    fn new(table: &'a TableRef) -> Self {
        Self {
            table,
            stage: TableStage::Idle,
        }
    }

    fn advance(&mut self, next: TableStage) {
        tracing::debug!(table = %self.table, from = ?self.stage, to = ?next, "stage");
        self.stage = next;
    }
}

#[tracing::instrument(skip_all, fields(table = %table))]
async fn apply_table<S: TargetStore>(
    store: &S,
    table: &TableRef,
    candidates: &FxHashMap<String, String>,
    really_run_update: bool,
) -> Result<TableReport, BackfillError> {
    let mut pass = TablePass::new(table);

    pass.advance(TableStage::QueryMissing);
    let missing = store.titles_missing_id(table).await?;

    let plan = UpdatePlan::build(table, candidates, &missing);
    pass.advance(TableStage::PlanBuilt);
    tracing::info!(table = %table, missing_titles = missing.len(), update_queries = plan.len(), "planned updates");

    if plan.is_empty() {
        pass.advance(TableStage::Reported);
        return Ok(TableReport {
            table: table.clone(),
            planned: 0,
            stage: pass.stage,
            batch: None,
        });
    }

    for statement in plan.preview(PREVIEW_STATEMENTS) {
        tracing::info!(table = %table, "update statement: {}", statement);
    }

    let planned = plan.len();
    let body = if really_run_update {
        pass.advance(TableStage::Executed);
        BatchBody::Updates(plan.updates)
    } else {
        pass.advance(TableStage::DryRunPreview);
        BatchBody::DryRun
    };
    let batch = store.execute_batch(table, &body).await?;

    tracing::info!(
        table = %table,
        dry_run = body.is_dry_run(),
        "NumProblemRows Before: {}, NumProblemRows After: {}, NumUpdated={}",
        batch.before.rows,
        batch.after.rows,
        batch.rows_updated()
    );
    tracing::info!(
        table = %table,
        dry_run = body.is_dry_run(),
        "NumDistinctProblemTitles Before: {}, NumDistinctProblemTitles After: {}, NumUpdated={}",
        batch.before.titles,
        batch.after.titles,
        batch.titles_updated()
    );

    pass.advance(TableStage::Reported);
    Ok(TableReport {
        table: table.clone(),
        planned,
        stage: pass.stage,
        batch: Some(batch),
    })
}

/// Runs one pass over every table in order. Tables never overlap and the
/// first error ends the pass.
pub async fn apply_pass<S: TargetStore>(
    store: &S,
    tables: &[TableRef],
    candidates: &FxHashMap<String, String>,
    really_run_update: bool,
    kind: PassKind,
) -> Result<PassReport, BackfillError> {
    let start = Instant::now();
    let mut reports = Vec::with_capacity(tables.len());

    if candidates.is_empty() {
        tracing::info!(pass = %kind, "no candidates, skipping pass");
    } else {
        tracing::info!(pass = %kind, candidates = candidates.len(), tables = tables.len(), really_run_update, "starting pass");
        for table in tables {
            reports.push(apply_table(store, table, candidates, really_run_update).await?);
        }
    }

    let report = PassReport {
        kind,
        candidates: candidates.len(),
        tables: reports,
        elapsed: start.elapsed(),
    };
    tracing::info!(
        pass = %kind,
        planned = report.planned(),
        rows_updated = report.rows_updated(),
        elapsed_ms = report.elapsed.as_millis() as u64,
        "finished pass"
    );
    Ok(report)
}
