use crate::classify::{classify, Classification};
use crate::config::BackfillConfig;
use crate::coverage::resolve_null_coverage;
use crate::document_store::{index_books, DocumentSource};
use crate::error::BackfillError;
use crate::observation::TitleIdIndex;
use crate::placeholder::assign_placeholders;
use crate::planner::{apply_pass, PassKind, PassReport};
use crate::report::{ambiguous_titles, write_ambiguous_report};
use crate::target_store::TargetStore;
use rustc_hash::FxHashMap;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub document_titles: usize,
    pub sql_titles: usize,
    pub merged_titles: usize,
    pub classification: Classification,
    pub placeholders: FxHashMap<String, String>,
    pub safe_pass: PassReport,
    pub placeholder_pass: PassReport,
}

impl RunSummary {
    pub fn log(&self) {
        tracing::info!(
            document_titles = self.document_titles,
            sql_titles = self.sql_titles,
            merged_titles = self.merged_titles,
            safe = self.classification.safe.len(),
            ambiguous = self.classification.ambiguous.len(),
            placeholders = self.placeholders.len(),
            safe_rows_updated = self.safe_pass.rows_updated(),
            placeholder_rows_updated = self.placeholder_pass.rows_updated(),
            "backfill summary"
        );
    }
}

pub struct Backfiller<'a, D, S> {
    config: &'a BackfillConfig,
    documents: &'a D,
    store: &'a S,
}

impl<'a, D: DocumentSource, S: TargetStore> Backfiller<'a, D, S> {
    pub fn new(config: &'a BackfillConfig, documents: &'a D, store: &'a S) -> Self {
        Self {
            config,
            documents,
            store,
        }
    }

    #[tracing::instrument(skip_all, fields(environment = %self.config.environment))]
    pub async fn run(&self) -> Result<RunSummary, BackfillError> {
        let start = Instant::now();
        let tables = &self.config.tables;
        tracing::info!(
            environment = %self.config.environment,
            tables = tables.len(),
            really_run_update = self.config.really_run_update,
            "starting backfill"
        );

        // The two pulls are the only concurrent work; either failing ends the run.
        let (books, sql_rows) = tokio::try_join!(self.documents.fetch_books(), self.store.observations(tables))?;

        let document_index = index_books(&books);
        let sql_index = TitleIdIndex::from_raw(sql_rows.iter().map(|(title, id)| (title.as_deref(), id.as_deref())));
        let merged = TitleIdIndex::merge(&document_index, &sql_index);
        tracing::info!(
            document_titles = document_index.len(),
            sql_rows = sql_rows.len(),
            sql_titles = sql_index.len(),
            merged_titles = merged.len(),
            "built title index"
        );

        let classification = classify(&merged);
        if let Some(path) = &self.config.ambiguous_report {
            write_ambiguous_report(path, &ambiguous_titles(&merged, &classification))?;
        }

        let safe_pass = apply_pass(
            self.store,
            tables,
            &classification.safe,
            self.config.really_run_update,
            PassKind::Safe,
        )
        .await?;

        // Known titles come from the pre-pass classification. The safe pass
        // only writes ids for titles already in that set, so it cannot shrink
        // the set of never-observed titles.
        let known = classification.known_titles();
        let gaps = resolve_null_coverage(self.store, tables, &known).await?;
        let placeholders = assign_placeholders(gaps.iter());

        let placeholder_pass = apply_pass(
            self.store,
            tables,
            &placeholders,
            self.config.really_run_update,
            PassKind::Placeholder,
        )
        .await?;

        let summary = RunSummary {
            document_titles: document_index.len(),
            sql_titles: sql_index.len(),
            merged_titles: merged.len(),
            classification,
            placeholders,
            safe_pass,
            placeholder_pass,
        };
        summary.log();
        tracing::info!(elapsed_ms = start.elapsed().as_millis() as u64, "backfill finished");
        Ok(summary)
    }
}
