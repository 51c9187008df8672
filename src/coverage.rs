use crate::config::TableRef;
use crate::error::BackfillError;
use crate::target_store::TargetStore;
use rustc_hash::FxHashSet;

/// Titles in the target store with no real id anywhere.
///
/// A null id in one table is not enough: the same title may carry its id in
/// another table or in the document store, in which case it is covered and
/// never gets a placeholder.
pub fn uncovered_titles(target_titles: &FxHashSet<String>, known: &FxHashSet<String>) -> FxHashSet<String> {
    target_titles.difference(known).cloned().collect()
}

pub async fn resolve_null_coverage<S: TargetStore>(
    store: &S,
    tables: &[TableRef],
    known: &FxHashSet<String>,
) -> Result<FxHashSet<String>, BackfillError> {
    let target_titles = store.target_titles(tables).await?;
    let gaps = uncovered_titles(&target_titles, known);
    tracing::info!(
        target_titles = target_titles.len(),
        known = known.len(),
        uncovered = gaps.len(),
        "resolved null coverage"
    );
    Ok(gaps)
}
