use crate::classify::Classification;
use crate::error::BackfillError;
use crate::observation::TitleIdIndex;
use serde::Serialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AmbiguousTitle {
    pub title: String,
    pub instance_ids: Vec<String>,
}

/// Ambiguous titles with their competing ids, sorted for stable diffs between runs.
pub fn ambiguous_titles(index: &TitleIdIndex, classification: &Classification) -> Vec<AmbiguousTitle> {
    let mut entries: Vec<AmbiguousTitle> = classification
        .ambiguous
        .iter()
        .map(|title| {
            let mut instance_ids: Vec<String> = index
                .ids_for(title)
                .map(|ids| ids.iter().cloned().collect())
                .unwrap_or_default();
            instance_ids.sort();
            AmbiguousTitle {
                title: title.clone(),
                instance_ids,
            }
        })
        .collect();
    entries.sort_by(|a, b| a.title.cmp(&b.title));
    entries
}

pub fn write_ambiguous_report(path: &Path, entries: &[AmbiguousTitle]) -> Result<(), BackfillError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(entries)?;
    fs::write(path, json)?;
    tracing::info!(path = %path.display(), count = entries.len(), "wrote ambiguous title report");
    Ok(())
}
