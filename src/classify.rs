use crate::observation::TitleIdIndex;
use rustc_hash::{FxHashMap, FxHashSet};

/// Partition of an index into titles with one id and titles with several.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub safe: FxHashMap<String, String>,
    pub ambiguous: FxHashSet<String>,
}

impl Classification {
    /// Every title with at least one real id somewhere.
    pub fn known_titles(&self) -> FxHashSet<String> {
        self.safe.keys().chain(self.ambiguous.iter()).cloned().collect()
    }

    pub fn is_safe(&self, title: &str) -> bool {
        self.safe.contains_key(title)
    }

    pub fn is_ambiguous(&self, title: &str) -> bool {
        self.ambiguous.contains(title)
    }
}

/// A title is safe only when exactly one distinct id was seen for it. Any
/// plurality excludes it; no tie-break is attempted.
pub fn classify(index: &TitleIdIndex) -> Classification {
    let mut classification = Classification::default();
    for (title, ids) in index.iter() {
        let mut iter = ids.iter();
        match (iter.next(), iter.next()) {
            (Some(id), None) => {
                classification.safe.insert(title.clone(), id.clone());
            }
            (Some(_), Some(_)) => {
                tracing::warn!(title = %title, num_matches = ids.len(), "title with multiple distinct instance ids");
                classification.ambiguous.insert(title.clone());
            }
            // empty sets never get into an index
            (None, _) => {}
        }
    }
    tracing::info!(
        safe = classification.safe.len(),
        ambiguous = classification.ambiguous.len(),
        "classified titles"
    );
    classification
}
