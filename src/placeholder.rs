use rustc_hash::FxHashMap;
use uuid::Uuid;

/// Marks ids minted by the backfill rather than assigned by the library.
pub const PLACEHOLDER_PREFIX: &str = "auto_";

/// `auto_` followed by a random (version 4) hyphenated uuid.
pub fn generate_placeholder_id() -> String {
    format!("{}{}", PLACEHOLDER_PREFIX, Uuid::new_v4().hyphenated())
}

pub fn is_placeholder(instance_id: &str) -> bool {
    instance_id
        .strip_prefix(PLACEHOLDER_PREFIX)
        .and_then(|rest| Uuid::parse_str(rest).ok())
        .is_some()
}

/// A fresh id per title; nothing is reused.
pub fn assign_placeholders<'a, I>(titles: I) -> FxHashMap<String, String>
where
    I: IntoIterator<Item = &'a String>,
{
    titles
        .into_iter()
        .map(|title| (title.clone(), generate_placeholder_id()))
        .collect()
}
