use rustc_hash::{FxHashMap, FxHashSet};

/// Evidence that a title is associated with an instance id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Observation {
    pub title: String,
    pub instance_id: String,
}

impl Observation {
    pub fn new(title: &str, instance_id: &str) -> Self {
        Self {
            title: title.to_string(),
            instance_id: instance_id.to_string(),
        }
    }

    /// Returns None when either field is missing or empty.
    pub fn from_raw(title: Option<&str>, instance_id: Option<&str>) -> Option<Self> {
        match (title, instance_id) {
            (Some(t), Some(id)) if !t.is_empty() && !id.is_empty() => Some(Self::new(t, id)),
            _ => None,
        }
    }
}

/// Title to the set of distinct instance ids observed for it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TitleIdIndex {
    map: FxHashMap<String, FxHashSet<String>>,
}

impl TitleIdIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_observations<I>(observations: I) -> Self
    where
        I: IntoIterator<Item = Observation>,
    {
        let mut index = Self::new();
        for observation in observations {
            index.insert(observation);
        }
        index
    }

    /// Builds an index straight from raw rows, dropping those with a missing field.
    pub fn from_raw<'a, I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (Option<&'a str>, Option<&'a str>)>,
    {
        Self::from_observations(rows.into_iter().filter_map(|(title, id)| Observation::from_raw(title, id)))
    }

    pub fn insert(&mut self, observation: Observation) {
        self.map
            .entry(observation.title)
            .or_default()
            .insert(observation.instance_id);
    }

    pub fn ids_for(&self, title: &str) -> Option<&FxHashSet<String>> {
        self.map.get(title)
    }

    pub fn contains_title(&self, title: &str) -> bool {
        self.map.contains_key(title)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FxHashSet<String>)> {
        self.map.iter()
    }

    pub fn titles(&self) -> impl Iterator<Item = &String> {
        self.map.keys()
    }

    /// Union of two indexes. Neither input is touched; a title seen on both
    /// sides ends up with the union of its ids, so disagreement between the
    /// sources surfaces as a multi-id set.
    pub fn merge(a: &TitleIdIndex, b: &TitleIdIndex) -> TitleIdIndex {
        let mut combined = a.clone();
        for (title, ids) in b.iter() {
            match combined.map.get_mut(title) {
                Some(existing) => existing.extend(ids.iter().cloned()),
                None => {
                    combined.map.insert(title.clone(), ids.clone());
                }
            }
        }
        combined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_missing_a_field_are_dropped() {
        let rows = vec![
            (Some("Cat"), Some("abc")),
            (None, Some("orphan-id")),
            (Some("Dog"), None),
            (Some(""), Some("x")),
            (Some("Eel"), Some("")),
        ];
        let index = TitleIdIndex::from_raw(rows);
        assert_eq!(index.len(), 1);
        assert!(index.contains_title("Cat"));
    }

    #[test]
    fn test_repeated_pairs_collapse() {
        let index = TitleIdIndex::from_observations(vec![
            Observation::new("Cat", "abc"),
            Observation::new("Cat", "abc"),
            Observation::new("Cat", "abc"),
        ]);
        assert_eq!(index.ids_for("Cat").unwrap().len(), 1);
    }

    #[test]
    fn test_merge_unions_instead_of_overwriting() {
        let a = TitleIdIndex::from_observations(vec![Observation::new("Dog", "X")]);
        let b = TitleIdIndex::from_observations(vec![Observation::new("Dog", "Y"), Observation::new("Cat", "abc")]);
        let merged = TitleIdIndex::merge(&a, &b);

        let dog = merged.ids_for("Dog").unwrap();
        assert_eq!(dog.len(), 2);
        assert!(dog.contains("X") && dog.contains("Y"));
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_merge_leaves_inputs_untouched() {
        let a = TitleIdIndex::from_observations(vec![Observation::new("Dog", "X")]);
        let b = TitleIdIndex::from_observations(vec![Observation::new("Dog", "Y")]);
        let a_before = a.clone();
        let b_before = b.clone();
        let _ = TitleIdIndex::merge(&a, &b);
        assert_eq!(a, a_before);
        assert_eq!(b, b_before);
    }

    #[test]
    fn test_merge_with_empty() {
        let a = TitleIdIndex::from_observations(vec![Observation::new("Cat", "abc")]);
        let empty = TitleIdIndex::new();
        assert_eq!(TitleIdIndex::merge(&a, &empty), a);
        assert_eq!(TitleIdIndex::merge(&empty, &a), a);
    }
}
