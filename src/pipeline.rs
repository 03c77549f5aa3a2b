//! Tag vocabulary extraction and the filtering stages that turn a fetched
//! collection plus the user's selections into the set shown on the map.

use std::{collections::HashSet, fmt};

use crate::normalize::{Feature, FeatureCollection, FeatureId, Tags};

/// Keys containing any of these are not offered as filters.
pub const TAG_STOPLIST: [&str; 4] = ["name", ":position", "wiki", "ref"];

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagRecord {
    pub key: String,
    pub value: String,
}

impl TagRecord {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        TagRecord {
            key: key.into(),
            value: value.into(),
        }
    }

    fn matches(&self, key: &str, value: &str) -> bool {
        self.key == key && self.value == value
    }
}

impl fmt::Display for TagRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

pub fn is_filterable_key(key: &str) -> bool {
    TAG_STOPLIST.iter().all(|s| !key.contains(s))
}

/// Distinct filterable tag pairs of the collection, in first-seen order.
pub fn tag_vocabulary(features: &[Feature]) -> Vec<TagRecord> {
    let mut seen = HashSet::new();
    let mut vocabulary = vec![];

    for (key, value) in features.iter().flat_map(|f| f.tag_pairs()) {
        if !is_filterable_key(key) {
            continue;
        }

        let record = TagRecord::new(key, value);
        if seen.insert(record.clone()) {
            vocabulary.push(record);
        }
    }

    vocabulary
}

/// Checked tags and checked feature rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub tags: HashSet<TagRecord>,
    pub rows: HashSet<FeatureId>,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.rows.is_empty()
    }

    pub fn toggle_tag(&mut self, tag: TagRecord) {
        if !self.tags.remove(&tag) {
            self.tags.insert(tag);
        }
    }

    pub fn toggle_row(&mut self, id: FeatureId) {
        if !self.rows.remove(&id) {
            self.rows.insert(id);
        }
    }
}

/// A feature of the active set: its position in the collection and its
/// derived display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveEntry {
    pub index: usize,
    pub name: String,
}

/// `name`, then `name:en`, then empty.
pub fn display_name(tags: Option<&Tags>) -> String {
    let Some(tags) = tags else {
        return String::new();
    };

    tags.get("name")
        .or_else(|| tags.get("name:en"))
        .cloned()
        .unwrap_or_default()
}

/// Indices of the features carrying at least one selected tag, or of every
/// feature when no tag is selected.
pub fn filter_by_tags(features: &[Feature], selected: &HashSet<TagRecord>) -> Vec<usize> {
    features
        .iter()
        .enumerate()
        .filter(|(_, f)| {
            selected.is_empty()
                || f.tag_pairs()
                    .any(|(k, v)| selected.iter().any(|s| s.matches(k, v)))
        })
        .map(|(ix, _)| ix)
        .collect()
}

/// Indices of the features whose id is selected, looked up in the whole
/// collection.
pub fn filter_by_rows(features: &[Feature], rows: &HashSet<FeatureId>) -> Vec<usize> {
    features
        .iter()
        .enumerate()
        .filter(|(_, f)| rows.contains(&f.id))
        .map(|(ix, _)| ix)
        .collect()
}

pub fn name_entries(features: &[Feature], indices: Vec<usize>) -> Vec<ActiveEntry> {
    indices
        .into_iter()
        .map(|index| ActiveEntry {
            index,
            name: display_name(features[index].tags.as_ref()),
        })
        .collect()
}

/// Result of running every stage over one collection and selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filtered {
    /// After tag filtering, what the feature table lists.
    pub tag_filtered: Vec<ActiveEntry>,
    /// What the map shows: the selected rows if any, the tag filtered set
    /// otherwise.
    pub displayed: Vec<ActiveEntry>,
}

pub fn apply(collection: &FeatureCollection, selection: &Selection) -> Filtered {
    let features = collection.features();

    let tag_filtered = name_entries(features, filter_by_tags(features, &selection.tags));

    let displayed = if selection.rows.is_empty() {
        tag_filtered.clone()
    } else {
        name_entries(features, filter_by_rows(features, &selection.rows))
    };

    Filtered {
        tag_filtered,
        displayed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overpass::ElementKind;

    fn feature(id: i64, tags: Option<&[(&str, &str)]>) -> Feature {
        Feature {
            id: FeatureId::new(ElementKind::Way, id),
            geometry: geo::Point::new(id as f64, 0.0).into(),
            tags: tags.map(|t| {
                t.iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect()
            }),
            nodes: vec![],
        }
    }

    fn selection(tags: &[(&str, &str)]) -> HashSet<TagRecord> {
        tags.iter().map(|(k, v)| TagRecord::new(*k, *v)).collect()
    }

    #[test]
    fn stoplist() {
        assert!(is_filterable_key("highway"));
        assert!(!is_filterable_key("name:en"));
        assert!(!is_filterable_key("old_name"));
        assert!(!is_filterable_key("stop:position"));
        assert!(!is_filterable_key("wikidata"));
        assert!(!is_filterable_key("route_ref"));
        assert!(is_filterable_key("Name"));
        // "ref" anywhere in the key, e.g. "preferred"
        assert!(!is_filterable_key("preferred"));
    }

    #[test]
    fn vocabulary_is_deduplicated_and_filtered() {
        let features = [
            feature(1, Some(&[("highway", "residential"), ("name:en", "Queen Street")])),
            feature(2, Some(&[("highway", "residential"), ("ref", "SH1")])),
            feature(3, None),
            feature(4, Some(&[("railway", "rail"), ("wikipedia", "en:x")])),
        ];

        let vocabulary = tag_vocabulary(&features);
        assert_eq!(
            vocabulary,
            [
                TagRecord::new("highway", "residential"),
                TagRecord::new("railway", "rail")
            ]
        );
        assert_eq!(tag_vocabulary(&features), vocabulary);
    }

    #[test]
    fn empty_selection_keeps_everything() {
        let features = [
            feature(1, Some(&[("highway", "residential")])),
            feature(2, None),
        ];
        assert_eq!(filter_by_tags(&features, &HashSet::new()), [0, 1]);
    }

    #[test]
    fn any_selected_tag_matches() {
        let features = [
            feature(1, Some(&[("highway", "residential")])),
            feature(2, Some(&[("highway", "primary")])),
            feature(3, Some(&[("railway", "rail")])),
            feature(4, None),
            feature(5, Some(&[])),
        ];

        let selected = selection(&[("highway", "residential"), ("railway", "rail")]);
        assert_eq!(filter_by_tags(&features, &selected), [0, 2]);

        // same key, different value
        let selected = selection(&[("highway", "footway")]);
        assert!(filter_by_tags(&features, &selected).is_empty());
    }

    #[test]
    fn names() {
        let tags = |t: &[(&str, &str)]| -> Tags {
            t.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        };

        assert_eq!(display_name(Some(&tags(&[("name:en", "Test")]))), "Test");
        assert_eq!(
            display_name(Some(&tags(&[("name", "Tāmaki"), ("name:en", "Auckland")]))),
            "Tāmaki"
        );
        assert_eq!(display_name(Some(&tags(&[("highway", "bus_stop")]))), "");
        assert_eq!(display_name(None), "");
    }

    #[test]
    fn rows_override_tags() {
        let collection = FeatureCollection::new(vec![
            feature(1, Some(&[("highway", "residential")])),
            feature(2, Some(&[("highway", "residential")])),
            feature(3, Some(&[("highway", "residential")])),
            feature(4, Some(&[("railway", "rail"), ("name", "Western Line")])),
        ]);

        let mut selection = Selection::default();
        selection.toggle_tag(TagRecord::new("highway", "residential"));
        selection.toggle_row(FeatureId::new(ElementKind::Way, 4));

        let filtered = apply(&collection, &selection);
        assert_eq!(
            filtered.tag_filtered.iter().map(|e| e.index).collect::<Vec<_>>(),
            [0, 1, 2]
        );
        assert_eq!(
            filtered.displayed,
            [ActiveEntry {
                index: 3,
                name: "Western Line".to_string()
            }]
        );

        selection.toggle_row(FeatureId::new(ElementKind::Way, 4));
        assert_eq!(apply(&collection, &selection).displayed.len(), 3);
    }
}
