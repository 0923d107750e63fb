//! Record and field instance structures, with path-based value access

use crate::tag::{TagPath, WILDCARD};
use indexmap::IndexMap;

/// A single subfield of a data field instance
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Subfield {
    pub code: char,
    pub value: String,
}

impl Subfield {
    pub fn new(code: char, value: impl Into<String>) -> Self {
        Self {
            code,
            value: value.into(),
        }
    }
}

/// One occurrence of a data field: two optional indicators plus an ordered
/// list of subfields. Subfield codes may repeat.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FieldInstance {
    pub ind1: Option<char>,
    pub ind2: Option<char>,
    pub subfields: Vec<Subfield>,
}

impl FieldInstance {
    pub fn new(ind1: Option<char>, ind2: Option<char>) -> Self {
        Self {
            ind1,
            ind2,
            subfields: Vec::new(),
        }
    }

    pub fn push_subfield(&mut self, code: char, value: impl Into<String>) {
        self.subfields.push(Subfield::new(code, value));
    }

    /// Does this instance satisfy the indicator constraints of the path?
    /// An absent indicator in the path only matches an absent indicator on
    /// the instance; the wildcard matches anything.
    pub fn matches(&self, path: &TagPath) -> bool {
        indicator_matches(path.ind1, self.ind1) && indicator_matches(path.ind2, self.ind2)
    }

    /// Values of all subfields with the given code, in order. The wildcard
    /// code selects every subfield.
    pub fn subfield_values(&self, code: char) -> impl Iterator<Item = &str> {
        self.subfields
            .iter()
            .filter(move |subfield| code == WILDCARD || subfield.code == code)
            .map(|subfield| subfield.value.as_str())
    }

    /// Collapse the instance into a code → value map, in subfield order.
    /// A repeated code keeps its first position but the last value wins.
    pub fn to_map(&self) -> IndexMap<char, String> {
        let mut map = IndexMap::new();
        for subfield in &self.subfields {
            map.insert(subfield.code, subfield.value.clone());
        }
        map
    }
}

fn indicator_matches(pattern: Option<char>, actual: Option<char>) -> bool {
    match pattern {
        Some(WILDCARD) => true,
        _ => pattern == actual,
    }
}

/// An immutable bibliographic record: scalar control fields (tags 001–009)
/// and ordered data field instances grouped by tag.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Record {
    control_fields: Vec<(String, String)>,
    fields: IndexMap<String, Vec<FieldInstance>>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_control_field(&mut self, tag: impl Into<String>, value: impl Into<String>) {
        self.control_fields.push((tag.into(), value.into()));
    }

    pub fn push_field(&mut self, tag: impl Into<String>, instance: FieldInstance) {
        self.fields.entry(tag.into()).or_default().push(instance);
    }

    /// Values of all control fields whose tag matches the path
    pub fn control_field_values(&self, path: &TagPath) -> Vec<&str> {
        self.control_fields
            .iter()
            .filter(|(tag, _)| path.matches_tag(tag))
            .map(|(_, value)| value.as_str())
            .collect()
    }

    /// First control field value matching the path
    pub fn control_field_value(&self, path: &TagPath) -> Option<&str> {
        self.control_field_values(path).into_iter().next()
    }

    /// All data field instances matching the path's tag and indicators, in
    /// record order
    pub fn instances(&self, path: &TagPath) -> Vec<&FieldInstance> {
        self.fields
            .iter()
            .filter(|(tag, _)| path.matches_tag(tag))
            .flat_map(|(_, instances)| instances)
            .filter(|instance| instance.matches(path))
            .collect()
    }

    /// Subfield values selected by a path with a subfield code, across all
    /// matching instances
    pub fn values(&self, path: &TagPath) -> Vec<&str> {
        let Some(code) = path.subfield else {
            return Vec::new();
        };
        self.instances(path)
            .into_iter()
            .flat_map(|instance| instance.subfield_values(code))
            .collect()
    }

    /// First value selected by the path: the control field scalar for
    /// control tags, otherwise the first matching subfield value. For a
    /// path without a subfield this is the first subfield value of the
    /// first matching instance.
    pub fn first_value(&self, path: &TagPath) -> Option<&str> {
        if path.is_control() {
            return self.control_field_value(path);
        }
        if path.has_subfield() {
            self.values(path).into_iter().next()
        } else {
            self.instances(path)
                .into_iter()
                .next()
                .and_then(|instance| instance.subfields.first())
                .map(|subfield| subfield.value.as_str())
        }
    }
}
