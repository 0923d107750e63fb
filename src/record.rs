//! Per-call record access. A [RecordView] wraps one record for the duration
//! of a single formatting call and is the object handed to every format
//! element. It carries the formatting context (locale, search pattern, user)
//! and defers loading the record until a field is actually read.

use crate::{engine::Engine, error::FormatError, store::XmlFlavor};
use bibfmt_marc::{Record, TagPath};
use indexmap::IndexMap;
use std::{
    cell::{OnceCell, RefCell},
    sync::Arc,
};

/// One entry returned by [RecordView::fields]: a scalar subfield value when
/// the path names a subfield (or a control field), a whole instance
/// otherwise
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Scalar(String),
    /// Subfield code → value map of one field instance, in subfield order
    Instance(IndexMap<char, String>),
}

impl FieldValue {
    /// Flatten to the underlying values, in insertion order
    pub fn into_values(self) -> Vec<String> {
        match self {
            Self::Scalar(value) => vec![value],
            Self::Instance(map) => map.into_values().collect(),
        }
    }
}

/// A record plus its formatting context. Created per formatting call and
/// discarded afterwards; the record itself is immutable for the whole call.
pub struct RecordView<'e> {
    engine: &'e Engine,
    id: u32,
    locale: String,
    search_pattern: Option<String>,
    user_id: Option<String>,
    /// Loaded lazily for id-based views; a failed load pins `None` and every
    /// accessor returns empty from then on
    record: OnceCell<Option<Arc<Record>>>,
    /// Errors raised while loading, drained by the facade at the end of the
    /// call
    errors: RefCell<Vec<FormatError>>,
}

impl<'e> RecordView<'e> {
    /// View over a stored record, fetched from the record store on first
    /// field access
    pub(crate) fn from_id(
        engine: &'e Engine,
        id: u32,
        locale: String,
        search_pattern: Option<String>,
        user_id: Option<String>,
    ) -> Self {
        Self {
            engine,
            id,
            locale,
            search_pattern,
            user_id,
            record: OnceCell::new(),
            errors: RefCell::new(Vec::new()),
        }
    }

    /// View over an inline serialized record. The record is parsed eagerly
    /// and its id re-extracted from control field 001.
    pub(crate) fn from_xml(
        engine: &'e Engine,
        xml: &str,
        locale: String,
        search_pattern: Option<String>,
        user_id: Option<String>,
    ) -> Self {
        let mut errors = Vec::new();
        let record = match Record::from_xml(xml) {
            Ok(record) => Some(Arc::new(record)),
            Err(error) => {
                let error = FormatError::RecordParseFailure {
                    reason: error.to_string(),
                };
                engine.sink.register(&error);
                errors.push(error);
                None
            }
        };
        let id = record
            .as_deref()
            .and_then(|record| record.control_field_value(&TagPath::parse("001")))
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(0);
        Self {
            engine,
            id,
            locale,
            search_pattern,
            user_id,
            record: OnceCell::from(record),
            errors: RefCell::new(errors),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Locale the record is being formatted in
    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// The search that led to this record being formatted, if any
    pub fn search_pattern(&self) -> Option<&str> {
        self.search_pattern.as_deref()
    }

    /// Id of the user viewing the formatted record, if any
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Value of the first control field matching the path, or empty
    pub fn control_field(&self, tag: &str) -> String {
        let path = TagPath::parse(tag);
        self.record()
            .and_then(|record| record.control_field_value(&path))
            .unwrap_or_default()
            .to_owned()
    }

    /// First value matching the path, or empty
    pub fn field(&self, tag: &str) -> String {
        match self.fields(tag).into_iter().next() {
            Some(FieldValue::Scalar(value)) => value,
            Some(FieldValue::Instance(map)) => map.into_values().next().unwrap_or_default(),
            None => String::new(),
        }
    }

    /// All values matching the path. A path with a subfield code yields
    /// scalars; a data field path without one yields per-instance subfield
    /// maps; a control field path yields the control scalars.
    pub fn fields(&self, tag: &str) -> Vec<FieldValue> {
        let Some(record) = self.record() else {
            return Vec::new();
        };
        let path = TagPath::parse(tag);
        if path.is_control() && !path.has_subfield() {
            record
                .control_field_values(&path)
                .into_iter()
                .map(|value| FieldValue::Scalar(value.to_owned()))
                .collect()
        } else if path.has_subfield() {
            record
                .values(&path)
                .into_iter()
                .map(|value| FieldValue::Scalar(value.to_owned()))
                .collect()
        } else {
            record
                .instances(&path)
                .into_iter()
                .map(|instance| FieldValue::Instance(instance.to_map()))
                .collect()
        }
    }

    /// Value of `key` in the knowledge base `kb`, or `default` when the base
    /// or the key is unknown. Lookups are cached per (kb, key) for the
    /// lifetime of the engine's caches.
    pub fn kb(&self, kb: &str, key: &str, default: &str) -> String {
        self.engine.kb_value(kb, key, default)
    }

    /// The wrapped record, fetching it on first use. `None` when the store
    /// has nothing readable; the failure is reported exactly once.
    fn record(&self) -> Option<&Arc<Record>> {
        self.record
            .get_or_init(|| {
                let raw = self.engine.records.raw_record(self.id, XmlFlavor::Xm);
                let record = raw.and_then(|xml| Record::from_xml(&xml).ok());
                if record.is_none() {
                    let error = FormatError::RecordUnavailable(self.id);
                    self.engine.sink.register(&error);
                    self.errors.borrow_mut().push(error);
                }
                record.map(Arc::new)
            })
            .as_ref()
    }

    /// Drain the errors collected while loading the record
    pub(crate) fn take_errors(&self) -> Vec<FormatError> {
        self.errors.take()
    }
}
