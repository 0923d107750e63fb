//! Interfaces of the external collaborators the engine formats against.
//! The engine owns none of this data; record content, knowledge bases, the
//! tag-name table and output format metadata all live elsewhere and are
//! consumed through these traits.

use crate::outputs::OutputFormatNames;
use indexmap::IndexMap;

/// What the record store knows about a record id
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RecordExistence {
    Present,
    /// The record existed and was deleted; only its tombstone is served
    Deleted,
    Absent,
}

/// Supported record serialization flavors
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum XmlFlavor {
    /// Plain MARCXML body
    Xm,
    /// MARCXML with OAI record framing
    MarcXml,
    /// Dublin Core with OAI record framing
    OaiDc,
    /// Plain Dublin Core
    Xd,
}

impl XmlFlavor {
    pub fn code(self) -> &'static str {
        match self {
            Self::Xm => "xm",
            Self::MarcXml => "marcxml",
            Self::OaiDc => "oai_dc",
            Self::Xd => "xd",
        }
    }
}

/// Source of record content and record-level metadata
pub trait RecordStore: Send + Sync {
    fn exists(&self, id: u32) -> RecordExistence;

    /// All values of the given field path, in record order. Accepts control
    /// field tags as well as full data field paths.
    fn field_values(&self, id: u32, tag: &str) -> Vec<String>;

    /// Last modification timestamp, ISO formatted
    fn modification_date(&self, id: u32) -> String;

    /// Creation timestamp, ISO formatted
    fn creation_date(&self, id: u32) -> String;

    /// The record pre-serialized in the given flavor, if the store has one
    fn raw_record(&self, id: u32, flavor: XmlFlavor) -> Option<String>;
}

/// Knowledge base lookups, used by elements for term translation
pub trait KbStore: Send + Sync {
    fn get(&self, kb: &str, key: &str) -> Option<String>;
}

/// Maps logical element names to the MARC tags they print. Elements without
/// a code implementation are synthesized from this table.
pub trait TagTable: Send + Sync {
    fn tag_exists(&self, name: &str) -> bool;
    fn tags_for_name(&self, name: &str) -> Vec<String>;
    fn all_name_tag_mappings(&self) -> IndexMap<String, Vec<String>>;
}

/// Localized names and presentation metadata of output formats
pub trait OutputMetaStore: Send + Sync {
    fn names(&self, code: &str) -> OutputFormatNames;
    fn description(&self, code: &str) -> String;
    fn content_type(&self, code: &str) -> String;
}
