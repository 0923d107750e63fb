//! MARCXML reader. Only the subset of MARCXML that records actually carry is
//! interpreted: `controlfield`, `datafield` and `subfield` elements. The
//! leader and any foreign markup are skipped.

use crate::record::{FieldInstance, Record};
use thiserror::Error;
use xml::reader::{EventReader, XmlEvent};

/// Error while reading a serialized MARCXML record
#[derive(Debug, Error)]
#[error("error parsing MARCXML record")]
pub struct RecordParseError(#[from] xml::reader::Error);

/// The element whose character data is being collected
#[derive(Default)]
struct Pending {
    control: Option<(String, String)>,
    field: Option<(String, FieldInstance)>,
    in_subfield: bool,
}

impl Record {
    /// Parse a record from its MARCXML serialization
    pub fn from_xml(source: &str) -> Result<Self, RecordParseError> {
        let mut record = Record::new();
        let mut pending = Pending::default();

        for event in EventReader::new(source.as_bytes()) {
            match event? {
                XmlEvent::StartElement {
                    name, attributes, ..
                } => {
                    let attr = |key: &str| {
                        attributes
                            .iter()
                            .find(|attr| attr.name.local_name == key)
                            .map(|attr| attr.value.as_str())
                    };
                    match name.local_name.as_str() {
                        "controlfield" => {
                            if let Some(tag) = attr("tag") {
                                pending.control = Some((tag.to_owned(), String::new()));
                            }
                        }
                        "datafield" => {
                            if let Some(tag) = attr("tag") {
                                let instance = FieldInstance::new(
                                    indicator(attr("ind1")),
                                    indicator(attr("ind2")),
                                );
                                pending.field = Some((tag.to_owned(), instance));
                            }
                        }
                        "subfield" => {
                            if let Some(code) = attr("code").and_then(|code| code.chars().next())
                                && let Some((_, instance)) = &mut pending.field
                            {
                                instance.push_subfield(code, "");
                                pending.in_subfield = true;
                            }
                        }
                        _ => {}
                    }
                }
                XmlEvent::Characters(text) => {
                    if let Some((_, value)) = &mut pending.control {
                        value.push_str(&text);
                    } else if pending.in_subfield
                        && let Some(subfield) = pending
                            .field
                            .as_mut()
                            .and_then(|(_, instance)| instance.subfields.last_mut())
                    {
                        subfield.value.push_str(&text);
                    }
                }
                XmlEvent::EndElement { name } => match name.local_name.as_str() {
                    "controlfield" => {
                        if let Some((tag, value)) = pending.control.take() {
                            record.push_control_field(tag, value);
                        }
                    }
                    "datafield" => {
                        if let Some((tag, instance)) = pending.field.take() {
                            record.push_field(tag, instance);
                        }
                    }
                    "subfield" => {
                        pending.in_subfield = false;
                    }
                    _ => {}
                },
                _ => {}
            }
        }

        Ok(record)
    }
}

/// Normalize an indicator attribute: blank, underscore or missing all mean
/// "no indicator"
fn indicator(value: Option<&str>) -> Option<char> {
    match value.map(str::trim) {
        None | Some("" | "_") => None,
        Some(value) => value.chars().next(),
    }
}
