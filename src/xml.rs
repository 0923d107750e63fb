//! Record serialization to the supported XML flavors. This is pure string
//! assembly over the record store: it shares no state with the formatting
//! core and never consults templates or elements.
//!
//! `marcxml` and `oai_dc` wrap the body in OAI `<record><header>…</header>
//! <metadata>…</metadata></record>` framing; `xd` and `oai_dc` map a fixed
//! set of MARC tags to Dublin Core. A deleted record serializes to its OAI
//! identifier and a `980 $c DELETED` marker only.

use crate::{
    engine::Engine,
    store::{RecordExistence, XmlFlavor},
};
use std::fmt::Write;

/// MARC tag → Dublin Core element mapping used by the `xd` and `oai_dc`
/// flavors
const DUBLIN_CORE_TAGS: &[(&str, &str)] = &[
    ("041__a", "language"),
    ("100__a", "creator"),
    ("700__a", "creator"),
    ("245__a", "title"),
    ("65017a", "subject"),
    ("8564_u", "identifier"),
    ("520__a", "description"),
];

impl Engine {
    /// Serialize a record in the given flavor, straight from the record
    /// store. An absent record serializes to the empty string.
    pub fn record_xml(&self, id: u32, flavor: XmlFlavor) -> String {
        let existence = self.records.exists(id);
        if existence == RecordExistence::Absent {
            return String::new();
        }

        let mut out = String::new();
        let framed = matches!(flavor, XmlFlavor::MarcXml | XmlFlavor::OaiDc);
        if framed {
            out.push_str("  <record>\n   <header>\n");
            for oai_id in self.records.field_values(id, &self.config.oai_id_tag) {
                let _ = writeln!(
                    out,
                    "    <identifier>{}</identifier>",
                    encode_for_xml(&oai_id)
                );
            }
            let _ = writeln!(
                out,
                "    <datestamp>{}</datestamp>",
                self.records.modification_date(id)
            );
            out.push_str("   </header>\n   <metadata>\n");
        }

        match flavor {
            XmlFlavor::Xm | XmlFlavor::MarcXml => {
                self.write_marc_body(&mut out, id, flavor, existence);
            }
            XmlFlavor::Xd | XmlFlavor::OaiDc => {
                self.write_dublin_core(&mut out, id, existence);
            }
        }

        if framed {
            out.push_str("   </metadata>\n  </record>\n");
        }
        out
    }

    fn write_marc_body(
        &self,
        out: &mut String,
        id: u32,
        flavor: XmlFlavor,
        existence: RecordExistence,
    ) {
        if existence == RecordExistence::Present
            && let Some(body) = self.records.raw_record(id, flavor)
        {
            out.push_str(&body);
            return;
        }

        // No pre-serialized body: emit the skeleton the store metadata
        // allows, which is all a deleted record ever gets
        if flavor == XmlFlavor::MarcXml {
            out.push_str("    <record xmlns=\"http://www.loc.gov/MARC21/slim\">\n");
        } else {
            out.push_str("    <record>\n");
        }
        let _ = writeln!(out, "        <controlfield tag=\"001\">{id}</controlfield>");
        if existence == RecordExistence::Deleted {
            if let Some(oai_id) = self
                .records
                .field_values(id, &self.config.oai_id_tag)
                .first()
            {
                out.push_str(&oai_datafield(&self.config.oai_id_tag, oai_id));
            }
            out.push_str(
                "        <datafield tag=\"980\" ind1=\"\" ind2=\"\">\
                 <subfield code=\"c\">DELETED</subfield></datafield>\n",
            );
        }
        out.push_str("    </record>\n");
    }

    fn write_dublin_core(&self, out: &mut String, id: u32, existence: RecordExistence) {
        out.push_str(
            "    <dc xmlns=\"http://purl.org/dc/elements/1.1/\"\n         \
             xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\"\n         \
             xsi:schemaLocation=\"http://purl.org/dc/elements/1.1/\n                             \
             http://www.openarchives.org/OAI/1.1/dc.xsd\">\n",
        );
        if existence == RecordExistence::Present {
            for (tag, dc_element) in DUBLIN_CORE_TAGS {
                for value in self.records.field_values(id, tag) {
                    let _ = writeln!(
                        out,
                        "        <{dc_element}>{}</{dc_element}>",
                        encode_for_xml(&value)
                    );
                }
            }
            let _ = writeln!(
                out,
                "        <date>{}</date>",
                self.records.creation_date(id)
            );
        }
        out.push_str("    </dc>\n");
    }
}

/// A datafield carrying the OAI identifier, built by slicing the configured
/// identifier path (`TTTIIs` form, `_` meaning a blank indicator)
fn oai_datafield(tag_path: &str, value: &str) -> String {
    let slice = |range: std::ops::Range<usize>| {
        tag_path
            .get(range)
            .filter(|part| *part != "_")
            .unwrap_or_default()
    };
    format!(
        "        <datafield tag=\"{}\" ind1=\"{}\" ind2=\"{}\">\
         <subfield code=\"{}\">{}</subfield></datafield>\n",
        slice(0..3),
        slice(3..4),
        slice(4..5),
        slice(5..6),
        encode_for_xml(value),
    )
}

/// Escape the five XML-reserved characters
fn encode_for_xml(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::TestEngine;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_encode_for_xml() {
        assert_eq!(
            encode_for_xml(r#"<a & "b">"#),
            "&lt;a &amp; &quot;b&quot;&gt;"
        );
    }

    #[test]
    fn test_absent_record_is_empty() {
        let harness = TestEngine::new();
        assert_eq!(harness.engine().record_xml(12345, XmlFlavor::Xm), "");
    }

    #[test]
    fn test_xm_uses_raw_body() {
        let harness = TestEngine::new();
        let out = harness.engine().record_xml(92, XmlFlavor::Xm);
        // The store's pre-serialized body is passed through untouched
        assert!(out.contains("<controlfield tag=\"001\">92</controlfield>"));
        assert!(!out.contains("<header>"));
    }

    #[test]
    fn test_marcxml_framing() {
        let harness = TestEngine::new();
        let out = harness.engine().record_xml(92, XmlFlavor::MarcXml);
        assert!(out.starts_with("  <record>\n   <header>\n"));
        assert!(out.contains("<identifier>oai:example:92</identifier>"));
        assert!(out.contains("<datestamp>"));
        assert!(out.contains("<metadata>"));
        assert!(out.ends_with("   </metadata>\n  </record>\n"));
    }

    #[test]
    fn test_dublin_core_mapping() {
        let harness = TestEngine::new();
        let out = harness.engine().record_xml(92, XmlFlavor::Xd);
        assert!(out.contains("<title>Hello</title>"));
        assert!(out.contains("<creator>Doe, J</creator>"));
        assert!(out.contains("<creator>Smith, A</creator>"));
        assert!(out.contains("<language>en</language>"));
        assert!(out.contains("<date>"));
        assert!(!out.contains("<header>"));
    }

    #[test]
    fn test_deleted_record_tombstone() {
        let harness = TestEngine::new();
        let out = harness.engine().record_xml(7, XmlFlavor::Xm);
        assert!(out.contains("<subfield code=\"c\">DELETED</subfield>"));
        assert!(out.contains("<subfield code=\"o\">oai:example:7</subfield>"));
        // Nothing but the tombstone fields
        assert!(!out.contains("<title>"));
    }

    #[test]
    fn test_deleted_record_dublin_core_is_bare() {
        let harness = TestEngine::new();
        let out = harness.engine().record_xml(7, XmlFlavor::Xd);
        assert!(out.contains("<dc"));
        assert!(!out.contains("<creator>"));
        assert!(!out.contains("<date>"));
    }
}
