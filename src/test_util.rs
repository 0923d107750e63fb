//! In-memory store implementations and a prebuilt engine harness for tests

use crate::{
    config::Config,
    element::CodeElement,
    engine::{Engine, Stores, Verbosity},
    error::{ErrorSink, FormatError},
    outputs::OutputFormatNames,
    record::RecordView,
    store::{KbStore, OutputMetaStore, RecordExistence, RecordStore, TagTable, XmlFlavor},
};
use bibfmt_marc::{Record, TagPath};
use bibfmt_template::ElementCall;
use indexmap::IndexMap;
use std::{
    cell::OnceCell,
    collections::{HashMap, HashSet},
    fs,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};
use tempfile::TempDir;

/// MARCXML of the standard test record (id 92)
pub fn sample_record_xml() -> String {
    r#"<record xmlns="http://www.loc.gov/MARC21/slim">
    <controlfield tag="001">92</controlfield>
    <datafield tag="041" ind1="" ind2=""><subfield code="a">en</subfield></datafield>
    <datafield tag="245" ind1="" ind2="">
        <subfield code="a">Hello</subfield>
        <subfield code="b">a subtitle</subfield>
    </datafield>
    <datafield tag="520" ind1="" ind2=""><subfield code="a">A short abstract</subfield></datafield>
    <datafield tag="650" ind1="1" ind2="7"><subfield code="a">Computing</subfield></datafield>
    <datafield tag="700" ind1="" ind2=""><subfield code="a">Doe, J</subfield></datafield>
    <datafield tag="700" ind1="" ind2=""><subfield code="a">Smith, A</subfield></datafield>
    <datafield tag="700" ind1="" ind2=""><subfield code="a">Roe, R</subfield></datafield>
    <datafield tag="856" ind1="4" ind2=""><subfield code="u">http://example.org/92</subfield></datafield>
    <datafield tag="909" ind1="C" ind2="1"><subfield code="c">2003-12-02</subfield></datafield>
    <datafield tag="909" ind1="C" ind2="O"><subfield code="o">oai:example:92</subfield></datafield>
    <datafield tag="980" ind1="" ind2=""><subfield code="a">PREPRINT</subfield></datafield>
</record>"#
        .to_owned()
}

/// Record store backed by parsed records. Ids can be known without having a
/// loadable body (999 in the default harness), or deleted (7).
#[derive(Clone, Default)]
pub struct MemRecordStore {
    ids: HashSet<u32>,
    deleted: HashSet<u32>,
    records: HashMap<u32, Record>,
    raw: HashMap<(u32, XmlFlavor), String>,
}

impl MemRecordStore {
    pub fn insert_xml(&mut self, id: u32, xml: &str) {
        self.ids.insert(id);
        self.records.insert(id, Record::from_xml(xml).unwrap());
        self.raw.insert((id, XmlFlavor::Xm), xml.to_owned());
    }

    /// An id the store knows but cannot serve a body for
    pub fn insert_unloadable(&mut self, id: u32) {
        self.ids.insert(id);
    }

    pub fn insert_deleted(&mut self, id: u32, tombstone_xml: &str) {
        self.ids.insert(id);
        self.deleted.insert(id);
        self.records.insert(id, Record::from_xml(tombstone_xml).unwrap());
    }
}

impl RecordStore for MemRecordStore {
    fn exists(&self, id: u32) -> RecordExistence {
        if self.deleted.contains(&id) {
            RecordExistence::Deleted
        } else if self.ids.contains(&id) {
            RecordExistence::Present
        } else {
            RecordExistence::Absent
        }
    }

    fn field_values(&self, id: u32, tag: &str) -> Vec<String> {
        let Some(record) = self.records.get(&id) else {
            return Vec::new();
        };
        let path = TagPath::parse(tag);
        let values = if path.is_control() {
            record.control_field_values(&path)
        } else {
            record.values(&path)
        };
        values.into_iter().map(str::to_owned).collect()
    }

    fn modification_date(&self, _id: u32) -> String {
        "2024-05-02T10:00:00Z".into()
    }

    fn creation_date(&self, _id: u32) -> String {
        "2003-12-02T09:00:00Z".into()
    }

    fn raw_record(&self, id: u32, flavor: XmlFlavor) -> Option<String> {
        self.raw.get(&(id, flavor)).cloned()
    }
}

/// Knowledge base store that counts how often it is actually consulted, so
/// tests can assert on caching
#[derive(Clone, Default)]
pub struct MemKbStore {
    mappings: HashMap<(String, String), String>,
    lookups: Arc<AtomicUsize>,
}

impl MemKbStore {
    pub fn new<'a>(mappings: impl IntoIterator<Item = ((&'a str, &'a str), &'a str)>) -> Self {
        Self {
            mappings: mappings
                .into_iter()
                .map(|((kb, key), value)| ((kb.to_owned(), key.to_owned()), value.to_owned()))
                .collect(),
            lookups: Arc::default(),
        }
    }

    /// Number of lookups that reached the store
    pub fn hits(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl KbStore for MemKbStore {
    fn get(&self, kb: &str, key: &str) -> Option<String> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.mappings.get(&(kb.to_owned(), key.to_owned())).cloned()
    }
}

#[derive(Clone, Default)]
pub struct MemTagTable {
    mappings: IndexMap<String, Vec<String>>,
}

impl TagTable for MemTagTable {
    fn tag_exists(&self, name: &str) -> bool {
        self.mappings
            .keys()
            .any(|key| key.eq_ignore_ascii_case(name))
    }

    fn tags_for_name(&self, name: &str) -> Vec<String> {
        self.mappings
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, tags)| tags.clone())
            .unwrap_or_default()
    }

    fn all_name_tag_mappings(&self) -> IndexMap<String, Vec<String>> {
        self.mappings.clone()
    }
}

#[derive(Clone, Default)]
pub struct MemOutputMeta {
    /// code → (names, description, content type)
    entries: HashMap<String, (OutputFormatNames, String, String)>,
}

impl OutputMetaStore for MemOutputMeta {
    fn names(&self, code: &str) -> OutputFormatNames {
        self.entries
            .get(&code.to_uppercase())
            .map(|(names, _, _)| names.clone())
            .unwrap_or_default()
    }

    fn description(&self, code: &str) -> String {
        self.entries
            .get(&code.to_uppercase())
            .map(|(_, description, _)| description.clone())
            .unwrap_or_default()
    }

    fn content_type(&self, code: &str) -> String {
        self.entries
            .get(&code.to_uppercase())
            .map(|(_, _, content_type)| content_type.clone())
            .unwrap_or_default()
    }
}

/// Error sink that keeps everything registered with it
#[derive(Debug, Default)]
pub struct CollectingSink(Mutex<Vec<FormatError>>);

impl CollectingSink {
    pub fn errors(&self) -> Vec<FormatError> {
        self.0.lock().expect("sink lock poisoned").clone()
    }
}

impl ErrorSink for CollectingSink {
    fn register(&self, error: &FormatError) {
        self.0.lock().expect("sink lock poisoned").push(error.clone());
    }
}

/// A full engine over in-memory stores and temporary template/output
/// directories. Seed data: record 92 (the sample record, also loadable by
/// id), record 999 (known but unloadable), record 7 (deleted), a collection
/// knowledge base, and HB output format metadata.
///
/// Builder-style mutations (`tag_table_entry`, `register`) must happen
/// before the first `engine()` call; the engine is built once, lazily.
pub struct TestEngine {
    _dir: TempDir,
    config: Config,
    records: MemRecordStore,
    kb: MemKbStore,
    tag_table: MemTagTable,
    output_meta: MemOutputMeta,
    sink: Arc<CollectingSink>,
    extra_elements: Vec<CodeElement>,
    engine: OnceCell<Engine>,
}

impl TestEngine {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("creating temp dir");
        let config = Config {
            templates_dir: dir.path().join("templates"),
            outputs_dir: dir.path().join("outputs"),
            ..Config::default()
        };
        fs::create_dir_all(&config.templates_dir).expect("creating templates dir");
        fs::create_dir_all(&config.outputs_dir).expect("creating outputs dir");

        let mut records = MemRecordStore::default();
        records.insert_xml(92, &sample_record_xml());
        records.insert_unloadable(999);
        records.insert_deleted(
            7,
            r#"<record>
    <controlfield tag="001">7</controlfield>
    <datafield tag="909" ind1="C" ind2="O"><subfield code="o">oai:example:7</subfield></datafield>
</record>"#,
        );

        let kb = MemKbStore::new([(("dbcollid2coll", "PREPRINT"), "Preprint")]);

        let mut output_meta = MemOutputMeta::default();
        output_meta.entries.insert(
            "HB".into(),
            (
                OutputFormatNames {
                    generic: "HTML brief".into(),
                    short: IndexMap::from([("en".to_owned(), "brief".to_owned())]),
                    long: IndexMap::from([("en".to_owned(), "HTML brief".to_owned())]),
                },
                "Brief HTML output".into(),
                "text/html".into(),
            ),
        );

        Self {
            _dir: dir,
            config,
            records,
            kb,
            tag_table: MemTagTable::default(),
            output_meta,
            sink: Arc::new(CollectingSink::default()),
            extra_elements: Vec::new(),
            engine: OnceCell::new(),
        }
    }

    /// Map a logical element name to tags in the tag-name table
    pub fn tag_table_entry(&mut self, name: &str, tags: &[&str]) {
        self.tag_table
            .mappings
            .insert(name.to_owned(), tags.iter().map(|tag| (*tag).to_owned()).collect());
    }

    /// Register an extra code element
    pub fn register(&mut self, element: CodeElement) {
        self.extra_elements.push(element);
    }

    /// Write a template file into the temporary templates directory
    pub fn template_file(&self, filename: &str, content: &str) {
        fs::write(self.config.templates_dir.join(filename), content)
            .expect("writing template file");
    }

    /// Write an output format file into the temporary outputs directory
    pub fn output_file(&self, filename: &str, content: &str) {
        fs::write(self.config.outputs_dir.join(filename), content)
            .expect("writing output file");
    }

    pub fn engine(&self) -> &Engine {
        self.engine.get_or_init(|| {
            let mut engine = Engine::new(
                self.config.clone(),
                Stores {
                    records: Box::new(self.records.clone()),
                    kb: Box::new(self.kb.clone()),
                    tags: Box::new(self.tag_table.clone()),
                    output_meta: Box::new(self.output_meta.clone()),
                },
            )
            .with_error_sink(Box::new(Arc::clone(&self.sink)));
            for element in self.extra_elements.clone() {
                engine.register_element(element);
            }
            engine
        })
    }

    /// A view over an inline record, in the default locale
    pub fn view(&self, xml: &str) -> RecordView<'_> {
        RecordView::from_xml(self.engine(), xml, "en".into(), None, None)
    }

    /// Everything registered with the error sink so far
    pub fn sink_errors(&self) -> Vec<FormatError> {
        self.sink.errors()
    }
}

/// Evaluate a single element invocation silently and return its text
pub fn eval_one(
    engine: &Engine,
    view: &RecordView<'_>,
    name: &str,
    params: &[(&str, &str)],
) -> String {
    let mut call = ElementCall::new(name);
    call.params = params
        .iter()
        .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
        .collect();
    engine.eval_element(view, &call, Verbosity::SILENT).text
}
