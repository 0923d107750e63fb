//! End-to-end tests of the formatting chain: output format decision,
//! template loading, language filtering, element evaluation and error
//! containment

use crate::{
    element::CodeElement,
    engine::{FormatRequest, RecordSource, TemplateSource, Verbosity},
    error::FormatError,
    test_util::{TestEngine, sample_record_xml},
};
use bibfmt_util::assert_matches;
use pretty_assertions::assert_eq;
use rstest::rstest;

fn minimal_record(body: &str) -> String {
    format!("<record><controlfield tag=\"001\">1</controlfield>{body}</record>")
}

fn datafield(tag: &str, code: char, value: &str) -> String {
    format!(
        "<datafield tag=\"{tag}\" ind1=\"\" ind2=\"\">\
         <subfield code=\"{code}\">{value}</subfield></datafield>"
    )
}

fn request_xml(xml: String, output: &str) -> FormatRequest {
    FormatRequest::new(RecordSource::Xml(xml), output)
}

/// A template invoking an element that reads a record field
#[test]
fn test_simple_substitution() {
    let harness = TestEngine::new();
    harness.template_file("title.bft", "Title: <BFE_TITLE/>");
    harness.output_file("HB.bfo", "default: title.bft");

    let record = minimal_record(&datafield("245", 'a', "Hello"));
    let outcome = harness.engine().format_record(&request_xml(record, "HB"));
    assert_eq!(outcome.text, "Title: Hello");
    assert_eq!(outcome.errors, Vec::new());
    assert!(!outcome.fatal);
}

/// Multilingual blocks reduce to the requested locale, falling back to the
/// configured default
#[rstest]
#[case::active_locale("fr", "Salut")]
#[case::fallback_locale("de", "Hi")]
fn test_language_filter(#[case] locale: &str, #[case] expected: &str) {
    let harness = TestEngine::new();
    harness.template_file("hello.bft", "<lang><en>Hi</en><fr>Salut</fr></lang>");
    harness.output_file("HB.bfo", "default: hello.bft");

    let mut request = request_xml(minimal_record(""), "HB");
    request.locale = Some(locale.to_owned());
    let outcome = harness.engine().format_record(&request);
    assert_eq!(outcome.text, expected);
}

/// Built-in wrapping: prefix and suffix on a non-empty result, default on
/// an empty one
#[test]
fn test_builtin_wrapping() {
    let mut harness = TestEngine::new();
    harness.register(CodeElement::new("EMPTY", "", |_, _| Ok(String::new())));
    harness.register(CodeElement::new("VAL", "", |_, _| Ok("v".into())));
    let engine = harness.engine();
    let view = harness.view(&minimal_record(""));

    let (text, errors, _) = engine.format_with_template(
        TemplateSource::Inline(r#"<BFE_EMPTY default="n/a" prefix="[" suffix="]"/>"#),
        &view,
        Verbosity::SILENT,
    );
    assert_eq!(text, "n/a");
    assert_eq!(errors, Vec::new());

    let (text, _, _) = engine.format_with_template(
        TemplateSource::Inline(r#"<BFE_VAL default="n/a" prefix="[" suffix="]"/>"#),
        &view,
        Verbosity::SILENT,
    );
    assert_eq!(text, "[v]");
}

/// First matching rule wins; no match selects the default; matching is
/// case-insensitive
#[rstest]
#[case::first_rule("PREPRINT", "P")]
#[case::case_insensitive("preprint", "P")]
#[case::second_rule("THESIS", "T")]
#[case::no_match("REPORT", "D")]
fn test_rule_selection(#[case] collection: &str, #[case] expected: &str) {
    let harness = TestEngine::new();
    harness.output_file(
        "TST.bfo",
        "tag 980__a:\nPREPRINT --- preprint.bft\nTHESIS --- thesis.bft\ndefault: default.bft\n",
    );
    harness.template_file("preprint.bft", "P");
    harness.template_file("thesis.bft", "T");
    harness.template_file("default.bft", "D");

    let record = minimal_record(&datafield("980", 'a', collection));
    let outcome = harness.engine().format_record(&request_xml(record, "TST"));
    assert_eq!(outcome.text, expected);
}

/// When several rules match, the one earlier in file order wins
#[test]
fn test_rule_selection_first_wins() {
    let harness = TestEngine::new();
    harness.output_file(
        "TST.bfo",
        "tag 980__a:\nPRE.* --- first.bft\nPREPRINT --- second.bft\ndefault: default.bft\n",
    );
    harness.template_file("first.bft", "1");
    harness.template_file("second.bft", "2");
    harness.template_file("default.bft", "D");

    let record = minimal_record(&datafield("980", 'a', "PREPRINT"));
    let outcome = harness.engine().format_record(&request_xml(record, "TST"));
    assert_eq!(outcome.text, "1");
}

/// A record without the rule field at all falls through to the default
#[test]
fn test_rule_selection_missing_field() {
    let harness = TestEngine::new();
    harness.output_file("TST.bfo", "tag 980__a:\nPREPRINT --- preprint.bft\ndefault: default.bft\n");
    harness.template_file("preprint.bft", "P");
    harness.template_file("default.bft", "D");

    let outcome = harness
        .engine()
        .format_record(&request_xml(minimal_record(""), "TST"));
    assert_eq!(outcome.text, "D");
}

/// An invalid rule pattern is a registered diagnostic and a non-match
#[test]
fn test_rule_with_invalid_pattern() {
    let harness = TestEngine::new();
    harness.output_file(
        "TST.bfo",
        "tag 980__a:\n*** --- never.bft\ndefault: default.bft\n",
    );
    harness.template_file("default.bft", "D");

    let record = minimal_record(&datafield("980", 'a', "PREPRINT"));
    let outcome = harness.engine().format_record(&request_xml(record, "TST"));
    assert_eq!(outcome.text, "D");
    assert_matches!(
        outcome.errors.as_slice(),
        [FormatError::BadRulePattern { .. }]
    );
}

/// Field element synthesized from the tag table, with separator and value
/// limit
#[test]
fn test_field_element_separator_and_limit() {
    let mut harness = TestEngine::new();
    harness.tag_table_entry("TAGS", &["700__a"]);
    let record = minimal_record(&format!(
        "{}{}{}",
        datafield("700", 'a', "A"),
        datafield("700", 'a', "B"),
        datafield("700", 'a', "C"),
    ));
    let view = harness.view(&record);

    let (text, errors, _) = harness.engine().format_with_template(
        TemplateSource::Inline(r#"<BFE_TAGS separator=", " nbMax="2"/>"#),
        &view,
        Verbosity::SILENT,
    );
    assert_eq!(text, "A, B");
    assert_eq!(errors, Vec::new());
}

/// A non-integer `nbMax` is reported and leaves the list unclipped
#[test]
fn test_field_element_bad_nb_max() {
    let mut harness = TestEngine::new();
    harness.tag_table_entry("TAGS", &["700__a"]);
    let record = minimal_record(&format!(
        "{}{}",
        datafield("700", 'a', "A"),
        datafield("700", 'a', "B"),
    ));
    let view = harness.view(&record);

    let (text, errors, _) = harness.engine().format_with_template(
        TemplateSource::Inline(r#"<BFE_TAGS separator="-" nbMax="lots"/>"#),
        &view,
        Verbosity::SILENT,
    );
    assert_eq!(text, "A-B");
    assert_eq!(
        errors,
        vec![FormatError::BadBuiltinParam {
            name: "TAGS".into(),
            param: "nbMax".into(),
            value: "lots".into(),
        }]
    );
}

/// A field element over a path without a subfield flattens each instance to
/// its subfield values
#[test]
fn test_field_element_instance_flattening() {
    let mut harness = TestEngine::new();
    harness.tag_table_entry("IMPRINT", &["260"]);
    let record = minimal_record(
        "<datafield tag=\"260\" ind1=\"\" ind2=\"\">\
         <subfield code=\"a\">Geneva</subfield>\
         <subfield code=\"b\">CERN</subfield></datafield>",
    );
    let view = harness.view(&record);

    let (text, _, _) = harness.engine().format_with_template(
        TemplateSource::Inline(r#"<BFE_IMPRINT separator=", "/>"#),
        &view,
        Verbosity::SILENT,
    );
    assert_eq!(text, "Geneva, CERN");
}

/// Verbosity ladder for a failing code element: silent substitution,
/// inline marker, fatal stop
#[test]
fn test_verbosity_silent() {
    let mut harness = TestEngine::new();
    harness.register(CodeElement::new("BOOM", "", |_, _| Err("boom".into())));
    let view = harness.view(&minimal_record(""));

    let (text, errors, fatal) = harness.engine().format_with_template(
        TemplateSource::Inline("x<BFE_BOOM/>y"),
        &view,
        Verbosity::SILENT,
    );
    assert_eq!(text, "xy");
    assert_matches!(
        errors.as_slice(),
        [FormatError::ElementEvaluationFailure { .. }]
    );
    assert!(!fatal);
    // The failure also reached the sink
    assert_eq!(harness.sink_errors(), errors);
}

#[test]
fn test_verbosity_inline_marker() {
    let mut harness = TestEngine::new();
    harness.register(CodeElement::new("BOOM", "", |_, _| Err("boom".into())));
    let view = harness.view(&minimal_record(""));

    let (text, errors, fatal) = harness.engine().format_with_template(
        TemplateSource::Inline("x<BFE_BOOM/>y"),
        &view,
        Verbosity::ERRORS,
    );
    assert!(text.starts_with('x'));
    assert!(text.ends_with('y'));
    assert!(text.contains("color: rgb(255, 0, 0)"));
    assert!(text.contains("boom"));
    assert_eq!(errors.len(), 1);
    assert!(!fatal);
}

#[test]
fn test_verbosity_fatal() {
    let mut harness = TestEngine::new();
    harness.register(CodeElement::new("BOOM", "", |_, _| Err("boom".into())));
    let view = harness.view(&minimal_record(""));

    let (text, errors, fatal) = harness.engine().format_with_template(
        TemplateSource::Inline("x<BFE_BOOM/>y"),
        &view,
        Verbosity::DEBUG,
    );
    assert_eq!(text, "");
    assert_eq!(errors.len(), 1);
    assert!(fatal);
}

/// Unknown elements substitute empty silently, or an inline marker when
/// verbosity shows errors
#[rstest]
#[case::silent(Verbosity::SILENT, "ab")]
#[case::warnings_same_as_errors(Verbosity::WARNINGS, "marker")]
fn test_unknown_element(#[case] verbosity: Verbosity, #[case] expectation: &str) {
    let harness = TestEngine::new();
    let view = harness.view(&minimal_record(""));
    let (text, errors, _) = harness.engine().format_with_template(
        TemplateSource::Inline("a<BFE_NO_SUCH/>b"),
        &view,
        verbosity,
    );
    if expectation == "ab" {
        assert_eq!(text, "ab");
    } else {
        assert!(text.contains("NO_SUCH"));
    }
    assert_eq!(
        errors,
        vec![FormatError::UnknownElement("NO_SUCH".into())]
    );
}

/// Literal percent signs survive the whole chain verbatim
#[test]
fn test_percent_literals_preserved() {
    let harness = TestEngine::new();
    harness.template_file("pct.bft", "100% of <BFE_TITLE/>, 0%% doubt");
    harness.output_file("HB.bfo", "default: pct.bft");

    let record = minimal_record(&datafield("245", 'a', "everything"));
    let outcome = harness.engine().format_record(&request_xml(record, "HB"));
    assert_eq!(outcome.text, "100% of everything, 0%% doubt");
}

/// Element output is spliced, never rescanned: no accidental recursion
#[test]
fn test_single_pass_substitution() {
    let mut harness = TestEngine::new();
    harness.register(CodeElement::new("ECHO", "", |_, _| {
        Ok("<BFE_TITLE/>".into())
    }));
    let view = harness.view(&minimal_record(&datafield("245", 'a', "Hello")));

    let (text, errors, _) = harness.engine().format_with_template(
        TemplateSource::Inline("<BFE_ECHO/>"),
        &view,
        Verbosity::SILENT,
    );
    assert_eq!(text, "<BFE_TITLE/>");
    assert_eq!(errors, Vec::new());
}

/// Elements are evaluated left to right in template source order
#[test]
fn test_evaluation_order() {
    use std::sync::{Arc, Mutex};
    let order = Arc::new(Mutex::new(Vec::new()));
    let mut harness = TestEngine::new();
    for name in ["FIRST", "SECOND"] {
        let order = Arc::clone(&order);
        harness.register(CodeElement::new(name, "", move |_, _| {
            order.lock().expect("lock poisoned").push(name);
            Ok(String::new())
        }));
    }
    let view = harness.view(&minimal_record(""));
    harness.engine().format_with_template(
        TemplateSource::Inline("<BFE_FIRST/> then <BFE_SECOND/>"),
        &view,
        Verbosity::SILENT,
    );
    assert_eq!(*order.lock().expect("lock poisoned"), ["FIRST", "SECOND"]);
}

/// A missing record yields empty output and a registered error
#[test]
fn test_no_such_record() {
    let harness = TestEngine::new();
    harness.output_file("HB.bfo", "default: any.bft");
    let outcome = harness
        .engine()
        .format_record(&FormatRequest::new(RecordSource::Id(12345), "HB"));
    assert_eq!(outcome.text, "");
    assert_eq!(outcome.errors, vec![FormatError::NoSuchRecord(12345)]);
    assert_eq!(harness.sink_errors(), outcome.errors);
}

/// Formatting by record id goes through the record store
#[test]
fn test_format_by_id() {
    let harness = TestEngine::new();
    harness.template_file("title.bft", "<BFE_TITLE/>");
    harness.output_file("HB.bfo", "default: title.bft");

    let outcome = harness
        .engine()
        .format_record(&FormatRequest::new(RecordSource::Id(92), "HB"));
    assert_eq!(outcome.text, "Hello : a subtitle");
}

/// An unknown output code is registered and surfaces as "no template found"
#[test]
fn test_unknown_output_code() {
    let harness = TestEngine::new();
    let outcome = harness
        .engine()
        .format_record(&request_xml(minimal_record(""), "nope"));
    assert_eq!(outcome.text, "");
    assert_eq!(
        outcome.errors,
        vec![
            FormatError::UnknownOutputCode("nope".into()),
            FormatError::NoTemplateFound("nope".into()),
        ]
    );
}

/// An output format with no matching rule and no default yields the
/// "no template" error
#[test]
fn test_no_template_found() {
    let harness = TestEngine::new();
    harness.output_file("TST.bfo", "tag 980__a:\nTHESIS --- thesis.bft\n");
    let record = minimal_record(&datafield("980", 'a', "PREPRINT"));
    let outcome = harness.engine().format_record(&request_xml(record, "TST"));
    assert_eq!(outcome.text, "");
    assert_eq!(
        outcome.errors,
        vec![FormatError::NoTemplateFound("TST".into())]
    );
}

/// Clearing the caches is observationally transparent: re-reads yield equal
/// structures
#[test]
fn test_cache_transparency() {
    let harness = TestEngine::new();
    harness.template_file("t.bft", "<name>T</name>\nbody");
    harness.output_file("TST.bfo", "default: t.bft");
    let engine = harness.engine();

    let template_before = engine.format_template("t.bft", true).unwrap();
    let output_before = engine.output_format("TST", true).unwrap();
    let element_before = engine.format_element("TITLE").unwrap();

    engine.clear_caches();

    assert_eq!(
        *engine.format_template("t.bft", true).unwrap(),
        *template_before
    );
    assert_eq!(*engine.output_format("TST", true).unwrap(), *output_before);
    assert_eq!(
        engine.format_element("TITLE").unwrap().name(),
        element_before.name()
    );
}

/// The locale defaults to the configured default when the request leaves it
/// unset
#[test]
fn test_default_locale() {
    let harness = TestEngine::new();
    harness.template_file("hello.bft", "<lang><en>Hi</en><fr>Salut</fr></lang>");
    harness.output_file("HB.bfo", "default: hello.bft");
    let outcome = harness
        .engine()
        .format_record(&request_xml(minimal_record(""), "HB"));
    assert_eq!(outcome.text, "Hi");
}
