//! Format elements: the named extensions a template can invoke. An element
//! is either *code-backed* (a registered Rust function with a declared
//! parameter schema) or *field-backed* (synthesized from the tag-name table
//! to print a list of MARC tags). Code wins when both exist.
//!
//! Evaluation applies the built-in parameters every element understands:
//! `prefix` and `suffix` wrap a non-empty result, `default` replaces an
//! empty one, and field elements additionally honour `separator` and
//! `nbMax`.

pub mod builtin;

use crate::{
    engine::{Engine, Verbosity},
    error::FormatError,
    record::{FieldValue, RecordView},
};
use bibfmt_template::ElementCall;
use indexmap::IndexMap;
use std::{collections::HashMap, fmt::Debug, sync::Arc};
use thiserror::Error;
use tracing::debug;

/// Error returned by a code element's formatting function
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ElementError(Box<dyn std::error::Error + Send + Sync>);

impl ElementError {
    pub fn new(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self(error.into())
    }
}

impl From<String> for ElementError {
    fn from(message: String) -> Self {
        Self(message.into())
    }
}

impl From<&str> for ElementError {
    fn from(message: &str) -> Self {
        Self(message.into())
    }
}

/// The formatting function of a code element. It receives the record view
/// and its declared parameters, resolved against the invocation's
/// attributes, and produces a text fragment. It must not mutate the view.
pub type ElementFn =
    Arc<dyn Fn(&RecordView<'_>, &ParamValues) -> Result<String, ElementError> + Send + Sync>;

/// One declared parameter of a code element
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub default: String,
    pub description: String,
}

/// The declared parameters of an element, resolved for one invocation:
/// attribute values where given, declared defaults elsewhere
#[derive(Clone, Debug, Default)]
pub struct ParamValues(IndexMap<String, String>);

impl ParamValues {
    /// Resolved value of a declared parameter. Unknown names yield empty.
    pub fn get(&self, name: &str) -> &str {
        self.0.get(name).map(String::as_str).unwrap_or_default()
    }

    fn bind(specs: &[ParamSpec], call: &ElementCall) -> Self {
        Self(
            specs
                .iter()
                .map(|spec| {
                    let value = call.param(&spec.name).unwrap_or(&spec.default);
                    (spec.name.clone(), value.to_owned())
                })
                .collect(),
        )
    }
}

/// A code-backed element: a formatting function plus its metadata. The
/// schema is supplied explicitly at registration; it is what the evaluator
/// binds invocation attributes against.
#[derive(Clone)]
pub struct CodeElement {
    pub name: String,
    pub description: String,
    pub see_also: Vec<String>,
    pub params: Vec<ParamSpec>,
    func: ElementFn,
}

impl CodeElement {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        func: impl Fn(&RecordView<'_>, &ParamValues) -> Result<String, ElementError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            see_also: Vec::new(),
            params: Vec::new(),
            func: Arc::new(func),
        }
    }

    /// Declare a parameter with its default value
    #[must_use]
    pub fn with_param(
        mut self,
        name: impl Into<String>,
        default: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            default: default.into(),
            description: description.into(),
        });
        self
    }

    #[must_use]
    pub fn with_see_also(
        mut self,
        see_also: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.see_also.extend(see_also.into_iter().map(Into::into));
        self
    }
}

impl Debug for CodeElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeElement")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// A field-backed element synthesized from the tag-name table
#[derive(Clone, Debug, PartialEq)]
pub struct FieldElement {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
}

impl FieldElement {
    fn new(name: impl Into<String>, tags: Vec<String>) -> Self {
        let label = if tags.len() > 1 { "fields" } else { "field" };
        Self {
            name: name.into(),
            description: format!("Prints {label} {} of the record", tags.join(", ")),
            tags,
        }
    }
}

/// A resolved format element
#[derive(Clone, Debug)]
pub enum FormatElement {
    Code(Arc<CodeElement>),
    Field(Arc<FieldElement>),
}

impl FormatElement {
    pub fn name(&self) -> &str {
        match self {
            Self::Code(element) => &element.name,
            Self::Field(element) => &element.name,
        }
    }

    /// Declared parameters, empty for field elements
    pub fn params(&self) -> &[ParamSpec] {
        match self {
            Self::Code(element) => &element.params,
            Self::Field(_) => &[],
        }
    }

    /// The built-in parameters the evaluator honours for this element kind
    pub fn builtin_params(&self) -> Vec<ParamSpec> {
        let spec = |name: &str, default: &str, description: &str| ParamSpec {
            name: name.into(),
            default: default.into(),
            description: description.into(),
        };
        let mut params = vec![
            spec(
                "prefix",
                "",
                "A prefix printed only if the record has a value for this element",
            ),
            spec(
                "suffix",
                "",
                "A suffix printed only if the record has a value for this element",
            ),
        ];
        if let Self::Field(_) = self {
            params.push(spec(
                "separator",
                " ",
                "A separator between the values of the field",
            ));
            params.push(spec(
                "nbMax",
                "",
                "The maximum number of values to print. No limit if not specified",
            ));
        }
        params.push(spec(
            "default",
            "",
            "A default value printed if the record has no value for this element",
        ));
        params
    }
}

/// Normalize an element name into its cache key: trimmed, spaces replaced by
/// underscores, uppercased, with an optional `BFE_` prefix stripped so both
/// spellings resolve to the same element
pub(crate) fn canonical_name(name: &str) -> String {
    let name = name.trim().replace(' ', "_").to_uppercase();
    match name.strip_prefix("BFE_") {
        Some(stripped) => stripped.to_owned(),
        None => name,
    }
}

/// Registered code elements, keyed by canonical name. Registration is
/// data-driven: adding an element is one [ElementRegistry::register] call at
/// engine construction.
#[derive(Clone, Debug, Default)]
pub struct ElementRegistry {
    code: HashMap<String, Arc<CodeElement>>,
}

impl ElementRegistry {
    /// Register a code element. A later registration under the same
    /// canonical name replaces the earlier one.
    pub fn register(&mut self, element: CodeElement) {
        self.code
            .insert(canonical_name(&element.name), Arc::new(element));
    }

    fn get(&self, key: &str) -> Option<Arc<CodeElement>> {
        self.code.get(key).map(Arc::clone)
    }
}

impl Engine {
    /// Resolve an element by the name a template invokes it under. Code
    /// elements take precedence over tag-table entries; successful
    /// resolutions are cached under the canonical name, failures are not
    /// (the next call retries).
    pub fn format_element(&self, name: &str) -> Result<Arc<FormatElement>, FormatError> {
        let key = canonical_name(name);
        if let Some(cached) = self.caches.elements.get(&key) {
            return Ok(cached);
        }
        if let Some(element) = self.registry.get(&key) {
            debug!(name = %key, "resolved code element");
            return Ok(self.caches.elements.insert(key, FormatElement::Code(element)));
        }
        if self.tags.tag_exists(name) {
            let tags = self.tags.tags_for_name(name);
            debug!(name = %key, ?tags, "synthesized field element");
            let element = FormatElement::Field(Arc::new(FieldElement::new(&key, tags)));
            return Ok(self.caches.elements.insert(key, element));
        }
        Err(FormatError::UnknownElement(name.to_owned()))
    }

    /// Every element the engine can resolve: all registered code elements
    /// plus every tag-table entry without a code counterpart
    pub fn format_elements(&self) -> IndexMap<String, Arc<FormatElement>> {
        let mut elements = IndexMap::new();
        for name in self.tags.all_name_tag_mappings().keys() {
            if let Ok(element) = self.format_element(name) {
                elements.insert(canonical_name(name), element);
            }
        }
        for key in self.registry.code.keys() {
            if let Ok(element) = self.format_element(key) {
                elements.insert(key.clone(), element);
            }
        }
        elements.sort_keys();
        elements
    }

    /// Evaluate one element invocation against a record view
    pub(crate) fn eval_element(
        &self,
        view: &RecordView<'_>,
        call: &ElementCall,
        verbosity: Verbosity,
    ) -> Evaluated {
        let element = match self.format_element(&call.name) {
            Ok(element) => element,
            Err(error) => {
                return Evaluated::failed(self, error, verbosity);
            }
        };
        match &*element {
            FormatElement::Code(code) => self.eval_code_element(view, code, call, verbosity),
            FormatElement::Field(field) => self.eval_field_element(view, field, call),
        }
    }

    fn eval_code_element(
        &self,
        view: &RecordView<'_>,
        element: &CodeElement,
        call: &ElementCall,
        verbosity: Verbosity,
    ) -> Evaluated {
        let params = ParamValues::bind(&element.params, call);
        match (element.func)(view, &params) {
            Ok(body) => Evaluated::ok(wrap(&body, call)),
            Err(error) => {
                let error = FormatError::ElementEvaluationFailure {
                    name: element.name.clone(),
                    reason: error.to_string(),
                };
                Evaluated::failed(self, error, verbosity)
            }
        }
    }

    fn eval_field_element(
        &self,
        view: &RecordView<'_>,
        element: &FieldElement,
        call: &ElementCall,
    ) -> Evaluated {
        let separator = call.param("separator").unwrap_or(" ");
        let mut values: Vec<String> = Vec::new();
        for tag in &element.tags {
            for value in view.fields(tag) {
                match value {
                    FieldValue::Scalar(value) => values.push(value),
                    // No subfield selected: flatten the instance to its
                    // values, in subfield order
                    FieldValue::Instance(map) => values.extend(map.into_values()),
                }
            }
        }

        let mut errors = Vec::new();
        match call.param("nbMax").map(str::trim) {
            None | Some("") => {}
            Some(raw) => match raw.parse::<i64>() {
                // Only a positive limit clips the list
                Ok(limit) if limit > 0 => values.truncate(limit as usize),
                Ok(_) => {}
                Err(_) => {
                    let error = FormatError::BadBuiltinParam {
                        name: element.name.clone(),
                        param: "nbMax".into(),
                        value: raw.to_owned(),
                    };
                    self.sink.register(&error);
                    errors.push(error);
                }
            },
        }

        // The wrapping decision looks at the bare concatenation so that a
        // whitespace separator cannot make an empty result look non-empty
        let text = if values.concat().trim().is_empty() {
            call.param("default").unwrap_or_default().to_owned()
        } else {
            format!(
                "{}{}{}",
                call.param("prefix").unwrap_or_default(),
                values.join(separator),
                call.param("suffix").unwrap_or_default(),
            )
        };
        Evaluated {
            text,
            errors,
            fatal: false,
        }
    }
}

/// Apply the built-in wrapping rule: a body that is non-empty after trimming
/// (the emitted body itself is not trimmed) gets the prefix and suffix; an
/// empty one is replaced by the default
fn wrap(body: &str, call: &ElementCall) -> String {
    if body.trim().is_empty() {
        call.param("default").unwrap_or_default().to_owned()
    } else {
        format!(
            "{}{}{}",
            call.param("prefix").unwrap_or_default(),
            body,
            call.param("suffix").unwrap_or_default(),
        )
    }
}

/// Outcome of evaluating one element invocation
pub(crate) struct Evaluated {
    /// Text to splice into the template in place of the invocation
    pub text: String,
    pub errors: Vec<FormatError>,
    /// Set when verbosity demands the whole formatting call stop here
    pub fatal: bool,
}

impl Evaluated {
    fn ok(text: String) -> Self {
        Self {
            text,
            errors: Vec::new(),
            fatal: false,
        }
    }

    /// Register a failure and render it according to verbosity: silent
    /// substitution by default, an inline marker for template authors at
    /// error verbosity, a fatal stop in debug mode
    fn failed(engine: &Engine, error: FormatError, verbosity: Verbosity) -> Self {
        engine.sink.register(&error);
        let text = if verbosity.shows_errors() {
            inline_error(&error)
        } else {
            String::new()
        };
        Self {
            text,
            errors: vec![error],
            fatal: verbosity.aborts_on_error(),
        }
    }
}

/// The inline marker substituted for a failed element when verbosity shows
/// errors. Styled so it stands out in rendered HTML output.
fn inline_error(error: &FormatError) -> String {
    format!(r#"<b><span style="color: rgb(255, 0, 0);">{error}</span></b> "#)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::TestEngine;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn call(name: &str, params: &[(&str, &str)]) -> ElementCall {
        let mut call = ElementCall::new(name);
        call.params = params
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect();
        call
    }

    #[rstest]
    #[case::plain("BFE_TITLE", "TITLE")]
    #[case::no_prefix("TITLE", "TITLE")]
    #[case::lowercase("bfe_title", "TITLE")]
    #[case::spaces(" label in tag ", "LABEL_IN_TAG")]
    fn test_canonical_name(#[case] name: &str, #[case] expected: &str) {
        assert_eq!(canonical_name(name), expected);
    }

    #[test]
    fn test_code_beats_field() {
        let mut harness = TestEngine::new();
        // The tag table also knows a TITLE mapping; the registered code
        // element must win
        harness.tag_table_entry("TITLE", &["245__a"]);
        let engine = harness.engine();
        let element = engine.format_element("TITLE").unwrap();
        assert!(matches!(&*element, FormatElement::Code(_)));
    }

    #[test]
    fn test_resolve_field_element() {
        let mut harness = TestEngine::new();
        harness.tag_table_entry("AUTHORS", &["700__a"]);
        let engine = harness.engine();
        let element = engine.format_element("bfe_authors").unwrap();
        match &*element {
            FormatElement::Field(field) => {
                assert_eq!(field.tags, vec!["700__a".to_owned()]);
                assert_eq!(field.description, "Prints field 700__a of the record");
            }
            other => panic!("expected field element, got {other:?}"),
        }
    }

    #[test]
    fn test_format_elements_listing() {
        let mut harness = TestEngine::new();
        harness.tag_table_entry("LABEL IN TAG", &["950__a"]);
        let elements = harness.engine().format_elements();
        // Stock code elements and tag-table entries both show up, keyed by
        // canonical name
        assert!(elements.contains_key("TITLE"));
        assert!(elements.contains_key("LABEL_IN_TAG"));
    }

    #[test]
    fn test_unknown_element() {
        let harness = TestEngine::new();
        assert_eq!(
            harness.engine().format_element("NO_SUCH").unwrap_err(),
            FormatError::UnknownElement("NO_SUCH".into())
        );
    }

    #[test]
    fn test_builtin_params_by_kind() {
        let code = FormatElement::Code(Arc::new(CodeElement::new("X", "", |_, _| {
            Ok(String::new())
        })));
        let names: Vec<_> = code
            .builtin_params()
            .into_iter()
            .map(|param| param.name)
            .collect();
        assert_eq!(names, ["prefix", "suffix", "default"]);

        let field = FormatElement::Field(Arc::new(FieldElement::new("Y", vec!["700__a".into()])));
        let names: Vec<_> = field
            .builtin_params()
            .into_iter()
            .map(|param| param.name)
            .collect();
        assert_eq!(names, ["prefix", "suffix", "separator", "nbMax", "default"]);
    }

    #[rstest]
    #[case::empty_gets_default("", &[("default", "n/a"), ("prefix", "["), ("suffix", "]")], "n/a")]
    #[case::whitespace_counts_as_empty("  ", &[("default", "n/a")], "n/a")]
    #[case::wrapped("v", &[("default", "n/a"), ("prefix", "["), ("suffix", "]")], "[v]")]
    #[case::untrimmed_body(" v ", &[("prefix", "<")], "< v ")]
    #[case::bare("v", &[], "v")]
    fn test_wrap(#[case] body: &str, #[case] params: &[(&str, &str)], #[case] expected: &str) {
        assert_eq!(wrap(body, &call("X", params)), expected);
    }
}
