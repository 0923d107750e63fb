//! The formatting engine facade. [Engine::format_record] is the main entry
//! point: it decides which template the output format selects for the
//! record, loads it, filters its language blocks, evaluates its element
//! invocations left to right in a single pass, and returns the assembled
//! text together with every error encountered on the way.

use crate::{
    cache::CacheManager,
    config::Config,
    element::{CodeElement, ElementRegistry, builtin},
    error::{ErrorSink, FormatError, TracingSink},
    outputs::OutputFormat,
    record::RecordView,
    store::{KbStore, OutputMetaStore, RecordExistence, RecordStore, TagTable},
};
use bibfmt_template::{Template, TemplateChunk, filter_languages};
use regex::RegexBuilder;
use tracing::{debug, instrument};

/// Verbosity of a formatting call, 0 through 9. Silent by default; from
/// [Verbosity::ERRORS] upward failed elements are rendered inline for
/// template authors; at [Verbosity::DEBUG] the first error aborts the call.
#[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
pub struct Verbosity(u8);

impl Verbosity {
    pub const SILENT: Self = Self(0);
    pub const ERRORS: Self = Self(5);
    pub const WARNINGS: Self = Self(7);
    pub const DEBUG: Self = Self(9);

    pub fn new(level: u8) -> Self {
        Self(level)
    }

    /// Render element failures inline instead of silently substituting
    /// empty text
    pub(crate) fn shows_errors(self) -> bool {
        self >= Self::ERRORS
    }

    /// Abort the whole formatting call on the first error
    pub(crate) fn aborts_on_error(self) -> bool {
        self >= Self::DEBUG
    }
}

/// The record a formatting call operates on: either an id to fetch from the
/// record store, or an inline serialized record (as used for previews and
/// harvesting)
#[derive(Clone, Debug)]
pub enum RecordSource {
    Id(u32),
    Xml(String),
}

/// Everything one formatting call needs
#[derive(Clone, Debug)]
pub struct FormatRequest {
    pub record: RecordSource,
    /// Output format code, e.g. `HB`
    pub output_format: String,
    /// Locale to format in; the configured default when absent
    pub locale: Option<String>,
    pub verbosity: Verbosity,
    /// The search that led to this record, exposed to elements
    pub search_pattern: Option<String>,
    /// The viewing user, exposed to elements
    pub user_id: Option<String>,
}

impl FormatRequest {
    pub fn new(record: RecordSource, output_format: impl Into<String>) -> Self {
        Self {
            record,
            output_format: output_format.into(),
            locale: None,
            verbosity: Verbosity::default(),
            search_pattern: None,
            user_id: None,
        }
    }
}

/// Result of a formatting call: the text plus every error encountered.
/// `fatal` is set when debug verbosity aborted the call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FormatOutcome {
    pub text: String,
    pub errors: Vec<FormatError>,
    pub fatal: bool,
}

/// A template to format with: a filename in the templates directory, or
/// inline code (previews format unsaved template code this way)
#[derive(Clone, Copy, Debug)]
pub enum TemplateSource<'a> {
    File(&'a str),
    Inline(&'a str),
}

/// The external collaborators an engine formats against
pub struct Stores {
    pub records: Box<dyn RecordStore>,
    pub kb: Box<dyn KbStore>,
    pub tags: Box<dyn TagTable>,
    pub output_meta: Box<dyn OutputMetaStore>,
}

/// A formatting engine: configuration, stores, the element registry and the
/// caches. Cheap to share behind a reference; all mutation after
/// construction is confined to the caches.
pub struct Engine {
    pub(crate) config: Config,
    pub(crate) records: Box<dyn RecordStore>,
    pub(crate) kb: Box<dyn KbStore>,
    pub(crate) tags: Box<dyn TagTable>,
    pub(crate) output_meta: Box<dyn OutputMetaStore>,
    pub(crate) sink: Box<dyn ErrorSink>,
    pub(crate) registry: ElementRegistry,
    pub(crate) caches: CacheManager,
}

impl Engine {
    /// Build an engine with the stock element set registered
    pub fn new(config: Config, stores: Stores) -> Self {
        let mut registry = ElementRegistry::default();
        for element in builtin::all() {
            registry.register(element);
        }
        Self {
            config,
            records: stores.records,
            kb: stores.kb,
            tags: stores.tags,
            output_meta: stores.output_meta,
            sink: Box::new(TracingSink),
            registry,
            caches: CacheManager::default(),
        }
    }

    /// Replace the default error sink
    #[must_use]
    pub fn with_error_sink(mut self, sink: Box<dyn ErrorSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Register an additional code element. Elements registered here shadow
    /// stock elements and tag-table entries of the same name.
    pub fn register_element(&mut self, element: CodeElement) {
        self.registry.register(element);
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Drop every cached template, element, output format and knowledge
    /// base lookup. The next reads repopulate from the sources.
    pub fn clear_caches(&self) {
        self.caches.clear();
    }

    /// Format a record with an output format. This never panics and only
    /// aborts early at debug verbosity; in every other case it returns
    /// whatever text could be assembled plus the accumulated errors.
    #[instrument(skip(self, request), fields(output = %request.output_format))]
    pub fn format_record(&self, request: &FormatRequest) -> FormatOutcome {
        let locale = request
            .locale
            .clone()
            .unwrap_or_else(|| self.config.default_locale.clone());
        let mut errors = Vec::new();

        let view = match &request.record {
            RecordSource::Id(id) => {
                if self.records.exists(*id) == RecordExistence::Absent {
                    self.report(&mut errors, FormatError::NoSuchRecord(*id));
                    return FormatOutcome {
                        text: String::new(),
                        errors,
                        fatal: request.verbosity.aborts_on_error(),
                    };
                }
                RecordView::from_id(
                    self,
                    *id,
                    locale,
                    request.search_pattern.clone(),
                    request.user_id.clone(),
                )
            }
            RecordSource::Xml(xml) => RecordView::from_xml(
                self,
                xml,
                locale,
                request.search_pattern.clone(),
                request.user_id.clone(),
            ),
        };

        let output = match self.output_format(&request.output_format, false) {
            Ok(output) => output,
            Err(error) => {
                self.report(&mut errors, error);
                // Keep going with the empty format; the missing default will
                // surface as "no template found" below
                std::sync::Arc::new(OutputFormat::default())
            }
        };

        let template = self.decide_template(&view, &output, &mut errors);
        let Some(template) = template else {
            self.report(
                &mut errors,
                FormatError::NoTemplateFound(request.output_format.clone()),
            );
            errors.extend(view.take_errors());
            return FormatOutcome {
                text: String::new(),
                errors,
                fatal: request.verbosity.aborts_on_error(),
            };
        };

        let (text, mut format_errors, fatal) = self.format_with_template(
            TemplateSource::File(&template),
            &view,
            request.verbosity,
        );
        errors.append(&mut format_errors);
        errors.extend(view.take_errors());
        FormatOutcome {
            text,
            errors,
            fatal,
        }
    }

    /// Format a record view with a specific template, bypassing the decision
    /// engine. Returns the text, the errors, and whether debug verbosity
    /// aborted the evaluation.
    pub fn format_with_template(
        &self,
        template: TemplateSource<'_>,
        view: &RecordView<'_>,
        verbosity: Verbosity,
    ) -> (String, Vec<FormatError>, bool) {
        let mut errors = Vec::new();
        let code = match template {
            TemplateSource::File(filename) => match self.format_template(filename, false) {
                Ok(template) => template.code.clone(),
                Err(error) => {
                    self.report(&mut errors, error);
                    String::new()
                }
            },
            // Inline code skipped the loader, so apply the same escape here
            // to keep one uniform reversal below
            TemplateSource::Inline(code) => code.replace('%', "%%"),
        };

        let localized = filter_languages(
            &code,
            view.locale(),
            &self.config.default_locale,
            &self.config.locales,
        );
        let (text, mut eval_errors, fatal) =
            self.eval_template_elements(&localized, view, verbosity);
        errors.append(&mut eval_errors);

        // The loader doubled every literal `%`; reverse that exactly once,
        // after substitution
        (text.replace("%%", "%"), errors, fatal)
    }

    /// Scan the template body and splice in the evaluation of each element
    /// invocation, left to right. A single pass: element output is never
    /// rescanned, so templates cannot recurse.
    fn eval_template_elements(
        &self,
        body: &str,
        view: &RecordView<'_>,
        verbosity: Verbosity,
    ) -> (String, Vec<FormatError>, bool) {
        let template = Template::parse(body);
        let mut out = String::with_capacity(body.len());
        let mut errors = Vec::new();
        for chunk in template.chunks() {
            match chunk {
                TemplateChunk::Raw(text) => out.push_str(text),
                TemplateChunk::Element(call) => {
                    debug!(element = %call.name, "evaluating element");
                    let evaluated = self.eval_element(view, call, verbosity);
                    errors.extend(evaluated.errors);
                    if evaluated.fatal {
                        return (String::new(), errors, true);
                    }
                    out.push_str(&evaluated.text);
                }
            }
        }
        (out, errors, false)
    }

    /// Pick the template an output format selects for a record: the first
    /// rule whose pattern matches the start of the record's field value
    /// wins, else the format's default. `None` means the format has no
    /// default either.
    fn decide_template(
        &self,
        view: &RecordView<'_>,
        output: &OutputFormat,
        errors: &mut Vec<FormatError>,
    ) -> Option<String> {
        for rule in &output.rules {
            let value = view.field(&rule.field);
            let value = value.trim();
            let pattern = rule.value.trim();
            match RegexBuilder::new(pattern).case_insensitive(true).build() {
                Ok(regex) => {
                    if regex.find(value).is_some_and(|found| found.start() == 0) {
                        debug!(field = %rule.field, %pattern, template = %rule.template, "rule matched");
                        return Some(rule.template.clone());
                    }
                }
                // An unparsable pattern is a non-match, not a failure of the
                // whole call
                Err(error) => self.report(
                    errors,
                    FormatError::BadRulePattern {
                        pattern: pattern.to_owned(),
                        reason: error.to_string(),
                    },
                ),
            }
        }
        (!output.default.is_empty()).then(|| output.default.clone())
    }

    /// Register an error with the sink and accumulate it for the caller
    pub(crate) fn report(&self, errors: &mut Vec<FormatError>, error: FormatError) {
        self.sink.register(&error);
        errors.push(error);
    }

    /// Knowledge base lookup with per-(kb, key) caching; misses map to the
    /// default
    pub(crate) fn kb_value(&self, kb: &str, key: &str, default: &str) -> String {
        self.caches
            .kb_lookup(&*self.kb, kb, key)
            .unwrap_or_else(|| default.to_owned())
    }
}
