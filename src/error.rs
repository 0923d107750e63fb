//! Error taxonomy of the formatting engine, and the sink that failures are
//! reported to

use thiserror::Error;
use tracing::error;

/// Any error the engine can produce while formatting a record. Every error
/// is registered with the configured [ErrorSink] and accumulated into the
/// per-call error list returned next to the formatted text; formatting only
/// aborts on the first error in debug verbosity.
///
/// Variants hold plain strings rather than source errors so that a single
/// error can be both sunk and returned to the caller.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum FormatError {
    /// The requested record id is not known to the record store
    #[error("record {0} does not exist")]
    NoSuchRecord(u32),

    /// The record store could not produce a readable record
    #[error("record {0} could not be loaded")]
    RecordUnavailable(u32),

    /// An inline record serialization could not be parsed
    #[error("could not parse inline record: {reason}")]
    RecordParseFailure { reason: String },

    /// No rule matched and the output format declares no default template
    #[error("no format template found for output format `{0}`")]
    NoTemplateFound(String),

    #[error("could not read format template `{filename}`: {reason}")]
    TemplateReadFailure { filename: String, reason: String },

    #[error("could not read output format `{filename}`: {reason}")]
    OutputFormatReadFailure { filename: String, reason: String },

    /// The output format code matches no file in the outputs directory
    #[error("could not resolve output format code `{0}`")]
    UnknownOutputCode(String),

    /// The element name is neither registered in code nor present in the
    /// tag-name table
    #[error("could not resolve format element `{0}`")]
    UnknownElement(String),

    /// A code element returned an error
    #[error("error evaluating format element `{name}`: {reason}")]
    ElementEvaluationFailure { name: String, reason: String },

    /// A built-in parameter carried a value of the wrong shape, e.g. a
    /// non-integer `nbMax`
    #[error("built-in parameter `{param}` of element `{name}` is not an integer: `{value}`")]
    BadBuiltinParam {
        name: String,
        param: String,
        value: String,
    },

    /// An output format rule carries a pattern that is not a valid regular
    /// expression; the rule is treated as a non-match
    #[error("invalid pattern `{pattern}` in output format rule: {reason}")]
    BadRulePattern { pattern: String, reason: String },

    /// The collision-numbering space for output format filenames ran out
    #[error("too many output formats named `{0}`")]
    OutputLimitReached(String),
}

/// Where errors are registered as they occur, independently of the per-call
/// error list. Embedding applications can plug in their own reporting here.
pub trait ErrorSink: Send + Sync {
    fn register(&self, error: &FormatError);
}

impl<T: ErrorSink + ?Sized> ErrorSink for std::sync::Arc<T> {
    fn register(&self, error: &FormatError) {
        (**self).register(error);
    }
}

/// Default sink: log through `tracing`
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl ErrorSink for TracingSink {
    fn register(&self, error: &FormatError) {
        error!(%error, "record formatting error");
    }
}
