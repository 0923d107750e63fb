//! Output format loading. An output format is a line-oriented rule file
//! mapping record content to a format template:
//!
//! ```text
//! tag 980__a:
//! PREPRINT --- preprint.bft
//! THESIS --- thesis.bft
//! default: brief.bft
//! ```
//!
//! A line ending in `:` sets the tag context for the rules that follow; a
//! line containing `---` is a rule; any other line with a `:` declares the
//! default template. Codes resolve to filenames case-insensitively.

use crate::{engine::Engine, error::FormatError, templates::list_dir};
use bibfmt_util::ResultTraced;
use indexmap::IndexMap;
use serde::Serialize;
use std::{fs, sync::Arc};
use tracing::debug;

/// Output format filenames are their code plus extension; codes are capped
/// at this length
const MAX_CODE_LEN: usize = 6;

/// Localized names of an output format, as served by the metadata store
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct OutputFormatNames {
    pub generic: String,
    /// Short name by locale
    pub short: IndexMap<String, String>,
    /// Long name by locale
    pub long: IndexMap<String, String>,
}

/// Presentation metadata of an output format
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct OutputFormatAttrs {
    /// Uppercased output format code
    pub code: String,
    pub names: OutputFormatNames,
    pub description: String,
    /// Content type the formatted output should be served with, if any
    pub content_type: String,
}

/// One rule of an output format: if the record's `field` matches `value`
/// (a case-insensitive pattern anchored at the start), format with
/// `template`
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct OutputRule {
    pub field: String,
    pub value: String,
    pub template: String,
}

/// A loaded output format: ordered rules plus the default template used
/// when none matches
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OutputFormat {
    pub rules: Vec<OutputRule>,
    pub default: String,
    /// Only populated when loaded with attributes
    pub attrs: Option<OutputFormatAttrs>,
}

impl Engine {
    /// Resolve an output format code to its filename. The code is stripped
    /// of anything but dots and alphanumerics, given the output extension if
    /// missing, and matched against the outputs directory without case
    /// sensitivity.
    pub fn resolve_output_filename(&self, code: &str) -> Option<String> {
        let mut code: String = code
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '.')
            .collect();
        let suffix = self.config.output_suffix();
        if !code.ends_with(&suffix) {
            code.push_str(&suffix);
        }
        list_dir(&self.config.outputs_dir)
            .into_iter()
            .find(|filename| filename.eq_ignore_ascii_case(&code))
    }

    /// Load an output format by code, from cache when possible
    pub fn output_format(
        &self,
        code: &str,
        with_attributes: bool,
    ) -> Result<Arc<OutputFormat>, FormatError> {
        let Some(filename) = self.resolve_output_filename(code) else {
            return Err(FormatError::UnknownOutputCode(code.to_owned())).traced();
        };

        if let Some(cached) = self.caches.outputs.get(&filename)
            && (!with_attributes || cached.attrs.is_some())
        {
            return Ok(cached);
        }

        let path = self.config.outputs_dir.join(&filename);
        debug!(?path, "loading output format");
        let source = fs::read_to_string(&path)
            .map_err(|error| FormatError::OutputFormatReadFailure {
                filename: filename.clone(),
                reason: error.to_string(),
            })
            .traced()?;

        let (rules, default) = parse_output_source(&source);
        let attrs = with_attributes.then(|| self.output_format_attrs(code));
        Ok(self.caches.outputs.insert(
            filename,
            OutputFormat {
                rules,
                default,
                attrs,
            },
        ))
    }

    /// Metadata of an output format, from the metadata store. Unresolvable
    /// codes get empty attributes (with the code still filled in).
    pub fn output_format_attrs(&self, code: &str) -> OutputFormatAttrs {
        let suffix = self.config.output_suffix();
        let code = code.strip_suffix(&suffix).unwrap_or(code);
        let mut attrs = OutputFormatAttrs {
            code: code.to_uppercase(),
            ..OutputFormatAttrs::default()
        };
        if self.resolve_output_filename(code).is_some() {
            attrs.names = self.output_meta.names(code);
            attrs.description = self.output_meta.description(code);
            attrs.content_type = self.output_meta.content_type(code);
        }
        attrs
    }

    /// All output formats in the outputs directory, keyed by filename
    pub fn output_formats(
        &self,
        with_attributes: bool,
    ) -> IndexMap<String, Arc<OutputFormat>> {
        let suffix = self.config.output_suffix();
        let mut outputs = IndexMap::new();
        for filename in list_dir(&self.config.outputs_dir) {
            if let Some(code) = filename.strip_suffix(&suffix) {
                match self.output_format(code, with_attributes) {
                    Ok(output) => {
                        outputs.insert(filename, output);
                    }
                    Err(error) => self.sink.register(&error),
                }
            }
        }
        outputs.sort_keys();
        outputs
    }

    /// A filename (and final code) for a new output format, unique in the
    /// outputs directory. Codes are uppercased and capped at six
    /// characters; collisions get a numeric suffix within that cap. Running
    /// out of suffixes is an [FormatError::OutputLimitReached].
    pub fn fresh_output_filename(&self, code: &str) -> Result<(String, String), FormatError> {
        let mut code: String = code
            .trim()
            .to_uppercase()
            .replace(' ', "_")
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '.')
            .collect();
        code.truncate(MAX_CODE_LEN);
        let suffix = self.config.output_suffix();

        let mut filename = code.clone();
        let mut index = 2;
        while self
            .config
            .outputs_dir
            .join(format!("{filename}{suffix}"))
            .exists()
        {
            let digits = index.to_string();
            let keep = MAX_CODE_LEN.saturating_sub(digits.len()).min(code.len());
            filename = format!("{}{digits}", &code[..keep]);
            index += 1;
            if index >= 99_999 {
                return Err(FormatError::OutputLimitReached(code)).traced();
            }
        }
        Ok((format!("{filename}{suffix}"), filename))
    }
}

/// Parse the line grammar of an output format file
fn parse_output_source(source: &str) -> (Vec<OutputRule>, String) {
    let mut rules = Vec::new();
    let mut default = String::new();
    let mut current_tag = String::new();

    for line in source.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.ends_with(':') {
            // Tag context: everything after the first word, joined
            let cleaned = line.trim_end_matches([':', ' ']);
            current_tag = cleaned.split_whitespace().skip(1).collect();
        } else if let Some((condition, template)) = line.rsplit_once("---") {
            rules.push(OutputRule {
                field: current_tag.clone(),
                value: condition.replace("---", ""),
                template: template.trim().to_owned(),
            });
        } else if let Some((_, default_part)) = line.split_once(':') {
            default = default_part.trim().to_owned();
        }
    }
    (rules, default)
}
