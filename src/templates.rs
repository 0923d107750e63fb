//! Format template loading. A template file is read once, its headers
//! stripped and every literal `%` doubled, then the result is cached by
//! filename. The doubling survives until the facade reverses it after
//! element substitution, so intermediate stages can treat `%` as reserved.

use crate::{engine::Engine, error::FormatError};
use bibfmt_template::{strip_headers, template_header};
use bibfmt_util::ResultTraced;
use indexmap::IndexMap;
use serde::Serialize;
use std::{fs, sync::Arc};
use tracing::debug;

/// Name and description declared in a template file's headers
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct TemplateAttrs {
    /// Declared `<name>`, falling back to the filename
    pub name: String,
    pub description: String,
}

/// A loaded format template
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FormatTemplate {
    /// Template body with headers removed and every `%` doubled
    pub code: String,
    /// Only populated when the template was loaded with attributes
    pub attrs: Option<TemplateAttrs>,
}

impl Engine {
    /// Load a format template by filename, from cache when possible. The
    /// filename must carry the configured template extension. A cached entry
    /// without attributes is reloaded when attributes are requested.
    pub fn format_template(
        &self,
        filename: &str,
        with_attributes: bool,
    ) -> Result<Arc<FormatTemplate>, FormatError> {
        let suffix = self.config.template_suffix();
        if !filename.ends_with(&suffix) {
            return Err(FormatError::TemplateReadFailure {
                filename: filename.to_owned(),
                reason: format!("template file names must end with `{suffix}`"),
            });
        }

        if let Some(cached) = self.caches.templates.get(filename)
            && (!with_attributes || cached.attrs.is_some())
        {
            return Ok(cached);
        }

        let path = self.config.templates_dir.join(filename);
        debug!(?path, "loading format template");
        let source = fs::read_to_string(&path)
            .map_err(|error| FormatError::TemplateReadFailure {
                filename: filename.to_owned(),
                reason: error.to_string(),
            })
            .traced()?;

        let code = strip_headers(&source).replace('%', "%%");
        let attrs = with_attributes.then(|| {
            let header = template_header(&source);
            TemplateAttrs {
                name: header.name.unwrap_or_else(|| filename.to_owned()),
                description: header.description.unwrap_or_default(),
            }
        });
        Ok(self
            .caches
            .templates
            .insert(filename.to_owned(), FormatTemplate { code, attrs }))
    }

    /// All templates in the templates directory, keyed by filename.
    /// Unreadable files are skipped (their failures are registered).
    pub fn format_templates(
        &self,
        with_attributes: bool,
    ) -> IndexMap<String, Arc<FormatTemplate>> {
        let suffix = self.config.template_suffix();
        let mut templates = IndexMap::new();
        for filename in list_dir(&self.config.templates_dir) {
            if filename.ends_with(&suffix) {
                match self.format_template(&filename, with_attributes) {
                    Ok(template) => {
                        templates.insert(filename, template);
                    }
                    Err(error) => self.sink.register(&error),
                }
            }
        }
        templates.sort_keys();
        templates
    }

    /// A filename (and display name) for a new template, unique in the
    /// templates directory. Used by authoring tools when saving a template.
    pub fn fresh_template_filename(&self, name: &str) -> (String, String) {
        let base = name.trim().replace(' ', "_");
        let sanitized: String = base
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_'))
            .collect();
        let suffix = self.config.template_suffix();

        let mut filename = sanitized.clone();
        let mut index = 1;
        while self
            .config
            .templates_dir
            .join(format!("{filename}{suffix}"))
            .exists()
        {
            index += 1;
            filename = format!("{sanitized}{index}");
        }

        let display = if index > 1 {
            format!("{base}{index}").replace('_', " ")
        } else {
            base.replace('_', " ")
        };
        (format!("{filename}{suffix}"), display)
    }
}

/// File names in a directory, in unspecified order. An unreadable directory
/// reads as empty.
pub(crate) fn list_dir(dir: &std::path::Path) -> Vec<String> {
    fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .filter_map(|entry| entry.file_name().into_string().ok())
                .collect()
        })
        .unwrap_or_default()
}
