//! Engine configuration

use serde::Deserialize;
use std::path::PathBuf;

/// Static configuration of a formatting engine: where templates and output
/// formats live, their file extensions, and the locale set used by
/// multilingual template blocks. An engine takes its `Config` at
/// construction; there is no global state.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory holding `<name>.<template_extension>` files
    pub templates_dir: PathBuf,
    /// Directory holding `<code>.<output_extension>` files
    pub outputs_dir: PathBuf,
    pub template_extension: String,
    pub output_extension: String,
    /// The known locale set. Only these appear as segments in `<lang>`
    /// blocks.
    pub locales: Vec<String>,
    /// Locale a `<lang>` block falls back to when it has no segment for the
    /// active one
    pub default_locale: String,
    /// Field path of the OAI identifier, used by the XML serializer
    pub oai_id_tag: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            templates_dir: "templates".into(),
            outputs_dir: "outputs".into(),
            template_extension: "bft".into(),
            output_extension: "bfo".into(),
            locales: ["en", "fr", "de", "es", "it"].map(String::from).to_vec(),
            default_locale: "en".into(),
            oai_id_tag: "909COo".into(),
        }
    }
}

impl Config {
    /// Template extension with its leading dot
    pub(crate) fn template_suffix(&self) -> String {
        format!(".{}", self.template_extension)
    }

    /// Output extension with its leading dot
    pub(crate) fn output_suffix(&self) -> String {
        format!(".{}", self.output_extension)
    }
}
