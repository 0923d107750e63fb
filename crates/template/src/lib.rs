//! The format template language: arbitrary text with embedded element
//! invocations (`<BFE_NAME attr="value"/>`), multilingual blocks
//! (`<lang><en>…</en><fr>…</fr></lang>`) and optional `<name>` /
//! `<description>` headers. This crate only understands the syntax; elements
//! are resolved and evaluated by the engine.
//!
//! **This crate is not semver compliant**. The version is locked to the root
//! `bibfmt` crate version.

mod lang;
mod parse;
mod scan;

pub use lang::filter_languages;
pub use parse::{TemplateHeader, strip_headers, template_header};

use indexmap::IndexMap;
use std::sync::Arc;

/// A parsed template body, split into raw text and element invocations. The
/// body is parsed during creation, hence the immutability.
///
/// Invariants:
/// - No two raw chunks are ever consecutive
/// - Raw chunks are never empty
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Template {
    chunks: Vec<TemplateChunk>,
}

impl Template {
    /// Parse a template body. Parsing never fails: anything that does not
    /// form a well-formed element invocation is kept as literal text.
    pub fn parse(body: &str) -> Self {
        Self {
            chunks: parse::chunks(body),
        }
    }

    /// The parsed chunks, in source order
    pub fn chunks(&self) -> &[TemplateChunk] {
        &self.chunks
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// A parsed piece of a template: either raw text to be emitted verbatim, or
/// an element invocation to be evaluated and spliced in
#[derive(Clone, Debug, PartialEq)]
pub enum TemplateChunk {
    /// Raw unprocessed text. Stored in an `Arc` so a render can share it
    /// without cloning; templates are immutable so this is safe.
    Raw(Arc<str>),
    /// An element invocation to be computed at render time
    Element(ElementCall),
}

/// A single `<BFE_…>` invocation: the element name (without the `BFE_`
/// prefix, original case preserved) and its attributes in source order
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ElementCall {
    pub name: String,
    pub params: IndexMap<String, String>,
}

impl ElementCall {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: IndexMap::new(),
        }
    }

    /// Attribute value by name, if the invocation carries it
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}
