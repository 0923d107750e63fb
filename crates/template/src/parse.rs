//! Template body parsing

use crate::{ElementCall, TemplateChunk, scan::find_tag_block};
use indexmap::IndexMap;
use winnow::{
    ModalResult, Parser,
    ascii::{Caseless, multispace0},
    combinator::{alt, delimited, opt, preceded, repeat, separated_pair},
    token::{take_till, take_while},
};

/// Every element invocation starts with this prefix (matched without case
/// sensitivity)
pub(crate) const ELEMENT_PREFIX: &str = "<BFE_";

/// Split a template body into raw text and element invocations. The scan is
/// a single left-to-right pass; anything that looks like an invocation but
/// fails to parse (say, an unterminated attribute value) stays literal.
pub(crate) fn chunks(body: &str) -> Vec<TemplateChunk> {
    let mut chunks = Vec::new();
    let mut raw_start = 0;
    let mut index = 0;
    while index < body.len() {
        let rest = &body[index..];
        let at_prefix = rest
            .get(..ELEMENT_PREFIX.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(ELEMENT_PREFIX));
        if at_prefix {
            let mut remainder = rest;
            if let Ok(call) = element_call(&mut remainder) {
                if raw_start < index {
                    chunks.push(TemplateChunk::Raw(body[raw_start..index].into()));
                }
                chunks.push(TemplateChunk::Element(call));
                index = body.len() - remainder.len();
                raw_start = index;
                continue;
            }
        }
        index += rest.chars().next().map_or(1, char::len_utf8);
    }
    if raw_start < body.len() {
        chunks.push(TemplateChunk::Raw(body[raw_start..].into()));
    }
    chunks
}

/// Parse one element invocation:
/// `<BFE_NAME attr1="value" attr2='value' />`, with the closing slash
/// optional. The name is any run of characters up to whitespace, `/` or `>`.
fn element_call(input: &mut &str) -> ModalResult<ElementCall> {
    preceded(
        Caseless(ELEMENT_PREFIX),
        (
            take_while(1.., |c: char| {
                !c.is_whitespace() && c != '/' && c != '>'
            }),
            repeat(0.., preceded(multispace0, attribute)),
            (multispace0, opt('/'), '>'),
        ),
    )
    .map(|(name, attributes, _): (&str, Vec<(&str, &str)>, _)| {
        // A repeated attribute keeps its first position, last value wins
        let params: IndexMap<String, String> = attributes
            .into_iter()
            .map(|(name, value)| (name.to_owned(), value.to_owned()))
            .collect();
        ElementCall {
            name: name.to_owned(),
            params,
        }
    })
    .parse_next(input)
}

/// Parse a single `name="value"` attribute. Either quote style is accepted
/// and values may span lines.
fn attribute<'a>(input: &mut &'a str) -> ModalResult<(&'a str, &'a str)> {
    separated_pair(
        take_while(1.., |c: char| {
            !c.is_whitespace() && !matches!(c, '=' | '/' | '>' | '\'' | '"')
        }),
        (multispace0, '=', multispace0),
        quoted_value,
    )
    .parse_next(input)
}

fn quoted_value<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    alt((
        delimited('\'', take_till(0.., '\''), '\''),
        delimited('"', take_till(0.., '"'), '"'),
    ))
    .parse_next(input)
}

/// The optional `<name>` and `<description>` headers of a template file
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TemplateHeader {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Extract the header values from a template source. The description is
/// right-trimmed of trailing periods.
pub fn template_header(source: &str) -> TemplateHeader {
    let name = find_tag_block(source, "name").map(|block| source[block.inner].to_owned());
    let description = find_tag_block(source, "description")
        .map(|block| source[block.inner].trim_end_matches('.').to_owned());
    TemplateHeader { name, description }
}

/// Remove the first `<name>` and first `<description>` header (each with an
/// optional trailing newline) from a template source, leaving the body
pub fn strip_headers(source: &str) -> String {
    let stripped = strip_block(source, "name");
    strip_block(&stripped, "description")
}

fn strip_block(source: &str, tag: &str) -> String {
    match find_tag_block(source, tag) {
        Some(block) => {
            let mut end = block.outer.end;
            if source[end..].starts_with('\n') {
                end += 1;
            }
            format!("{}{}", &source[..block.outer.start], &source[end..])
        }
        None => source.to_owned(),
    }
}
