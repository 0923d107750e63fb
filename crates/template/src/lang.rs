//! Multilingual block filtering

use crate::scan::{close_angle, find_tag_block};
use std::ops::Range;

/// Reduce every `<lang>…</lang>` block of a template body to the active
/// locale. Inside a block, each known-locale segment `<xx>…</xx>` is
/// replaced by its content when `xx` is the active locale and dropped
/// otherwise; text between segments is preserved, and the outer `<lang>`
/// tags are consumed. A block with no segment for `locale` falls back to
/// `fallback` for that block. Locale tags are case-sensitive; only locales
/// from `known` count as segments.
pub fn filter_languages(body: &str, locale: &str, fallback: &str, known: &[String]) -> String {
    let mut out = String::with_capacity(body.len());
    let mut rest = body;
    while let Some(block) = find_tag_block(rest, "lang") {
        out.push_str(&rest[..block.outer.start]);
        out.push_str(&filter_block(
            &rest[block.inner],
            locale,
            fallback,
            known,
        ));
        rest = &rest[block.outer.end..];
    }
    out.push_str(rest);
    out
}

/// Filter the content of one `<lang>` block
fn filter_block(content: &str, locale: &str, fallback: &str, known: &[String]) -> String {
    // Decide which locale this block will be read in before touching it
    let active = if find_segment(content, locale).is_some() {
        locale
    } else {
        fallback
    };

    let mut out = String::new();
    let mut rest = content;
    while let Some((start, segment_locale, segment)) = next_segment(rest, known) {
        out.push_str(&rest[..start]);
        if segment_locale == active {
            out.push_str(&rest[segment.inner.clone()]);
        }
        rest = &rest[segment.end..];
    }
    out.push_str(rest);
    out
}

/// A `<xx>…</xx>` locale segment, with ranges relative to where the segment
/// starts
struct Segment {
    inner: Range<usize>,
    end: usize,
}

/// Try to read a locale segment starting exactly at the beginning of
/// `source` (which must begin with `<`)
fn segment_at(source: &str, locale: &str) -> Option<Segment> {
    let tail = source.strip_prefix('<')?.strip_prefix(locale)?;
    let skip = close_angle(tail)?;
    let inner_start = 1 + locale.len() + skip;

    let close = format!("</{locale}");
    let mut from = inner_start;
    while let Some(offset) = source[from..].find(&close) {
        let close_start = from + offset;
        if let Some(skip) = close_angle(&source[close_start + close.len()..]) {
            return Some(Segment {
                inner: inner_start..close_start,
                end: close_start + close.len() + skip,
            });
        }
        from = close_start + 1;
    }
    None
}

/// First complete segment for the given locale anywhere in `source`
fn find_segment(source: &str, locale: &str) -> Option<(usize, Segment)> {
    let mut from = 0;
    while let Some(offset) = source[from..].find('<') {
        let start = from + offset;
        if let Some(segment) = segment_at(&source[start..], locale) {
            return Some((start, segment));
        }
        from = start + 1;
    }
    None
}

/// First segment of any known locale, returning its start offset, the locale
/// and the segment (ranges relative to the start offset shifted to absolute)
fn next_segment<'k>(
    source: &str,
    known: &'k [String],
) -> Option<(usize, &'k str, Segment)> {
    let mut from = 0;
    while let Some(offset) = source[from..].find('<') {
        let start = from + offset;
        for locale in known {
            if let Some(segment) = segment_at(&source[start..], locale) {
                return Some((
                    start,
                    locale.as_str(),
                    Segment {
                        inner: start + segment.inner.start..start + segment.inner.end,
                        end: start + segment.end,
                    },
                ));
            }
        }
        from = start + 1;
    }
    None
}
