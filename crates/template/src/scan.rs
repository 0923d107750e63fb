//! Shared text-scanning helpers for tag-delimited blocks. The template
//! language tolerates whitespace before the closing `>` of its own tags, so
//! these scanners do too.

use std::ops::Range;

/// A `<tag>…</tag>` block located in a source string
#[derive(Debug, PartialEq)]
pub(crate) struct TagBlock {
    /// Byte range of the whole block, open tag through close tag
    pub outer: Range<usize>,
    /// Byte range of the content between the tags
    pub inner: Range<usize>,
}

/// Find the first `<tag>…</tag>` block, matching the tag name
/// case-insensitively. Returns `None` when no complete block exists; an
/// unclosed open tag is not a block.
pub(crate) fn find_tag_block(source: &str, tag: &str) -> Option<TagBlock> {
    let open = format!("<{tag}");
    let close = format!("</{tag}");
    let mut from = 0;
    while let Some(offset) = find_ignore_case(&source[from..], &open) {
        let start = from + offset;
        if let Some(skip) = close_angle(&source[start + open.len()..]) {
            let inner_start = start + open.len() + skip;
            if let Some((inner_end, end)) =
                find_close(&source[inner_start..], &close).map(|(inner_end, end)| {
                    (inner_start + inner_end, inner_start + end)
                })
            {
                return Some(TagBlock {
                    outer: start..end,
                    inner: inner_start..inner_end,
                });
            }
        }
        from = start + 1;
    }
    None
}

/// Find the first complete close tag, returning (offset of the tag, offset
/// just past its `>`)
fn find_close(source: &str, close: &str) -> Option<(usize, usize)> {
    let mut from = 0;
    while let Some(offset) = find_ignore_case(&source[from..], close) {
        let start = from + offset;
        if let Some(skip) = close_angle(&source[start + close.len()..]) {
            return Some((start, start + close.len() + skip));
        }
        from = start + 1;
    }
    None
}

/// If the string starts with optional whitespace followed by `>`, return the
/// byte length through the `>`
pub(crate) fn close_angle(source: &str) -> Option<usize> {
    let trimmed = source.trim_start();
    let skipped = source.len() - trimmed.len();
    trimmed.starts_with('>').then_some(skipped + 1)
}

/// Byte offset of the first ASCII-case-insensitive occurrence of `needle`
pub(crate) fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_tag_block() {
        let source = "before <name>My name</name> after";
        let block = find_tag_block(source, "name").unwrap();
        assert_eq!(&source[block.inner.clone()], "My name");
        assert_eq!(&source[block.outer], "<name>My name</name>");
    }

    #[test]
    fn test_find_tag_block_case_and_whitespace() {
        let source = "<NAME >x</Name\t>";
        let block = find_tag_block(source, "name").unwrap();
        assert_eq!(&source[block.inner], "x");
    }

    #[test]
    fn test_find_tag_block_unclosed() {
        assert_eq!(find_tag_block("<name>never closed", "name"), None);
    }

    #[test]
    fn test_find_tag_block_prefix_collision() {
        // <named> must not be mistaken for an open <name> tag
        let source = "<named>no</named><name>yes</name>";
        let block = find_tag_block(source, "name").unwrap();
        assert_eq!(&source[block.inner], "yes");
    }
}
