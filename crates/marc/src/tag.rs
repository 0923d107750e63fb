//! MARC field paths

use serde::Serialize;
use std::fmt::{self, Display};

/// Wildcard character accepted in any position of a tag path
pub const WILDCARD: char = '%';

/// A parsed MARC field path: a (usually three-digit) tag, two optional
/// indicators and an optional subfield code.
///
/// A path is built from a raw string such as `245__a`, `700C5$u` or `8564_u`.
/// The accepted spellings are `TTT`, `TTTs`, `TTTII` and `TTTIIs`, where the
/// subfield may be preceded by `.`, `$` or `$$`, an underscore stands for an
/// absent indicator, and `%` is a wildcard in any position. Parsing never
/// fails: the parser does not check well-formedness, and a malformed path
/// simply matches nothing downstream.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct TagPath {
    /// Field tag, e.g. `245`. May contain wildcards, e.g. `2%5`.
    pub tag: String,
    /// First indicator. `None` requires the indicator to be absent.
    pub ind1: Option<char>,
    /// Second indicator. `None` requires the indicator to be absent.
    pub ind2: Option<char>,
    /// Subfield code. `None` selects whole field instances.
    pub subfield: Option<char>,
}

impl TagPath {
    /// Parse a raw tag string. Spaces and the `$`/`.` subfield separators are
    /// discarded, then the remaining length decides which slots are filled:
    /// 3 = tag only, 4 = tag + subfield, 5 = tag + indicators, 6 = all four.
    /// Any other length fills the tag slot (up to three characters) and
    /// leaves the rest empty.
    pub fn parse(raw: &str) -> Self {
        let cleaned: Vec<char> = raw
            .chars()
            .filter(|c| !matches!(c, ' ' | '$' | '.'))
            .collect();
        let tag: String = cleaned.iter().take(3).collect();
        // An underscore explicitly marks "no indicator"
        let indicator = |c: char| (c != '_').then_some(c);
        match cleaned.as_slice() {
            [_, _, _, subfield] => Self {
                tag,
                subfield: Some(*subfield),
                ..Self::default()
            },
            [_, _, _, ind1, ind2] => Self {
                tag,
                ind1: indicator(*ind1),
                ind2: indicator(*ind2),
                subfield: None,
            },
            [_, _, _, ind1, ind2, subfield] => Self {
                tag,
                ind1: indicator(*ind1),
                ind2: indicator(*ind2),
                subfield: Some(*subfield),
            },
            _ => Self {
                tag,
                ..Self::default()
            },
        }
    }

    /// Does this path's tag match the given concrete field tag? Comparison is
    /// character-wise with `%` matching any character.
    pub fn matches_tag(&self, tag: &str) -> bool {
        self.tag.len() == tag.len()
            && self
                .tag
                .chars()
                .zip(tag.chars())
                .all(|(pattern, actual)| pattern == WILDCARD || pattern == actual)
    }

    /// Is this a control field path (tags 001 through 009)?
    pub fn is_control(&self) -> bool {
        let mut chars = self.tag.chars();
        matches!(
            (chars.next(), chars.next(), chars.next(), chars.next()),
            (Some('0'), Some('0'), Some('1'..='9'), None)
        )
    }

    /// Does the path select individual subfield values (as opposed to whole
    /// field instances)?
    pub fn has_subfield(&self) -> bool {
        self.subfield.is_some()
    }
}

impl Display for TagPath {
    /// Write the canonical spelling of the path: absent indicators print as
    /// `_`, and indicators are only printed when the path carries an
    /// indicator or subfield slot at all.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag)?;
        if self.ind1.is_some() || self.ind2.is_some() || self.subfield.is_some() {
            write!(f, "{}", self.ind1.unwrap_or('_'))?;
            write!(f, "{}", self.ind2.unwrap_or('_'))?;
        }
        if let Some(subfield) = self.subfield {
            write!(f, "{subfield}")?;
        }
        Ok(())
    }
}

impl From<&str> for TagPath {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}
