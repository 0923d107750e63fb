//! MARC bibliographic record model: tag paths, records, field instances and
//! the MARCXML reader. This crate is purely a data layer; it knows nothing
//! about templates, output formats or stores.
//!
//! **This crate is not semver compliant**. The version is locked to the root
//! `bibfmt` crate version.

mod marcxml;
mod record;
mod tag;

pub use marcxml::RecordParseError;
pub use record::{FieldInstance, Record, Subfield};
pub use tag::TagPath;
