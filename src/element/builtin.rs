//! Stock format elements shipped with the engine. These cover the basic
//! bibliographic fields and double as reference implementations of the
//! element protocol: read through the record view, never mutate it, return
//! the fragment.

use crate::{
    element::{CodeElement, ElementError, ParamValues},
    record::{FieldValue, RecordView},
};

/// All stock elements, registered into every new engine
pub fn all() -> Vec<CodeElement> {
    vec![title(), authors(), date_rec(), abstract_(), collection()]
}

fn title() -> CodeElement {
    CodeElement::new("TITLE", "Prints the title of the record", format_title).with_param(
        "separator",
        " : ",
        "Separator between the title and its subtitle",
    )
}

fn format_title(view: &RecordView<'_>, params: &ParamValues) -> Result<String, ElementError> {
    let mut title = view.field("245__a");
    let subtitle = view.field("245__b");
    if !subtitle.is_empty() {
        title.push_str(params.get("separator"));
        title.push_str(&subtitle);
    }
    Ok(title)
}

fn authors() -> CodeElement {
    CodeElement::new(
        "AUTHORS",
        "Prints the authors of the record, main entry first",
        format_authors,
    )
    .with_param("separator", "; ", "Separator between authors")
}

fn format_authors(view: &RecordView<'_>, params: &ParamValues) -> Result<String, ElementError> {
    let mut authors = scalar_values(view, "100__a");
    authors.extend(scalar_values(view, "700__a"));
    Ok(authors.join(params.get("separator")))
}

fn date_rec() -> CodeElement {
    CodeElement::new(
        "DATE_REC",
        "Date of the entry of the record in the database",
        format_date_rec,
    )
    .with_see_also(["DATE"])
}

fn format_date_rec(view: &RecordView<'_>, _: &ParamValues) -> Result<String, ElementError> {
    Ok(view.field("909C1c"))
}

fn abstract_() -> CodeElement {
    CodeElement::new("ABSTRACT", "Prints the abstract of the record", |view, _| {
        Ok(view.field("520__a"))
    })
}

fn collection() -> CodeElement {
    CodeElement::new(
        "COLLECTION",
        "Prints the collection the record belongs to, translated through \
        the collection knowledge base",
        format_collection,
    )
    .with_param("kb", "dbcollid2coll", "Knowledge base used for translation")
}

fn format_collection(view: &RecordView<'_>, params: &ParamValues) -> Result<String, ElementError> {
    let code = view.field("980__a");
    if code.is_empty() {
        return Ok(code);
    }
    // Untranslatable codes pass through unchanged
    Ok(view.kb(params.get("kb"), &code, &code))
}

fn scalar_values(view: &RecordView<'_>, tag: &str) -> Vec<String> {
    view.fields(tag)
        .into_iter()
        .flat_map(FieldValue::into_values)
        .collect()
}
