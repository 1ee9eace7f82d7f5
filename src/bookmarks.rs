//! PDF outline (bookmarks) for rendered reports, built on top of `lopdf`.
//!
//! `genpdf` cannot emit outlines, so the rendered bytes are parsed again and an `/Outlines`
//! tree is attached to the catalog with one entry per titled section.

use std::collections::BTreeMap;

use lopdf::{Dictionary, Document, Object, ObjectId};
use thiserror::Error;

use crate::model::Section;

/// Errors that can occur while embedding bookmarks into a rendered PDF document.
#[derive(Debug, Error)]
pub enum BookmarkError {
    /// The PDF bytes could not be parsed or written by `lopdf`.
    #[error("failed to process PDF bytes: {0}")]
    Pdf(#[from] lopdf::Error),
    /// Writing the updated document failed.
    #[error("failed to write PDF bytes: {0}")]
    Io(#[from] std::io::Error),
    /// The trailer has no usable `/Root` reference.
    #[error("PDF catalog entry is missing")]
    MissingCatalog,
    /// The catalog object was not a dictionary.
    #[error("PDF catalog entry is not a dictionary")]
    InvalidCatalog,
    /// A section refers to a page the document does not have.
    #[error("section {section_index} refers to missing page {page_number}")]
    MissingPage {
        /// Index of the section whose page reference is missing.
        section_index: usize,
        /// The requested (1-indexed) page number.
        page_number: usize,
    },
}

/// Adds a flat outline mapping every titled section to its starting page.
///
/// Sections without a title or without a recorded page are skipped. When nothing qualifies the
/// input bytes are returned unchanged.
pub fn apply_section_bookmarks(
    pdf_bytes: &[u8],
    sections: &[Section],
    section_pages: &[Option<usize>],
) -> Result<Vec<u8>, BookmarkError> {
    let mut document = Document::load_mem(pdf_bytes)?;

    let pages = document.get_pages();
    let entries = collect_outline_entries(&mut document, sections, section_pages, &pages)?;
    if entries.is_empty() {
        return Ok(pdf_bytes.to_vec());
    }

    let outlines_id = document.new_object_id();
    link_outline_entries(outlines_id, &mut document, &entries);
    insert_outlines_root(outlines_id, &mut document, &entries)?;

    let mut buffer = Vec::new();
    document.save_to(&mut buffer)?;
    Ok(buffer)
}

struct OutlineEntry {
    object_id: ObjectId,
    page_ref: ObjectId,
    title: String,
    name: Option<String>,
}

fn collect_outline_entries(
    document: &mut Document,
    sections: &[Section],
    section_pages: &[Option<usize>],
    pages: &BTreeMap<u32, ObjectId>,
) -> Result<Vec<OutlineEntry>, BookmarkError> {
    let mut entries = Vec::new();

    for (index, (section, page)) in sections.iter().zip(section_pages).enumerate() {
        let (Some(title), Some(page_number)) = (section.title(), *page) else {
            continue;
        };
        let page_ref = u32::try_from(page_number)
            .ok()
            .and_then(|number| pages.get(&number).copied())
            .ok_or(BookmarkError::MissingPage {
                section_index: index,
                page_number,
            })?;

        entries.push(OutlineEntry {
            object_id: document.new_object_id(),
            page_ref,
            title: title.to_string(),
            name: section.identifier().map(str::to_string),
        });
    }

    Ok(entries)
}

fn link_outline_entries(outlines_id: ObjectId, document: &mut Document, entries: &[OutlineEntry]) {
    for (index, entry) in entries.iter().enumerate() {
        let mut dictionary = Dictionary::new();
        dictionary.set("Title", Object::string_literal(entry.title.as_str()));
        dictionary.set(
            "Dest",
            Object::Array(vec![
                Object::Reference(entry.page_ref),
                Object::Name("Fit".into()),
            ]),
        );
        dictionary.set("Parent", Object::Reference(outlines_id));

        if let Some(name) = &entry.name {
            dictionary.set("NM", Object::string_literal(name.as_str()));
        }
        if let Some(previous) = index.checked_sub(1).and_then(|i| entries.get(i)) {
            dictionary.set("Prev", Object::Reference(previous.object_id));
        }
        if let Some(next) = entries.get(index + 1) {
            dictionary.set("Next", Object::Reference(next.object_id));
        }

        document
            .objects
            .insert(entry.object_id, Object::Dictionary(dictionary));
    }
}

fn insert_outlines_root(
    outlines_id: ObjectId,
    document: &mut Document,
    entries: &[OutlineEntry],
) -> Result<(), BookmarkError> {
    let catalog_id = document
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(|_| BookmarkError::MissingCatalog)?;

    let mut dictionary = Dictionary::new();
    dictionary.set("Type", Object::Name("Outlines".into()));
    dictionary.set("Count", Object::Integer(entries.len() as i64));
    if let Some(first) = entries.first() {
        dictionary.set("First", Object::Reference(first.object_id));
    }
    if let Some(last) = entries.last() {
        dictionary.set("Last", Object::Reference(last.object_id));
    }
    document
        .objects
        .insert(outlines_id, Object::Dictionary(dictionary));

    document
        .objects
        .get_mut(&catalog_id)
        .ok_or(BookmarkError::MissingCatalog)?
        .as_dict_mut()
        .map_err(|_| BookmarkError::InvalidCatalog)?
        .set("Outlines", Object::Reference(outlines_id));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    fn two_page_pdf() -> Vec<u8> {
        let mut document = Document::with_version("1.5");
        let pages_id = document.new_object_id();
        let kids: Vec<Object> = (0..2)
            .map(|_| {
                document
                    .add_object(dictionary! {
                        "Type" => "Page",
                        "Parent" => pages_id,
                        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
                    })
                    .into()
            })
            .collect();
        document.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => 2,
            }),
        );
        let catalog_id = document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        document.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        document.save_to(&mut bytes).unwrap();
        bytes
    }

    fn outline_titles(bytes: &[u8]) -> Vec<String> {
        let document = Document::load_mem(bytes).unwrap();
        let catalog = document.catalog().unwrap();
        let outlines = document
            .get_dictionary(catalog.get(b"Outlines").unwrap().as_reference().unwrap())
            .unwrap();
        let mut titles = Vec::new();
        let mut current = outlines.get(b"First").and_then(Object::as_reference).ok();
        while let Some(id) = current {
            let entry = document.get_dictionary(id).unwrap();
            let title = entry.get(b"Title").unwrap().as_str().unwrap();
            titles.push(String::from_utf8_lossy(title).into_owned());
            current = entry.get(b"Next").and_then(Object::as_reference).ok();
        }
        titles
    }

    #[test]
    fn titled_sections_become_outline_entries() {
        let sections = [
            Section::untitled(),
            Section::new("Chief Complaint"),
            Section::new("Consultation Note"),
        ];
        let bytes = apply_section_bookmarks(
            &two_page_pdf(),
            &sections,
            &[Some(1), Some(1), Some(2)],
        )
        .unwrap();

        assert_eq!(
            outline_titles(&bytes),
            vec!["Chief Complaint".to_string(), "Consultation Note".to_string()]
        );
    }

    #[test]
    fn nothing_to_bookmark_returns_input() {
        let input = two_page_pdf();
        let output = apply_section_bookmarks(&input, &[Section::new("Note")], &[None]).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn missing_page_is_an_error() {
        let err = apply_section_bookmarks(&two_page_pdf(), &[Section::new("Note")], &[Some(9)])
            .unwrap_err();
        assert!(matches!(
            err,
            BookmarkError::MissingPage {
                section_index: 0,
                page_number: 9
            }
        ));
    }
}
