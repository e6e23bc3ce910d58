//! Merge tool
//!
//! Concatenates documents in the order given. Object ids of each appended
//! document are shifted past the destination's highest id, then its pages
//! are re-parented under the destination page tree. Attributes a page
//! inherits from its old tree are copied onto the page first.

use crate::error::EditError;
use crate::geometry::inherited_attribute;
use lopdf::{Document, Object, ObjectId};

pub const MERGED_FILENAME: &str = "merged_document.pdf";

/// Page attributes that may live on an ancestor `Pages` node
const INHERITABLE: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// Merge two or more PDFs. `progress(done, total)` fires after each input.
pub fn merge_documents<F>(inputs: &[Vec<u8>], mut progress: F) -> Result<Vec<u8>, EditError>
where
    F: FnMut(usize, usize),
{
    if inputs.len() < 2 {
        return Err(EditError::Operation(format!(
            "At least two documents are needed to merge, got {}",
            inputs.len()
        )));
    }
    let total = inputs.len();

    let mut dest = load_input(&inputs[0], 0)?;
    pin_inherited_attributes(&mut dest);
    let mut kids: Vec<ObjectId> = dest.get_pages().into_values().collect();
    progress(1, total);

    for (index, bytes) in inputs.iter().enumerate().skip(1) {
        let mut source = load_input(bytes, index)?;
        pin_inherited_attributes(&mut source);
        let offset = dest.max_id;
        let source_pages: Vec<ObjectId> = source.get_pages().into_values().collect();

        for (id, object) in source.objects {
            dest.objects.insert(shift(id, offset), shift_refs(object, offset));
        }
        kids.extend(source_pages.into_iter().map(|id| shift(id, offset)));
        dest.max_id = dest.max_id.max(source.max_id + offset);

        tracing::debug!("Appended document {} of {}", index + 1, total);
        progress(index + 1, total);
    }

    rebuild_page_tree(&mut dest, &kids)?;
    dest.prune_objects();
    dest.compress();

    let mut buffer = Vec::new();
    dest.save_to(&mut buffer)
        .map_err(|e| EditError::Operation(format!("Failed to save merged PDF: {}", e)))?;

    tracing::info!("Merged {} documents into {} pages", total, kids.len());
    Ok(buffer)
}

fn load_input(bytes: &[u8], index: usize) -> Result<Document, EditError> {
    Document::load_mem(bytes)
        .map_err(|e| EditError::DocumentLoad(format!("Document {}: {}", index + 1, e)))
}

/// Copy inherited attributes down onto every page so they survive re-parenting.
fn pin_inherited_attributes(doc: &mut Document) {
    let mut pinned = Vec::new();
    for page_id in doc.get_pages().into_values() {
        let Ok(page) = doc.get_dictionary(page_id) else {
            continue;
        };
        for key in INHERITABLE {
            if page.has(key) {
                continue;
            }
            if let Some(value) = inherited_attribute(doc, page_id, key) {
                pinned.push((page_id, key, value.clone()));
            }
        }
    }

    for (page_id, key, value) in pinned {
        if let Ok(page) = doc.get_dictionary_mut(page_id) {
            page.set(key, value);
        }
    }
}

fn shift(id: ObjectId, offset: u32) -> ObjectId {
    (id.0 + offset, id.1)
}

fn shift_refs(object: Object, offset: u32) -> Object {
    match object {
        Object::Reference(id) => Object::Reference(shift(id, offset)),
        Object::Array(items) => Object::Array(items.into_iter().map(|o| shift_refs(o, offset)).collect()),
        Object::Dictionary(mut dict) => {
            for (_, value) in dict.iter_mut() {
                *value = shift_refs(std::mem::replace(value, Object::Null), offset);
            }
            Object::Dictionary(dict)
        }
        Object::Stream(mut stream) => {
            for (_, value) in stream.dict.iter_mut() {
                *value = shift_refs(std::mem::replace(value, Object::Null), offset);
            }
            Object::Stream(stream)
        }
        other => other,
    }
}

/// Point the destination's root Pages node at `kids` and re-parent each page.
fn rebuild_page_tree(doc: &mut Document, kids: &[ObjectId]) -> Result<(), EditError> {
    let pages_id = doc
        .catalog()
        .and_then(|catalog| catalog.get(b"Pages"))
        .and_then(Object::as_reference)
        .map_err(|e| EditError::Operation(format!("Destination has no page tree: {}", e)))?;

    for &page_id in kids {
        if let Ok(page) = doc.get_dictionary_mut(page_id) {
            page.set("Parent", pages_id);
        }
    }

    let pages = doc
        .get_dictionary_mut(pages_id)
        .map_err(|e| EditError::Operation(format!("Invalid Pages dictionary: {}", e)))?;
    pages.set(
        "Kids",
        kids.iter().map(|&id| Object::Reference(id)).collect::<Vec<_>>(),
    );
    pages.set("Count", kids.len() as i64);
    Ok(())
}
