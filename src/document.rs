//! Thin helpers over `lopdf` shared by both pipelines.

use lopdf::{Document, Object, ObjectId, SaveOptions};

/// Upper bound on objects packed into one object stream when saving.
pub const OBJECTS_PER_STREAM: usize = 50;

/// Walks at most this many `/Parent` links when resolving inherited attributes.
const MAX_INHERITANCE_DEPTH: usize = 32;

/// Loads a document from memory, trying the empty password on encrypted files.
pub fn load_document(bytes: &[u8]) -> lopdf::Result<Document> {
    let mut doc = Document::load_mem(bytes)?;

    if doc.is_encrypted() {
        log::debug!("PDF is encrypted, trying the empty password");
        if let Err(e) = doc.decrypt("") {
            // Unencrypted parts are still usable; later steps fail on their own if not.
            log::warn!("Failed to decrypt with empty password: {:?}", e);
        }
    }

    Ok(doc)
}

/// Serializes `doc` with object streams and a cross-reference stream.
pub fn save_document(doc: &mut Document) -> lopdf::Result<Vec<u8>> {
    // Object streams need PDF 1.5.
    if doc.version.as_str() < "1.5" {
        doc.version = "1.5".to_string();
    }

    let options = SaveOptions::builder()
        .use_object_streams(true)
        .use_xref_streams(true)
        .max_objects_per_stream(OBJECTS_PER_STREAM)
        .build();

    let mut buffer = Vec::new();
    doc.save_with_options(&mut buffer, options)?;
    Ok(buffer)
}

pub fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// Looks `key` up on the page, then on its ancestors in the page tree.
pub fn inherited_attribute(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut node = doc.get_dictionary(page_id).ok()?;

    for _ in 0..MAX_INHERITANCE_DEPTH {
        if let Ok(value) = node.get(key) {
            return resolve(doc, value).cloned();
        }
        let parent_id = node.get(b"Parent").and_then(Object::as_reference).ok()?;
        node = doc.get_dictionary(parent_id).ok()?;
    }

    None
}

pub fn rect_values(object: &Object) -> Option<[f32; 4]> {
    let array = object.as_array().ok()?;
    if array.len() != 4 {
        return None;
    }
    let mut rect = [0.0; 4];
    for (slot, value) in rect.iter_mut().zip(array) {
        *slot = value.as_float().ok()?;
    }
    Some(rect)
}

pub fn rect_object(rect: [f32; 4]) -> Object {
    Object::Array(rect.iter().map(|v| Object::Real(*v)).collect())
}

/// Page width and height in points, taken from the (possibly inherited) `MediaBox`.
pub fn page_size(doc: &Document, page_id: ObjectId) -> Option<(f32, f32)> {
    let media_box = inherited_attribute(doc, page_id, b"MediaBox")?;
    let [x0, y0, x1, y1] = rect_values(&media_box)?;
    Some(((x1 - x0).abs(), (y1 - y0).abs()))
}

pub fn page_ids(doc: &Document) -> Vec<ObjectId> {
    doc.get_pages().into_values().collect()
}


#[cfg(test)]
mod tests {
    use super::fixtures::create_test_pdf;
    use super::*;

    #[test]
    fn test_inherited_resources_found_on_parent() {
        let doc = Document::load_mem(&create_test_pdf(2)).unwrap();
        let first = page_ids(&doc)[0];
        let resources = inherited_attribute(&doc, first, b"Resources").unwrap();
        assert!(resources.as_dict().unwrap().has(b"Font"));
        assert!(inherited_attribute(&doc, first, b"Rotate").is_none());
    }

    #[test]
    fn test_page_size_reads_media_box() {
        let doc = Document::load_mem(&create_test_pdf(3)).unwrap();
        let sizes: Vec<_> = page_ids(&doc)
            .into_iter()
            .map(|id| page_size(&doc, id).unwrap())
            .collect();
        assert_eq!(sizes, vec![(100.0, 200.0), (110.0, 200.0), (120.0, 200.0)]);
    }

    #[test]
    fn test_save_uses_object_streams() {
        let mut doc = Document::load_mem(&create_test_pdf(3)).unwrap();
        let bytes = save_document(&mut doc).unwrap();
        let needle = b"/ObjStm";
        assert!(bytes.windows(needle.len()).any(|w| w == needle));

        let reloaded = Document::load_mem(&bytes).unwrap();
        assert_eq!(reloaded.get_pages().len(), 3);
    }

    #[test]
    fn test_rect_values_rejects_short_arrays() {
        assert_eq!(
            rect_values(&Object::Array(vec![0.into(), 1.into()])),
            None
        );
        assert_eq!(
            rect_values(&rect_object([0.0, 0.0, 10.0, 20.0])),
            Some([0.0, 0.0, 10.0, 20.0])
        );
    }
}
