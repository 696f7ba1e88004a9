//! Rebuilds a document from the pages that survived editing.
//!
//! Pages are copied one by one into a fresh document in output order. Objects
//! they reference are copied once per rebuild, so resources shared between
//! pages stay shared.

use std::collections::{BTreeMap, HashSet};

use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::document::{inherited_attribute, load_document, page_ids, save_document};
use crate::error::{PdfToolError, Result};
use crate::pages::PageCollection;
use crate::progress::ProgressSink;

const INHERITABLE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Produces a new PDF holding the non-deleted pages of `source` in position order.
pub fn rebuild_document<P>(source: &[u8], pages: &PageCollection, progress: &mut P) -> Result<Vec<u8>>
where
    P: ProgressSink + ?Sized,
{
    let order = pages.surviving_original_indices();
    if order.is_empty() {
        return Err(PdfToolError::EmptyResultRejected);
    }

    progress.stage("Creating new PDF...");
    let original = load_document(source).map_err(|e| PdfToolError::RebuildFailed(e.to_string()))?;
    let mut doc = extract_pages(&original, &order, progress)?;

    progress.stage("Saving PDF...");
    let bytes = save_document(&mut doc).map_err(|e| PdfToolError::RebuildFailed(e.to_string()))?;

    let stats = pages.stats();
    log::info!(
        "Rebuilt PDF with {} of {} pages ({} bytes)",
        stats.remaining,
        stats.total,
        bytes.len()
    );
    Ok(bytes)
}

/// Copies pages `order` (0-based source indices) of `original` into a new document.
pub fn extract_pages<P>(original: &Document, order: &[usize], progress: &mut P) -> Result<Document>
where
    P: ProgressSink + ?Sized,
{
    let source_pages = page_ids(original);
    let mut selected = Vec::with_capacity(order.len());
    for &index in order {
        let page_id = source_pages.get(index).copied().ok_or_else(|| {
            PdfToolError::RebuildFailed(format!(
                "Page {} does not exist (document has {} pages)",
                index + 1,
                source_pages.len()
            ))
        })?;
        selected.push(page_id);
    }

    let mut doc = Document::with_version(original.version.clone());
    let pages_id = doc.new_object_id();
    let mut copier = PageCopier::new(original, &mut doc, &source_pages, &selected);

    let mut kids = Vec::with_capacity(selected.len());
    for (k, page_id) in selected.iter().enumerate() {
        progress.stage(&format!("Copying page {} of {}...", k + 1, selected.len()));
        kids.push(Object::Reference(copier.copy_page(*page_id, pages_id)?));
    }

    let pages = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Count", Object::Integer(kids.len() as i64)),
        ("Kids", Object::Array(kids)),
    ]);
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    Ok(doc)
}

struct PageCopier<'a> {
    source: &'a Document,
    target: &'a mut Document,
    /// Source id -> target id for everything copied so far.
    copied: BTreeMap<ObjectId, ObjectId>,
    /// Every page of the source; references to ones not being copied become null.
    source_pages: HashSet<ObjectId>,
}

impl<'a> PageCopier<'a> {
    fn new(
        source: &'a Document,
        target: &'a mut Document,
        all_pages: &[ObjectId],
        selected: &[ObjectId],
    ) -> Self {
        let mut copied = BTreeMap::new();
        // Reserve target ids up front so annotations pointing at another kept
        // page resolve to its copy.
        for page_id in selected {
            copied
                .entry(*page_id)
                .or_insert_with(|| target.new_object_id());
        }
        Self {
            source,
            target,
            copied,
            source_pages: all_pages.iter().copied().collect(),
        }
    }

    fn copy_page(&mut self, page_id: ObjectId, parent_id: ObjectId) -> Result<ObjectId> {
        let mut page = self
            .source
            .get_dictionary(page_id)
            .map_err(|e| PdfToolError::RebuildFailed(format!("Page {:?}: {}", page_id, e)))?
            .clone();

        for key in INHERITABLE_KEYS {
            if !page.has(key) {
                if let Some(value) = inherited_attribute(self.source, page_id, key) {
                    page.set(key.to_vec(), value);
                }
            }
        }
        page.remove(b"Parent");
        // Article beads chain to other pages and threads.
        page.remove(b"B");

        let mut page = self.copy_dictionary(&page);
        page.set("Parent", Object::Reference(parent_id));

        let target_id = match self.copied.get(&page_id) {
            Some(id) => *id,
            None => self.target.new_object_id(),
        };
        self.target.objects.insert(target_id, Object::Dictionary(page));
        Ok(target_id)
    }

    fn copy_dictionary(&mut self, dict: &Dictionary) -> Dictionary {
        let mut copy = Dictionary::new();
        for (key, value) in dict.iter() {
            copy.set(key.clone(), self.copy_object(value));
        }
        copy
    }

    fn copy_object(&mut self, object: &Object) -> Object {
        match object {
            Object::Reference(id) => self
                .copy_reference(*id)
                .map(Object::Reference)
                .unwrap_or(Object::Null),
            Object::Array(items) => {
                Object::Array(items.iter().map(|item| self.copy_object(item)).collect())
            }
            Object::Dictionary(dict) => Object::Dictionary(self.copy_dictionary(dict)),
            Object::Stream(stream) => {
                let mut copy = stream.clone();
                copy.dict = self.copy_dictionary(&stream.dict);
                Object::Stream(copy)
            }
            other => other.clone(),
        }
    }

    /// Target id for a source reference, copying the object on first sight.
    /// Returns `None` for dangling references and pages left out of the output.
    fn copy_reference(&mut self, id: ObjectId) -> Option<ObjectId> {
        if let Some(target_id) = self.copied.get(&id) {
            return Some(*target_id);
        }
        if self.source_pages.contains(&id) {
            return None;
        }
        let source = self.source;
        let object = source.get_object(id).ok()?;

        let target_id = self.target.new_object_id();
        // Register before recursing so cycles terminate.
        self.copied.insert(id, target_id);
        let copy = self.copy_object(object);
        self.target.objects.insert(target_id, copy);
        Some(target_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::fixtures::{create_test_pdf, page_widths};
    use crate::progress::NoProgress;

    fn count_fonts(bytes: &[u8]) -> usize {
        let doc = Document::load_mem(bytes).unwrap();
        doc.objects
            .values()
            .filter(|o| o.type_name().map(|t| t == b"Font").unwrap_or(false))
            .count()
    }

    #[test]
    fn test_delete_and_swap_scenario() {
        let source = create_test_pdf(3);
        let mut pages = PageCollection::new(3);
        pages.toggle_deleted(1).unwrap();
        pages.swap_positions(0, 2);

        let output = rebuild_document(&source, &pages, &mut NoProgress).unwrap();
        // Source page i is 100 + 10 * i wide.
        assert_eq!(page_widths(&output), vec![120, 100]);
    }

    #[test]
    fn test_output_page_count_matches_remaining() {
        let source = create_test_pdf(5);
        let mut pages = PageCollection::new(5);
        pages.toggle_deleted(0).unwrap();
        pages.toggle_deleted(3).unwrap();

        let output = rebuild_document(&source, &pages, &mut NoProgress).unwrap();
        let doc = Document::load_mem(&output).unwrap();
        assert_eq!(doc.get_pages().len(), pages.stats().remaining);
        assert_eq!(page_widths(&output), vec![110, 120, 140]);
    }

    #[test]
    fn test_empty_result_rejected_before_loading() {
        let mut pages = PageCollection::new(2);
        pages.select_all();
        // Source bytes are never parsed when nothing survives.
        let result = rebuild_document(b"garbage", &pages, &mut NoProgress);
        assert!(matches!(result, Err(PdfToolError::EmptyResultRejected)));
    }

    #[test]
    fn test_unloadable_source_is_rebuild_failed() {
        let pages = PageCollection::new(1);
        let result = rebuild_document(b"garbage", &pages, &mut NoProgress);
        assert!(matches!(result, Err(PdfToolError::RebuildFailed(_))));
    }

    #[test]
    fn test_inherited_resources_are_materialized_and_shared() {
        let source = create_test_pdf(3);
        let pages = PageCollection::new(3);
        let output = rebuild_document(&source, &pages, &mut NoProgress).unwrap();

        let doc = Document::load_mem(&output).unwrap();
        for page_id in page_ids(&doc) {
            let page = doc.get_dictionary(page_id).unwrap();
            assert!(page.has(b"Resources"));
        }
        assert_eq!(count_fonts(&output), 1);
    }

    #[test]
    fn test_links_to_dropped_pages_become_null() {
        let source = create_test_pdf(2);
        let mut original = Document::load_mem(&source).unwrap();
        let ids = page_ids(&original);
        let link = original.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Annot".to_vec())),
            ("Subtype", Object::Name(b"Link".to_vec())),
            ("Dest", Object::Array(vec![Object::Reference(ids[1]), "Fit".into()])),
        ]));
        original
            .get_dictionary_mut(ids[0])
            .unwrap()
            .set("Annots", Object::Array(vec![Object::Reference(link)]));

        let doc = extract_pages(&original, &[0], &mut NoProgress).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
        let pages_in_output = doc
            .objects
            .values()
            .filter(|o| o.type_name().map(|t| t == b"Page").unwrap_or(false))
            .count();
        assert_eq!(pages_in_output, 1);
    }

    #[test]
    fn test_progress_reports_each_copied_page() {
        let source = create_test_pdf(3);
        let mut pages = PageCollection::new(3);
        pages.toggle_deleted(2).unwrap();
        let mut labels = Vec::new();
        rebuild_document(&source, &pages, &mut |label: &str| {
            labels.push(label.to_string())
        })
        .unwrap();
        assert_eq!(
            labels,
            vec![
                "Creating new PDF...",
                "Copying page 1 of 2...",
                "Copying page 2 of 2...",
                "Saving PDF...",
            ]
        );
    }
}
