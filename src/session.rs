//! Editing context for one loaded document.

use crate::document::{load_document, page_ids};
use crate::error::{PdfToolError, Result};
use crate::input::{validate_upload, EDIT_SIZE_LIMIT, EDITED_FILE_NAME};
use crate::pages::{PageCollection, PageStats};
use crate::progress::ProgressSink;
use crate::rebuild::rebuild_document;
use crate::thumbnail::{ThumbnailRenderer, THUMBNAIL_SCALE};

/// Source bytes plus the page state the user is editing.
///
/// Owned by the caller and passed to every command; loading another file
/// means building a new session.
#[derive(Debug, Clone)]
pub struct EditorSession {
    file_name: String,
    source: Vec<u8>,
    pages: PageCollection,
}

impl EditorSession {
    /// Validates the upload, parses it once to count pages and builds a fresh
    /// page collection.
    pub fn load<P>(file_name: &str, mime: &str, source: Vec<u8>, progress: &mut P) -> Result<Self>
    where
        P: ProgressSink + ?Sized,
    {
        validate_upload(mime, source.len() as u64, EDIT_SIZE_LIMIT)?;

        progress.stage("Loading PDF...");
        progress.stage("Loading document...");
        let doc = load_document(&source).map_err(|e| PdfToolError::LoadFailed(e.to_string()))?;
        let page_count = doc.get_pages().len();
        log::info!("Loaded {:?} with {} pages", file_name, page_count);

        Ok(Self {
            file_name: file_name.to_string(),
            source,
            pages: PageCollection::new(page_count),
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn source(&self) -> &[u8] {
        &self.source
    }

    pub fn pages(&self) -> &PageCollection {
        &self.pages
    }

    /// Renders a preview of every source page and attaches it to its entry.
    /// Pages that fail to render keep no thumbnail. Returns how many rendered.
    pub fn render_thumbnails<R, P>(&mut self, renderer: &mut R, progress: &mut P) -> Result<usize>
    where
        R: ThumbnailRenderer + ?Sized,
        P: ProgressSink + ?Sized,
    {
        progress.stage("Rendering pages...");
        let doc =
            load_document(&self.source).map_err(|e| PdfToolError::LoadFailed(e.to_string()))?;
        let ids = page_ids(&doc);
        let total = ids.len();

        let mut rendered = 0;
        for (index, page_id) in ids.into_iter().enumerate() {
            progress.stage(&format!("Rendering page {} of {}...", index + 1, total));
            match renderer.render_page(&doc, page_id, index, THUMBNAIL_SCALE) {
                Ok(thumbnail) => {
                    if self.pages.attach_thumbnail(index, thumbnail) {
                        rendered += 1;
                    }
                }
                Err(e) => log::warn!("Failed to render page {}: {:#}", index + 1, e),
            }
        }
        Ok(rendered)
    }

    pub fn toggle_deleted(&mut self, position: usize) -> Result<bool> {
        self.pages.toggle_deleted(position)
    }

    pub fn swap_positions(&mut self, a: usize, b: usize) -> bool {
        self.pages.swap_positions(a, b)
    }

    pub fn select_all(&mut self) {
        self.pages.select_all();
    }

    pub fn restore_all(&mut self) {
        self.pages.restore_all();
    }

    pub fn stats(&self) -> PageStats {
        self.pages.stats()
    }

    pub fn rebuild<P>(&self, progress: &mut P) -> Result<Vec<u8>>
    where
        P: ProgressSink + ?Sized,
    {
        rebuild_document(&self.source, &self.pages, progress)
    }

    pub fn output_file_name(&self) -> &'static str {
        EDITED_FILE_NAME
    }
}
