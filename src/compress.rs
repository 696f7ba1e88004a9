//! Compression pipeline: optional page shrinking, then an object-stream re-save.

use std::collections::HashSet;

use anyhow::Context;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use crate::document::{
    inherited_attribute, load_document, page_ids, rect_object, rect_values, resolve,
    save_document,
};
use crate::error::{PdfToolError, Result};
use crate::images::recompress_images;
use crate::input::{compressed_file_name, validate_upload, COMPRESS_SIZE_LIMIT};
use crate::progress::ProgressSink;
use crate::quality::QualityTier;
use crate::size::SavingsReport;

/// Page boxes rewritten when a page is scaled.
const PAGE_BOXES: [&[u8]; 5] = [b"MediaBox", b"CropBox", b"BleedBox", b"TrimBox", b"ArtBox"];

/// Boxes a page may inherit from the page tree.
const INHERITABLE_BOXES: [&[u8]; 2] = [b"MediaBox", b"CropBox"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressOptions {
    pub tier: QualityTier,
    /// Re-encode image XObjects as JPEG at the tier's quality. Off by default:
    /// without it the tiers differ only in page geometry.
    pub recompress_images: bool,
    /// Longest image side kept when `recompress_images` is set.
    pub max_image_dim: u32,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            tier: QualityTier::default(),
            recompress_images: false,
            max_image_dim: 1500,
        }
    }
}

impl CompressOptions {
    pub fn with_tier(tier: QualityTier) -> Self {
        Self {
            tier,
            ..Self::default()
        }
    }
}

/// Result of compressing one uploaded file.
#[derive(Debug, Clone)]
pub struct CompressedFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub report: SavingsReport,
}

/// Compresses a PDF held in memory.
///
/// The output may be larger than the input. Any load or save failure is
/// reported as [`PdfToolError::CompressionFailed`]; the cause is logged.
pub fn compress_document<P>(input: &[u8], options: &CompressOptions, progress: &mut P) -> Result<Vec<u8>>
where
    P: ProgressSink + ?Sized,
{
    run_compression(input, options, progress).map_err(|e| {
        log::error!("Compression failed: {:#}", e);
        PdfToolError::CompressionFailed
    })
}

/// Validates an upload, compresses it and names the download.
pub fn compress_upload<P>(
    file_name: &str,
    mime: &str,
    input: &[u8],
    options: &CompressOptions,
    progress: &mut P,
) -> Result<CompressedFile>
where
    P: ProgressSink + ?Sized,
{
    validate_upload(mime, input.len() as u64, COMPRESS_SIZE_LIMIT)?;
    let bytes = compress_document(input, options, progress)?;
    let report = SavingsReport::new(input.len() as u64, bytes.len() as u64);
    Ok(CompressedFile {
        file_name: compressed_file_name(file_name),
        bytes,
        report,
    })
}

fn run_compression<P>(input: &[u8], options: &CompressOptions, progress: &mut P) -> anyhow::Result<Vec<u8>>
where
    P: ProgressSink + ?Sized,
{
    progress.stage("Loading PDF...");
    let mut doc = load_document(input).context("Failed to load PDF")?;

    if options.recompress_images {
        progress.stage("Compressing images in PDF...");
        let rewritten =
            recompress_images(&mut doc, options.tier.jpeg_quality(), options.max_image_dim);
        log::info!("Recompressed {} images", rewritten);
    }

    let pages = page_ids(&doc);
    let total = pages.len();
    let mut scaled_annots = HashSet::new();
    for (i, page_id) in pages.into_iter().enumerate() {
        progress.stage(&format!("Processing page {} of {}...", i + 1, total));
        if let Some(factor) = options.tier.page_scale() {
            scale_page(&mut doc, page_id, factor, &mut scaled_annots)
                .with_context(|| format!("Failed to scale page {}", i + 1))?;
        }
    }

    progress.stage("Saving compressed PDF...");
    let bytes = save_document(&mut doc).context("Failed to save PDF")?;
    progress.stage("Done!");

    log::info!(
        "Compressed {} pages at tier {}: {} -> {} bytes",
        total,
        options.tier,
        input.len(),
        bytes.len()
    );
    Ok(bytes)
}

/// Scales a page's boxes, content and annotation rectangles by `factor`.
///
/// Indirect annotations are recorded in `scaled_annots` so one shared between
/// pages is only scaled once.
pub fn scale_page(
    doc: &mut Document,
    page_id: ObjectId,
    factor: f32,
    scaled_annots: &mut HashSet<ObjectId>,
) -> lopdf::Result<()> {
    let mut boxes = Vec::new();
    for key in PAGE_BOXES {
        let value = if INHERITABLE_BOXES.contains(&key) {
            inherited_attribute(doc, page_id, key)
        } else {
            let page = doc.get_dictionary(page_id)?;
            page.get(key)
                .ok()
                .and_then(|v| resolve(doc, v).cloned())
        };
        if let Some(rect) = value.as_ref().and_then(rect_values) {
            boxes.push((key, rect.map(|v| v * factor)));
        }
    }

    let existing_contents = match doc.get_dictionary(page_id)?.get(b"Contents") {
        Ok(Object::Array(items)) => items.clone(),
        Ok(reference @ Object::Reference(_)) => vec![reference.clone()],
        _ => Vec::new(),
    };
    let open = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    Object::Real(factor),
                    0.into(),
                    0.into(),
                    Object::Real(factor),
                    0.into(),
                    0.into(),
                ],
            ),
        ],
    };
    let close = Content {
        operations: vec![Operation::new("Q", vec![])],
    };
    // Content streams are concatenated when read; keep operators apart.
    let mut open_bytes = open.encode()?;
    open_bytes.push(b'\n');
    let mut close_bytes = vec![b'\n'];
    close_bytes.extend(close.encode()?);
    let open_id = doc.add_object(Stream::new(Dictionary::new(), open_bytes));
    let close_id = doc.add_object(Stream::new(Dictionary::new(), close_bytes));

    let mut contents = Vec::with_capacity(existing_contents.len() + 2);
    contents.push(Object::Reference(open_id));
    contents.extend(existing_contents);
    contents.push(Object::Reference(close_id));

    let page = doc.get_dictionary_mut(page_id)?;
    for (key, rect) in boxes {
        page.set(key.to_vec(), rect_object(rect));
    }
    page.set("Contents", Object::Array(contents));

    scale_annotations(doc, page_id, factor, scaled_annots)
}

fn scale_annotations(
    doc: &mut Document,
    page_id: ObjectId,
    factor: f32,
    scaled_annots: &mut HashSet<ObjectId>,
) -> lopdf::Result<()> {
    let annots = match doc.get_dictionary(page_id)?.get(b"Annots") {
        Ok(Object::Array(items)) => items.clone(),
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => return Ok(()),
        },
        _ => return Ok(()),
    };

    let mut inline_changed = false;
    let mut rewritten = Vec::with_capacity(annots.len());
    for annot in annots {
        match annot {
            Object::Reference(id) => {
                if scaled_annots.insert(id) {
                    if let Ok(dict) = doc.get_dictionary_mut(id) {
                        scale_rect_entry(dict, factor);
                    }
                }
                rewritten.push(Object::Reference(id));
            }
            Object::Dictionary(mut dict) => {
                scale_rect_entry(&mut dict, factor);
                inline_changed = true;
                rewritten.push(Object::Dictionary(dict));
            }
            other => rewritten.push(other),
        }
    }

    if inline_changed {
        doc.get_dictionary_mut(page_id)?
            .set("Annots", Object::Array(rewritten));
    }
    Ok(())
}

fn scale_rect_entry(dict: &mut Dictionary, factor: f32) {
    if let Some(rect) = dict.get(b"Rect").ok().and_then(rect_values) {
        dict.set("Rect", rect_object(rect.map(|v| v * factor)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::fixtures::{create_test_pdf, page_widths};
    use crate::document::page_size;
    use crate::progress::NoProgress;

    fn page_heights(bytes: &[u8]) -> Vec<f32> {
        let doc = Document::load_mem(bytes).unwrap();
        page_ids(&doc)
            .into_iter()
            .map(|id| page_size(&doc, id).unwrap().1)
            .collect()
    }

    #[test]
    fn test_low_tier_scales_pages() {
        let input = create_test_pdf(2);
        let options = CompressOptions::with_tier(QualityTier::Low);
        let output = compress_document(&input, &options, &mut NoProgress).unwrap();

        assert_eq!(page_widths(&output), vec![75, 83]);
        assert_eq!(page_heights(&output), vec![150.0, 150.0]);
    }

    #[test]
    fn test_medium_and_high_keep_geometry() {
        let input = create_test_pdf(2);
        for tier in [QualityTier::Medium, QualityTier::High] {
            let output =
                compress_document(&input, &CompressOptions::with_tier(tier), &mut NoProgress)
                    .unwrap();
            assert_eq!(page_widths(&output), vec![100, 110]);
            assert_eq!(page_heights(&output), vec![200.0, 200.0]);
        }
    }

    #[test]
    fn test_scaled_content_is_wrapped() {
        let mut doc = Document::load_mem(&create_test_pdf(1)).unwrap();
        let page_id = page_ids(&doc)[0];
        scale_page(&mut doc, page_id, 0.5, &mut HashSet::new()).unwrap();

        let content = doc.get_page_content(page_id).unwrap();
        let ops = Content::decode(&content).unwrap().operations;
        assert_eq!(ops.first().unwrap().operator, "q");
        assert_eq!(ops[1].operator, "cm");
        assert_eq!(ops.last().unwrap().operator, "Q");
        assert!(ops.iter().any(|op| op.operator == "Tj"));
    }

    #[test]
    fn test_annotation_rects_are_scaled() {
        let mut doc = Document::load_mem(&create_test_pdf(1)).unwrap();
        let page_id = page_ids(&doc)[0];
        let annot_id = doc.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Annot".to_vec())),
            ("Subtype", Object::Name(b"Link".to_vec())),
            (
                "Rect",
                Object::Array(vec![10.into(), 20.into(), 30.into(), 40.into()]),
            ),
        ]));
        doc.get_dictionary_mut(page_id)
            .unwrap()
            .set("Annots", Object::Array(vec![Object::Reference(annot_id)]));

        scale_page(&mut doc, page_id, 0.5, &mut HashSet::new()).unwrap();

        let rect = doc.get_dictionary(annot_id).unwrap().get(b"Rect").unwrap();
        assert_eq!(rect_values(rect), Some([5.0, 10.0, 15.0, 20.0]));
    }

    #[test]
    fn test_shared_annotation_scaled_once() {
        let mut doc = Document::load_mem(&create_test_pdf(2)).unwrap();
        let pages = page_ids(&doc);
        let annot_id = doc.add_object(Dictionary::from_iter(vec![
            ("Subtype", Object::Name(b"Link".to_vec())),
            (
                "Rect",
                Object::Array(vec![0.into(), 0.into(), 40.into(), 80.into()]),
            ),
        ]));
        for page_id in &pages {
            doc.get_dictionary_mut(*page_id)
                .unwrap()
                .set("Annots", Object::Array(vec![Object::Reference(annot_id)]));
        }

        let mut scaled = HashSet::new();
        for page_id in pages {
            scale_page(&mut doc, page_id, 0.5, &mut scaled).unwrap();
        }

        let rect = doc.get_dictionary(annot_id).unwrap().get(b"Rect").unwrap();
        assert_eq!(rect_values(rect), Some([0.0, 0.0, 20.0, 40.0]));
    }

    #[test]
    fn test_low_tier_content_applies_transform() {
        let output = compress_document(
            &create_test_pdf(1),
            &CompressOptions::with_tier(QualityTier::Low),
            &mut NoProgress,
        )
        .unwrap();
        let doc = Document::load_mem(&output).unwrap();
        let page_id = page_ids(&doc)[0];
        let content = doc.get_page_content(page_id).unwrap();
        let ops: Vec<String> = Content::decode(&content)
            .unwrap()
            .operations
            .into_iter()
            .map(|op| op.operator)
            .collect();
        assert_eq!(ops, vec!["q", "cm", "BT", "Tf", "Td", "Tj", "ET", "Q"]);
    }

    #[test]
    fn test_invalid_input_reports_compression_failed() {
        let result = compress_document(b"not a pdf", &CompressOptions::default(), &mut NoProgress);
        let err = result.unwrap_err();
        assert!(matches!(err, PdfToolError::CompressionFailed));
        assert_eq!(err.to_string(), "Could not compress the PDF. Try another file.");
    }

    #[test]
    fn test_progress_labels() {
        let input = create_test_pdf(2);
        let mut labels = Vec::new();
        compress_document(
            &input,
            &CompressOptions::default(),
            &mut |label: &str| labels.push(label.to_string()),
        )
        .unwrap();
        assert_eq!(
            labels,
            vec![
                "Loading PDF...",
                "Processing page 1 of 2...",
                "Processing page 2 of 2...",
                "Saving compressed PDF...",
                "Done!",
            ]
        );
    }

    #[test]
    fn test_compress_upload_names_and_reports() {
        let input = create_test_pdf(1);
        let result = compress_upload(
            "scan.pdf",
            "application/pdf",
            &input,
            &CompressOptions::default(),
            &mut NoProgress,
        )
        .unwrap();
        assert_eq!(result.file_name, "compressed_scan.pdf");
        assert_eq!(result.report.original, input.len() as u64);
        assert_eq!(result.report.compressed, result.bytes.len() as u64);

        let rejected = compress_upload(
            "notes.txt",
            "text/plain",
            &input,
            &CompressOptions::default(),
            &mut NoProgress,
        );
        assert!(matches!(rejected, Err(PdfToolError::InvalidFileType)));
    }
}
