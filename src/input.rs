//! Upload checks and download names.

use crate::error::{PdfToolError, Result};

pub const PDF_MIME: &str = "application/pdf";

/// Ceiling for files handed to the compression pipeline.
pub const COMPRESS_SIZE_LIMIT: u64 = 100 * 1024 * 1024;

/// Ceiling for files opened in the page editor.
pub const EDIT_SIZE_LIMIT: u64 = 50 * 1024 * 1024;

pub const EDITED_FILE_NAME: &str = "edited.pdf";

/// Guesses the MIME type of an upload from its name, then its magic bytes.
pub fn detect_mime(file_name: Option<&str>, bytes: &[u8]) -> &'static str {
    let by_extension = file_name
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);

    if by_extension || bytes.starts_with(b"%PDF-") {
        PDF_MIME
    } else {
        "application/octet-stream"
    }
}

/// Rejects non-PDF uploads and files over `limit` before any pipeline runs.
pub fn validate_upload(mime: &str, size: u64, limit: u64) -> Result<()> {
    if mime != PDF_MIME {
        return Err(PdfToolError::InvalidFileType);
    }
    if size > limit {
        return Err(PdfToolError::FileTooLarge { size, limit });
    }
    Ok(())
}

pub fn compressed_file_name(original: &str) -> String {
    format!("compressed_{}", original)
}
