use thiserror::Error;

#[derive(Error, Debug)]
pub enum PdfToolError {
    #[error("Please select a PDF file")]
    InvalidFileType,

    #[error("File is {size} bytes, the limit is {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("Failed to load PDF: {0}")]
    LoadFailed(String),

    #[error("Could not compress the PDF. Try another file.")]
    CompressionFailed,

    #[error("Failed to save PDF: {0}")]
    RebuildFailed(String),

    #[error("Cannot save an empty PDF. Restore at least one page.")]
    EmptyResultRejected,

    #[error("No page at position {position}")]
    EntryNotFound { position: usize },
}

pub type Result<T> = std::result::Result<T, PdfToolError>;
