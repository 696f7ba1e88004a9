//! In-memory PDF page tools: shrink a document, or reorder and delete its
//! pages and rebuild it. Everything runs on `lopdf`, so the same engine
//! serves the browser (through `wasm-bindgen`) and the `pdf-tools` CLI.

pub mod compress;
pub mod document;
pub mod error;
pub mod images;
pub mod input;
pub mod pages;
pub mod progress;
pub mod quality;
pub mod rebuild;
pub mod session;
pub mod size;
pub mod thumbnail;
pub mod wasm;

pub use compress::{compress_document, compress_upload, CompressOptions, CompressedFile};
pub use error::{PdfToolError, Result};
pub use pages::{PageCollection, PageEntry, PageStats};
pub use progress::{LogProgress, NoProgress, ProgressSink};
pub use quality::QualityTier;
pub use rebuild::rebuild_document;
pub use session::EditorSession;
pub use size::{format_file_size, SavingsReport};
pub use thumbnail::{BlankPageRenderer, Thumbnail, ThumbnailRenderer};
