//! Browser bindings. The page glue calls these and keeps one pipeline in
//! flight at a time.

use js_sys::Function;
use wasm_bindgen::prelude::*;

use crate::compress::{compress_document, CompressOptions};
use crate::input::detect_mime;
use crate::progress::ProgressSink;
use crate::quality::QualityTier;
use crate::session::EditorSession;
use crate::size::SavingsReport;

/// Routes `log` records to the browser console, where no other logger exists.
struct ConsoleLogger;

static CONSOLE_LOGGER: ConsoleLogger = ConsoleLogger;

impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = JsValue::from_str(&console_line(record));
        match record.level() {
            log::Level::Error => web_sys::console::error_1(&line),
            log::Level::Warn => web_sys::console::warn_1(&line),
            log::Level::Info => web_sys::console::info_1(&line),
            _ => web_sys::console::debug_1(&line),
        }
    }

    fn flush(&self) {}
}

fn console_line(record: &log::Record) -> String {
    format!("[{}] {}", record.target(), record.args())
}

/// Installs the console logger when the module is instantiated.
#[cfg_attr(target_arch = "wasm32", wasm_bindgen(start))]
pub fn init_logging() {
    if log::set_logger(&CONSOLE_LOGGER).is_ok() {
        log::set_max_level(log::LevelFilter::Info);
    }
}

/// Sends stage labels to an optional JS callback and the browser console.
struct JsProgress(Option<Function>);

impl ProgressSink for JsProgress {
    fn stage(&mut self, label: &str) {
        web_sys::console::log_1(&label.into());
        if let Some(callback) = &self.0 {
            if let Err(e) = callback.call1(&JsValue::NULL, &JsValue::from_str(label)) {
                web_sys::console::warn_1(&e);
            }
        }
    }
}

#[wasm_bindgen]
pub fn compress_pdf(
    input: &[u8],
    quality: &str,
    progress: Option<Function>,
) -> Result<Vec<u8>, JsError> {
    let options = CompressOptions::with_tier(QualityTier::from_label(quality));
    let bytes = compress_document(input, &options, &mut JsProgress(progress))?;
    Ok(bytes)
}

/// Savings line for the result panel, e.g. `"1.5 KB (30%)"`.
#[wasm_bindgen]
pub fn format_savings(original: f64, compressed: f64) -> String {
    SavingsReport::new(original as u64, compressed as u64).saved_label()
}

#[wasm_bindgen]
pub struct PdfEditor {
    session: EditorSession,
}

#[wasm_bindgen]
impl PdfEditor {
    #[wasm_bindgen(constructor)]
    pub fn new(bytes: Vec<u8>, file_name: String, progress: Option<Function>) -> Result<PdfEditor, JsError> {
        let session = load_session(&file_name, bytes, &mut JsProgress(progress))?;
        Ok(PdfEditor { session })
    }

    pub fn toggle_deleted(&mut self, position: usize) -> Result<bool, JsError> {
        Ok(self.session.toggle_deleted(position)?)
    }

    pub fn swap_positions(&mut self, a: usize, b: usize) -> bool {
        self.session.swap_positions(a, b)
    }

    pub fn select_all(&mut self) {
        self.session.select_all();
    }

    pub fn restore_all(&mut self) {
        self.session.restore_all();
    }

    #[wasm_bindgen(getter)]
    pub fn total(&self) -> usize {
        self.session.stats().total
    }

    #[wasm_bindgen(getter)]
    pub fn deleted(&self) -> usize {
        self.session.stats().deleted
    }

    #[wasm_bindgen(getter)]
    pub fn remaining(&self) -> usize {
        self.session.stats().remaining
    }

    /// Source page indices in current display order, deleted pages included.
    pub fn order(&self) -> Vec<u32> {
        self.session
            .pages()
            .in_output_order()
            .into_iter()
            .map(|entry| entry.original_index() as u32)
            .collect()
    }

    pub fn is_deleted_at(&self, position: usize) -> bool {
        self.session
            .pages()
            .entry_at(position)
            .map(|entry| entry.is_deleted())
            .unwrap_or(false)
    }

    #[wasm_bindgen(getter)]
    pub fn output_file_name(&self) -> String {
        self.session.output_file_name().to_string()
    }

    pub fn save(&self, progress: Option<Function>) -> Result<Vec<u8>, JsError> {
        Ok(self.session.rebuild(&mut JsProgress(progress))?)
    }
}

/// Opens an editing session, typing the upload by its name and magic bytes.
fn load_session<P>(file_name: &str, bytes: Vec<u8>, progress: &mut P) -> crate::Result<EditorSession>
where
    P: ProgressSink + ?Sized,
{
    let mime = detect_mime(Some(file_name), &bytes);
    EditorSession::load(file_name, mime, bytes, progress)
}
