use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use pdf_tools_rust::input::{compressed_file_name, detect_mime, EDITED_FILE_NAME};
use pdf_tools_rust::{
    compress_upload, format_file_size, BlankPageRenderer, CompressOptions, EditorSession,
    LogProgress, QualityTier,
};

/// Shrink PDFs, or reorder and delete their pages
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Re-save a PDF with object streams, optionally shrinking pages and images
    Compress {
        /// Input PDF file
        input: PathBuf,

        /// Output PDF file (defaults to compressed_<input name> next to the input)
        output: Option<PathBuf>,

        /// Quality tier; `low` also shrinks page geometry to 75%
        #[arg(long, value_enum, default_value_t = QualityTier::Medium)]
        quality: QualityTier,

        /// Re-encode embedded images as JPEG at the tier's quality
        #[arg(long)]
        recompress_images: bool,

        /// Max image dimension (longer side) when recompressing images
        #[arg(long, default_value_t = 1500)]
        max_dim: u32,
    },

    /// Reorder and delete pages, then write the remaining pages to a new PDF
    Edit {
        /// Input PDF file
        input: PathBuf,

        /// Output PDF file (defaults to edited.pdf next to the input)
        output: Option<PathBuf>,

        /// Swap the pages at two 0-based positions, e.g. `0:2`. Applied in order, before deletions
        #[arg(long, value_parser = parse_swap)]
        swap: Vec<(usize, usize)>,

        /// Toggle deletion of the page at a 0-based position (after swaps)
        #[arg(long)]
        delete: Vec<usize>,

        /// Mark every page deleted before applying --delete toggles
        #[arg(long)]
        select_all: bool,

        /// Restore every page before applying --delete toggles
        #[arg(long, conflicts_with = "select_all")]
        restore_all: bool,

        /// Write page previews as PNG files into this directory
        #[arg(long)]
        thumbnails: Option<PathBuf>,
    },
}

fn parse_swap(value: &str) -> Result<(usize, usize), String> {
    let (a, b) = value
        .split_once(':')
        .ok_or_else(|| format!("expected A:B, got {:?}", value))?;
    let a = a.trim().parse().map_err(|e| format!("bad position {:?}: {}", a, e))?;
    let b = b.trim().parse().map_err(|e| format!("bad position {:?}: {}", b, e))?;
    Ok((a, b))
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    match args.command {
        Command::Compress {
            input,
            output,
            quality,
            recompress_images,
            max_dim,
        } => {
            let options = CompressOptions {
                tier: quality,
                recompress_images,
                max_image_dim: max_dim,
            };
            compress(&input, output, &options)
        }
        Command::Edit {
            input,
            output,
            swap,
            delete,
            select_all,
            restore_all,
            thumbnails,
        } => {
            let edits = Edits {
                swaps: swap,
                deletes: delete,
                select_all,
                restore_all,
            };
            edit(&input, output, &edits, thumbnails.as_deref())
        }
    }
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("{:?} is not a file", path))
}

fn sibling(input: &Path, name: &str) -> PathBuf {
    input.with_file_name(name)
}

fn compress(input: &Path, output: Option<PathBuf>, options: &CompressOptions) -> Result<()> {
    let name = file_name(input)?;
    let bytes = std::fs::read(input).with_context(|| format!("Failed to read {:?}", input))?;
    let mime = detect_mime(Some(&name), &bytes);

    let start = Instant::now();
    let result = compress_upload(&name, mime, &bytes, options, &mut LogProgress)?;
    println!("Compressed in {:.2?}", start.elapsed());

    let output = output.unwrap_or_else(|| sibling(input, &compressed_file_name(&name)));
    std::fs::write(&output, &result.bytes)
        .with_context(|| format!("Failed to write {:?}", output))?;

    println!("Original size: {}", format_file_size(result.report.original));
    println!("New size:      {}", format_file_size(result.report.compressed));
    println!("Saved:         {}", result.report.saved_label());
    println!("Wrote {:?}", output);
    Ok(())
}

struct Edits {
    swaps: Vec<(usize, usize)>,
    deletes: Vec<usize>,
    select_all: bool,
    restore_all: bool,
}

fn edit(input: &Path, output: Option<PathBuf>, edits: &Edits, thumbnails: Option<&Path>) -> Result<()> {
    let name = file_name(input)?;
    let bytes = std::fs::read(input).with_context(|| format!("Failed to read {:?}", input))?;
    let mime = detect_mime(Some(&name), &bytes);
    let mut session = EditorSession::load(&name, mime, bytes, &mut LogProgress)?;

    if let Some(dir) = thumbnails {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
        session.render_thumbnails(&mut BlankPageRenderer, &mut LogProgress)?;
        for entry in session.pages().entries() {
            if let Some(thumbnail) = &entry.thumbnail {
                let path = dir.join(format!("page-{}.png", entry.original_index() + 1));
                thumbnail.save_png(&path)?;
            }
        }
    }

    if edits.restore_all {
        session.restore_all();
    }
    if edits.select_all {
        session.select_all();
    }
    for &(a, b) in &edits.swaps {
        if !session.swap_positions(a, b) {
            log::warn!("Ignoring swap {}:{}, position out of range", a, b);
        }
    }
    for &position in &edits.deletes {
        session.toggle_deleted(position)?;
    }

    let stats = session.stats();
    println!(
        "Pages: {} total, {} deleted, {} remaining",
        stats.total, stats.deleted, stats.remaining
    );

    let rebuilt = session.rebuild(&mut LogProgress)?;
    let output = output.unwrap_or_else(|| sibling(input, EDITED_FILE_NAME));
    std::fs::write(&output, &rebuilt).with_context(|| format!("Failed to write {:?}", output))?;

    println!("PDF saved: {} of {} pages", stats.remaining, stats.total);
    println!("Wrote {:?}", output);
    Ok(())
}
