/// Module for the track catalog and directory scanning
pub mod catalog;
/// Module for error handling
pub mod error;
/// Module for driving the external merge tooling
pub mod merge;
/// Module for establishing the canonical play order
pub mod order;
/// Module for part and chapter planning
pub mod plan;
/// Module for book integrity checks
pub mod validate;

use std::fs;
use std::path::PathBuf;

use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};

use crate::catalog::Catalog;
use crate::error::{BookError, Error};

/// A book whose representative track already runs longer than this is assumed
/// to be merged and is skipped (1 hour).
pub const DEFAULT_LONG_ENOUGH_MS: u64 = 3_600_000;
/// Ceiling for one output part (6.5 hours).
pub const DEFAULT_MAX_PART_MS: u64 = 23_400_000;

/// Configuration options for the bundling run
#[derive(Debug, Clone)]
pub struct BundleOptions {
    /// Directory tree holding the per-track source files
    pub source_dir: PathBuf,
    /// Root of the output tree: `<target>/<author>/<book title>/...`
    pub target_dir: PathBuf,
    /// Staging directory, wiped and rebuilt for every book
    pub work_dir: PathBuf,
    /// Representative-track duration above which a book counts as already merged
    pub long_enough_ms: u64,
    /// Maximum duration of one output part
    pub max_part_ms: u64,
    /// Prefix for generated chapter titles ("Chapter " -> "Chapter 1", ...)
    pub chapter_prefix: String,
}

impl Default for BundleOptions {
    fn default() -> Self {
        BundleOptions {
            source_dir: PathBuf::from("."),
            target_dir: PathBuf::from("target"),
            work_dir: std::env::temp_dir().join("bookbind"),
            long_enough_ms: DEFAULT_LONG_ENOUGH_MS,
            max_part_ms: DEFAULT_MAX_PART_MS,
            chapter_prefix: "Chapter ".to_string(),
        }
    }
}

/// Bundle every complete book found under the source directory into chaptered
/// output files: scan, validate, order, plan, merge, tag.
///
/// Books that fail validation or cannot be ordered are skipped with a logged
/// reason. Books whose external tooling fails count as errors but do not stop
/// the run; the final result reports them in aggregate.
pub fn bundle_books(options: &BundleOptions) -> Result<(), Error> {
    // 1. Validate options
    validate_options(options)?;

    // 2. Discover and index the source tracks
    info!("Discovering audio files in {:?}...", options.source_dir);
    let mut catalog = catalog::scan_directory(&options.source_dir);
    if catalog.is_empty() {
        info!("No audio files found.");
        return Ok(());
    }
    info!(
        "Found {} tracks across {} books.",
        catalog.track_count(),
        catalog.book_count()
    );

    // 3. Drop incomplete or inconsistent books before any expensive work
    let rejected = validate::prune_catalog(&mut catalog, options.long_enough_ms);
    if rejected > 0 {
        info!("{} books failed integrity checks and were skipped.", rejected);
    }
    if catalog.is_empty() {
        info!("Nothing left to process.");
        return Ok(());
    }

    // 4. Merge the surviving books, one at a time
    let books = catalog.books();
    let pb = ProgressBar::new(books.len() as u64);
    pb.set_style(ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}").expect("Internal Error: Failed to set progress bar style")
        .progress_chars("#>-"));
    pb.set_message("Merging books");

    let mut success_count = 0;
    let mut error_count = 0;
    for (author, book) in books {
        pb.set_message(format!("{author}: {book}"));
        match process_one(&catalog, &author, &book, options) {
            Ok(()) => success_count += 1,
            Err(Error::Book {
                author,
                book,
                source: BookError::NoDiskInfo,
            }) => {
                // not an error: the book simply cannot be ordered
                warn!("skipping \"{}: {}\": no disk numbering information", author, book);
            }
            Err(e) => {
                error!("Error: {}", e);
                error_count += 1;
            }
        }
        pb.inc(1);
    }
    pb.finish_with_message("Merging done");

    // 5. Report final status
    info!(
        "Processing complete. {} books succeeded, {} books failed.",
        success_count, error_count
    );
    if error_count > 0 {
        Err(Error::BooksFailed(error_count))
    } else {
        Ok(())
    }
}

/// Order, plan and merge a single book.
fn process_one(
    catalog: &Catalog,
    author: &str,
    book: &str,
    options: &BundleOptions,
) -> Result<(), Error> {
    let Some(tracks) = catalog.lookup(author, book) else {
        return Ok(());
    };

    let ordered = order::order_tracks(tracks).map_err(|source| book_error(author, book, source))?;
    let plan = plan::plan_book(author, book, ordered, options.max_part_ms);
    info!(
        "{}: {}: {} tracks, {} ms total, {} part(s) of up to {} ms",
        author,
        book,
        plan.tracks.len(),
        plan.total_ms,
        plan.parts,
        plan.part_budget_ms
    );
    merge::process_book(&plan, options).map_err(|source| book_error(author, book, source))?;
    Ok(())
}

fn book_error(author: &str, book: &str, source: BookError) -> Error {
    Error::Book {
        author: author.to_string(),
        book: book.to_string(),
        source,
    }
}

/// Check the run configuration before any work begins. Configuration
/// problems are the only failures that abort the whole run up front.
fn validate_options(options: &BundleOptions) -> Result<(), Error> {
    if !options.source_dir.is_dir() {
        return Err(Error::InvalidOptions(format!(
            "Source path is not a valid directory: {:?}",
            options.source_dir
        )));
    }
    if options.max_part_ms == 0 {
        return Err(Error::InvalidOptions(
            "Maximum part duration must be greater than zero".to_string(),
        ));
    }
    if !options.target_dir.exists() {
        fs::create_dir_all(&options.target_dir).map_err(|e| Error::Io {
            path: options.target_dir.clone(),
            source: e,
        })?;
        info!("Created target directory: {:?}", options.target_dir);
    } else if !options.target_dir.is_dir() {
        return Err(Error::InvalidOptions(format!(
            "Target path exists but is not a directory: {:?}",
            options.target_dir
        )));
    }
    Ok(())
}
